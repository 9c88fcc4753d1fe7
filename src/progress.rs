//! Search progress reporting.
//!
//! Reports what a running `rfind search` is doing: which phase it is in,
//! how far the cache lookup and the walk have come, and each match as it is
//! found. Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use reference_finder_core::SearchResult;

use crate::events::{SearchObserver, SearchOutcome, SearchPhase};

/// Human-friendly progress on stderr: "walk  1,234 / 5,000 directories".
///
/// Walk progress is printed once per whole percent so large trees do not
/// flood the terminal.
#[derive(Default)]
pub struct StderrProgress {
    last_percent: Mutex<Option<u64>>,
}

impl StderrProgress {
    fn line(&self, line: String) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", line);
        let _ = err.flush();
    }
}

impl SearchObserver for StderrProgress {
    fn on_phase(&self, phase: SearchPhase) {
        let label = match phase {
            SearchPhase::Idle => return,
            SearchPhase::CacheLookup => "search  checking cache...",
            SearchPhase::Walk => "search  walking roots...",
            SearchPhase::Completed => "search  done",
            SearchPhase::Interrupted => "search  interrupted",
        };
        self.line(label.to_string());
    }

    fn on_result(&self, result: &SearchResult) {
        self.line(format!(
            "match  [{}] {}  {}",
            result.query,
            result.kind,
            result.path.display()
        ));
    }

    fn on_directory_processed(&self, completed: usize, total: usize, _path: &Path) {
        let percent = (completed as u64 * 100) / total.max(1) as u64;
        let mut last = self.last_percent.lock();
        if *last == Some(percent) {
            return;
        }
        *last = Some(percent);
        self.line(format!(
            "walk  {} / {} directories",
            format_number(completed as u64),
            format_number(total as u64)
        ));
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn emit(&self, obj: serde_json::Value) {
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

impl SearchObserver for JsonProgress {
    fn on_phase(&self, phase: SearchPhase) {
        self.emit(serde_json::json!({ "event": "phase", "phase": phase }));
    }

    fn on_result(&self, result: &SearchResult) {
        self.emit(serde_json::json!({ "event": "result", "result": result }));
    }

    fn on_db_progress(&self, fraction: f64) {
        self.emit(serde_json::json!({ "event": "progress", "phase": "cache_lookup", "fraction": fraction }));
    }

    fn on_walk_progress(&self, fraction: f64) {
        self.emit(serde_json::json!({ "event": "progress", "phase": "walk", "fraction": fraction }));
    }

    fn on_directory_processed(&self, completed: usize, total: usize, path: &Path) {
        self.emit(serde_json::json!({
            "event": "directory",
            "n": completed,
            "total": total,
            "path": path.display().to_string()
        }));
    }

    fn on_completed(&self, outcome: &SearchOutcome) {
        self.emit(serde_json::json!({
            "event": "completed",
            "state": outcome.state,
            "summary": outcome.summary
        }));
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SearchObserver for NoProgress {}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn observer(&self) -> Arc<dyn SearchObserver> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress::default()),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "unknown progress mode '{}': expected human, json or off",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_mode_parses() {
        assert_eq!("human".parse::<ProgressMode>().unwrap(), ProgressMode::Human);
        assert_eq!("json".parse::<ProgressMode>().unwrap(), ProgressMode::Json);
        assert_eq!("off".parse::<ProgressMode>().unwrap(), ProgressMode::Off);
        assert!("loud".parse::<ProgressMode>().is_err());
    }

    #[test]
    fn human_walk_progress_is_throttled_per_percent() {
        let p = StderrProgress::default();
        p.on_directory_processed(1, 1000, Path::new("/a"));
        p.on_directory_processed(2, 1000, Path::new("/b"));
        assert_eq!(*p.last_percent.lock(), Some(0));
        p.on_directory_processed(10, 1000, Path::new("/c"));
        assert_eq!(*p.last_percent.lock(), Some(1));
    }
}
