//! Time-stamped node log lines.
//!
//! Every line a node writes has the shape
//! `"<ss>.<mmm> - <node> : <message>"`, where the time is measured from the
//! start of the simulation (two-digit seconds, three-digit milliseconds).
//! Where the lines go is up to the [`LogSink`].

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::sync::lock;

/// Destination for node log lines. Receives one formatted line per call.
pub trait LogSink: Send + Sync + Debug {
    fn write_line(&self, line: &str);
}

/// Prints lines to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

/// Forwards lines to `tracing` at INFO level under the `meridian::node`
/// target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&self, line: &str) {
        tracing::info!(target: "meridian::node", "{line}");
    }
}

/// Keeps lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line written so far.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    /// Lines containing `needle`.
    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        lock(&self.lines)
            .iter()
            .filter(|line| line.contains(needle))
            .cloned()
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &str) {
        lock(&self.lines).push(line.to_string());
    }
}

/// Built-in sink selection, as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkKind {
    #[default]
    Stdout,
    Tracing,
}

impl SinkKind {
    pub(crate) fn build(self) -> Arc<dyn LogSink> {
        match self {
            Self::Stdout => Arc::new(StdoutSink),
            Self::Tracing => Arc::new(TracingSink),
        }
    }
}

/// Formats one log line.
pub fn format_line(elapsed: Duration, node: &str, message: &str) -> String {
    let millis = elapsed.as_millis();
    format!(
        "{:02}.{:03} - {node} : {message}",
        millis / 1000,
        millis % 1000
    )
}

/// A sink paired with the instant the simulation started.
#[derive(Debug, Clone)]
pub(crate) struct Journal {
    start: Instant,
    sink: Arc<dyn LogSink>,
}

impl Journal {
    pub(crate) fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            start: Instant::now(),
            sink,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub(crate) fn write(&self, node: &str, message: &str) {
        self.sink
            .write_line(&format_line(self.elapsed(), node, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(3_417, "03.417" ; "seconds and millis")]
    #[test_case(0, "00.000" ; "start")]
    #[test_case(999, "00.999" ; "just under a second")]
    #[test_case(61_005, "61.005" ; "past a minute")]
    #[test_case(125_040, "125.040" ; "three digit seconds")]
    fn line_timestamp(ms: u64, stamp: &str) {
        let line = format_line(Duration::from_millis(ms), "S1", "starting");
        assert_eq!(line, format!("{stamp} - S1 : starting"));
    }

    #[test]
    fn memory_sink_collects_in_order() {
        let sink = Arc::new(MemorySink::new());
        let journal = Journal::new(sink.clone());
        journal.write("C1", "first");
        journal.write("C1", "second");

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - C1 : first"));
        assert!(lines[1].ends_with(" - C1 : second"));
        assert_eq!(sink.lines_containing("second").len(), 1);
    }
}
