use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Outcome tag printed at the start of every action log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Boot,
    Ok,
    Click,
    Navigate,
    Wait,
    Input,
    Storage,
    Accepted,
    Failure,
    Search,
    Target,
    Measure,
    Screenshot,
    Keys,
    File,
    Moved,
    Deleted,
    Warning,
    Display,
    Finish,
}

impl Outcome {
    pub fn tag(&self) -> &'static str {
        match self {
            Outcome::Boot => "🤖",
            Outcome::Ok => "👌",
            Outcome::Click => "👆",
            Outcome::Navigate => "🌐",
            Outcome::Wait => "⏳",
            Outcome::Input => "📝",
            Outcome::Storage => "💾",
            Outcome::Accepted => "✅",
            Outcome::Failure => "❌",
            Outcome::Search => "🔍",
            Outcome::Target => "🎯",
            Outcome::Measure => "📏",
            Outcome::Screenshot => "📷",
            Outcome::Keys => "🔄",
            Outcome::File => "📁",
            Outcome::Moved => "🚚",
            Outcome::Deleted => "🗑️",
            Outcome::Warning => "⚠️",
            Outcome::Display => "🖥️",
            Outcome::Finish => "🏁",
        }
    }
}

/// Destination for formatted action log lines
pub trait LogSink: Send + Sync {
    fn append(&self, line: &str) -> std::io::Result<()>;
}

/// Appends lines to a file, opening it in append mode per write
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

/// Mirrors lines to standard output
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)
    }
}

/// Keeps lines in memory; used to inspect a run without touching the filesystem
#[derive(Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl LogSink for MemorySink {
    fn append(&self, line: &str) -> std::io::Result<()> {
        self.lines
            .lock()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?
            .push(line.to_string());
        Ok(())
    }
}

/// Format a single log line: `[<tag>] <YYYY-MM-DD HH:MM:SS> - <message>`
pub fn format_line(outcome: Outcome, message: &str) -> String {
    format!(
        "[{}] {} - {}",
        outcome.tag(),
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    )
}

/// Append-only action log for a run.
///
/// Writes are synchronous and happen in call order. A sink failure is reported
/// once through tracing and never returned to the caller.
#[derive(Clone)]
pub struct ActionLog {
    sinks: Arc<Vec<Arc<dyn LogSink>>>,
    write_failed: Arc<AtomicBool>,
}

impl ActionLog {
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
            write_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// File log at `path`, mirrored to stdout
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self::new(vec![
            Arc::new(FileSink::new(path)) as Arc<dyn LogSink>,
            Arc::new(ConsoleSink),
        ])
    }

    pub fn record(&self, outcome: Outcome, message: impl AsRef<str>) {
        let line = format_line(outcome, message.as_ref());
        for sink in self.sinks.iter() {
            if let Err(e) = sink.append(&line) {
                if !self.write_failed.swap(true, Ordering::SeqCst) {
                    tracing::error!("Failed to write action log line: {}", e);
                }
            }
        }
    }

    pub fn ok(&self, message: impl AsRef<str>) {
        self.record(Outcome::Ok, message);
    }

    pub fn failure(&self, message: impl AsRef<str>) {
        self.record(Outcome::Failure, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.record(Outcome::Warning, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSink;

    impl LogSink for BrokenSink {
        fn append(&self, _line: &str) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"))
        }
    }

    #[test]
    fn test_line_format() {
        let line = format_line(Outcome::Click, "Clicked element css=#go");
        assert!(line.starts_with("[👆] "));
        assert!(line.ends_with(" - Clicked element css=#go"));
        // "[👆] " + "YYYY-MM-DD HH:MM:SS" + " - "
        let stamp = line.split("] ").nth(1).unwrap().split(" - ").next().unwrap();
        assert_eq!(stamp.len(), 19);
    }

    #[test]
    fn test_lines_keep_call_order() {
        let memory = MemorySink::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actions.log");
        let log = ActionLog::new(vec![
            Arc::new(FileSink::new(&path)) as Arc<dyn LogSink>,
            Arc::new(memory.clone()),
        ]);

        for i in 0..25 {
            log.ok(format!("event {}", i));
        }

        let file_lines: Vec<String> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(file_lines, memory.lines());
        for (i, line) in file_lines.iter().enumerate() {
            assert!(line.ends_with(&format!(" - event {}", i)));
        }
    }

    #[test]
    fn test_broken_sink_does_not_stop_others() {
        let memory = MemorySink::new();
        let log = ActionLog::new(vec![
            Arc::new(BrokenSink) as Arc<dyn LogSink>,
            Arc::new(memory.clone()),
        ]);

        log.failure("first");
        log.failure("second");

        assert_eq!(memory.lines().len(), 2);
        assert!(log.write_failed.load(Ordering::SeqCst));
    }
}
