pub mod logger;
pub mod workspace;

pub use logger::{ActionLog, ConsoleSink, FileSink, LogSink, MemorySink, Outcome};
pub use workspace::{timestamp, RunWorkspace};
