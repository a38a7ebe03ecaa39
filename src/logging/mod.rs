pub mod buffer;
pub mod run_logger;

pub use buffer::{LogEntry, MessageBuffer, MessageSeverity};
pub use run_logger::RunLogger;
