pub mod log;

pub use log::{LogRecord, NewLogRecord};
