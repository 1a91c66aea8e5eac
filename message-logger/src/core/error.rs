/*!
Error types shared across the logger core
*/

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoggerError>;

/// Failures the logger can surface. Proxy lookups are advisory and never
/// reach this type; they are swallowed inside the resolver task.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Filesystem failure while touching a log file or the log directory.
    #[error("log io error at {}: {source}", .path.display())]
    LogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A log entry or message snapshot could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Invalid or unusable configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
