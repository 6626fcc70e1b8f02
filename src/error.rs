use thiserror::Error;

/// Error taxonomy for the station core.
///
/// Per-item failures (one frame, one command) are recovered where they occur
/// and never surface through this type; batch-level preconditions (device open,
/// zero usable frames) do.
#[derive(Debug, Error)]
pub enum QcError {
    #[error("Initialization error: {0}")]
    Init(String),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Capture failed: {0}")]
    CaptureBatch(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Command send error: {0}")]
    CommandSend(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Config error: {0}")]
    Config(String),
}
