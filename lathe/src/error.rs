use thiserror::Error;

/// Errors raised while building or driving a harness.
///
/// Timeouts and aborts are deliberately absent: they end a benchmark early
/// and show up as fewer completed runs in the result.
#[derive(Debug, Error)]
pub enum Error {
    /// The harness was built without a task to drive.
    #[error("a task must be set before the harness can be built")]
    MissingTask,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cooperative driver needs coordinated-omission correction.
    #[error("cooperative scheduling requires coordinated-omission correction to be enabled")]
    CoordinatedOmissionRequired,

    /// The event loop finished without the measure handler publishing a result.
    #[error("the benchmark finished without publishing a result")]
    NoResult,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
