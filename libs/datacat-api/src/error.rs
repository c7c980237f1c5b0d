use std::fmt::Display;
use std::io;

/// Failure raised by a Source, Serializer or Sink.
///
/// Each variant carries its own context in the message, so the orchestrator
/// only has to name the stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Reading the data set or writing to the destination failed.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// Malformed input or a record that cannot be encoded.
    #[error("{0}")]
    Format(String),

    /// A stage parameter is invalid. Raised while resolving stages.
    #[error("{0}")]
    Config(String),

    /// The destination refused or failed to acknowledge a record.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// `output()` called before `init()` succeeded.
    #[error("{0} sink used before init")]
    NotReady(&'static str),
}

impl StageError {
    /// `map_err` adapter: io error annotated with what was being accessed.
    pub fn io_at(what: impl Display) -> impl FnOnce(io::Error) -> Self {
        move |e| StageError::Io(io::Error::new(e.kind(), format!("{what}: {e}")))
    }

    /// Prefix the message with the file or record it came from.
    pub fn at(self, what: impl Display) -> Self {
        match self {
            StageError::Io(e) => StageError::Io(io::Error::new(e.kind(), format!("{what}: {e}"))),
            StageError::Format(msg) => StageError::Format(format!("{what}: {msg}")),
            StageError::Config(msg) => StageError::Config(format!("{what}: {msg}")),
            StageError::Delivery(msg) => StageError::Delivery(format!("{what}: {msg}")),
            other @ StageError::NotReady(_) => other,
        }
    }
}

impl From<serde_json::Error> for StageError {
    fn from(e: serde_json::Error) -> Self {
        StageError::Format(e.to_string())
    }
}
