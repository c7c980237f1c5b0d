#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    #[error("rate must be a positive finite number of records per second, got {0}")]
    InvalidRate(f64),

    #[error("invalid slice: {0}")]
    InvalidSlice(String),

    #[error("record {index}: timing field '{field}' is missing")]
    MissingField { field: String, index: usize },

    #[error("timing field '{field}': cannot parse {raw:?}: {reason}")]
    Timestamp { field: String, raw: String, reason: String },
}
