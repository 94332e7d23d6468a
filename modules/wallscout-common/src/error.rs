use thiserror::Error;

#[derive(Error, Debug)]
pub enum WallScoutError {
    /// Malformed source parameters or an upstream response of the wrong shape.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required field is missing from an enrichment record.
    #[error("Data shape error: {0}")]
    DataShape(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
