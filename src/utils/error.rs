use thiserror::Error;

/// Fatal errors. Anything that only affects a single image is reported
/// through `BandOutcome` or `MrzResult` instead.
#[derive(Debug, Error)]
pub enum MrzError {
    #[error("Image processing error: {0}")]
    ImageProcessingError(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Catalog error: {0}")]
    CatalogError(String),
    #[error("Training error: {0}")]
    TrainingError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MrzError>;
