use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Duplicate key: {0} is already tracked")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TrackerError {
    /// Only a lost store stops an operation; everything else is reported per ticker.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrackerError::StoreUnavailable(_))
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
