use thiserror::Error;

/// Application-wide error types for the harvester.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (non-success status, unreadable body, bad URL).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The listing page had no table, or the table had no data rows.
    #[error("No data found: {0}")]
    NoDataFound(String),

    /// A requested band is not one of the supported bands.
    #[error("Unsupported band '{0}'")]
    InvalidBand(String),

    /// Invalid or missing configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Scratch directory or file operation failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// CSV snapshot writing failed.
    #[error("CSV error: {0}")]
    CsvError(String),
}

impl AppError {
    /// Returns true if this error came from the transport rather than the content.
    pub fn is_network(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::CsvError(e.to_string())
    }
}
