//! Error types for Drivescore
//!
//! Provides a unified error type and domain-specific error variants.
//!
//! Per-value decryption faults are deliberately absent: the field codec
//! reports them as `None` and they never reach this type.

use thiserror::Error;

/// Result type alias using DrivescoreError
pub type Result<T> = std::result::Result<T, DrivescoreError>;

/// Unified error type for Drivescore operations
#[derive(Debug, Error)]
pub enum DrivescoreError {
    // Batch validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // Risk model errors
    #[error("Model inference error: {0}")]
    Model(#[from] ModelError),

    // Crypto errors
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DrivescoreError {
    /// Stable numeric code for the error family.
    pub fn code(&self) -> u32 {
        match self {
            DrivescoreError::Config(_) => 10,
            DrivescoreError::Validation(_) => 20,
            DrivescoreError::Model(_) => 30,
            DrivescoreError::Crypto(_) => 40,
            DrivescoreError::Storage(_) => 50,
            DrivescoreError::Serialization(_) => 60,
            DrivescoreError::Internal(_) => 90,
        }
    }

    /// True for errors that must halt initialization.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DrivescoreError::Config(_))
    }
}

/// Write-time validation errors. Any of these rejects the whole batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("row {row}: missing required fields: {}", fields.join(", "))]
    MissingFields { row: usize, fields: Vec<String> },

    #[error("row {row}: unknown road type '{value}'")]
    UnknownRoadType { row: usize, value: String },

    #[error("row {row}: empty {field}")]
    EmptyIdentifier { row: usize, field: &'static str },

    #[error("trip has no samples")]
    EmptyTrip,

    #[error("trip {expected} mixed with samples from trip {actual}")]
    MixedTrip { expected: String, actual: String },

    #[error("trip {trip_id} belongs to driver {expected}, found sample for driver {actual}")]
    DriverMismatch {
        trip_id: String,
        expected: String,
        actual: String,
    },
}

/// Risk model errors. Surfaced to the caller, never replaced by a default score.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model returned non-finite score {score} at row {row}")]
    NonFiniteScore { row: usize, score: f64 },

    #[error("model returned {actual} scores for {expected} rows")]
    BatchSizeMismatch { expected: usize, actual: usize },

    #[error("invalid model definition: {0}")]
    InvalidModel(String),
}

/// Cryptographic operation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    #[error("Encryption failed")]
    EncryptionFailed,
}

impl From<serde_json::Error> for DrivescoreError {
    fn from(err: serde_json::Error) -> Self {
        DrivescoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for DrivescoreError {
    fn from(err: std::io::Error) -> Self {
        DrivescoreError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DrivescoreError::Validation(ValidationError::MissingFields {
            row: 3,
            fields: vec!["road_type".to_string(), "speed".to_string()],
        });
        let msg = err.to_string();
        assert!(msg.contains("row 3"));
        assert!(msg.contains("road_type, speed"));
    }

    #[test]
    fn test_model_error() {
        let err = ModelError::BatchSizeMismatch {
            expected: 3,
            actual: 2,
        };
        assert!(err.to_string().contains("2 scores for 3 rows"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(DrivescoreError::Config("x".into()).code(), 10);
        assert_eq!(
            DrivescoreError::from(ValidationError::EmptyTrip).code(),
            20
        );
        assert_eq!(
            DrivescoreError::from(ModelError::Inference("down".into())).code(),
            30
        );
        assert!(DrivescoreError::Config("missing key".into()).is_fatal());
        assert!(!DrivescoreError::Storage("io".into()).is_fatal());
    }
}
