//! Error Handling Module
//!
//! Defines the error type shared by every stage of the classification
//! pipeline. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for PlantVillage inference operations
#[derive(Error, Debug)]
pub enum PlantVillageError {
    /// The input bytes are not a decodable (or accepted) still image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Model manifest or weights file does not exist
    #[error("Model artifact not found: {0}")]
    ArtifactNotFound(PathBuf),

    /// Model artifact exists but cannot be turned into a network
    #[error("Failed to deserialize model artifact: {0}")]
    Deserialization(String),

    /// A tensor or table does not have the size the consumer expects
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Label index outside of the label table
    #[error("Label index {index} is out of range for a table of {len} labels")]
    OutOfRange { index: usize, len: usize },

    /// The forward pass produced something that cannot be read back
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error while writing artifacts or reports
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for PlantVillage inference operations
pub type Result<T> = std::result::Result<T, PlantVillageError>;

impl PlantVillageError {
    /// Whether the error was caused by the uploaded image rather than the model
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::ShapeMismatch { .. })
    }
}
