//! Error type shared by every fallible operation in the crate.
//!
//! Configuration problems (bad geometry, mismatched chaining, malformed
//! connection tables or config files) are detected when layers are built or
//! appended to a [`Network`](crate::network::Network). The numeric kernels
//! themselves never return errors.

use thiserror::Error;

/// Errors raised while building, configuring, training or persisting a network.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// A layer's expected input does not match the size it is fed.
    #[error("shape mismatch: {context} expects {expected} values, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// Connection table dimensions disagree with the layer's channel counts.
    #[error("invalid connection table: {0}")]
    InvalidConnectionTable(String),

    /// Layer geometry that cannot produce a valid output shape.
    #[error("invalid layer: {0}")]
    InvalidLayer(String),

    /// Semantically invalid JSON configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Layers cannot be appended once the chain has been used.
    #[error("layer chain is frozen after the first forward or train call")]
    ChainFrozen,

    /// Forward/train called on a network without layers.
    #[error("network has no layers")]
    EmptyNetwork,

    /// Training or test data that does not line up.
    #[error("data mismatch: {0}")]
    DataMismatch(String),

    /// Malformed weight stream.
    #[error("weight stream: {0}")]
    Weights(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, NetworkError>;
