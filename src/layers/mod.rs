//! Layer abstractions for neural networks
//!
//! This module provides the Layer trait, the partial-connected engine shared by
//! convolution and average pooling, and the concrete layer types a network
//! chain is built from.

pub(crate) mod r#trait;
pub mod buffers;
pub mod connection_table;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod ghh;
pub mod partial_connected;
pub mod pooling;

// Re-export the Layer trait for convenience
pub use buffers::LayerBuffers;
pub use connection_table::ConnectionTable;
pub use conv2d::{Conv2DLayer, Padding};
pub use dense::DenseLayer;
pub use dropout::{DropoutLayer, DropoutMode, Phase};
pub use ghh::GhhActivationLayer;
pub use partial_connected::{PartialConnectedLayer, WeightLink};
pub use pooling::{AveragePoolingLayer, MaxPoolingLayer};
pub use r#trait::Layer;
