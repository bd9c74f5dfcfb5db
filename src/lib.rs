//! Tiny ConvNet Library
//!
//! A small neural-network training library in the LeNet tradition: convolution,
//! pooling, fully-connected, dropout and GHH layers chained into a feed-forward
//! [`Network`], trained by backpropagation with pluggable losses and optimizers.
//!
//! Convolution and average pooling are thin wrappers over one sparse
//! weighted-sum engine, [`layers::PartialConnectedLayer`], which stores each
//! layer as an explicit list of (input, output, weight) links.
//!
//! # Modules
//!
//! - `layers`: Layer trait, partial-connected engine and concrete layers
//! - `network`: Layer chain, training loop, evaluation and weight persistence
//! - `loss`: Loss functions evaluated at the network output
//! - `optimizers`: Optimizer trait and implementations (SGD, Momentum, Levenberg-Marquardt, Adam)
//! - `utils`: Index3D, RNG, activation functions, learning-rate schedules
//! - `config`: Training configuration structures
//! - `architecture`: Architecture configuration and network building
//! - `result`: Test summary with confusion matrix
//! - `error`: Crate error type

pub mod architecture;
pub mod config;
pub mod error;
pub mod layers;
pub mod loss;
pub mod network;
pub mod optimizers;
pub mod result;
pub mod utils;

pub use error::{NetworkError, Result};
pub use loss::Loss;
pub use network::{Network, NetworkState};
pub use result::TestResult;
