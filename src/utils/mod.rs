//! Shared utilities: tensor addressing, random numbers, activation functions
//! and learning-rate schedules.

pub mod activations;
pub mod index3d;
pub mod lr_scheduler;
pub mod rng;

pub use activations::Activation;
pub use index3d::Index3D;
pub use rng::SimpleRng;
