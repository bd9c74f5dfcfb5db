//! Optimizer abstractions for weight updates.
//!
//! After a minibatch the network hands every parameter vector (each layer's
//! weights, then its biases) to the optimizer together with the averaged
//! gradient. Stateful optimizers keep their per-vector state keyed by a
//! [`ParamKey`], created lazily on the first update of that vector and kept
//! until [`Optimizer::reset`] or until the optimizer is replaced.
//!
//! # Available Optimizers
//!
//! - [`SGD`]: plain gradient descent with optional L2 weight decay
//! - [`Momentum`]: gradient descent with a velocity term
//! - [`LevenbergMarquardt`]: gradient descent scaled by the Hessian diagonal
//! - [`Adam`]: adaptive moment estimation
//!
//! # Example
//!
//! ```
//! use tiny_convnet::optimizers::{Adam, Optimizer, ParamKey};
//!
//! let mut optimizer = Adam::new(0.001, 0.9, 0.999, 1e-8);
//! let mut weights = vec![1.0, 2.0, 3.0];
//! optimizer.update(ParamKey::weights(0), &mut weights, &[0.1, 0.2, 0.3]);
//! assert!(weights[0] < 1.0);
//! ```

pub mod adam;
pub mod levenberg_marquardt;
pub mod momentum;
pub mod sgd;

pub use adam::Adam;
pub use levenberg_marquardt::LevenbergMarquardt;
pub use momentum::Momentum;
pub use sgd::SGD;

/// Which parameter vector of a layer an update refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamSlot {
    Weights,
    Biases,
}

/// Stable identity of one parameter vector inside a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamKey {
    pub layer: usize,
    pub slot: ParamSlot,
}

impl ParamKey {
    pub fn weights(layer: usize) -> Self {
        Self {
            layer,
            slot: ParamSlot::Weights,
        }
    }

    pub fn biases(layer: usize) -> Self {
        Self {
            layer,
            slot: ParamSlot::Biases,
        }
    }
}

/// Core trait for optimizers.
///
/// Implementations must be `Send` so a network can be moved across threads.
pub trait Optimizer: Send {
    /// Apply one update in place.
    ///
    /// # Panics
    ///
    /// Implementations panic if `parameters` and `gradients` differ in length.
    fn update(&mut self, key: ParamKey, parameters: &mut [f32], gradients: &[f32]);

    /// Update with a Hessian diagonal estimate available.
    ///
    /// Optimizers that do not use curvature ignore it.
    fn update_with_hessian(
        &mut self,
        key: ParamKey,
        parameters: &mut [f32],
        gradients: &[f32],
        _hessian: &[f32],
    ) {
        self.update(key, parameters, gradients);
    }

    /// Whether the network must estimate the Hessian diagonal before each epoch.
    fn requires_hessian(&self) -> bool {
        false
    }

    /// Drop all per-vector state.
    fn reset(&mut self);

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);
}

pub(crate) fn check_lengths(parameters: &[f32], gradients: &[f32]) {
    assert_eq!(
        parameters.len(),
        gradients.len(),
        "Parameters and gradients must have the same length"
    );
}
