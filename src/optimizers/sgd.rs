//! Stochastic Gradient Descent (SGD) optimizer.
//!
//! `w = w - η * (∇L/∂w + λ * w)`

use crate::optimizers::{check_lengths, Optimizer, ParamKey};

/// Plain gradient descent with optional L2 weight decay.
///
/// Stateless: the same gradient always produces the same delta.
///
/// # Example
///
/// ```
/// use tiny_convnet::optimizers::{Optimizer, ParamKey, SGD};
///
/// let mut optimizer = SGD::new(0.1);
/// let mut params = vec![1.0, 2.0, 3.0];
/// optimizer.update(ParamKey::weights(0), &mut params, &[0.1, 0.2, 0.3]);
/// assert!((params[0] - 0.99).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct SGD {
    learning_rate: f32,
    lambda: f32,
}

impl SGD {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            lambda: 0.0,
        }
    }

    /// Set the L2 weight-decay coefficient.
    pub fn with_weight_decay(mut self, lambda: f32) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn weight_decay(&self) -> f32 {
        self.lambda
    }
}

impl Default for SGD {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _key: ParamKey, parameters: &mut [f32], gradients: &[f32]) {
        check_lengths(parameters, gradients);
        for (param, grad) in parameters.iter_mut().zip(gradients) {
            *param -= self.learning_rate * (grad + self.lambda * *param);
        }
    }

    fn reset(&mut self) {}

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
