//! Stochastic diagonal Levenberg-Marquardt.
//!
//! Each weight gets its own step size `η / (h + μ)`, where `h` is the
//! running estimate of the Hessian diagonal for that weight. Weights with high
//! curvature move slowly, flat directions move fast; `μ` bounds the step when
//! the curvature estimate is close to zero.

use crate::optimizers::{check_lengths, Optimizer, ParamKey};

/// Gradient descent scaled by the Hessian diagonal.
///
/// The network refreshes the curvature estimate before every epoch because
/// [`Optimizer::requires_hessian`] returns `true`. Without an estimate
/// (plain [`Optimizer::update`]) the curvature is taken as zero.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    learning_rate: f32,
    mu: f32,
}

impl LevenbergMarquardt {
    pub fn new(learning_rate: f32, mu: f32) -> Self {
        Self { learning_rate, mu }
    }

    pub fn mu(&self) -> f32 {
        self.mu
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new(0.00085, 0.02)
    }
}

impl Optimizer for LevenbergMarquardt {
    fn update(&mut self, _key: ParamKey, parameters: &mut [f32], gradients: &[f32]) {
        check_lengths(parameters, gradients);
        let step = self.learning_rate / self.mu;
        for (w, g) in parameters.iter_mut().zip(gradients) {
            *w -= step * g;
        }
    }

    fn update_with_hessian(
        &mut self,
        _key: ParamKey,
        parameters: &mut [f32],
        gradients: &[f32],
        hessian: &[f32],
    ) {
        check_lengths(parameters, gradients);
        assert_eq!(
            parameters.len(),
            hessian.len(),
            "Parameters and hessian must have the same length"
        );
        for ((w, g), h) in parameters.iter_mut().zip(gradients).zip(hessian) {
            *w -= self.learning_rate / (h + self.mu) * g;
        }
    }

    fn requires_hessian(&self) -> bool {
        true
    }

    fn reset(&mut self) {}

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
