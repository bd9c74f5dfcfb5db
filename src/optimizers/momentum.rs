//! Gradient descent with momentum.

use std::collections::HashMap;

use crate::optimizers::{check_lengths, Optimizer, ParamKey};

/// Momentum optimizer.
///
/// ```text
/// v = μ * v_prev - η * (g + λ * w)
/// w = w + v
/// ```
///
/// One velocity vector per [`ParamKey`], allocated on first use.
#[derive(Debug, Clone)]
pub struct Momentum {
    learning_rate: f32,
    lambda: f32,
    mu: f32,
    velocity: HashMap<ParamKey, Vec<f32>>,
}

impl Momentum {
    pub fn new(learning_rate: f32, mu: f32) -> Self {
        Self {
            learning_rate,
            lambda: 0.0,
            mu,
            velocity: HashMap::new(),
        }
    }

    pub fn with_weight_decay(mut self, lambda: f32) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn mu(&self) -> f32 {
        self.mu
    }
}

impl Default for Momentum {
    fn default() -> Self {
        Self::new(0.01, 0.9)
    }
}

impl Optimizer for Momentum {
    fn update(&mut self, key: ParamKey, parameters: &mut [f32], gradients: &[f32]) {
        check_lengths(parameters, gradients);
        let velocity = self
            .velocity
            .entry(key)
            .or_insert_with(|| vec![0.0; parameters.len()]);
        for ((w, &g), v) in parameters.iter_mut().zip(gradients).zip(velocity.iter_mut()) {
            *v = self.mu * *v - self.learning_rate * (g + self.lambda * *w);
            *w += *v;
        }
    }

    fn reset(&mut self) {
        self.velocity.clear();
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
