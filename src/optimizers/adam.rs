//! Adam (Adaptive Moment Estimation) optimizer.

use std::collections::HashMap;

use crate::optimizers::{check_lengths, Optimizer, ParamKey};

/// Moment estimates and step counter of one parameter vector.
#[derive(Debug, Clone, Default)]
struct AdamState {
    m: Vec<f32>,
    v: Vec<f32>,
    t: i32,
}

/// Adam optimizer.
///
/// ```text
/// m_t = β1 * m_{t-1} + (1 - β1) * g
/// v_t = β2 * v_{t-1} + (1 - β2) * g²
/// m_hat = m_t / (1 - β1^t)
/// v_hat = v_t / (1 - β2^t)
/// w = w - α * m_hat / (√v_hat + ε)
/// ```
///
/// Every parameter vector (keyed by [`ParamKey`]) keeps its own moments and
/// its own `t`, so the bias correction of one layer is unaffected by how many
/// other vectors were updated before it.
///
/// Kingma, D. P., & Ba, J. (2014). Adam: A method for stochastic optimization.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    state: HashMap<ParamKey, AdamState>,
}

impl Adam {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            state: HashMap::new(),
        }
    }

    /// Number of update steps already applied to `key`.
    pub fn steps(&self, key: ParamKey) -> usize {
        self.state.get(&key).map_or(0, |s| s.t as usize)
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.001, 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn update(&mut self, key: ParamKey, parameters: &mut [f32], gradients: &[f32]) {
        check_lengths(parameters, gradients);

        let state = self.state.entry(key).or_default();
        if state.m.len() != parameters.len() {
            state.m = vec![0.0; parameters.len()];
            state.v = vec![0.0; parameters.len()];
            state.t = 0;
        }
        state.t += 1;

        let bias_correction1 = 1.0 - self.beta1.powi(state.t);
        let bias_correction2 = 1.0 - self.beta2.powi(state.t);

        for i in 0..parameters.len() {
            let g = gradients[i];
            state.m[i] = self.beta1 * state.m[i] + (1.0 - self.beta1) * g;
            state.v[i] = self.beta2 * state.v[i] + (1.0 - self.beta2) * g * g;

            let m_hat = state.m[i] / bias_correction1;
            let v_hat = state.v[i] / bias_correction2;

            parameters[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn reset(&mut self) {
        self.state.clear();
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adam_first_step_is_learning_rate_sized() {
        // With bias correction the first step is ±α regardless of |g|.
        let mut opt = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let mut w = vec![1.0f32, 1.0];
        opt.update(ParamKey::weights(0), &mut w, &[5.0, -0.001]);
        assert!((w[0] - 0.99).abs() < 1e-5);
        assert!((w[1] - 1.01).abs() < 1e-4);
    }

    #[test]
    fn test_adam_state_is_per_key() {
        let mut opt = Adam::default();
        let mut a = vec![0.0f32; 2];
        let mut b = vec![0.0f32; 3];
        opt.update(ParamKey::weights(0), &mut a, &[1.0, 1.0]);
        opt.update(ParamKey::weights(0), &mut a, &[1.0, 1.0]);
        opt.update(ParamKey::biases(0), &mut b, &[1.0, 1.0, 1.0]);
        assert_eq!(opt.steps(ParamKey::weights(0)), 2);
        assert_eq!(opt.steps(ParamKey::biases(0)), 1);
        assert_eq!(opt.steps(ParamKey::weights(7)), 0);
    }

    #[test]
    fn test_adam_reset() {
        let mut opt = Adam::default();
        let mut w = vec![0.0f32];
        opt.update(ParamKey::weights(0), &mut w, &[1.0]);
        opt.reset();
        assert_eq!(opt.steps(ParamKey::weights(0)), 0);
    }
}
