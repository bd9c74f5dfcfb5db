//! Learning-rate schedules for use inside epoch callbacks.
//!
//! The network never changes the learning rate on its own. A schedule is
//! advanced from the `on_epoch` callback and pushed into the optimizer:
//!
//! ```ignore
//! let mut schedule = ExponentialDecay::new(0.01, 0.85).with_min_lr(1e-5);
//! net.train(&images, &labels, 10, 20, |_| {}, |net| {
//!     schedule.step();
//!     schedule.apply(net.optimizer_mut());
//! })?;
//! ```

use crate::optimizers::Optimizer;

/// Epoch-indexed learning-rate schedule.
pub trait LRScheduler {
    /// Learning rate for the current epoch.
    fn get_lr(&self) -> f32;

    /// Advance to the next epoch.
    fn step(&mut self);

    /// Return to epoch 0.
    fn reset(&mut self);

    /// Push the current rate into `optimizer`.
    fn apply(&self, optimizer: &mut dyn Optimizer) {
        optimizer.set_learning_rate(self.get_lr());
    }
}

/// `lr = initial_lr * gamma^(epoch / step_size)`.
#[derive(Debug, Clone)]
pub struct StepDecay {
    initial_lr: f32,
    step_size: usize,
    gamma: f32,
    current_epoch: usize,
    current_lr: f32,
}

impl StepDecay {
    /// # Panics
    ///
    /// Panics if `step_size` is zero.
    pub fn new(initial_lr: f32, step_size: usize, gamma: f32) -> Self {
        assert!(step_size > 0, "step_size must be positive");
        Self {
            initial_lr,
            step_size,
            gamma,
            current_epoch: 0,
            current_lr: initial_lr,
        }
    }
}

impl LRScheduler for StepDecay {
    fn get_lr(&self) -> f32 {
        self.current_lr
    }

    fn step(&mut self) {
        self.current_epoch += 1;
        let decays = self.current_epoch / self.step_size;
        self.current_lr = self.initial_lr * self.gamma.powi(decays as i32);
    }

    fn reset(&mut self) {
        self.current_epoch = 0;
        self.current_lr = self.initial_lr;
    }
}

/// `lr = max(min_lr, initial_lr * gamma^epoch)`.
///
/// The floor keeps long runs from decaying the rate to nothing.
#[derive(Debug, Clone)]
pub struct ExponentialDecay {
    initial_lr: f32,
    gamma: f32,
    min_lr: f32,
    current_epoch: usize,
    current_lr: f32,
}

impl ExponentialDecay {
    pub fn new(initial_lr: f32, gamma: f32) -> Self {
        Self {
            initial_lr,
            gamma,
            min_lr: 0.0,
            current_epoch: 0,
            current_lr: initial_lr,
        }
    }

    pub fn with_min_lr(mut self, min_lr: f32) -> Self {
        self.min_lr = min_lr;
        self.current_lr = self.current_lr.max(min_lr);
        self
    }
}

impl LRScheduler for ExponentialDecay {
    fn get_lr(&self) -> f32 {
        self.current_lr
    }

    fn step(&mut self) {
        self.current_epoch += 1;
        let lr = self.initial_lr * self.gamma.powi(self.current_epoch as i32);
        self.current_lr = lr.max(self.min_lr);
    }

    fn reset(&mut self) {
        self.current_epoch = 0;
        self.current_lr = self.initial_lr.max(self.min_lr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::SGD;

    #[test]
    fn test_step_decay_boundaries() {
        let mut s = StepDecay::new(0.1, 2, 0.5);
        let mut seen = vec![s.get_lr()];
        for _ in 0..4 {
            s.step();
            seen.push(s.get_lr());
        }
        let expected = [0.1, 0.1, 0.05, 0.05, 0.025];
        for (a, b) in seen.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-7);
        }
        s.reset();
        assert_eq!(s.get_lr(), 0.1);
    }

    #[test]
    fn test_exponential_decay_respects_floor() {
        let mut s = ExponentialDecay::new(0.01, 0.5).with_min_lr(1e-3);
        for _ in 0..10 {
            s.step();
        }
        assert_eq!(s.get_lr(), 1e-3);
    }

    #[test]
    fn test_apply_sets_optimizer_rate() {
        let mut s = ExponentialDecay::new(0.2, 0.5);
        let mut opt = SGD::new(0.2);
        s.step();
        s.apply(&mut opt);
        assert!((opt.learning_rate() - 0.1).abs() < 1e-7);
    }
}
