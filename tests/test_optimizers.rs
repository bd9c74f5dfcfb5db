// Integration tests for the optimizers.
// Each test drives `update` directly with hand-picked gradients.

use approx::assert_relative_eq;
use tiny_convnet::optimizers::{Adam, LevenbergMarquardt, Momentum, Optimizer, ParamKey, SGD};

/// Parameter deltas of `steps` updates with the same gradient.
fn deltas(optimizer: &mut dyn Optimizer, key: ParamKey, param: &mut f32, grad: f32, steps: usize) -> Vec<f32> {
    (0..steps)
        .map(|_| {
            let before = *param;
            let mut p = [*param];
            optimizer.update(key, &mut p, &[grad]);
            *param = p[0];
            *param - before
        })
        .collect()
}

// ============================================================================
// SGD Tests
// ============================================================================

mod sgd_tests {
    use super::*;

    #[test]
    fn test_sgd_same_gradient_same_delta() {
        let mut sgd = SGD::new(0.1);
        let mut param = 0.0f32;
        let d = deltas(&mut sgd, ParamKey::weights(0), &mut param, 0.5, 5);
        for delta in d {
            assert_relative_eq!(delta, -0.05, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_sgd_weight_decay() {
        let mut sgd = SGD::new(0.1).with_weight_decay(0.5);
        let mut params = [2.0f32];
        sgd.update(ParamKey::weights(0), &mut params, &[0.0]);
        // 2 - 0.1 * (0 + 0.5 * 2)
        assert_relative_eq!(params[0], 1.9, epsilon = 1e-6);
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn test_sgd_length_mismatch_panics() {
        let mut sgd = SGD::new(0.1);
        let mut params = [1.0f32, 2.0];
        sgd.update(ParamKey::weights(0), &mut params, &[1.0]);
    }
}

// ============================================================================
// Momentum Tests
// ============================================================================

mod momentum_tests {
    use super::*;

    #[test]
    fn test_momentum_accelerates_under_constant_gradient() {
        let mut momentum = Momentum::new(0.1, 0.9);
        let mut param = 0.0f32;
        let d = deltas(&mut momentum, ParamKey::weights(0), &mut param, 1.0, 3);

        assert_relative_eq!(d[0], -0.1, epsilon = 1e-6);
        assert_relative_eq!(d[1], -0.19, epsilon = 1e-6);
        assert_relative_eq!(d[2], -0.271, epsilon = 1e-6);
    }

    #[test]
    fn test_momentum_keys_are_independent() {
        let mut momentum = Momentum::new(0.1, 0.9);
        let mut a = 0.0f32;
        let mut b = 0.0f32;
        deltas(&mut momentum, ParamKey::weights(0), &mut a, 1.0, 3);
        let d = deltas(&mut momentum, ParamKey::biases(0), &mut b, 1.0, 1);
        assert_relative_eq!(d[0], -0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_momentum_reset_clears_velocity() {
        let mut momentum = Momentum::new(0.1, 0.9);
        let mut param = 0.0f32;
        deltas(&mut momentum, ParamKey::weights(0), &mut param, 1.0, 4);
        momentum.reset();
        let d = deltas(&mut momentum, ParamKey::weights(0), &mut param, 1.0, 1);
        assert_relative_eq!(d[0], -0.1, epsilon = 1e-6);
    }
}

// ============================================================================
// Adam Tests
// ============================================================================

mod adam_tests {
    use super::*;

    #[test]
    fn test_adam_first_step_is_learning_rate() {
        let mut adam = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let mut param = 0.0f32;
        let d = deltas(&mut adam, ParamKey::weights(0), &mut param, 3.0, 1);
        assert_relative_eq!(d[0], -0.01, epsilon = 1e-6);
    }

    #[test]
    fn test_adam_constant_gradient_from_scratch_gives_equal_steps() {
        let mut adam = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let mut param = 0.0f32;
        let d = deltas(&mut adam, ParamKey::weights(0), &mut param, 1.0, 10);
        for delta in d {
            assert_relative_eq!(delta, -0.01, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_adam_step_depends_on_history() {
        let mut adam = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let key = ParamKey::weights(0);
        let mut param = 0.0f32;

        deltas(&mut adam, key, &mut param, 10.0, 5);
        let d = deltas(&mut adam, key, &mut param, 1.0, 10);

        // the large second moment from the burst keeps shrinking the steps
        assert_relative_eq!(d[0], -0.008844, epsilon = 1e-4);
        for pair in d.windows(2) {
            assert!(
                pair[1].abs() < pair[0].abs(),
                "steps did not shrink: {:?}",
                d
            );
        }
        assert_eq!(adam.steps(key), 15);
    }

    #[test]
    fn test_adam_reset_restarts_bias_correction() {
        let mut adam = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let key = ParamKey::biases(2);
        let mut param = 1.0f32;
        deltas(&mut adam, key, &mut param, 10.0, 5);

        adam.reset();
        assert_eq!(adam.steps(key), 0);
        let d = deltas(&mut adam, key, &mut param, 1.0, 1);
        assert_relative_eq!(d[0], -0.01, epsilon = 1e-5);
    }

    #[test]
    fn test_adam_does_not_need_hessian() {
        assert!(!Adam::default().requires_hessian());
        assert!(!SGD::default().requires_hessian());
        assert!(!Momentum::default().requires_hessian());
    }
}

// ============================================================================
// Levenberg-Marquardt Tests
// ============================================================================

mod levenberg_marquardt_tests {
    use super::*;

    #[test]
    fn test_step_shrinks_with_curvature() {
        let mut lm = LevenbergMarquardt::new(0.01, 0.02);
        let mut params = [0.0f32, 0.0, 0.0];
        lm.update_with_hessian(
            ParamKey::weights(0),
            &mut params,
            &[1.0, 1.0, 1.0],
            &[0.0, 0.08, 0.98],
        );

        assert_relative_eq!(params[0], -0.5, epsilon = 1e-5);
        assert_relative_eq!(params[1], -0.1, epsilon = 1e-5);
        assert_relative_eq!(params[2], -0.01, epsilon = 1e-5);
    }

    #[test]
    fn test_plain_update_treats_curvature_as_zero() {
        let mut lm = LevenbergMarquardt::new(0.01, 0.02);
        let mut params = [0.0f32];
        lm.update(ParamKey::weights(0), &mut params, &[2.0]);
        assert_relative_eq!(params[0], -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_defaults() {
        let lm = LevenbergMarquardt::default();
        assert!(lm.requires_hessian());
        assert_relative_eq!(lm.learning_rate(), 0.00085);
        assert_relative_eq!(lm.mu(), 0.02);
    }

    #[test]
    fn test_set_learning_rate() {
        let mut lm = LevenbergMarquardt::default();
        lm.set_learning_rate(0.5);
        assert_eq!(lm.learning_rate(), 0.5);
    }
}
