// Integration tests for dropout layer.
// Tests dropout behavior in isolation and integration with other layers.

use approx::assert_relative_eq;
use tiny_convnet::layers::{DenseLayer, DropoutLayer, DropoutMode, Layer, Phase};
use tiny_convnet::optimizers::SGD;
use tiny_convnet::utils::{Activation, Index3D, SimpleRng};
use tiny_convnet::{Loss, Network};

fn seeded_buffers(layer: &DropoutLayer, seed: u64) -> tiny_convnet::layers::LayerBuffers {
    let mut buffers = layer.create_buffers();
    buffers.rng = SimpleRng::new(seed);
    buffers
}

// ============================================================================
// Statistical Dropout Rate Verification
// ============================================================================

#[test]
fn test_dropout_rate_statistical_verification() {
    for &rate in &[0.1, 0.3, 0.5, 0.7, 0.9] {
        let size = 10_000;
        let layer = DropoutLayer::new(size, rate).unwrap();
        let mut buffers = seeded_buffers(&layer, 42);

        let input = vec![1.0f32; size];
        layer.forward(&input, &mut buffers);

        let dropped = buffers.output.iter().filter(|&&x| x == 0.0).count();
        let actual = dropped as f32 / size as f32;
        assert!(
            (actual - rate).abs() < 0.03,
            "Expected drop rate ~{}, got {}",
            rate,
            actual
        );
    }
}

#[test]
fn test_dropout_scaling_factor() {
    let rate = 0.75;
    let layer = DropoutLayer::new(200, rate).unwrap();
    let mut buffers = seeded_buffers(&layer, 7);

    let input = vec![2.0f32; 200];
    layer.forward(&input, &mut buffers);

    for &y in &buffers.output {
        assert!(y == 0.0 || (y - 8.0).abs() < 1e-5, "unexpected output {}", y);
    }
}

#[test]
fn test_dropout_scaling_maintains_expected_value() {
    let size = 20_000;
    let layer = DropoutLayer::new(size, 0.4).unwrap();
    let mut buffers = seeded_buffers(&layer, 3);

    let input = vec![1.0f32; size];
    layer.forward(&input, &mut buffers);

    let mean = buffers.output.iter().sum::<f32>() / size as f32;
    assert!((mean - 1.0).abs() < 0.05, "mean {}", mean);
}

// ============================================================================
// Phase Tests
// ============================================================================

#[test]
fn test_dropout_test_phase_is_identity() {
    let mut layer = DropoutLayer::new(50, 0.9).unwrap();
    layer.set_phase(Phase::Test);
    let mut buffers = seeded_buffers(&layer, 1);

    let input: Vec<f32> = (0..50).map(|i| i as f32 * 0.1 - 2.0).collect();
    layer.forward(&input, &mut buffers);
    assert_eq!(buffers.output, input);

    let grad: Vec<f32> = (0..50).map(|i| i as f32).collect();
    layer.backward(&input, &grad, &mut buffers);
    assert_eq!(buffers.grad_input, grad);
}

#[test]
fn test_dropout_phase_switching() {
    let mut layer = DropoutLayer::new(100, 0.5).unwrap();
    let mut buffers = seeded_buffers(&layer, 5);
    let input = vec![1.0f32; 100];

    layer.forward(&input, &mut buffers);
    assert!(buffers.output.iter().any(|&x| x == 0.0));

    layer.set_phase(Phase::Test);
    assert_eq!(layer.phase(), Phase::Test);
    layer.forward(&input, &mut buffers);
    assert!(buffers.output.iter().all(|&x| x == 1.0));

    layer.set_phase(Phase::Train);
    layer.forward(&input, &mut buffers);
    assert!(buffers.output.iter().any(|&x| x == 0.0));
}

// ============================================================================
// Gradient Flow Tests
// ============================================================================

#[test]
fn test_dropout_gradient_mask_consistency() {
    let layer = DropoutLayer::new(64, 0.5).unwrap();
    let mut buffers = seeded_buffers(&layer, 11);

    let input = vec![1.0f32; 64];
    layer.forward(&input, &mut buffers);
    let output = buffers.output.clone();

    let grad = vec![1.0f32; 64];
    layer.backward(&input, &grad, &mut buffers);

    // identical ones in, so dy/dx equals the forward output
    for (g, y) in buffers.grad_input.iter().zip(&output) {
        assert_relative_eq!(*g, *y, epsilon = 1e-6);
    }
}

#[test]
fn test_dropout_mask_changes_between_samples() {
    let layer = DropoutLayer::new(64, 0.5).unwrap();
    let mut buffers = seeded_buffers(&layer, 13);
    let input = vec![1.0f32; 64];

    layer.forward(&input, &mut buffers);
    let first = buffers.output.clone();
    layer.forward(&input, &mut buffers);
    assert_ne!(first, buffers.output);
}

#[test]
fn test_dropout_determinism_with_seed() {
    let layer = DropoutLayer::new(128, 0.3).unwrap();
    let input = vec![1.0f32; 128];

    let mut a = seeded_buffers(&layer, 21);
    let mut b = seeded_buffers(&layer, 21);
    layer.forward(&input, &mut a);
    layer.forward(&input, &mut b);
    assert_eq!(a.output, b.output);

    let mut c = seeded_buffers(&layer, 22);
    layer.forward(&input, &mut c);
    assert_ne!(a.output, c.output);
}

// ============================================================================
// Per-Minibatch Masks
// ============================================================================

#[test]
fn test_per_batch_mask_shared_across_workers() {
    let layer = DropoutLayer::with_shape(Index3D::new(4, 4, 2), 0.5, DropoutMode::PerBatch).unwrap();
    let input = vec![1.0f32; 32];

    // different worker generators, same minibatch seed
    let mut first = seeded_buffers(&layer, 1);
    let mut second = seeded_buffers(&layer, 2);
    layer.begin_minibatch(77, &mut first);
    layer.begin_minibatch(77, &mut second);

    layer.forward(&input, &mut first);
    layer.forward(&input, &mut second);
    assert_eq!(first.output, second.output);

    // stable within the minibatch
    let before = first.output.clone();
    layer.forward(&input, &mut first);
    assert_eq!(before, first.output);

    // redrawn for the next one
    layer.begin_minibatch(78, &mut first);
    layer.forward(&input, &mut first);
    assert_ne!(before, first.output);
}

#[test]
fn test_per_batch_masks_before_first_minibatch() {
    let layer = DropoutLayer::with_shape(Index3D::new(4, 1, 1), 0.5, DropoutMode::PerBatch).unwrap();
    let mut buffers = seeded_buffers(&layer, 5);
    layer.forward(&[1.0; 4], &mut buffers);
    assert!(buffers.output.contains(&0.0), "output {:?}", buffers.output);

    // same behaviour through a network that has not trained yet
    let mut net = Network::new(Loss::Mse, Box::new(SGD::default()));
    net.add(DropoutLayer::with_shape(Index3D::new(32, 1, 1), 0.5, DropoutMode::PerBatch).unwrap())
        .unwrap();
    let output = net.predict(&[1.0; 32]).unwrap();
    assert!(output.contains(&0.0));
    assert!(output.iter().all(|&v| v == 0.0 || v == 2.0));
}

// ============================================================================
// Integration with DenseLayer
// ============================================================================

#[test]
fn test_dropout_between_dense_layers() {
    let mut rng = SimpleRng::new(4);
    let mut dense = DenseLayer::new(6, 10, Activation::Relu);
    dense.init_weights(&mut rng);
    let dropout = DropoutLayer::new(10, 0.5).unwrap();

    let mut dense_buffers = dense.create_buffers();
    let mut dropout_buffers = seeded_buffers(&dropout, 9);

    let input = vec![0.5f32; 6];
    dense.forward(&input, &mut dense_buffers);
    dropout.forward(&dense_buffers.output, &mut dropout_buffers);

    let grad = vec![1.0f32; 10];
    dropout.backward(&dense_buffers.output, &grad, &mut dropout_buffers);
    let upstream = dropout_buffers.grad_input.clone();
    dense.backward(&input, &upstream, &mut dense_buffers);

    // dropped units contribute nothing to the dense bias gradient
    for (o, &m) in dropout_buffers.mask.iter().enumerate() {
        if m == 0.0 {
            assert_eq!(dense_buffers.grad_biases[o], 0.0);
        }
    }
}

#[test]
fn test_dropout_no_trainable_parameters() {
    let layer = DropoutLayer::new(1000, 0.5).unwrap();
    assert_eq!(layer.parameter_count(), 0);
    assert_eq!(layer.input_size(), 1000);
    assert_eq!(layer.output_size(), 1000);
}

#[test]
fn test_dropout_rejects_invalid_rates() {
    assert!(DropoutLayer::new(10, 1.0).is_err());
    assert!(DropoutLayer::new(10, -0.1).is_err());
    assert!(DropoutLayer::new(10, 0.0).is_ok());
}
