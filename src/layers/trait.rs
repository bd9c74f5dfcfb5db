//! Layer trait definition.
//!
//! Every layer type (convolution, pooling, fully-connected, dropout, GHH)
//! implements [`Layer`]. A layer owns its weights and biases; everything that
//! changes while a sample is processed lives in a [`LayerBuffers`] owned by
//! the worker running that sample. This split lets a network run many
//! samples of one minibatch in parallel against a shared, read-only chain.

use crate::layers::{LayerBuffers, Phase};
use crate::utils::{Activation, Index3D, SimpleRng};

/// Core trait for network layers.
///
/// # Example
///
/// ```ignore
/// let mut buffers = layer.create_buffers();
/// layer.forward(&input, &mut buffers);
/// layer.backward(&input, &grad_output, &mut buffers);
/// // buffers.grad_input now holds dL/d(input),
/// // buffers.grad_weights / grad_biases hold the accumulated gradients.
/// ```
pub trait Layer: Send + Sync {
    /// Short type name used in logs and error messages.
    fn layer_type(&self) -> &'static str;

    fn in_shape(&self) -> Index3D;

    fn out_shape(&self) -> Index3D;

    fn input_size(&self) -> usize {
        self.in_shape().size()
    }

    fn output_size(&self) -> usize {
        self.out_shape().size()
    }

    fn activation(&self) -> Activation;

    fn weights(&self) -> &[f32];

    fn biases(&self) -> &[f32];

    /// Mutable access to `(weights, biases)` for optimizers and weight loading.
    fn params_mut(&mut self) -> (&mut [f32], &mut [f32]);

    /// Total count of weights and biases.
    fn parameter_count(&self) -> usize {
        self.weights().len() + self.biases().len()
    }

    /// Number of inputs feeding one output (used for initialisation).
    fn fan_in_size(&self) -> usize;

    /// Number of outputs one input feeds (used for initialisation).
    fn fan_out_size(&self) -> usize;

    /// Xavier/Glorot uniform weights in `[-limit, limit]` with
    /// `limit = sqrt(6 / (fan_in + fan_out))`, zero biases.
    fn init_weights(&mut self, rng: &mut SimpleRng) {
        let fan = (self.fan_in_size() + self.fan_out_size()).max(1) as f32;
        let limit = (6.0f32 / fan).sqrt();
        let (weights, biases) = self.params_mut();
        for w in weights.iter_mut() {
            *w = rng.gen_range_f32(-limit, limit);
        }
        biases.fill(0.0);
    }

    /// Allocate the scratch state one worker needs for this layer.
    fn create_buffers(&self) -> LayerBuffers {
        LayerBuffers::new(
            self.input_size(),
            self.output_size(),
            self.weights().len(),
            self.biases().len(),
        )
    }

    /// Compute `buffers.output` from `input`.
    fn forward(&self, input: &[f32], buffers: &mut LayerBuffers);

    /// Given dL/d(output), write dL/d(input) into `buffers.grad_input` and
    /// add this sample's weight and bias gradients to the accumulators.
    ///
    /// `input` and `buffers.output` must be those of the matching forward call.
    fn backward(&self, input: &[f32], grad_output: &[f32], buffers: &mut LayerBuffers);

    /// Second-order counterpart of [`Layer::backward`] used to estimate the
    /// Hessian diagonal: given d²L/d(output)², write d²L/d(input)² into
    /// `buffers.delta2_input` and accumulate curvature per weight and bias.
    fn backward_2nd(&self, input: &[f32], delta2_output: &[f32], buffers: &mut LayerBuffers);

    /// Switch between training and evaluation behaviour. Only layers with
    /// phase-dependent behaviour (dropout) care.
    fn set_phase(&mut self, _phase: Phase) {}

    /// Called on every worker's buffers before a minibatch starts. `seed` is
    /// the same for all workers of one minibatch.
    fn begin_minibatch(&self, _seed: u64, _buffers: &mut LayerBuffers) {}
}

/// Apply the activation's second-order factor: `d2z = d2y * f'(y)²`.
pub(crate) fn activation_delta2(activation: Activation, y: &[f32], d2y: &[f32], d2z: &mut [f32]) {
    for ((d, &yi), &hi) in d2z.iter_mut().zip(y).zip(d2y) {
        let df = activation.df(yi);
        *d = hi * df * df;
    }
}
