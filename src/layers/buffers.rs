//! Per-worker scratch state of one layer.

use crate::utils::SimpleRng;

/// Mutable buffers one worker needs to run a layer forward and backward.
///
/// Every worker slot owns one `LayerBuffers` per layer, so workers never
/// share activation or gradient storage while a minibatch is in flight.
/// Gradient (and Hessian) accumulators keep summing across samples until
/// [`LayerBuffers::clear_gradients`] is called at the start of the next
/// minibatch.
#[derive(Debug, Clone)]
pub struct LayerBuffers {
    /// Pre-activation values of the last forward pass.
    pub pre: Vec<f32>,
    /// Activated output of the last forward pass.
    pub output: Vec<f32>,
    /// dL/dz of the last backward pass.
    pub delta: Vec<f32>,
    /// dL/d(input) of the last backward pass.
    pub grad_input: Vec<f32>,
    pub grad_weights: Vec<f32>,
    pub grad_biases: Vec<f32>,
    /// Hessian diagonal accumulators; empty until first needed.
    pub hessian_weights: Vec<f32>,
    pub hessian_biases: Vec<f32>,
    /// d²L/dz² of the last second-order pass.
    pub delta2: Vec<f32>,
    /// d²L/d(input)² of the last second-order pass.
    pub delta2_input: Vec<f32>,
    /// Input indices selected by the last forward pass (max pooling, GHH).
    pub winners: Vec<usize>,
    /// Dropout mask (1.0 keep, 0.0 drop); empty until first drawn.
    pub mask: Vec<f32>,
    pub rng: SimpleRng,
}

impl LayerBuffers {
    pub fn new(input_size: usize, output_size: usize, weight_count: usize, bias_count: usize) -> Self {
        Self {
            pre: vec![0.0; output_size],
            output: vec![0.0; output_size],
            delta: vec![0.0; output_size],
            grad_input: vec![0.0; input_size],
            grad_weights: vec![0.0; weight_count],
            grad_biases: vec![0.0; bias_count],
            hessian_weights: Vec::new(),
            hessian_biases: Vec::new(),
            delta2: Vec::new(),
            delta2_input: Vec::new(),
            winners: Vec::new(),
            mask: Vec::new(),
            rng: SimpleRng::new(0),
        }
    }

    pub fn with_winners(mut self, count: usize) -> Self {
        self.winners = vec![0; count];
        self
    }

    pub fn clear_gradients(&mut self) {
        self.grad_weights.fill(0.0);
        self.grad_biases.fill(0.0);
    }

    /// Add another worker's accumulated gradients into this one.
    pub fn merge_gradients(&mut self, other: &LayerBuffers) {
        for (a, b) in self.grad_weights.iter_mut().zip(&other.grad_weights) {
            *a += b;
        }
        for (a, b) in self.grad_biases.iter_mut().zip(&other.grad_biases) {
            *a += b;
        }
    }

    pub fn scale_gradients(&mut self, factor: f32) {
        for g in self.grad_weights.iter_mut().chain(self.grad_biases.iter_mut()) {
            *g *= factor;
        }
    }

    /// Allocate and zero the second-order buffers.
    pub fn reset_hessian(&mut self) {
        let (weights, biases) = (self.grad_weights.len(), self.grad_biases.len());
        self.hessian_weights.clear();
        self.hessian_weights.resize(weights, 0.0);
        self.hessian_biases.clear();
        self.hessian_biases.resize(biases, 0.0);
        self.delta2.clear();
        self.delta2.resize(self.output.len(), 0.0);
        self.delta2_input.clear();
        self.delta2_input.resize(self.grad_input.len(), 0.0);
    }

    /// Add another worker's Hessian accumulators into this one.
    pub fn merge_hessian(&mut self, other: &LayerBuffers) {
        for (a, b) in self.hessian_weights.iter_mut().zip(&other.hessian_weights) {
            *a += b;
        }
        for (a, b) in self.hessian_biases.iter_mut().zip(&other.hessian_biases) {
            *a += b;
        }
    }

    pub fn scale_hessian(&mut self, factor: f32) {
        for h in self
            .hessian_weights
            .iter_mut()
            .chain(self.hessian_biases.iter_mut())
        {
            *h *= factor;
        }
    }
}
