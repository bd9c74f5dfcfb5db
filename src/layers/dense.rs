//! Dense (fully connected) layer implementation
//!
//! This module provides a DenseLayer (also known as Linear or Fully Connected layer)
//! that computes `y = f(xW + b)` over a flattened input.

use crate::layers::r#trait::activation_delta2;
use crate::layers::{Layer, LayerBuffers};
use crate::utils::{Activation, Index3D};

/// Dense (fully connected) layer with weights and biases.
///
/// Every input feeds every output, so unlike convolution and average
/// pooling this layer runs plain nested loops instead of a link list.
///
/// # Fields
///
/// * `input_size` - Number of input features
/// * `output_size` - Number of output features
/// * `weights` - Weight matrix stored row-major as (input_size × output_size),
///   i.e. the weight from input `i` to output `o` is `weights[i * output_size + o]`
/// * `biases` - Bias vector (output_size)
///
/// # Example
///
/// ```
/// use tiny_convnet::layers::{DenseLayer, Layer};
/// use tiny_convnet::utils::{Activation, SimpleRng};
///
/// let mut layer = DenseLayer::new(784, 512, Activation::Relu);
/// layer.init_weights(&mut SimpleRng::new(42));
/// assert_eq!(layer.input_size(), 784);
/// assert_eq!(layer.output_size(), 512);
/// ```
#[derive(Debug, Clone)]
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
    activation: Activation,
}

impl DenseLayer {
    /// Create a new DenseLayer with zeroed parameters.
    ///
    /// Call [`Layer::init_weights`] (or let the network do it) before training.
    ///
    /// # Arguments
    ///
    /// * `input_size` - Number of input features
    /// * `output_size` - Number of output features
    /// * `activation` - Activation applied to every output
    pub fn new(input_size: usize, output_size: usize, activation: Activation) -> Self {
        Self {
            input_size,
            output_size,
            weights: vec![0.0f32; input_size * output_size],
            biases: vec![0.0f32; output_size],
            activation,
        }
    }

    /// Weight connecting `input` to `output`.
    pub fn weight(&self, input: usize, output: usize) -> f32 {
        self.weights[input * self.output_size + output]
    }
}

impl Layer for DenseLayer {
    fn layer_type(&self) -> &'static str {
        "fully-connected"
    }

    fn in_shape(&self) -> Index3D {
        Index3D::new(self.input_size, 1, 1)
    }

    fn out_shape(&self) -> Index3D {
        Index3D::new(self.output_size, 1, 1)
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    fn weights(&self) -> &[f32] {
        &self.weights
    }

    fn biases(&self) -> &[f32] {
        &self.biases
    }

    fn params_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.weights, &mut self.biases)
    }

    fn fan_in_size(&self) -> usize {
        self.input_size
    }

    fn fan_out_size(&self) -> usize {
        self.output_size
    }

    fn forward(&self, input: &[f32], buffers: &mut LayerBuffers) {
        assert_eq!(input.len(), self.input_size, "input len mismatch");

        buffers.pre.copy_from_slice(&self.biases);
        for (i, &x) in input.iter().enumerate() {
            if x == 0.0 {
                continue;
            }
            let row = &self.weights[i * self.output_size..(i + 1) * self.output_size];
            for (z, &w) in buffers.pre.iter_mut().zip(row) {
                *z += x * w;
            }
        }
        self.activation.apply(&buffers.pre, &mut buffers.output);
    }

    fn backward(&self, input: &[f32], grad_output: &[f32], buffers: &mut LayerBuffers) {
        assert_eq!(grad_output.len(), self.output_size, "grad_output len mismatch");
        self.activation
            .backward(&buffers.output, grad_output, &mut buffers.delta);
        let delta = &buffers.delta;

        for (i, &x) in input.iter().enumerate() {
            let row = i * self.output_size..(i + 1) * self.output_size;
            let weights = &self.weights[row.clone()];
            buffers.grad_input[i] = weights.iter().zip(delta).map(|(w, d)| w * d).sum();

            for (g, &d) in buffers.grad_weights[row].iter_mut().zip(delta) {
                *g += x * d;
            }
        }

        for (g, &d) in buffers.grad_biases.iter_mut().zip(delta) {
            *g += d;
        }
    }

    fn backward_2nd(&self, input: &[f32], delta2_output: &[f32], buffers: &mut LayerBuffers) {
        activation_delta2(self.activation, &buffers.output, delta2_output, &mut buffers.delta2);
        let delta2 = &buffers.delta2;

        for (i, &x) in input.iter().enumerate() {
            let row = i * self.output_size..(i + 1) * self.output_size;
            let weights = &self.weights[row.clone()];
            buffers.delta2_input[i] = weights.iter().zip(delta2).map(|(w, d)| w * w * d).sum();

            for (h, &d) in buffers.hessian_weights[row].iter_mut().zip(delta2) {
                *h += x * x * d;
            }
        }

        for (h, &d) in buffers.hessian_biases.iter_mut().zip(delta2) {
            *h += d;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::SimpleRng;
    use approx::assert_relative_eq;

    #[test]
    fn test_dense_layer_creation() {
        let layer = DenseLayer::new(10, 5, Activation::Identity);

        assert_eq!(layer.input_size(), 10);
        assert_eq!(layer.output_size(), 5);
        assert_eq!(layer.weights.len(), 50); // 10 × 5
        assert_eq!(layer.biases.len(), 5);
    }

    #[test]
    fn test_dense_layer_parameter_count() {
        let layer = DenseLayer::new(784, 512, Activation::Identity);

        // 784 × 512 weights + 512 biases = 401,408 + 512 = 401,920
        assert_eq!(layer.parameter_count(), 784 * 512 + 512);
    }

    #[test]
    fn test_xavier_initialization() {
        let mut rng = SimpleRng::new(42);
        let mut layer = DenseLayer::new(100, 50, Activation::Tanh);
        layer.init_weights(&mut rng);

        // Xavier limit = sqrt(6 / (100 + 50)) = sqrt(6 / 150) ≈ 0.2
        let limit = (6.0f32 / 150.0).sqrt();

        for &weight in &layer.weights {
            assert!(
                weight >= -limit && weight <= limit,
                "Weight {} outside Xavier range [{}, {}]",
                weight,
                -limit,
                limit
            );
        }
        for &bias in &layer.biases {
            assert_eq!(bias, 0.0);
        }
    }

    #[test]
    fn test_forward_row_major_weights() {
        let mut layer = DenseLayer::new(2, 3, Activation::Identity);
        layer.weights.copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        layer.biases.copy_from_slice(&[0.5, 0.0, -0.5]);
        let mut buffers = layer.create_buffers();

        layer.forward(&[1.0, 2.0], &mut buffers);

        assert_eq!(buffers.output, vec![9.5, 12.0, 14.5]);
        assert_eq!(layer.weight(1, 0), 4.0);
    }

    #[test]
    fn test_backward_gradients() {
        let mut layer = DenseLayer::new(2, 2, Activation::Identity);
        layer.weights.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        let mut buffers = layer.create_buffers();
        let input = [0.5, -1.0];

        layer.forward(&input, &mut buffers);
        layer.backward(&input, &[1.0, 2.0], &mut buffers);

        // dL/dx_i = Σ_o W[i][o] * g_o
        assert_relative_eq!(buffers.grad_input[0], 1.0 + 4.0);
        assert_relative_eq!(buffers.grad_input[1], 3.0 + 8.0);
        // dL/dW[i][o] = x_i * g_o
        assert_eq!(buffers.grad_weights, vec![0.5, 1.0, -1.0, -2.0]);
        assert_eq!(buffers.grad_biases, vec![1.0, 2.0]);
    }

    #[test]
    fn test_backward_2nd_gauss_newton() {
        let mut layer = DenseLayer::new(1, 1, Activation::Identity);
        layer.weights[0] = 3.0;
        let mut buffers = layer.create_buffers();
        buffers.reset_hessian();
        let input = [2.0];

        layer.forward(&input, &mut buffers);
        layer.backward_2nd(&input, &[1.0], &mut buffers);

        assert_relative_eq!(buffers.hessian_weights[0], 4.0);
        assert_relative_eq!(buffers.hessian_biases[0], 1.0);
        assert_relative_eq!(buffers.delta2_input[0], 9.0);
    }
}
