//! Generalized hinging hyperplanes (GHH) activation block.
//!
//! Inputs are grouped as `[output][sum_term][max_term]`. Each output is an
//! alternating sum over `n_sum` groups of the maximum of `n_max` inputs:
//!
//! `y_o = f(Σ_s (-1)^s · max_m x[(o·n_sum + s)·n_max + m])`
//!
//! Fed by a fully-connected layer this yields a piecewise-linear learned
//! activation. The block has no parameters of its own.

use crate::error::{NetworkError, Result};
use crate::layers::r#trait::activation_delta2;
use crate::layers::{Layer, LayerBuffers};
use crate::utils::{Activation, Index3D};

#[derive(Debug, Clone)]
pub struct GhhActivationLayer {
    out_size: usize,
    n_sum: usize,
    n_max: usize,
    activation: Activation,
}

impl GhhActivationLayer {
    pub fn new(out_size: usize, n_sum: usize, n_max: usize, activation: Activation) -> Result<Self> {
        if out_size == 0 || n_sum == 0 || n_max == 0 {
            return Err(NetworkError::InvalidLayer(format!(
                "ghh block needs positive sizes, got out={} n_sum={} n_max={}",
                out_size, n_sum, n_max
            )));
        }
        Ok(Self {
            out_size,
            n_sum,
            n_max,
            activation,
        })
    }

    pub fn n_sum(&self) -> usize {
        self.n_sum
    }

    pub fn n_max(&self) -> usize {
        self.n_max
    }

    fn sign(s: usize) -> f32 {
        if s % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }
}

impl Layer for GhhActivationLayer {
    fn layer_type(&self) -> &'static str {
        "ghh"
    }

    fn in_shape(&self) -> Index3D {
        Index3D::new(self.out_size * self.n_sum * self.n_max, 1, 1)
    }

    fn out_shape(&self) -> Index3D {
        Index3D::new(self.out_size, 1, 1)
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    fn weights(&self) -> &[f32] {
        &[]
    }

    fn biases(&self) -> &[f32] {
        &[]
    }

    fn params_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut [], &mut [])
    }

    fn fan_in_size(&self) -> usize {
        self.n_sum * self.n_max
    }

    fn fan_out_size(&self) -> usize {
        1
    }

    fn create_buffers(&self) -> LayerBuffers {
        LayerBuffers::new(self.input_size(), self.output_size(), 0, 0)
            .with_winners(self.out_size * self.n_sum)
    }

    fn forward(&self, input: &[f32], buffers: &mut LayerBuffers) {
        assert_eq!(input.len(), self.input_size(), "input len mismatch");

        for o in 0..self.out_size {
            let mut sum = 0.0f32;
            for s in 0..self.n_sum {
                let group = o * self.n_sum + s;
                let start = group * self.n_max;
                let mut best = start;
                for i in start + 1..start + self.n_max {
                    if input[i] > input[best] {
                        best = i;
                    }
                }
                buffers.winners[group] = best;
                sum += Self::sign(s) * input[best];
            }
            buffers.pre[o] = sum;
        }
        self.activation.apply(&buffers.pre, &mut buffers.output);
    }

    fn backward(&self, _input: &[f32], grad_output: &[f32], buffers: &mut LayerBuffers) {
        self.activation
            .backward(&buffers.output, grad_output, &mut buffers.delta);
        buffers.grad_input.fill(0.0);
        for (group, &winner) in buffers.winners.iter().enumerate() {
            let (o, s) = (group / self.n_sum, group % self.n_sum);
            buffers.grad_input[winner] = Self::sign(s) * buffers.delta[o];
        }
    }

    fn backward_2nd(&self, _input: &[f32], delta2_output: &[f32], buffers: &mut LayerBuffers) {
        activation_delta2(self.activation, &buffers.output, delta2_output, &mut buffers.delta2);
        buffers.delta2_input.fill(0.0);
        for (group, &winner) in buffers.winners.iter().enumerate() {
            buffers.delta2_input[winner] = buffers.delta2[group / self.n_sum];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes() {
        let layer = GhhActivationLayer::new(3, 2, 4, Activation::Identity).unwrap();
        assert_eq!(layer.input_size(), 24);
        assert_eq!(layer.output_size(), 3);
        assert_eq!(layer.parameter_count(), 0);
    }

    #[test]
    fn test_forward_alternating_max_sum() {
        let layer = GhhActivationLayer::new(1, 2, 3, Activation::Identity).unwrap();
        let mut buffers = layer.create_buffers();
        // max(1, 4, 2) - max(0, -1, 3) = 4 - 3
        layer.forward(&[1.0, 4.0, 2.0, 0.0, -1.0, 3.0], &mut buffers);
        assert_eq!(buffers.output, vec![1.0]);
        assert_eq!(buffers.winners, vec![1, 5]);
    }

    #[test]
    fn test_backward_routes_signed_gradient() {
        let layer = GhhActivationLayer::new(1, 2, 3, Activation::Identity).unwrap();
        let mut buffers = layer.create_buffers();
        let input = [1.0, 4.0, 2.0, 0.0, -1.0, 3.0];
        layer.forward(&input, &mut buffers);
        layer.backward(&input, &[2.0], &mut buffers);
        assert_eq!(buffers.grad_input, vec![0.0, 2.0, 0.0, 0.0, 0.0, -2.0]);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(GhhActivationLayer::new(2, 0, 3, Activation::Identity).is_err());
    }
}
