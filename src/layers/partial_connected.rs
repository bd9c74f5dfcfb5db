//! Sparse weighted-sum layer shared by convolution and average pooling.
//!
//! A `PartialConnectedLayer` knows nothing about images or kernels. It holds
//! a list of [`WeightLink`]s (input index, output index, weight index) and
//! one optional bias per output, and runs forward and backward propagation
//! over those links. Concrete layers only decide which links exist.
//!
//! Links are registered per output (fan-in) with [`connect_weight`]; the
//! reverse views (fan-out per input, uses per weight) are derived by
//! [`remap`], which must run after the links change.
//!
//! [`connect_weight`]: PartialConnectedLayer::connect_weight
//! [`remap`]: PartialConnectedLayer::remap

use crate::layers::r#trait::activation_delta2;
use crate::layers::{Layer, LayerBuffers};
use crate::utils::{Activation, Index3D};

/// One weighted contribution `weights[weight] * input[input]` to `output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightLink {
    pub input: usize,
    pub output: usize,
    pub weight: usize,
}

/// Weighted-sum engine over an explicit link list.
#[derive(Debug, Clone)]
pub struct PartialConnectedLayer {
    in_shape: Index3D,
    out_shape: Index3D,
    weights: Vec<f32>,
    biases: Vec<f32>,
    activation: Activation,
    scale_factor: f32,
    /// Fan-in per output, in insertion order.
    out_links: Vec<Vec<WeightLink>>,
    /// Fan-out per input; rebuilt by `remap`.
    in_links: Vec<Vec<WeightLink>>,
    /// Uses of each weight; rebuilt by `remap`.
    weight_links: Vec<Vec<WeightLink>>,
    /// Bias feeding each output.
    out_bias: Vec<Option<usize>>,
    /// Outputs fed by each bias; rebuilt by `remap`.
    bias_outputs: Vec<Vec<usize>>,
}

impl PartialConnectedLayer {
    /// Create a layer without links. Weights and biases start at zero.
    pub fn new(
        in_shape: Index3D,
        out_shape: Index3D,
        weight_count: usize,
        bias_count: usize,
        activation: Activation,
    ) -> Self {
        Self {
            in_shape,
            out_shape,
            weights: vec![0.0; weight_count],
            biases: vec![0.0; bias_count],
            activation,
            scale_factor: 1.0,
            out_links: vec![Vec::new(); out_shape.size()],
            in_links: vec![Vec::new(); in_shape.size()],
            weight_links: vec![Vec::new(); weight_count],
            out_bias: vec![None; out_shape.size()],
            bias_outputs: vec![Vec::new(); bias_count],
        }
    }

    /// Shorthand for flat (N × 1 × 1) input and output shapes.
    pub fn flat(
        in_size: usize,
        out_size: usize,
        weight_count: usize,
        bias_count: usize,
        activation: Activation,
    ) -> Self {
        Self::new(
            Index3D::new(in_size, 1, 1),
            Index3D::new(out_size, 1, 1),
            weight_count,
            bias_count,
            activation,
        )
    }

    /// Multiply every weighted sum by `scale` before the bias is added.
    pub fn with_scale_factor(mut self, scale: f32) -> Self {
        self.scale_factor = scale;
        self
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    /// Register `weights[weight] * input[input]` as a contribution to `output`.
    ///
    /// # Panics
    ///
    /// Out-of-range indices are a bug in the caller's link builder.
    pub fn connect_weight(&mut self, input: usize, output: usize, weight: usize) {
        assert!(input < self.in_shape.size(), "link input {} out of range", input);
        assert!(output < self.out_shape.size(), "link output {} out of range", output);
        assert!(weight < self.weights.len(), "link weight {} out of range", weight);
        self.out_links[output].push(WeightLink {
            input,
            output,
            weight,
        });
    }

    /// Feed `biases[bias]` into `output`.
    pub fn connect_bias(&mut self, bias: usize, output: usize) {
        assert!(output < self.out_shape.size(), "bias output {} out of range", output);
        assert!(bias < self.biases.len(), "bias {} out of range", bias);
        self.out_bias[output] = Some(bias);
    }

    /// Drop every weight and bias link. Weight values are kept.
    pub fn clear_links(&mut self) {
        self.out_links.iter_mut().for_each(Vec::clear);
        self.out_bias.iter_mut().for_each(|b| *b = None);
        self.remap();
    }

    /// Keep only the links for which `keep` returns true, then remap.
    pub fn retain_links<F: FnMut(&WeightLink) -> bool>(&mut self, mut keep: F) {
        for links in &mut self.out_links {
            links.retain(|l| keep(l));
        }
        self.remap();
    }

    /// Rebuild the per-input and per-weight views from the per-output links.
    pub fn remap(&mut self) {
        self.in_links.iter_mut().for_each(Vec::clear);
        self.weight_links.iter_mut().for_each(Vec::clear);
        self.bias_outputs.iter_mut().for_each(Vec::clear);

        for links in &self.out_links {
            for &link in links {
                self.in_links[link.input].push(link);
                self.weight_links[link.weight].push(link);
            }
        }
        for (output, bias) in self.out_bias.iter().enumerate() {
            if let Some(b) = *bias {
                self.bias_outputs[b].push(output);
            }
        }
    }

    pub fn link_count(&self) -> usize {
        self.out_links.iter().map(Vec::len).sum()
    }

    /// Links feeding `output`, in insertion order.
    pub fn links_to(&self, output: usize) -> &[WeightLink] {
        &self.out_links[output]
    }

    /// Links fed by `input` (valid after `remap`).
    pub fn links_from(&self, input: usize) -> &[WeightLink] {
        &self.in_links[input]
    }

    /// Number of weights used by at least one link (valid after `remap`).
    pub fn connected_weight_count(&self) -> usize {
        self.weight_links.iter().filter(|l| !l.is_empty()).count()
    }

    /// Weighted sums, bias and activation into `buffers.output`.
    pub fn forward_propagation(&self, input: &[f32], buffers: &mut LayerBuffers) {
        assert_eq!(input.len(), self.in_shape.size(), "input len mismatch");

        for (o, links) in self.out_links.iter().enumerate() {
            let mut sum = 0.0f32;
            for link in links {
                sum += self.weights[link.weight] * input[link.input];
            }
            sum *= self.scale_factor;
            if let Some(b) = self.out_bias[o] {
                sum += self.biases[b];
            }
            buffers.pre[o] = sum;
        }
        self.activation.apply(&buffers.pre, &mut buffers.output);
    }

    /// Input gradient plus accumulated weight and bias gradients.
    pub fn back_propagation(&self, input: &[f32], grad_output: &[f32], buffers: &mut LayerBuffers) {
        assert_eq!(grad_output.len(), self.out_shape.size(), "grad_output len mismatch");
        self.activation
            .backward(&buffers.output, grad_output, &mut buffers.delta);
        let delta = &buffers.delta;

        for (i, links) in self.in_links.iter().enumerate() {
            let mut sum = 0.0f32;
            for link in links {
                sum += self.weights[link.weight] * delta[link.output];
            }
            buffers.grad_input[i] = sum * self.scale_factor;
        }

        for (w, links) in self.weight_links.iter().enumerate() {
            let mut diff = 0.0f32;
            for link in links {
                diff += input[link.input] * delta[link.output];
            }
            buffers.grad_weights[w] += diff * self.scale_factor;
        }

        for (b, outputs) in self.bias_outputs.iter().enumerate() {
            buffers.grad_biases[b] += outputs.iter().map(|&o| delta[o]).sum::<f32>();
        }
    }

    /// Gauss-Newton curvature: same traversal as `back_propagation` with
    /// squared weights, squared inputs and squared activation slopes.
    pub fn back_propagation_2nd(
        &self,
        input: &[f32],
        delta2_output: &[f32],
        buffers: &mut LayerBuffers,
    ) {
        activation_delta2(self.activation, &buffers.output, delta2_output, &mut buffers.delta2);
        let delta2 = &buffers.delta2;
        let scale2 = self.scale_factor * self.scale_factor;

        for (w, links) in self.weight_links.iter().enumerate() {
            let mut diff = 0.0f32;
            for link in links {
                diff += input[link.input] * input[link.input] * delta2[link.output];
            }
            buffers.hessian_weights[w] += diff * scale2;
        }

        for (b, outputs) in self.bias_outputs.iter().enumerate() {
            buffers.hessian_biases[b] += outputs.iter().map(|&o| delta2[o]).sum::<f32>();
        }

        for (i, links) in self.in_links.iter().enumerate() {
            let mut sum = 0.0f32;
            for link in links {
                let w = self.weights[link.weight];
                sum += w * w * delta2[link.output];
            }
            buffers.delta2_input[i] = sum * scale2;
        }
    }

    fn max_fan(links: &[Vec<WeightLink>]) -> usize {
        links.iter().map(Vec::len).max().unwrap_or(0)
    }
}

impl Layer for PartialConnectedLayer {
    fn layer_type(&self) -> &'static str {
        "partial"
    }

    fn in_shape(&self) -> Index3D {
        self.in_shape
    }

    fn out_shape(&self) -> Index3D {
        self.out_shape
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
        Self::max_fan(&self.out_links)
    }

    fn fan_out_size(&self) -> usize {
        Self::max_fan(&self.in_links)
    }

    fn forward(&self, input: &[f32], buffers: &mut LayerBuffers) {
        self.forward_propagation(input, buffers);
    }

    fn backward(&self, input: &[f32], grad_output: &[f32], buffers: &mut LayerBuffers) {
        self.back_propagation(input, grad_output, buffers);
    }

    fn backward_2nd(&self, input: &[f32], delta2_output: &[f32], buffers: &mut LayerBuffers) {
        self.back_propagation_2nd(input, delta2_output, buffers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 3 inputs, 2 outputs: out0 = w0*x0 + w1*x1 + b0, out1 = w1*x1 + w2*x2 + b0
    fn shared_weight_layer() -> PartialConnectedLayer {
        let mut layer = PartialConnectedLayer::flat(3, 2, 3, 1, Activation::Identity);
        layer.connect_weight(0, 0, 0);
        layer.connect_weight(1, 0, 1);
        layer.connect_weight(1, 1, 1);
        layer.connect_weight(2, 1, 2);
        layer.connect_bias(0, 0);
        layer.connect_bias(0, 1);
        layer.remap();
        layer.weights.copy_from_slice(&[0.5, -1.0, 2.0]);
        layer.biases[0] = 0.25;
        layer
    }

    #[test]
    fn test_forward_weighted_sums() {
        let layer = shared_weight_layer();
        let mut buffers = layer.create_buffers();
        layer.forward(&[1.0, 2.0, 3.0], &mut buffers);
        assert_relative_eq!(buffers.output[0], 0.5 - 2.0 + 0.25);
        assert_relative_eq!(buffers.output[1], -2.0 + 6.0 + 0.25);
    }

    #[test]
    fn test_backward_shared_weight_accumulates_both_uses() {
        let layer = shared_weight_layer();
        let mut buffers = layer.create_buffers();
        let input = [1.0, 2.0, 3.0];
        layer.forward(&input, &mut buffers);
        layer.backward(&input, &[1.0, 10.0], &mut buffers);

        assert_eq!(buffers.grad_input, vec![0.5, -1.0 + -10.0, 20.0]);
        assert_eq!(buffers.grad_weights, vec![1.0, 2.0 + 20.0, 30.0]);
        assert_eq!(buffers.grad_biases, vec![11.0]);
    }

    #[test]
    fn test_gradients_accumulate_until_cleared() {
        let layer = shared_weight_layer();
        let mut buffers = layer.create_buffers();
        let input = [1.0, 2.0, 3.0];
        for _ in 0..2 {
            layer.forward(&input, &mut buffers);
            layer.backward(&input, &[1.0, 0.0], &mut buffers);
        }
        assert_eq!(buffers.grad_weights, vec![2.0, 4.0, 0.0]);
        buffers.clear_gradients();
        assert_eq!(buffers.grad_weights, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_remap_after_retain() {
        let mut layer = shared_weight_layer();
        assert_eq!(layer.link_count(), 4);
        layer.retain_links(|l| l.weight != 1);
        assert_eq!(layer.link_count(), 2);
        assert!(layer.links_from(1).is_empty());
        assert_eq!(layer.connected_weight_count(), 2);
    }

    #[test]
    fn test_scale_factor_applies_to_sum_not_bias() {
        let mut layer = PartialConnectedLayer::flat(2, 1, 1, 1, Activation::Identity)
            .with_scale_factor(0.5);
        layer.connect_weight(0, 0, 0);
        layer.connect_weight(1, 0, 0);
        layer.connect_bias(0, 0);
        layer.remap();
        layer.weights[0] = 1.0;
        layer.biases[0] = 1.0;
        let mut buffers = layer.create_buffers();
        layer.forward(&[2.0, 4.0], &mut buffers);
        assert_relative_eq!(buffers.output[0], 4.0);
    }

    #[test]
    #[should_panic(expected = "link output 5 out of range")]
    fn test_out_of_range_output_panics() {
        let mut layer = PartialConnectedLayer::flat(2, 2, 1, 0, Activation::Identity);
        layer.connect_weight(0, 5, 0);
    }
}
