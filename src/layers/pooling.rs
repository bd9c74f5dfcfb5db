//! Non-overlapping pooling layers.
//!
//! Both layers split every channel into `pooling_size × pooling_size` windows.
//! Average pooling is a partial-connected layer whose links share one
//! learnable weight (and bias) per channel; max pooling walks the same
//! windows but routes everything through the winning input.

use crate::error::{NetworkError, Result};
use crate::layers::r#trait::activation_delta2;
use crate::layers::{Layer, LayerBuffers, PartialConnectedLayer};
use crate::utils::{Activation, Index3D};

fn pooled_shape(
    in_width: usize,
    in_height: usize,
    in_channels: usize,
    pooling_size: usize,
) -> Result<(Index3D, Index3D)> {
    if pooling_size == 0 || in_channels == 0 {
        return Err(NetworkError::InvalidLayer(
            "pooling needs a positive window size and channel count".to_string(),
        ));
    }
    if in_width % pooling_size != 0 || in_height % pooling_size != 0 {
        return Err(NetworkError::InvalidLayer(format!(
            "pooling size {} does not divide a {}x{} input",
            pooling_size, in_width, in_height
        )));
    }
    Ok((
        Index3D::new(in_width, in_height, in_channels),
        Index3D::new(in_width / pooling_size, in_height / pooling_size, in_channels),
    ))
}

/// Calls `f(input_index, output_index, channel)` for every input pixel of
/// every pooling window, window by window.
fn for_each_window_cell<F: FnMut(usize, usize, usize)>(
    in_shape: Index3D,
    out_shape: Index3D,
    pooling_size: usize,
    mut f: F,
) {
    for c in 0..in_shape.depth {
        for y in 0..out_shape.height {
            for x in 0..out_shape.width {
                let output = out_shape.get_index(x, y, c);
                for dy in 0..pooling_size {
                    for dx in 0..pooling_size {
                        let input = in_shape.get_index(
                            x * pooling_size + dx,
                            y * pooling_size + dy,
                            c,
                        );
                        f(input, output, c);
                    }
                }
            }
        }
    }
}

/// Average pooling with a learned scale and bias per channel.
///
/// `y = f(w_c * mean(window) + b_c)`
#[derive(Debug, Clone)]
pub struct AveragePoolingLayer {
    base: PartialConnectedLayer,
    pooling_size: usize,
}

impl AveragePoolingLayer {
    pub fn new(
        in_width: usize,
        in_height: usize,
        in_channels: usize,
        pooling_size: usize,
        activation: Activation,
    ) -> Result<Self> {
        let (in_shape, out_shape) = pooled_shape(in_width, in_height, in_channels, pooling_size)?;
        let mut base =
            PartialConnectedLayer::new(in_shape, out_shape, in_channels, in_channels, activation)
                .with_scale_factor(1.0 / (pooling_size * pooling_size) as f32);

        for_each_window_cell(in_shape, out_shape, pooling_size, |input, output, c| {
            base.connect_weight(input, output, c);
        });
        for c in 0..out_shape.depth {
            for y in 0..out_shape.height {
                for x in 0..out_shape.width {
                    base.connect_bias(c, out_shape.get_index(x, y, c));
                }
            }
        }
        base.remap();

        Ok(Self { base, pooling_size })
    }

    pub fn pooling_size(&self) -> usize {
        self.pooling_size
    }

    pub fn engine(&self) -> &PartialConnectedLayer {
        &self.base
    }
}

impl Layer for AveragePoolingLayer {
    fn layer_type(&self) -> &'static str {
        "ave-pool"
    }

    fn in_shape(&self) -> Index3D {
        self.base.in_shape()
    }

    fn out_shape(&self) -> Index3D {
        self.base.out_shape()
    }

    fn activation(&self) -> Activation {
        self.base.activation()
    }

    fn weights(&self) -> &[f32] {
        self.base.weights()
    }

    fn biases(&self) -> &[f32] {
        self.base.biases()
    }

    fn params_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        self.base.params_mut()
    }

    fn fan_in_size(&self) -> usize {
        self.pooling_size * self.pooling_size
    }

    fn fan_out_size(&self) -> usize {
        1
    }

    fn forward(&self, input: &[f32], buffers: &mut LayerBuffers) {
        self.base.forward_propagation(input, buffers);
    }

    fn backward(&self, input: &[f32], grad_output: &[f32], buffers: &mut LayerBuffers) {
        self.base.back_propagation(input, grad_output, buffers);
    }

    fn backward_2nd(&self, input: &[f32], delta2_output: &[f32], buffers: &mut LayerBuffers) {
        self.base.back_propagation_2nd(input, delta2_output, buffers);
    }
}

/// Max pooling: each output takes the largest input of its window.
///
/// The forward pass records the winning input index per output in the
/// worker's buffers; the backward pass sends the whole output gradient to
/// that input and zero to the others. Winners are recomputed on every
/// forward call.
///
/// A `1 × 1` window with a softmax activation turns this layer into a plain
/// softmax block over `in_channels` values.
#[derive(Debug, Clone)]
pub struct MaxPoolingLayer {
    in_shape: Index3D,
    out_shape: Index3D,
    pooling_size: usize,
    activation: Activation,
    /// Input indices of each output's window.
    windows: Vec<Vec<usize>>,
}

impl MaxPoolingLayer {
    pub fn new(
        in_width: usize,
        in_height: usize,
        in_channels: usize,
        pooling_size: usize,
        activation: Activation,
    ) -> Result<Self> {
        let (in_shape, out_shape) = pooled_shape(in_width, in_height, in_channels, pooling_size)?;
        let mut windows = vec![Vec::with_capacity(pooling_size * pooling_size); out_shape.size()];
        for_each_window_cell(in_shape, out_shape, pooling_size, |input, output, _| {
            windows[output].push(input);
        });

        Ok(Self {
            in_shape,
            out_shape,
            pooling_size,
            activation,
            windows,
        })
    }

    pub fn pooling_size(&self) -> usize {
        self.pooling_size
    }
}

impl Layer for MaxPoolingLayer {
    fn layer_type(&self) -> &'static str {
        "max-pool"
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
        &[]
    }

    fn biases(&self) -> &[f32] {
        &[]
    }

    fn params_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut [], &mut [])
    }

    fn fan_in_size(&self) -> usize {
        self.pooling_size * self.pooling_size
    }

    fn fan_out_size(&self) -> usize {
        1
    }

    fn create_buffers(&self) -> LayerBuffers {
        LayerBuffers::new(self.input_size(), self.output_size(), 0, 0)
            .with_winners(self.output_size())
    }

    fn forward(&self, input: &[f32], buffers: &mut LayerBuffers) {
        assert_eq!(input.len(), self.in_shape.size(), "input len mismatch");
        for (o, window) in self.windows.iter().enumerate() {
            let mut best = window[0];
            for &i in &window[1..] {
                if input[i] > input[best] {
                    best = i;
                }
            }
            buffers.winners[o] = best;
            buffers.pre[o] = input[best];
        }
        self.activation.apply(&buffers.pre, &mut buffers.output);
    }

    fn backward(&self, _input: &[f32], grad_output: &[f32], buffers: &mut LayerBuffers) {
        self.activation
            .backward(&buffers.output, grad_output, &mut buffers.delta);
        buffers.grad_input.fill(0.0);
        for (o, &winner) in buffers.winners.iter().enumerate() {
            buffers.grad_input[winner] = buffers.delta[o];
        }
    }

    fn backward_2nd(&self, _input: &[f32], delta2_output: &[f32], buffers: &mut LayerBuffers) {
        activation_delta2(self.activation, &buffers.output, delta2_output, &mut buffers.delta2);
        buffers.delta2_input.fill(0.0);
        for (o, &winner) in buffers.winners.iter().enumerate() {
            buffers.delta2_input[winner] = buffers.delta2[o];
        }
    }
}
