//! 2D convolutional layer built on the partial-connected engine.
//!
//! The layer only decides which links exist: each output pixel of each
//! output channel is connected to a `window_size × window_size` patch of every
//! input channel that the [`ConnectionTable`] allows. Stride is always 1.

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};
use crate::layers::{ConnectionTable, Layer, LayerBuffers, PartialConnectedLayer};
use crate::utils::{Activation, Index3D};

/// Border handling of a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// Only positions where the kernel fits inside the input; output shrinks
    /// by `window_size - 1`.
    #[default]
    Valid,
    /// Implicit zero padding of `window_size / 2`; output keeps the input size.
    Same,
}

impl Padding {
    pub fn out_length(&self, in_length: usize, window_size: usize) -> usize {
        match self {
            Padding::Valid => in_length - window_size + 1,
            Padding::Same => in_length,
        }
    }

    fn amount(&self, window_size: usize) -> usize {
        match self {
            Padding::Valid => 0,
            Padding::Same => window_size / 2,
        }
    }
}

/// Convolutional layer with learnable `window_size²` kernels per connected
/// (input channel, output channel) pair and one bias per output channel.
///
/// The weight vector always has room for every channel pair
/// (`window_size² × in_channels × out_channels`); pairs switched off by the
/// connection table simply have no links.
///
/// # Example
///
/// ```
/// use tiny_convnet::layers::{Conv2DLayer, Layer, Padding};
/// use tiny_convnet::utils::Activation;
///
/// // 32x32 grayscale in, 5x5 kernels, 6 feature maps
/// let conv = Conv2DLayer::new(32, 32, 5, 1, 6, Padding::Valid, Activation::Tanh).unwrap();
/// assert_eq!(conv.out_shape().width, 28);
/// assert_eq!(conv.parameter_count(), 5 * 5 * 6 + 6);
/// ```
#[derive(Debug, Clone)]
pub struct Conv2DLayer {
    base: PartialConnectedLayer,
    in_shape: Index3D,
    out_shape: Index3D,
    weight_shape: Index3D,
    window_size: usize,
    padding: Padding,
    connection: ConnectionTable,
}

impl Conv2DLayer {
    /// Fully connected channels.
    pub fn new(
        in_width: usize,
        in_height: usize,
        window_size: usize,
        in_channels: usize,
        out_channels: usize,
        padding: Padding,
        activation: Activation,
    ) -> Result<Self> {
        Self::with_connection_table(
            in_width,
            in_height,
            window_size,
            in_channels,
            out_channels,
            ConnectionTable::full(),
            padding,
            activation,
        )
    }

    /// Channels restricted by `table` (rows = input channels, cols = output channels).
    #[allow(clippy::too_many_arguments)]
    pub fn with_connection_table(
        in_width: usize,
        in_height: usize,
        window_size: usize,
        in_channels: usize,
        out_channels: usize,
        table: ConnectionTable,
        padding: Padding,
        activation: Activation,
    ) -> Result<Self> {
        if window_size == 0 || in_channels == 0 || out_channels == 0 {
            return Err(NetworkError::InvalidLayer(
                "convolution needs a positive window size and channel counts".to_string(),
            ));
        }
        if padding == Padding::Valid && (window_size > in_width || window_size > in_height) {
            return Err(NetworkError::InvalidLayer(format!(
                "window {} does not fit a {}x{} input without padding",
                window_size, in_width, in_height
            )));
        }
        table.validate(in_channels, out_channels)?;

        let in_shape = Index3D::new(in_width, in_height, in_channels);
        let out_shape = Index3D::new(
            padding.out_length(in_width, window_size),
            padding.out_length(in_height, window_size),
            out_channels,
        );
        let weight_shape = Index3D::new(window_size, window_size, in_channels * out_channels);
        let base = PartialConnectedLayer::new(
            in_shape,
            out_shape,
            weight_shape.size(),
            out_channels,
            activation,
        );

        let mut layer = Self {
            base,
            in_shape,
            out_shape,
            weight_shape,
            window_size,
            padding,
            connection: table,
        };
        layer.init_connection();
        Ok(layer)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn connection_table(&self) -> &ConnectionTable {
        &self.connection
    }

    /// The underlying link engine.
    pub fn engine(&self) -> &PartialConnectedLayer {
        &self.base
    }

    /// Replace the channel connectivity after construction and rebuild links.
    ///
    /// Weight values are left as they are; kernels of newly connected pairs
    /// keep whatever they were initialised to.
    pub fn set_connection_table(&mut self, table: ConnectionTable) -> Result<()> {
        table.validate(self.in_shape.depth, self.out_shape.depth)?;
        self.connection = table;
        self.base.clear_links();
        self.init_connection();
        Ok(())
    }

    fn init_connection(&mut self) {
        let pad = self.padding.amount(self.window_size);

        for inc in 0..self.in_shape.depth {
            for outc in 0..self.out_shape.depth {
                if !self.connection.is_connected(inc, outc) {
                    continue;
                }
                for y in 0..self.out_shape.height {
                    for x in 0..self.out_shape.width {
                        self.connect_kernel(inc, outc, x, y, pad);
                    }
                }
            }
        }

        for outc in 0..self.out_shape.depth {
            for y in 0..self.out_shape.height {
                for x in 0..self.out_shape.width {
                    self.base.connect_bias(outc, self.out_shape.get_index(x, y, outc));
                }
            }
        }

        self.base.remap();
    }

    fn connect_kernel(&mut self, inc: usize, outc: usize, x: usize, y: usize, pad: usize) {
        let output = self.out_shape.get_index(x, y, outc);
        let kernel = outc * self.in_shape.depth + inc;

        for dy in 0..self.window_size {
            // Source pixels in the zero-padded border contribute nothing.
            if y + dy < pad || y + dy - pad >= self.in_shape.height {
                continue;
            }
            for dx in 0..self.window_size {
                if x + dx < pad || x + dx - pad >= self.in_shape.width {
                    continue;
                }
                self.base.connect_weight(
                    self.in_shape.get_index(x + dx - pad, y + dy - pad, inc),
                    output,
                    self.weight_shape.get_index(dx, dy, kernel),
                );
            }
        }
    }
}

impl Layer for Conv2DLayer {
    fn layer_type(&self) -> &'static str {
        "conv"
    }

    fn in_shape(&self) -> Index3D {
        self.in_shape
    }

    fn out_shape(&self) -> Index3D {
        self.out_shape
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
        self.window_size * self.window_size * self.in_shape.depth
    }

    fn fan_out_size(&self) -> usize {
        self.window_size * self.window_size * self.out_shape.depth
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
