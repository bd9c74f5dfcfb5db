//! Dropout layer implementation for regularization
//!
//! This module provides a DropoutLayer that randomly drops (sets to zero) a fraction
//! of input units during training to prevent overfitting. During inference, all units
//! are kept and outputs are passed through unchanged.

use crate::error::{NetworkError, Result};
use crate::layers::{Layer, LayerBuffers};
use crate::utils::{Activation, Index3D, SimpleRng};

/// Whether a network is being trained or evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Train,
    Test,
}

/// How often the dropout mask is redrawn during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropoutMode {
    /// New mask for every sample.
    #[default]
    PerSample,
    /// One mask shared by every sample (and worker) of a minibatch.
    PerBatch,
}

/// Dropout layer for regularization.
///
/// During training, randomly sets a fraction of input units to zero with probability
/// `drop_rate`, and scales the remaining units by 1/(1-drop_rate) to maintain expected
/// values. During inference, passes inputs through unchanged.
///
/// The mask and its random generator live in the worker's [`LayerBuffers`],
/// so the layer itself stays read-only while a minibatch runs.
///
/// # Fields
///
/// * `shape` - Input/output shape (dropout doesn't change dimensions)
/// * `drop_rate` - Probability of dropping each unit (0.0 = no dropout)
/// * `mode` - Per-sample or per-minibatch masks
/// * `phase` - Train (masking) or Test (pass-through)
///
/// # Example
///
/// ```
/// use tiny_convnet::layers::{DropoutLayer, Layer, Phase};
///
/// let mut layer = DropoutLayer::new(512, 0.5).unwrap();
/// layer.set_phase(Phase::Test);
/// assert_eq!(layer.input_size(), 512);
/// assert_eq!(layer.output_size(), 512);
/// ```
#[derive(Debug, Clone)]
pub struct DropoutLayer {
    shape: Index3D,
    drop_rate: f32,
    mode: DropoutMode,
    phase: Phase,
}

impl DropoutLayer {
    /// Creates a flat dropout layer with per-sample masks.
    ///
    /// The layer starts in [`Phase::Train`].
    ///
    /// # Arguments
    ///
    /// * `size` - Number of input/output features
    /// * `drop_rate` - Probability of dropping each unit, in `[0.0, 1.0)`
    pub fn new(size: usize, drop_rate: f32) -> Result<Self> {
        Self::with_shape(Index3D::new(size, 1, 1), drop_rate, DropoutMode::PerSample)
    }

    /// Dropout over a 3D feature map, e.g. right after a convolution.
    pub fn with_shape(shape: Index3D, drop_rate: f32, mode: DropoutMode) -> Result<Self> {
        if !(0.0..1.0).contains(&drop_rate) {
            return Err(NetworkError::InvalidLayer(format!(
                "drop_rate must be in range [0.0, 1.0), got {}",
                drop_rate
            )));
        }
        Ok(Self {
            shape,
            drop_rate,
            mode,
            phase: Phase::Train,
        })
    }

    pub fn drop_rate(&self) -> f32 {
        self.drop_rate
    }

    pub fn mode(&self) -> DropoutMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn scale(&self) -> f32 {
        1.0 / (1.0 - self.drop_rate)
    }

    fn sample_mask(&self, mask: &mut Vec<f32>, rng: &mut SimpleRng) {
        mask.clear();
        mask.extend((0..self.shape.size()).map(|_| {
            if rng.gen_bool(self.drop_rate) {
                0.0
            } else {
                1.0
            }
        }));
    }
}

impl Layer for DropoutLayer {
    fn layer_type(&self) -> &'static str {
        "dropout"
    }

    fn in_shape(&self) -> Index3D {
        self.shape
    }

    fn out_shape(&self) -> Index3D {
        self.shape
    }

    fn activation(&self) -> Activation {
        Activation::Identity
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
        1
    }

    fn fan_out_size(&self) -> usize {
        1
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    fn begin_minibatch(&self, seed: u64, buffers: &mut LayerBuffers) {
        if self.mode == DropoutMode::PerBatch {
            let mut rng = SimpleRng::new(seed);
            self.sample_mask(&mut buffers.mask, &mut rng);
        }
    }

    fn forward(&self, input: &[f32], buffers: &mut LayerBuffers) {
        assert_eq!(
            input.len(),
            self.shape.size(),
            "input len mismatch: expected {}, got {}",
            self.shape.size(),
            input.len()
        );

        if self.phase == Phase::Test {
            // Inference mode: pass through unchanged
            buffers.pre.copy_from_slice(input);
            buffers.output.copy_from_slice(input);
            return;
        }

        // A per-batch mask is drawn from the worker's generator until the
        // first minibatch supplies one.
        if self.mode == DropoutMode::PerSample || buffers.mask.is_empty() {
            let LayerBuffers { mask, rng, .. } = buffers;
            self.sample_mask(mask, rng);
        }
        let scale = self.scale();
        for ((y, &x), &m) in buffers.output.iter_mut().zip(input).zip(&buffers.mask) {
            *y = x * m * scale;
        }
        buffers.pre.copy_from_slice(&buffers.output);
    }

    fn backward(&self, _input: &[f32], grad_output: &[f32], buffers: &mut LayerBuffers) {
        assert_eq!(
            grad_output.len(),
            self.shape.size(),
            "grad_output len mismatch: expected {}, got {}",
            self.shape.size(),
            grad_output.len()
        );

        if self.phase == Phase::Test {
            buffers.grad_input.copy_from_slice(grad_output);
            return;
        }
        let scale = self.scale();
        for ((g, &go), &m) in buffers.grad_input.iter_mut().zip(grad_output).zip(&buffers.mask) {
            *g = go * m * scale;
        }
    }

    fn backward_2nd(&self, _input: &[f32], delta2_output: &[f32], buffers: &mut LayerBuffers) {
        if self.phase == Phase::Test {
            buffers.delta2_input.copy_from_slice(delta2_output);
            return;
        }
        let scale = self.scale();
        for ((g, &d), &m) in buffers
            .delta2_input
            .iter_mut()
            .zip(delta2_output)
            .zip(&buffers.mask)
        {
            let factor = m * scale;
            *g = d * factor * factor;
        }
    }
}
