//! Activation functions applied after each layer's weighted aggregation.
//!
//! An [`Activation`] is a small strategy value chosen when a layer is built.
//! Derivatives are expressed in terms of the activated output `y = f(z)`,
//! which is what layers keep around after the forward pass.

/// Activation function selector.
///
/// # Example
///
/// ```
/// use tiny_convnet::utils::activations::Activation;
///
/// let mut out = vec![0.0f32; 3];
/// Activation::Relu.apply(&[-1.0, 0.0, 2.0], &mut out);
/// assert_eq!(out, vec![0.0, 0.0, 2.0]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Activation {
    #[default]
    Identity,
    Sigmoid,
    Tanh,
    Relu,
    LeakyRelu {
        alpha: f32,
    },
    Elu {
        alpha: f32,
    },
    /// Softmax over the whole output vector of the layer.
    Softmax,
}

impl Activation {
    /// Parse the short names used in configuration files.
    ///
    /// `leaky_relu` and `elu` get their customary default slopes.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "identity" | "linear" => Some(Activation::Identity),
            "sigmoid" => Some(Activation::Sigmoid),
            "tanh" | "tan_h" => Some(Activation::Tanh),
            "relu" => Some(Activation::Relu),
            "leaky_relu" => Some(Activation::LeakyRelu { alpha: 0.01 }),
            "elu" => Some(Activation::Elu { alpha: 1.0 }),
            "softmax" => Some(Activation::Softmax),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Relu => "relu",
            Activation::LeakyRelu { .. } => "leaky_relu",
            Activation::Elu { .. } => "elu",
            Activation::Softmax => "softmax",
        }
    }

    /// Elementwise transform of a single pre-activation value.
    ///
    /// Softmax is not elementwise; use [`Activation::apply`] for it.
    pub fn f(&self, z: f32) -> f32 {
        match *self {
            Activation::Identity | Activation::Softmax => z,
            Activation::Sigmoid => 1.0 / (1.0 + (-z).exp()),
            Activation::Tanh => z.tanh(),
            Activation::Relu => z.max(0.0),
            Activation::LeakyRelu { alpha } => {
                if z > 0.0 {
                    z
                } else {
                    alpha * z
                }
            }
            Activation::Elu { alpha } => {
                if z > 0.0 {
                    z
                } else {
                    alpha * (z.exp() - 1.0)
                }
            }
        }
    }

    /// Derivative expressed through the output `y = f(z)`.
    ///
    /// For softmax this is the diagonal of the Jacobian only.
    pub fn df(&self, y: f32) -> f32 {
        match *self {
            Activation::Identity => 1.0,
            Activation::Sigmoid | Activation::Softmax => y * (1.0 - y),
            Activation::Tanh => 1.0 - y * y,
            Activation::Relu => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyRelu { alpha } => {
                if y > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            Activation::Elu { alpha } => {
                if y > 0.0 {
                    1.0
                } else {
                    y + alpha
                }
            }
        }
    }

    /// Activate a whole layer output: `output[i] = f(pre[i])`.
    pub fn apply(&self, pre: &[f32], output: &mut [f32]) {
        assert_eq!(pre.len(), output.len(), "activation length mismatch");
        match self {
            Activation::Softmax => softmax(pre, output),
            _ => {
                for (y, &z) in output.iter_mut().zip(pre) {
                    *y = self.f(z);
                }
            }
        }
    }

    /// Turn dL/dy into dL/dz given the activated output `y`.
    ///
    /// Softmax uses its full Jacobian: `dz_i = y_i * (g_i - Σ_j g_j y_j)`.
    pub fn backward(&self, y: &[f32], grad_output: &[f32], grad_pre: &mut [f32]) {
        assert_eq!(y.len(), grad_output.len(), "activation length mismatch");
        assert_eq!(y.len(), grad_pre.len(), "activation length mismatch");
        match self {
            Activation::Softmax => {
                let dot: f32 = y.iter().zip(grad_output).map(|(a, g)| a * g).sum();
                for ((d, &yi), &gi) in grad_pre.iter_mut().zip(y).zip(grad_output) {
                    *d = yi * (gi - dot);
                }
            }
            _ => {
                for ((d, &yi), &gi) in grad_pre.iter_mut().zip(y).zip(grad_output) {
                    *d = gi * self.df(yi);
                }
            }
        }
    }

    /// Values used for "off" and "on" entries of one-hot training targets.
    pub fn target_range(&self) -> (f32, f32) {
        match self {
            Activation::Tanh => (-0.8, 0.8),
            Activation::Softmax => (0.0, 1.0),
            _ => (0.1, 0.9),
        }
    }
}

/// Numerically stable softmax (max-subtraction).
pub fn softmax(pre: &[f32], output: &mut [f32]) {
    if pre.is_empty() {
        return;
    }
    let max = pre.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for (y, &z) in output.iter_mut().zip(pre) {
        *y = (z - max).exp();
        sum += *y;
    }
    let inv = 1.0 / sum;
    for y in output.iter_mut() {
        *y *= inv;
    }
}
