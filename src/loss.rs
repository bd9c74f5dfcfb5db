//! Loss functions evaluated at the network output.
//!
//! A loss provides the scalar objective for reporting and its gradient with
//! respect to each network output, which seeds the backward pass.

use serde::{Deserialize, Serialize};

/// Keeps logarithms and divisions finite for saturated outputs.
const PROB_EPSILON: f32 = 1e-7;

/// Loss function selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    /// `½ Σ (y - t)²`
    #[default]
    Mse,
    /// Binary cross-entropy, one independent probability per output.
    CrossEntropy,
    /// Categorical cross-entropy, for softmax outputs.
    CrossEntropyMulticlass,
}

impl Loss {
    /// Scalar loss of one sample.
    pub fn value(&self, output: &[f32], target: &[f32]) -> f32 {
        assert_eq!(output.len(), target.len(), "loss: output/target length mismatch");
        match self {
            Loss::Mse => {
                output
                    .iter()
                    .zip(target)
                    .map(|(y, t)| (y - t) * (y - t))
                    .sum::<f32>()
                    * 0.5
            }
            Loss::CrossEntropy => output
                .iter()
                .zip(target)
                .map(|(&y, &t)| {
                    let y = y.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                    -t * y.ln() - (1.0 - t) * (1.0 - y).ln()
                })
                .sum(),
            Loss::CrossEntropyMulticlass => output
                .iter()
                .zip(target)
                .map(|(&y, &t)| -t * y.max(PROB_EPSILON).ln())
                .sum(),
        }
    }

    /// dL/dy for every output, written into `grad`.
    pub fn derivative(&self, output: &[f32], target: &[f32], grad: &mut [f32]) {
        assert_eq!(output.len(), target.len(), "loss: output/target length mismatch");
        assert_eq!(output.len(), grad.len(), "loss: gradient length mismatch");
        for ((g, &y), &t) in grad.iter_mut().zip(output).zip(target) {
            *g = match self {
                Loss::Mse => y - t,
                Loss::CrossEntropy => {
                    let y = y.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                    (y - t) / (y * (1.0 - y))
                }
                Loss::CrossEntropyMulticlass => -t / y.max(PROB_EPSILON),
            };
        }
    }

    /// Curvature d²L/dy² used by the Hessian diagonal estimate.
    pub fn second_derivative(&self, output: &[f32], target: &[f32], out: &mut [f32]) {
        for ((h, &y), &t) in out.iter_mut().zip(output).zip(target) {
            *h = match self {
                Loss::Mse => 1.0,
                Loss::CrossEntropy => {
                    let y = y.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                    t / (y * y) + (1.0 - t) / ((1.0 - y) * (1.0 - y))
                }
                Loss::CrossEntropyMulticlass => {
                    let y = y.max(PROB_EPSILON);
                    t / (y * y)
                }
            };
        }
    }
}
