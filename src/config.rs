//! Configuration structures for training
//!
//! This module provides the training configuration read from JSON files:
//! minibatch size, epoch count, worker count, loss, optimizer and an optional
//! learning-rate decay applied from the epoch callback.

use crate::error::{NetworkError, Result};
use crate::loss::Loss;
use crate::optimizers::{Adam, LevenbergMarquardt, Momentum, Optimizer, SGD};
use crate::utils::lr_scheduler::{ExponentialDecay, LRScheduler, StepDecay};
use serde::{Deserialize, Serialize};
use std::fs;

/// Optimizer selection with its hyperparameters.
///
/// Omitted hyperparameters fall back to the optimizer's `Default`.
///
/// ```json
/// { "type": "adam", "learning_rate": 0.001 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Sgd {
        learning_rate: Option<f32>,
        weight_decay: Option<f32>,
    },
    Momentum {
        learning_rate: Option<f32>,
        mu: Option<f32>,
        weight_decay: Option<f32>,
    },
    LevenbergMarquardt {
        learning_rate: Option<f32>,
        mu: Option<f32>,
    },
    Adam {
        learning_rate: Option<f32>,
        beta1: Option<f32>,
        beta2: Option<f32>,
        epsilon: Option<f32>,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Sgd {
            learning_rate: None,
            weight_decay: None,
        }
    }
}

impl OptimizerConfig {
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            OptimizerConfig::Sgd {
                learning_rate,
                weight_decay,
            } => {
                let base = SGD::default();
                Box::new(
                    SGD::new(learning_rate.unwrap_or(base.learning_rate()))
                        .with_weight_decay(weight_decay.unwrap_or(0.0)),
                )
            }
            OptimizerConfig::Momentum {
                learning_rate,
                mu,
                weight_decay,
            } => {
                let base = Momentum::default();
                Box::new(
                    Momentum::new(
                        learning_rate.unwrap_or(base.learning_rate()),
                        mu.unwrap_or(base.mu()),
                    )
                    .with_weight_decay(weight_decay.unwrap_or(0.0)),
                )
            }
            OptimizerConfig::LevenbergMarquardt { learning_rate, mu } => {
                let base = LevenbergMarquardt::default();
                Box::new(LevenbergMarquardt::new(
                    learning_rate.unwrap_or(base.learning_rate()),
                    mu.unwrap_or(base.mu()),
                ))
            }
            OptimizerConfig::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(
                learning_rate.unwrap_or(0.001),
                beta1.unwrap_or(0.9),
                beta2.unwrap_or(0.999),
                epsilon.unwrap_or(1e-8),
            )),
        }
    }

    fn learning_rate(&self) -> Option<f32> {
        match *self {
            OptimizerConfig::Sgd { learning_rate, .. }
            | OptimizerConfig::Momentum { learning_rate, .. }
            | OptimizerConfig::LevenbergMarquardt { learning_rate, .. }
            | OptimizerConfig::Adam { learning_rate, .. } => learning_rate,
        }
    }
}

/// Per-epoch learning-rate decay.
///
/// With `step_size` the rate is multiplied by `gamma` every `step_size`
/// epochs, otherwise every epoch. `min_lr` floors the decayed rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrDecayConfig {
    pub gamma: f32,
    pub step_size: Option<usize>,
    pub min_lr: Option<f32>,
}

fn default_minibatch_size() -> usize {
    10
}

fn default_epochs() -> usize {
    20
}

fn default_workers() -> usize {
    1
}

fn default_seed() -> u64 {
    42
}

/// Configuration for training
///
/// # Example
///
/// ```json
/// {
///   "minibatch_size": 10,
///   "epochs": 30,
///   "workers": 4,
///   "loss": "mse",
///   "optimizer": { "type": "levenberg_marquardt", "learning_rate": 0.00085 },
///   "lr_decay": { "gamma": 0.85, "min_lr": 0.00001 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_minibatch_size")]
    pub minibatch_size: usize,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Parallel workers per minibatch
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Seed for weight initialisation and dropout masks
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub loss: Loss,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    pub lr_decay: Option<LrDecayConfig>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            minibatch_size: default_minibatch_size(),
            epochs: default_epochs(),
            workers: default_workers(),
            seed: default_seed(),
            loss: Loss::default(),
            optimizer: OptimizerConfig::default(),
            lr_decay: None,
        }
    }
}

impl TrainingConfig {
    pub fn build_optimizer(&self) -> Box<dyn Optimizer> {
        self.optimizer.build()
    }

    /// Schedule matching `lr_decay`, starting from the optimizer's rate.
    pub fn build_scheduler(&self) -> Option<Box<dyn LRScheduler>> {
        let decay = self.lr_decay.as_ref()?;
        let initial = self.build_optimizer().learning_rate();
        let scheduler: Box<dyn LRScheduler> = match decay.step_size {
            Some(step_size) => Box::new(StepDecay::new(initial, step_size, decay.gamma)),
            None => Box::new(
                ExponentialDecay::new(initial, decay.gamma).with_min_lr(decay.min_lr.unwrap_or(0.0)),
            ),
        };
        Some(scheduler)
    }
}

/// Loads a training configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it into a `TrainingConfig` and
/// validates the values.
///
/// # Examples
///
/// ```no_run
/// use tiny_convnet::config::load_config;
///
/// let cfg = load_config("config/training.json").unwrap();
/// assert!(cfg.minibatch_size > 0);
/// ```
pub fn load_config(path: &str) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn invalid(message: impl Into<String>) -> NetworkError {
    NetworkError::InvalidConfig(message.into())
}

pub fn validate_config(config: &TrainingConfig) -> Result<()> {
    if config.minibatch_size == 0 {
        return Err(invalid("minibatch_size must be greater than 0"));
    }
    if config.workers == 0 {
        return Err(invalid("workers must be greater than 0"));
    }

    if let Some(lr) = config.optimizer.learning_rate() {
        if lr <= 0.0 {
            return Err(invalid("learning_rate must be positive"));
        }
    }

    match config.optimizer {
        OptimizerConfig::Sgd { weight_decay, .. } | OptimizerConfig::Momentum { weight_decay, .. }
            if weight_decay.is_some_and(|l| l < 0.0) =>
        {
            return Err(invalid("weight_decay must be non-negative"));
        }
        OptimizerConfig::Momentum { mu: Some(mu), .. } if !(0.0..1.0).contains(&mu) => {
            return Err(invalid("momentum mu must be in range [0.0, 1.0)"));
        }
        OptimizerConfig::LevenbergMarquardt { mu: Some(mu), .. } if mu < 0.0 => {
            return Err(invalid("levenberg_marquardt mu must be non-negative"));
        }
        OptimizerConfig::Adam { beta1, beta2, .. }
            if [beta1, beta2]
                .iter()
                .flatten()
                .any(|b| !(0.0..1.0).contains(b)) =>
        {
            return Err(invalid("adam betas must be in range [0.0, 1.0)"));
        }
        _ => {}
    }

    if let Some(ref decay) = config.lr_decay {
        if decay.gamma <= 0.0 || decay.gamma > 1.0 {
            return Err(invalid("lr_decay gamma must be in range (0.0, 1.0]"));
        }
        if decay.step_size == Some(0) {
            return Err(invalid("lr_decay step_size must be greater than 0"));
        }
        if decay.min_lr.is_some_and(|m| m < 0.0) {
            return Err(invalid("lr_decay min_lr must be non-negative"));
        }
    }

    Ok(())
}
