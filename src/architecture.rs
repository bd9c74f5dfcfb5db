//! Architecture configuration structures
//!
//! This module provides configuration structures for defining network architectures
//! via JSON configuration files, so a LeNet-style chain can be changed without
//! touching code.

use crate::config::TrainingConfig;
use crate::error::{NetworkError, Result};
use crate::layers::{
    AveragePoolingLayer, ConnectionTable, Conv2DLayer, DenseLayer, DropoutLayer, DropoutMode,
    GhhActivationLayer, Layer, MaxPoolingLayer, Padding,
};
use crate::network::Network;
use crate::utils::{Activation, Index3D, SimpleRng};
use serde::{Deserialize, Serialize};
use std::fs;

const LAYER_TYPES: &str =
    "convolutional, average_pooling, max_pooling, fully_connected, dropout, ghh";

/// Configuration for a single layer in the network.
///
/// Defines the layer type and its parameters. Different layer types require different fields:
///
/// - **convolutional**: `input_width`, `input_height`, `window_size`, `in_channels`,
///   `out_channels`; optional `padding` (`valid` default, or `same`) and
///   `connection_table` (row-major, `in_channels` rows × `out_channels` columns)
/// - **average_pooling** / **max_pooling**: `input_width`, `input_height`,
///   `in_channels`, `pooling_size`
/// - **fully_connected**: `input_size`, `output_size`
/// - **dropout**: `drop_rate` and either `input_size` or the full
///   `input_width`/`input_height`/`in_channels` geometry; optional `per_batch`
/// - **ghh**: `output_size`, `n_sum`, `n_max`
///
/// Every layer except dropout accepts an `activation` name (default `identity`).
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "convolutional",
///   "input_width": 32,
///   "input_height": 32,
///   "window_size": 5,
///   "in_channels": 1,
///   "out_channels": 6,
///   "activation": "tanh"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub layer_type: String,

    // Image geometry
    pub input_width: Option<usize>,
    pub input_height: Option<usize>,
    pub in_channels: Option<usize>,
    pub out_channels: Option<usize>,
    /// Convolution kernel size (square)
    pub window_size: Option<usize>,
    /// Pooling window size (square, non-overlapping)
    pub pooling_size: Option<usize>,
    pub padding: Option<Padding>,
    pub connection_table: Option<Vec<bool>>,

    // Flat geometry
    pub input_size: Option<usize>,
    pub output_size: Option<usize>,

    // Dropout
    pub drop_rate: Option<f32>,
    pub per_batch: Option<bool>,

    // GHH
    pub n_sum: Option<usize>,
    pub n_max: Option<usize>,

    /// Activation name: identity, sigmoid, tanh, relu, leaky_relu, elu, softmax
    pub activation: Option<String>,
}

/// Configuration for the entire network architecture.
///
/// Layers are chained in the order they appear in the configuration.
///
/// # Example
///
/// ```json
/// {
///   "layers": [
///     { "layer_type": "fully_connected", "input_size": 784, "output_size": 100, "activation": "tanh" },
///     { "layer_type": "dropout", "input_size": 100, "drop_rate": 0.2 },
///     { "layer_type": "fully_connected", "input_size": 100, "output_size": 10, "activation": "tanh" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    /// Sequence of layer configurations defining the network structure
    pub layers: Vec<LayerConfig>,
}

/// Loads an architecture configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it into an `ArchitectureConfig` and
/// validates every layer and every connection between consecutive layers.
///
/// # Examples
///
/// ```no_run
/// use tiny_convnet::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/lenet5.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: &str) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

fn require<T>(value: Option<T>, index: usize, layer_type: &str, field: &str) -> Result<T> {
    value.ok_or_else(|| {
        NetworkError::InvalidConfig(format!(
            "Layer {}: {} layer requires '{}'",
            index, layer_type, field
        ))
    })
}

fn layer_error(index: usize, err: NetworkError) -> NetworkError {
    match err {
        NetworkError::InvalidLayer(msg) | NetworkError::InvalidConnectionTable(msg) => {
            NetworkError::InvalidConfig(format!("Layer {}: {}", index, msg))
        }
        other => other,
    }
}

fn parse_activation(layer: &LayerConfig, index: usize) -> Result<Activation> {
    match layer.activation {
        None => Ok(Activation::Identity),
        Some(ref name) => Activation::from_name(name).ok_or_else(|| {
            NetworkError::InvalidConfig(format!(
                "Layer {}: unknown activation '{}'",
                index, name
            ))
        }),
    }
}

/// Builds one layer from its configuration.
///
/// Weights are left at zero; [`build_network`] initialises them.
pub fn build_layer(layer: &LayerConfig, index: usize) -> Result<Box<dyn Layer>> {
    let layer_type = layer.layer_type.to_lowercase();
    let activation = parse_activation(layer, index)?;

    let built: Box<dyn Layer> = match layer_type.as_str() {
        "convolutional" => {
            let in_channels = require(layer.in_channels, index, &layer_type, "in_channels")?;
            let out_channels = require(layer.out_channels, index, &layer_type, "out_channels")?;
            let table = match layer.connection_table {
                Some(ref entries) => ConnectionTable::new(entries, in_channels, out_channels)
                    .map_err(|e| layer_error(index, e))?,
                None => ConnectionTable::full(),
            };
            Box::new(
                Conv2DLayer::with_connection_table(
                    require(layer.input_width, index, &layer_type, "input_width")?,
                    require(layer.input_height, index, &layer_type, "input_height")?,
                    require(layer.window_size, index, &layer_type, "window_size")?,
                    in_channels,
                    out_channels,
                    table,
                    layer.padding.unwrap_or_default(),
                    activation,
                )
                .map_err(|e| layer_error(index, e))?,
            )
        }
        "average_pooling" | "max_pooling" => {
            let width = require(layer.input_width, index, &layer_type, "input_width")?;
            let height = require(layer.input_height, index, &layer_type, "input_height")?;
            let channels = require(layer.in_channels, index, &layer_type, "in_channels")?;
            let pooling = require(layer.pooling_size, index, &layer_type, "pooling_size")?;
            if layer_type == "average_pooling" {
                Box::new(
                    AveragePoolingLayer::new(width, height, channels, pooling, activation)
                        .map_err(|e| layer_error(index, e))?,
                )
            } else {
                Box::new(
                    MaxPoolingLayer::new(width, height, channels, pooling, activation)
                        .map_err(|e| layer_error(index, e))?,
                )
            }
        }
        "fully_connected" => {
            let input_size = require(layer.input_size, index, &layer_type, "input_size")?;
            let output_size = require(layer.output_size, index, &layer_type, "output_size")?;
            if input_size == 0 || output_size == 0 {
                return Err(NetworkError::InvalidConfig(format!(
                    "Layer {}: fully_connected sizes must be greater than 0",
                    index
                )));
            }
            Box::new(DenseLayer::new(input_size, output_size, activation))
        }
        "dropout" => {
            let drop_rate = require(layer.drop_rate, index, &layer_type, "drop_rate")?;
            let shape = match (layer.input_width, layer.input_height, layer.in_channels) {
                (Some(w), Some(h), Some(c)) => Index3D::new(w, h, c),
                _ => Index3D::new(
                    require(layer.input_size, index, &layer_type, "input_size")?,
                    1,
                    1,
                ),
            };
            let mode = if layer.per_batch.unwrap_or(false) {
                DropoutMode::PerBatch
            } else {
                DropoutMode::PerSample
            };
            Box::new(
                DropoutLayer::with_shape(shape, drop_rate, mode)
                    .map_err(|e| layer_error(index, e))?,
            )
        }
        "ghh" => Box::new(
            GhhActivationLayer::new(
                require(layer.output_size, index, &layer_type, "output_size")?,
                require(layer.n_sum, index, &layer_type, "n_sum")?,
                require(layer.n_max, index, &layer_type, "n_max")?,
                activation,
            )
            .map_err(|e| layer_error(index, e))?,
        ),
        _ => {
            return Err(NetworkError::InvalidConfig(format!(
                "Layer {}: Invalid layer type '{}'. Must be one of: {}",
                index, layer.layer_type, LAYER_TYPES
            )));
        }
    };
    Ok(built)
}

/// Validates an architecture configuration.
///
/// Checks that:
/// - Architecture has at least one layer
/// - Each layer has the required fields for its type and a buildable geometry
/// - Layer connections are valid (output size of layer i matches input size of layer i+1)
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(NetworkError::InvalidConfig(
            "Architecture must have at least one layer".to_string(),
        ));
    }

    let mut previous_output: Option<usize> = None;
    for (i, layer_config) in config.layers.iter().enumerate() {
        let layer = build_layer(layer_config, i)?;
        if let Some(output) = previous_output {
            if output != layer.input_size() {
                return Err(NetworkError::InvalidConfig(format!(
                    "Layer connection mismatch: Layer {} output size ({}) does not match Layer {} input size ({})",
                    i - 1,
                    output,
                    i,
                    layer.input_size()
                )));
            }
        }
        previous_output = Some(layer.output_size());
    }

    Ok(())
}

/// Builds a ready-to-train network from an architecture and a training configuration.
///
/// Layers are chained in order, weights initialised from `rng`, and the
/// network gets the configured loss, optimizer, worker count and seed.
///
/// # Examples
///
/// ```no_run
/// use tiny_convnet::architecture::{build_network, load_architecture};
/// use tiny_convnet::config::load_config;
/// use tiny_convnet::utils::SimpleRng;
///
/// let arch = load_architecture("config/architectures/lenet5.json").unwrap();
/// let training = load_config("config/training.json").unwrap();
/// let mut rng = SimpleRng::new(training.seed);
/// let net = build_network(&arch, &training, &mut rng).unwrap();
/// assert_eq!(net.len(), arch.layers.len());
/// ```
pub fn build_network(
    config: &ArchitectureConfig,
    training: &TrainingConfig,
    rng: &mut SimpleRng,
) -> Result<Network> {
    if config.layers.is_empty() {
        return Err(NetworkError::InvalidConfig(
            "Architecture must have at least one layer".to_string(),
        ));
    }

    let mut net = Network::new(training.loss, training.build_optimizer())
        .with_workers(training.workers)
        .with_seed(training.seed);

    for (i, layer_config) in config.layers.iter().enumerate() {
        net.add_boxed(build_layer(layer_config, i)?)?;
    }
    net.init_weights(rng);
    Ok(net)
}
