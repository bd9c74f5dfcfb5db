//! Feed-forward network: layer chain, training loop and evaluation.
//!
//! A [`Network`] owns its layers, a [`Loss`] and a boxed [`Optimizer`].
//! Layers are appended while the network is idle; the first forward, test or
//! train call freezes the chain and allocates one buffer set per worker.
//!
//! Within a minibatch every worker runs forward and backward passes for its
//! share of the samples (worker `w` takes samples `w, w + W, ...`) on its own
//! [`LayerBuffers`], in parallel through rayon. Once all workers are done the
//! per-worker gradients are summed in worker order into worker 0, divided by
//! the minibatch size and handed to the optimizer, one parameter vector at a
//! time.

use std::io::{Read, Write};

use log::{debug, info, trace};
use rayon::prelude::*;

use crate::error::{NetworkError, Result};
use crate::layers::{DenseLayer, Layer, LayerBuffers, Phase};
use crate::loss::Loss;
use crate::optimizers::{Optimizer, ParamKey};
use crate::result::TestResult;
use crate::utils::{Activation, SimpleRng};

/// Number of leading training samples used to estimate the Hessian diagonal.
const HESSIAN_SAMPLES: usize = 500;

const DEFAULT_SEED: u64 = 42;

/// Lifecycle of the layer chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// Layers may still be appended.
    Idle,
    /// Chain is frozen and worker buffers exist.
    Built,
    /// A minibatch is being accumulated.
    Training,
}

/// Scratch state of one parallel execution slot.
struct Worker {
    buffers: Vec<LayerBuffers>,
    /// dL/dy (or d²L/dy²) at the network output.
    loss_grad: Vec<f32>,
}

impl Worker {
    fn new(layers: &[Box<dyn Layer>], rng: &mut SimpleRng) -> Self {
        let buffers = layers
            .iter()
            .map(|layer| {
                let mut buffers = layer.create_buffers();
                buffers.rng = rng.fork();
                buffers
            })
            .collect();
        let output_size = layers.last().map_or(0, |l| l.output_size());
        Self {
            buffers,
            loss_grad: vec![0.0; output_size],
        }
    }

    fn output(&self) -> &[f32] {
        self.buffers.last().map(|b| b.output.as_slice()).unwrap_or(&[])
    }

    fn forward(&mut self, layers: &[Box<dyn Layer>], input: &[f32]) {
        for (i, layer) in layers.iter().enumerate() {
            let (done, rest) = self.buffers.split_at_mut(i);
            let layer_input: &[f32] = if i == 0 { input } else { &done[i - 1].output };
            layer.forward(layer_input, &mut rest[0]);
        }
    }

    /// Backward pass of the sample last sent through [`Worker::forward`].
    fn backward(&mut self, layers: &[Box<dyn Layer>], loss: Loss, input: &[f32], target: &[f32]) {
        let last = layers.len() - 1;
        loss.derivative(&self.buffers[last].output, target, &mut self.loss_grad);

        for i in (0..layers.len()).rev() {
            let (upto, after) = self.buffers.split_at_mut(i + 1);
            let (before, current) = upto.split_at_mut(i);
            let layer_input: &[f32] = if i == 0 { input } else { &before[i - 1].output };
            let grad_output = if i == last {
                &self.loss_grad
            } else {
                &after[0].grad_input
            };
            layers[i].backward(layer_input, grad_output, &mut current[0]);
        }
    }

    fn backward_2nd(&mut self, layers: &[Box<dyn Layer>], loss: Loss, input: &[f32], target: &[f32]) {
        let last = layers.len() - 1;
        loss.second_derivative(&self.buffers[last].output, target, &mut self.loss_grad);

        for i in (0..layers.len()).rev() {
            let (upto, after) = self.buffers.split_at_mut(i + 1);
            let (before, current) = upto.split_at_mut(i);
            let layer_input: &[f32] = if i == 0 { input } else { &before[i - 1].output };
            let delta2_output = if i == last {
                &self.loss_grad
            } else {
                &after[0].delta2_input
            };
            layers[i].backward_2nd(layer_input, delta2_output, &mut current[0]);
        }
    }
}

/// Feed-forward neural network.
///
/// # Example
///
/// ```
/// use tiny_convnet::layers::DenseLayer;
/// use tiny_convnet::loss::Loss;
/// use tiny_convnet::network::Network;
/// use tiny_convnet::optimizers::SGD;
/// use tiny_convnet::utils::{Activation, SimpleRng};
///
/// let mut net = Network::new(Loss::Mse, Box::new(SGD::new(0.1)));
/// net.add(DenseLayer::new(2, 4, Activation::Tanh)).unwrap();
/// net.add(DenseLayer::new(4, 2, Activation::Tanh)).unwrap();
/// net.init_weights(&mut SimpleRng::new(1));
///
/// let inputs = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
/// let labels = vec![1, 0];
/// net.train(&inputs, &labels, 2, 10, |_| {}, |_| {}).unwrap();
/// assert_eq!(net.test(&inputs, &labels).unwrap().num_total, 2);
/// ```
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    loss: Loss,
    optimizer: Box<dyn Optimizer>,
    workers: Vec<Worker>,
    worker_count: usize,
    state: NetworkState,
    phase: Phase,
    rng: SimpleRng,
}

impl Network {
    pub fn new(loss: Loss, optimizer: Box<dyn Optimizer>) -> Self {
        Self {
            layers: Vec::new(),
            loss,
            optimizer,
            workers: Vec::new(),
            worker_count: 1,
            state: NetworkState::Idle,
            phase: Phase::Train,
            rng: SimpleRng::new(DEFAULT_SEED),
        }
    }

    /// Number of parallel workers per minibatch (at least 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = workers.max(1);
        self
    }

    /// Seed for dropout masks.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SimpleRng::new(seed);
        self
    }

    /// Multilayer perceptron of dense layers, e.g. `&[784, 100, 10]`.
    pub fn make_mlp(
        sizes: &[usize],
        activation: Activation,
        loss: Loss,
        optimizer: Box<dyn Optimizer>,
    ) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(NetworkError::InvalidConfig(
                "an mlp needs at least an input and an output size".to_string(),
            ));
        }
        let mut net = Self::new(loss, optimizer);
        for pair in sizes.windows(2) {
            net.add(DenseLayer::new(pair[0], pair[1], activation))?;
        }
        Ok(net)
    }

    /// Append a layer to the chain.
    ///
    /// Fails with [`NetworkError::ShapeMismatch`] when the layer's input size
    /// differs from the current tail's output size, and with
    /// [`NetworkError::ChainFrozen`] once the network has been used.
    pub fn add<L: Layer + 'static>(&mut self, layer: L) -> Result<()> {
        self.add_boxed(Box::new(layer))
    }

    pub fn add_boxed(&mut self, layer: Box<dyn Layer>) -> Result<()> {
        if self.state != NetworkState::Idle {
            return Err(NetworkError::ChainFrozen);
        }
        if let Some(tail) = self.layers.last() {
            if tail.output_size() != layer.input_size() {
                return Err(NetworkError::ShapeMismatch {
                    context: format!("layer {} ({})", self.layers.len(), layer.layer_type()),
                    expected: layer.input_size(),
                    actual: tail.output_size(),
                });
            }
        }
        trace!(
            "layer {}: {} {} -> {}, {} params",
            self.layers.len(),
            layer.layer_type(),
            layer.in_shape(),
            layer.out_shape(),
            layer.parameter_count()
        );
        self.layers.push(layer);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn workers(&self) -> usize {
        self.worker_count
    }

    pub fn layer(&self, index: usize) -> Option<&dyn Layer> {
        self.layers.get(index).map(|l| l.as_ref())
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut (dyn Layer + 'static)> {
        self.layers.get_mut(index).map(|l| l.as_mut())
    }

    pub fn layers(&self) -> impl Iterator<Item = &dyn Layer> {
        self.layers.iter().map(|l| l.as_ref())
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_size())
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.output_size())
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    pub fn loss_function(&self) -> Loss {
        self.loss
    }

    pub fn optimizer(&self) -> &dyn Optimizer {
        self.optimizer.as_ref()
    }

    pub fn optimizer_mut(&mut self) -> &mut dyn Optimizer {
        self.optimizer.as_mut()
    }

    /// Switch every layer between training and evaluation behaviour.
    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        for layer in &mut self.layers {
            layer.set_phase(phase);
        }
    }

    /// Xavier-uniform weights and zero biases for every layer.
    pub fn init_weights(&mut self, rng: &mut SimpleRng) {
        for layer in &mut self.layers {
            layer.init_weights(rng);
        }
    }

    /// Freeze the chain and allocate worker buffers if needed.
    fn build(&mut self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(NetworkError::EmptyNetwork);
        }
        if self.state == NetworkState::Idle || self.workers.len() != self.worker_count {
            let rng = &mut self.rng;
            let layers = &self.layers;
            self.workers = (0..self.worker_count)
                .map(|_| Worker::new(layers, rng))
                .collect();
            self.state = NetworkState::Built;
            debug!(
                "network built: {} layers, {} params, {} workers",
                self.layers.len(),
                self.parameter_count(),
                self.worker_count
            );
        }
        Ok(())
    }

    fn check_input(&self, input: &[f32]) -> Result<()> {
        if input.len() != self.input_size() {
            return Err(NetworkError::ShapeMismatch {
                context: "network input".to_string(),
                expected: self.input_size(),
                actual: input.len(),
            });
        }
        Ok(())
    }

    /// Output activations for one sample.
    pub fn predict(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.build()?;
        self.check_input(input)?;
        let worker = &mut self.workers[0];
        worker.forward(&self.layers, input);
        Ok(worker.output().to_vec())
    }

    /// Index of the largest output activation.
    pub fn predict_label(&mut self, input: &[f32]) -> Result<usize> {
        Ok(argmax(&self.predict(input)?))
    }

    pub fn forward_batch(&mut self, inputs: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        inputs.iter().map(|input| self.predict(input)).collect()
    }

    /// Forward-only evaluation against class labels.
    pub fn test(&mut self, inputs: &[Vec<f32>], labels: &[usize]) -> Result<TestResult> {
        check_lengths(inputs.len(), labels.len())?;
        let mut result = TestResult::new();
        for (input, &label) in inputs.iter().zip(labels) {
            result.insert(self.predict_label(input)?, label);
        }
        Ok(result)
    }

    /// Loss summed over a dataset.
    pub fn loss(&mut self, inputs: &[Vec<f32>], targets: &[Vec<f32>]) -> Result<f32> {
        check_lengths(inputs.len(), targets.len())?;
        let mut total = 0.0f32;
        for (input, target) in inputs.iter().zip(targets) {
            let output = self.predict(input)?;
            self.check_target(target)?;
            total += self.loss.value(&output, target);
        }
        Ok(total)
    }

    /// One-hot targets for `labels`, using the output activation's range.
    pub fn label_targets(&self, labels: &[usize]) -> Result<Vec<Vec<f32>>> {
        let outputs = self.output_size();
        let activation = self
            .layers
            .last()
            .map_or(Activation::Identity, |l| l.activation());
        let (off, on) = activation.target_range();

        labels
            .iter()
            .map(|&label| {
                if label >= outputs {
                    return Err(NetworkError::DataMismatch(format!(
                        "label {} out of range for {} outputs",
                        label, outputs
                    )));
                }
                let mut target = vec![off; outputs];
                target[label] = on;
                Ok(target)
            })
            .collect()
    }

    /// Train on class labels.
    ///
    /// Labels are turned into one-hot targets (see [`Activation::target_range`])
    /// and passed to [`Network::train_with_targets`].
    pub fn train<M, E>(
        &mut self,
        inputs: &[Vec<f32>],
        labels: &[usize],
        minibatch_size: usize,
        epochs: usize,
        on_minibatch: M,
        on_epoch: E,
    ) -> Result<()>
    where
        M: FnMut(&mut Network),
        E: FnMut(&mut Network),
    {
        check_lengths(inputs.len(), labels.len())?;
        if self.layers.is_empty() {
            return Err(NetworkError::EmptyNetwork);
        }
        let targets = self.label_targets(labels)?;
        self.train_with_targets(inputs, &targets, minibatch_size, epochs, on_minibatch, on_epoch)
    }

    /// Train on explicit target vectors.
    ///
    /// Samples are taken in order, `minibatch_size` at a time; the last
    /// minibatch of an epoch may be smaller. `on_minibatch` runs after every
    /// weight update and `on_epoch` after every epoch, both with full access
    /// to the network (e.g. to adjust the learning rate).
    ///
    /// Weights are not checked for NaN or overflow; an unbounded learning
    /// rate will happily diverge.
    pub fn train_with_targets<M, E>(
        &mut self,
        inputs: &[Vec<f32>],
        targets: &[Vec<f32>],
        minibatch_size: usize,
        epochs: usize,
        mut on_minibatch: M,
        mut on_epoch: E,
    ) -> Result<()>
    where
        M: FnMut(&mut Network),
        E: FnMut(&mut Network),
    {
        check_lengths(inputs.len(), targets.len())?;
        if minibatch_size == 0 {
            return Err(NetworkError::InvalidConfig(
                "minibatch_size must be positive".to_string(),
            ));
        }
        self.build()?;
        for (input, target) in inputs.iter().zip(targets) {
            self.check_input(input)?;
            self.check_target(target)?;
        }

        info!(
            "training: {} samples, minibatch {}, {} epochs, {} workers",
            inputs.len(),
            minibatch_size,
            epochs,
            self.worker_count
        );

        for epoch in 0..epochs {
            if self.optimizer.requires_hessian() {
                self.estimate_hessian(inputs, targets);
            }

            for start in (0..inputs.len()).step_by(minibatch_size) {
                let end = (start + minibatch_size).min(inputs.len());
                self.train_minibatch(&inputs[start..end], &targets[start..end]);
                on_minibatch(&mut *self);
            }

            info!(
                "epoch {}/{} done, learning rate {}",
                epoch + 1,
                epochs,
                self.optimizer.learning_rate()
            );
            on_epoch(&mut *self);
        }

        info!("training finished");
        Ok(())
    }

    fn check_target(&self, target: &[f32]) -> Result<()> {
        if target.len() != self.output_size() {
            return Err(NetworkError::ShapeMismatch {
                context: "network output".to_string(),
                expected: self.output_size(),
                actual: target.len(),
            });
        }
        Ok(())
    }

    fn train_minibatch(&mut self, inputs: &[Vec<f32>], targets: &[Vec<f32>]) {
        self.state = NetworkState::Training;
        let seed = self.rng.next_u64();
        let layers = &self.layers;
        let loss = self.loss;
        let stride = self.workers.len();

        self.workers
            .par_iter_mut()
            .enumerate()
            .for_each(|(w, worker)| {
                for (layer, buffers) in layers.iter().zip(worker.buffers.iter_mut()) {
                    buffers.clear_gradients();
                    layer.begin_minibatch(seed, buffers);
                }
                for i in (w..inputs.len()).step_by(stride) {
                    worker.forward(layers, &inputs[i]);
                    worker.backward(layers, loss, &inputs[i], &targets[i]);
                }
            });

        let (first, rest) = self.workers.split_at_mut(1);
        let primary = &mut first[0];
        for other in rest.iter() {
            for (a, b) in primary.buffers.iter_mut().zip(&other.buffers) {
                a.merge_gradients(b);
            }
        }
        let scale = 1.0 / inputs.len() as f32;
        for buffers in &mut primary.buffers {
            buffers.scale_gradients(scale);
        }

        let use_hessian = self.optimizer.requires_hessian();
        for (l, (layer, buffers)) in self.layers.iter_mut().zip(&primary.buffers).enumerate() {
            let (weights, biases) = layer.params_mut();
            if !weights.is_empty() {
                if use_hessian {
                    self.optimizer.update_with_hessian(
                        ParamKey::weights(l),
                        weights,
                        &buffers.grad_weights,
                        &buffers.hessian_weights,
                    );
                } else {
                    self.optimizer
                        .update(ParamKey::weights(l), weights, &buffers.grad_weights);
                }
            }
            if !biases.is_empty() {
                if use_hessian {
                    self.optimizer.update_with_hessian(
                        ParamKey::biases(l),
                        biases,
                        &buffers.grad_biases,
                        &buffers.hessian_biases,
                    );
                } else {
                    self.optimizer
                        .update(ParamKey::biases(l), biases, &buffers.grad_biases);
                }
            }
        }

        self.state = NetworkState::Built;
        debug!("minibatch of {} samples applied", inputs.len());
    }

    /// Average Gauss-Newton Hessian diagonal over the leading samples,
    /// left in worker 0's buffers.
    fn estimate_hessian(&mut self, inputs: &[Vec<f32>], targets: &[Vec<f32>]) {
        let count = inputs.len().min(HESSIAN_SAMPLES);
        if count == 0 {
            return;
        }
        let seed = self.rng.next_u64();
        let layers = &self.layers;
        let loss = self.loss;
        let stride = self.workers.len();

        self.workers
            .par_iter_mut()
            .enumerate()
            .for_each(|(w, worker)| {
                for (layer, buffers) in layers.iter().zip(worker.buffers.iter_mut()) {
                    buffers.reset_hessian();
                    layer.begin_minibatch(seed, buffers);
                }
                for i in (w..count).step_by(stride) {
                    worker.forward(layers, &inputs[i]);
                    worker.backward_2nd(layers, loss, &inputs[i], &targets[i]);
                }
            });

        let (first, rest) = self.workers.split_at_mut(1);
        let primary = &mut first[0];
        for other in rest.iter() {
            for (a, b) in primary.buffers.iter_mut().zip(&other.buffers) {
                a.merge_hessian(b);
            }
        }
        let scale = 1.0 / count as f32;
        for buffers in &mut primary.buffers {
            buffers.scale_hessian(scale);
        }
        debug!("hessian diagonal estimated over {} samples", count);
    }

    /// Compare backprop gradients of one layer against central finite
    /// differences of the summed loss, returning the largest absolute
    /// difference over its weights and biases.
    ///
    /// Runs single-threaded on worker 0; put dropout layers in
    /// [`Phase::Test`] first or the comparison is meaningless.
    pub fn gradient_check(
        &mut self,
        inputs: &[Vec<f32>],
        targets: &[Vec<f32>],
        layer_index: usize,
        epsilon: f32,
    ) -> Result<f32> {
        check_lengths(inputs.len(), targets.len())?;
        if layer_index >= self.layers.len() {
            return Err(NetworkError::InvalidConfig(format!(
                "no layer {} in a chain of {}",
                layer_index,
                self.layers.len()
            )));
        }
        self.build()?;
        for (input, target) in inputs.iter().zip(targets) {
            self.check_input(input)?;
            self.check_target(target)?;
        }

        let worker = &mut self.workers[0];
        worker.buffers.iter_mut().for_each(LayerBuffers::clear_gradients);
        for (input, target) in inputs.iter().zip(targets) {
            worker.forward(&self.layers, input);
            worker.backward(&self.layers, self.loss, input, target);
        }
        let analytic_weights = worker.buffers[layer_index].grad_weights.clone();
        let analytic_biases = worker.buffers[layer_index].grad_biases.clone();

        let mut worst = 0.0f32;
        for (slot, analytic) in [analytic_weights, analytic_biases].iter().enumerate() {
            for (i, &expected) in analytic.iter().enumerate() {
                let original = self.param(layer_index, slot, i);
                self.set_param(layer_index, slot, i, original + epsilon);
                let plus = self.loss(inputs, targets)?;
                self.set_param(layer_index, slot, i, original - epsilon);
                let minus = self.loss(inputs, targets)?;
                self.set_param(layer_index, slot, i, original);

                let numeric = (plus - minus) / (2.0 * epsilon);
                worst = worst.max((numeric - expected).abs());
            }
        }
        debug!("gradient check on layer {}: max error {}", layer_index, worst);
        Ok(worst)
    }

    fn param(&self, layer: usize, slot: usize, index: usize) -> f32 {
        let layer = &self.layers[layer];
        if slot == 0 {
            layer.weights()[index]
        } else {
            layer.biases()[index]
        }
    }

    fn set_param(&mut self, layer: usize, slot: usize, index: usize, value: f32) {
        let (weights, biases) = self.layers[layer].params_mut();
        if slot == 0 {
            weights[index] = value;
        } else {
            biases[index] = value;
        }
    }

    /// Write every layer's weights then biases as whitespace-separated text,
    /// one line per layer.
    pub fn save_weights<W: Write>(&self, writer: &mut W) -> Result<()> {
        for layer in &self.layers {
            let mut first = true;
            for value in layer.weights().iter().chain(layer.biases()) {
                if !first {
                    write!(writer, " ")?;
                }
                write!(writer, "{}", value)?;
                first = false;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Read weights written by [`Network::save_weights`] into an identically
    /// shaped chain. Nothing is changed unless the whole stream fits.
    pub fn load_weights<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;

        let values = text
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f32>()
                    .map_err(|e| NetworkError::Weights(format!("cannot parse '{}': {}", token, e)))
            })
            .collect::<Result<Vec<f32>>>()?;

        let expected = self.parameter_count();
        if values.len() != expected {
            return Err(NetworkError::Weights(format!(
                "expected {} values, got {}",
                expected,
                values.len()
            )));
        }

        let mut offset = 0;
        for layer in &mut self.layers {
            let (weights, biases) = layer.params_mut();
            for target in [weights, biases] {
                target.copy_from_slice(&values[offset..offset + target.len()]);
                offset += target.len();
            }
        }
        Ok(())
    }
}

fn check_lengths(inputs: usize, expected: usize) -> Result<()> {
    if inputs != expected {
        return Err(NetworkError::DataMismatch(format!(
            "{} inputs but {} labels/targets",
            inputs, expected
        )));
    }
    Ok(())
}

fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
