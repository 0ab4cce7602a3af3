//! Sequence model definition and inference.
//!
//! Models are stored as a JSON layer stack (`model.json`). LSTM weights use the
//! Keras gate layout `[input, forget, cell, output]` along the last axis.
//! Every buffer touched during inference is leased from a [`TensorPool`] and
//! handed back when its guard drops, so repeated calls reuse memory on every
//! exit path.

use serde::Deserialize;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Buffers kept for reuse; anything beyond this is freed on release.
const MAX_POOLED_BUFFERS: usize = 16;

#[derive(Debug, Error, PartialEq)]
pub enum InferenceError {
    #[error("input shape mismatch: expected {expected} features per step, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("empty input sequence")]
    EmptySequence,
    #[error("model produced no output")]
    EmptyOutput,
    #[error("model produced a non-finite output ({0})")]
    NonFinite(f64),
}

/// Trait implemented by every inference backend the engine can drive.
pub trait SequenceModel: Send + Sync + std::fmt::Debug {
    /// Number of steps the model was trained on.
    fn sequence_length(&self) -> usize;

    /// Width of each step of the input sequence.
    fn input_features(&self) -> usize;

    /// Runs the model over `input` and returns its single scalar output.
    fn predict(&self, input: &SequenceTensor<'_>, pool: &TensorPool) -> Result<f64, InferenceError>;
}

/// Pool of reusable `f64` buffers with a live-lease counter.
#[derive(Debug, Default)]
pub struct TensorPool {
    free: Mutex<Vec<Vec<f64>>>,
    live: AtomicUsize,
}

impl TensorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leases a zeroed buffer of `len` values.
    pub fn acquire(&self, len: usize) -> TensorGuard<'_> {
        let mut buffer = self
            .free
            .lock()
            .map(|mut free| free.pop())
            .unwrap_or_else(|poisoned| poisoned.into_inner().pop())
            .unwrap_or_default();
        buffer.clear();
        buffer.resize(len, 0.0);
        self.live.fetch_add(1, Ordering::Relaxed);
        TensorGuard { buffer, pool: self }
    }

    /// Number of buffers currently leased.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    fn release(&self, buffer: Vec<f64>) {
        self.live.fetch_sub(1, Ordering::Relaxed);
        let mut free = match self.free.lock() {
            Ok(free) => free,
            Err(poisoned) => poisoned.into_inner(),
        };
        if free.len() < MAX_POOLED_BUFFERS {
            free.push(buffer);
        }
    }
}

/// Leased buffer; returns to its pool on drop.
#[derive(Debug)]
pub struct TensorGuard<'a> {
    buffer: Vec<f64>,
    pool: &'a TensorPool,
}

impl Deref for TensorGuard<'_> {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.buffer
    }
}

impl DerefMut for TensorGuard<'_> {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.buffer
    }
}

impl Drop for TensorGuard<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffer));
    }
}

/// Row-major `[steps, features]` input for one inference call.
#[derive(Debug)]
pub struct SequenceTensor<'a> {
    data: TensorGuard<'a>,
    steps: usize,
    features: usize,
}

impl<'a> SequenceTensor<'a> {
    pub fn from_rows(rows: &[Vec<f64>], pool: &'a TensorPool) -> Result<Self, InferenceError> {
        let features = rows.first().map(Vec::len).ok_or(InferenceError::EmptySequence)?;
        let mut data = pool.acquire(rows.len() * features);
        for (step, row) in rows.iter().enumerate() {
            if row.len() != features {
                return Err(InferenceError::ShapeMismatch {
                    expected: features,
                    actual: row.len(),
                });
            }
            data[step * features..(step + 1) * features].copy_from_slice(row);
        }
        Ok(Self {
            data,
            steps: rows.len(),
            features,
        })
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn features(&self) -> usize {
        self.features
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    fn apply(self, value: f64) -> f64 {
        match self {
            Activation::Linear => value,
            Activation::Relu => value.max(0.0),
            Activation::Sigmoid => sigmoid(value),
            Activation::Tanh => value.tanh(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Layer {
    Lstm(LstmLayer),
    Dense(DenseLayer),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LstmLayer {
    pub units: usize,
    /// `[input_width][4 * units]`
    pub kernel: Vec<Vec<f64>>,
    /// `[units][4 * units]`
    pub recurrent_kernel: Vec<Vec<f64>>,
    /// `[4 * units]`
    pub bias: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DenseLayer {
    pub units: usize,
    /// `[input_width][units]`
    pub kernel: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

/// Contents of `model.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDefinition {
    pub sequence_length: usize,
    pub input_features: usize,
    pub layers: Vec<Layer>,
}

/// Stacked LSTM with a dense head, evaluated on the CPU.
#[derive(Debug, Clone)]
pub struct LstmModel {
    sequence_length: usize,
    input_features: usize,
    layers: Vec<Layer>,
}

impl LstmModel {
    /// Validates layer shapes and builds the model.
    pub fn from_definition(definition: ModelDefinition) -> Result<Self, String> {
        let ModelDefinition {
            sequence_length,
            input_features,
            layers,
        } = definition;

        if layers.is_empty() {
            return Err("model has no layers".to_string());
        }
        if !matches!(layers.first(), Some(Layer::Lstm(_))) {
            return Err("first layer must be an lstm".to_string());
        }

        let mut width = input_features;
        let mut seen_dense = false;
        for (index, layer) in layers.iter().enumerate() {
            match layer {
                Layer::Lstm(lstm) => {
                    if seen_dense {
                        return Err(format!("layer {index}: lstm cannot follow a dense layer"));
                    }
                    let gates = 4 * lstm.units;
                    check_matrix(&lstm.kernel, width, gates, index, "kernel")?;
                    check_matrix(&lstm.recurrent_kernel, lstm.units, gates, index, "recurrent_kernel")?;
                    check_len(lstm.bias.len(), gates, index, "bias")?;
                    width = lstm.units;
                }
                Layer::Dense(dense) => {
                    seen_dense = true;
                    check_matrix(&dense.kernel, width, dense.units, index, "kernel")?;
                    check_len(dense.bias.len(), dense.units, index, "bias")?;
                    width = dense.units;
                }
            }
        }
        if width != 1 {
            return Err(format!("model must produce one output, final width is {width}"));
        }

        Ok(Self {
            sequence_length,
            input_features,
            layers,
        })
    }
}

impl SequenceModel for LstmModel {
    fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    fn input_features(&self) -> usize {
        self.input_features
    }

    fn predict(&self, input: &SequenceTensor<'_>, pool: &TensorPool) -> Result<f64, InferenceError> {
        if input.features() != self.input_features {
            return Err(InferenceError::ShapeMismatch {
                expected: self.input_features,
                actual: input.features(),
            });
        }
        if input.steps() == 0 {
            return Err(InferenceError::EmptySequence);
        }

        // Activations are [steps, width]; dense layers collapse to one step.
        let steps = input.steps();
        let mut current = pool.acquire(steps * input.features());
        current.copy_from_slice(&input.data);
        let mut current_steps = steps;
        let mut width = input.features();

        for layer in &self.layers {
            let next = match layer {
                Layer::Lstm(lstm) => {
                    let out = run_lstm(lstm, &current, current_steps, width, pool);
                    width = lstm.units;
                    out
                }
                Layer::Dense(dense) => {
                    let last = &current[(current_steps - 1) * width..current_steps * width];
                    let out = run_dense(dense, last, pool);
                    current_steps = 1;
                    width = dense.units;
                    out
                }
            };
            current = next;
        }

        let output = *current.first().ok_or(InferenceError::EmptyOutput)?;
        if !output.is_finite() {
            return Err(InferenceError::NonFinite(output));
        }
        Ok(output)
    }
}

fn run_lstm<'a>(
    layer: &LstmLayer,
    input: &[f64],
    steps: usize,
    width: usize,
    pool: &'a TensorPool,
) -> TensorGuard<'a> {
    let units = layer.units;
    let mut output = pool.acquire(steps * units);
    let mut hidden = pool.acquire(units);
    let mut cell = pool.acquire(units);
    let mut gates = pool.acquire(4 * units);

    for step in 0..steps {
        let x = &input[step * width..(step + 1) * width];
        gates.copy_from_slice(&layer.bias);
        for (value, row) in x.iter().zip(&layer.kernel) {
            for (gate, weight) in gates.iter_mut().zip(row) {
                *gate += value * weight;
            }
        }
        for (value, row) in hidden.iter().zip(&layer.recurrent_kernel) {
            for (gate, weight) in gates.iter_mut().zip(row) {
                *gate += value * weight;
            }
        }

        for u in 0..units {
            let input_gate = sigmoid(gates[u]);
            let forget_gate = sigmoid(gates[units + u]);
            let candidate = gates[2 * units + u].tanh();
            let output_gate = sigmoid(gates[3 * units + u]);
            cell[u] = forget_gate * cell[u] + input_gate * candidate;
            hidden[u] = output_gate * cell[u].tanh();
        }
        output[step * units..(step + 1) * units].copy_from_slice(&hidden);
    }

    output
}

fn run_dense<'a>(layer: &DenseLayer, input: &[f64], pool: &'a TensorPool) -> TensorGuard<'a> {
    let mut output = pool.acquire(layer.units);
    output.copy_from_slice(&layer.bias);
    for (value, row) in input.iter().zip(&layer.kernel) {
        for (out, weight) in output.iter_mut().zip(row) {
            *out += value * weight;
        }
    }
    for out in output.iter_mut() {
        *out = layer.activation.apply(*out);
    }
    output
}

fn sigmoid(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

fn check_matrix(
    matrix: &[Vec<f64>],
    rows: usize,
    cols: usize,
    layer: usize,
    name: &str,
) -> Result<(), String> {
    check_len(matrix.len(), rows, layer, name)?;
    if let Some(row) = matrix.iter().position(|row| row.len() != cols) {
        return Err(format!(
            "layer {layer}: {name} row {row} has {} columns, expected {cols}",
            matrix[row].len()
        ));
    }
    Ok(())
}

fn check_len(actual: usize, expected: usize, layer: usize, name: &str) -> Result<(), String> {
    if actual != expected {
        return Err(format!(
            "layer {layer}: {name} has {actual} entries, expected {expected}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_unit_model(kernel: f64, dense_weight: f64, dense_bias: f64) -> LstmModel {
        LstmModel::from_definition(ModelDefinition {
            sequence_length: 1,
            input_features: 1,
            layers: vec![
                Layer::Lstm(LstmLayer {
                    units: 1,
                    kernel: vec![vec![kernel; 4]],
                    recurrent_kernel: vec![vec![0.0; 4]],
                    bias: vec![0.0; 4],
                }),
                Layer::Dense(DenseLayer {
                    units: 1,
                    kernel: vec![vec![dense_weight]],
                    bias: vec![dense_bias],
                    activation: Activation::Linear,
                }),
            ],
        })
        .expect("valid model")
    }

    #[test]
    fn single_step_matches_lstm_equations() -> Result<(), InferenceError> {
        let model = single_unit_model(1.0, 1.0, 0.0);
        let pool = TensorPool::new();
        let input = SequenceTensor::from_rows(&[vec![1.0]], &pool)?;

        let output = model.predict(&input, &pool)?;

        let gate = sigmoid(1.0);
        let cell = gate * 1.0_f64.tanh();
        let expected = gate * cell.tanh();
        assert!((output - expected).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn zero_weights_return_dense_bias() -> Result<(), InferenceError> {
        let model = single_unit_model(0.0, 0.0, 0.42);
        let pool = TensorPool::new();
        let rows = vec![vec![0.3]; 12];
        let input = SequenceTensor::from_rows(&rows, &pool)?;

        let output = model.predict(&input, &pool)?;

        assert!((output - 0.42).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn buffers_are_released_after_success_and_failure() -> Result<(), InferenceError> {
        let model = single_unit_model(0.5, 1.0, 0.0);
        let pool = TensorPool::new();

        {
            let input = SequenceTensor::from_rows(&vec![vec![1.0]; 12], &pool)?;
            model.predict(&input, &pool)?;
            assert_eq!(pool.live(), 1);
        }
        assert_eq!(pool.live(), 0);

        {
            let input = SequenceTensor::from_rows(&vec![vec![1.0, 2.0]; 12], &pool)?;
            let result = model.predict(&input, &pool);
            assert_eq!(
                result,
                Err(InferenceError::ShapeMismatch {
                    expected: 1,
                    actual: 2
                })
            );
        }
        assert_eq!(pool.live(), 0);
        Ok(())
    }

    #[test]
    fn ragged_rows_are_rejected_without_leaking() {
        let pool = TensorPool::new();

        let result = SequenceTensor::from_rows(&[vec![1.0, 2.0], vec![1.0]], &pool);

        assert!(matches!(result, Err(InferenceError::ShapeMismatch { .. })));
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn definition_with_wrong_kernel_shape_is_rejected() {
        let result = LstmModel::from_definition(ModelDefinition {
            sequence_length: 12,
            input_features: 5,
            layers: vec![Layer::Lstm(LstmLayer {
                units: 2,
                kernel: vec![vec![0.0; 8]; 4],
                recurrent_kernel: vec![vec![0.0; 8]; 2],
                bias: vec![0.0; 8],
            })],
        });

        let err = result.expect_err("kernel rows must match input width");
        assert!(err.contains("kernel"));
    }

    #[test]
    fn definition_must_end_in_single_output() {
        let result = LstmModel::from_definition(ModelDefinition {
            sequence_length: 12,
            input_features: 1,
            layers: vec![Layer::Lstm(LstmLayer {
                units: 2,
                kernel: vec![vec![0.0; 8]],
                recurrent_kernel: vec![vec![0.0; 8]; 2],
                bias: vec![0.0; 8],
            })],
        });

        assert!(result.is_err());
    }

    #[test]
    fn parses_json_layer_stack() -> Result<(), Box<dyn std::error::Error>> {
        let json = r#"{
            "sequence_length": 12,
            "input_features": 1,
            "layers": [
                {"type": "lstm", "units": 1, "kernel": [[0, 0, 0, 0]],
                 "recurrent_kernel": [[0, 0, 0, 0]], "bias": [0, 0, 0, 0]},
                {"type": "dense", "units": 1, "kernel": [[1]], "bias": [0.25], "activation": "relu"}
            ]
        }"#;

        let definition: ModelDefinition = serde_json::from_str(json)?;
        let model = LstmModel::from_definition(definition)?;

        assert_eq!(model.sequence_length(), 12);
        assert_eq!(model.input_features(), 1);
        Ok(())
    }
}
