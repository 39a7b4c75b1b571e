//! This module provides the `TaggerModel` struct for running the ONNX tagging model.
//!
//! It includes functionality for:
//! - Loading the model from a local file.
//! - Selecting execution providers (e.g., CPU, CUDA).
//! - Running predictions on preprocessed image tensors.
//!
//! The model exposes either a `prediction` output holding probabilities or a
//! `logits` output, which is passed through a sigmoid here.

use std::path::Path;

use anyhow::{anyhow, Result};
use ndarray::{Array, Axis, Ix4};
use ort::{
    execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch},
    session::Session,
    value::Tensor,
};

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

#[cfg(feature = "tensorrt")]
use ort::execution_providers::TensorRTExecutionProvider;

#[cfg(feature = "coreml")]
use ort::execution_providers::CoreMLExecutionProvider;

use crate::error::TaggerError;

const PREDICTION_OUTPUT: &str = "prediction";
const LOGITS_OUTPUT: &str = "logits";

/// Represents the execution device for the ONNX model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    /// Use the CPU for inference.
    Cpu,
    /// Use the CUDA execution provider.
    #[cfg(feature = "cuda")]
    Cuda(i32),
    /// Use the TensorRT execution provider.
    #[cfg(feature = "tensorrt")]
    TensorRT(i32),
    /// Use the CoreML execution provider (for macOS).
    #[cfg(feature = "coreml")]
    CoreML,
}

impl Device {
    /// Creates a list of `Device` instances for CPU execution.
    pub fn cpu() -> Vec<Self> {
        vec![Self::Cpu]
    }

    /// Creates a list of `Device` instances for CUDA execution on specified GPUs.
    #[cfg(feature = "cuda")]
    pub fn cuda_devices(device_ids: Vec<i32>) -> Vec<Self> {
        device_ids.into_iter().map(Self::Cuda).collect()
    }

    /// Creates a list of `Device` instances for TensorRT execution on specified GPUs.
    #[cfg(feature = "tensorrt")]
    pub fn tensorrt_devices(device_ids: Vec<i32>) -> Vec<Self> {
        device_ids.into_iter().map(Self::TensorRT).collect()
    }

    /// Creates a list of `Device` instances for CoreML execution.
    #[cfg(feature = "coreml")]
    pub fn coreml() -> Vec<Self> {
        vec![Self::CoreML]
    }

    /// Parses a device setting: `cpu`, `coreml`, or `cuda` / `tensorrt` with
    /// optional GPU ids such as `cuda:0,1`.
    pub fn parse_list(text: &str) -> Result<Vec<Self>, String> {
        let text = text.trim().to_ascii_lowercase();
        let (kind, _ids) = match text.split_once(':') {
            Some((kind, ids)) => (kind, Some(ids)),
            None => (text.as_str(), None),
        };
        match kind {
            "" | "cpu" => Ok(Self::cpu()),
            #[cfg(feature = "cuda")]
            "cuda" => Ok(Self::cuda_devices(parse_device_ids(_ids)?)),
            #[cfg(feature = "tensorrt")]
            "tensorrt" => Ok(Self::tensorrt_devices(parse_device_ids(_ids)?)),
            #[cfg(feature = "coreml")]
            "coreml" => Ok(Self::coreml()),
            other if ["cuda", "tensorrt", "coreml"].contains(&other) => {
                Err(format!("built without the `{}` feature", other))
            }
            other => Err(format!("unknown device {:?}", other)),
        }
    }

    fn provider(&self) -> ExecutionProviderDispatch {
        match self {
            Device::Cpu => CPUExecutionProvider::default().build(),
            #[cfg(feature = "cuda")]
            Device::Cuda(device_id) => CUDAExecutionProvider::default()
                .with_device_id(*device_id)
                .build(),
            #[cfg(feature = "tensorrt")]
            Device::TensorRT(device_id) => TensorRTExecutionProvider::default()
                .with_device_id(*device_id)
                .build(),
            #[cfg(feature = "coreml")]
            Device::CoreML => CoreMLExecutionProvider::default().build(),
        }
    }
}

#[cfg(any(feature = "cuda", feature = "tensorrt"))]
fn parse_device_ids(ids: Option<&str>) -> Result<Vec<i32>, String> {
    match ids {
        None => Ok(vec![0]),
        Some(ids) => ids
            .split(',')
            .map(|id| {
                id.trim()
                    .parse::<i32>()
                    .map_err(|_| format!("bad device id {:?}", id))
            })
            .collect(),
    }
}

/// Which output the scores are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutput {
    /// Already probabilities.
    Prediction,
    /// Raw logits; a sigmoid is applied.
    Logits,
}

impl ScoreOutput {
    /// Picks `prediction` over `logits` from the model's output names.
    pub fn select<S: AsRef<str>>(names: &[S]) -> Result<(String, Self), TaggerError> {
        let has = |wanted: &str| names.iter().any(|n| n.as_ref() == wanted);
        if has(PREDICTION_OUTPUT) {
            Ok((PREDICTION_OUTPUT.to_string(), ScoreOutput::Prediction))
        } else if has(LOGITS_OUTPUT) {
            Ok((LOGITS_OUTPUT.to_string(), ScoreOutput::Logits))
        } else {
            Err(TaggerError::MissingOutput(
                names.iter().map(|n| n.as_ref().to_string()).collect(),
            ))
        }
    }

    pub fn to_probability(self, value: f32) -> f32 {
        match self {
            ScoreOutput::Prediction => value,
            ScoreOutput::Logits => sigmoid(value),
        }
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// A wrapper around an ONNX Runtime session for image tagging.
#[derive(Debug)]
pub struct TaggerModel {
    session: Session,
    input_name: String,
    output_name: String,
    output_kind: ScoreOutput,
}

impl TaggerModel {
    /// Loads a model from a local `.onnx` file on the given devices.
    pub fn load<P: AsRef<Path>>(model_path: P, devices: &[Device]) -> Result<Self> {
        let model_path = model_path.as_ref();
        let threads = num_cpus::get();
        let providers: Vec<ExecutionProviderDispatch> =
            devices.iter().map(Device::provider).collect();

        let session = Session::builder()
            .and_then(|b| b.with_execution_providers(providers))
            .and_then(|b| b.with_intra_threads(threads))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| anyhow!("Failed to create ONNX session for {:?}: {}", model_path, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| anyhow!("Model {:?} has no inputs", model_path))?;

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        let (output_name, output_kind) = ScoreOutput::select(&output_names)?;

        tracing::info!(
            "Loaded model {:?} (input {:?}, output {:?}, {} threads)",
            model_path,
            input_name,
            output_name,
            threads
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            output_kind,
        })
    }

    pub fn output_kind(&self) -> ScoreOutput {
        self.output_kind
    }

    /// Runs prediction on a batch of preprocessed image tensors.
    ///
    /// # Arguments
    ///
    /// * `input_tensor` - A 4D tensor with shape `[batch_size, 3, height, width]`.
    ///
    /// # Returns
    ///
    /// One vector of probabilities per image.
    pub fn predict(&mut self, input_tensor: Array<f32, Ix4>) -> Result<Vec<Vec<f32>>> {
        if input_tensor.shape()[0] == 0 {
            return Ok(Vec::new());
        }

        let input_tensor =
            Tensor::from_array(input_tensor).map_err(|e| anyhow!("Invalid input tensor: {}", e))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| anyhow!("Inference failed: {}", e))?;

        let preds = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| anyhow!("Failed to read output {:?}: {}", self.output_name, e))?;

        let kind = self.output_kind;
        let preds_vec = preds
            .axis_iter(Axis(0))
            .map(|row| row.iter().map(|&v| kind.to_probability(v)).collect::<Vec<_>>())
            .collect();

        Ok(preds_vec)
    }
}
