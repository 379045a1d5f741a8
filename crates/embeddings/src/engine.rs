use std::{collections::HashMap, path::Path, sync::Mutex};

use anyhow::{Context, Result, anyhow};
use ort::{
    session::{Session, builder::SessionBuilder},
    value::Tensor,
};

use crate::{codec, config::EngineConfig};
use common::Device;

/// One inference engine per worker. Workers never share model state; the
/// session lives and dies with its owning worker thread.
#[derive(Debug)]
pub struct EmbeddingEngine {
    config: EngineConfig,
    backend: EmbeddingBackend,
}

#[derive(Debug)]
enum EmbeddingBackend {
    Onnx(Mutex<Session>),
    Pseudo,
}

impl EmbeddingEngine {
    /// Construction binds to the configured device before the session is
    /// committed. Failure here is fatal to the owning worker only.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let backend = if config.allow_pseudo_fallback {
            EmbeddingBackend::Pseudo
        } else {
            EmbeddingBackend::Onnx(Mutex::new(build_session(&config)?))
        };
        Ok(Self { config, backend })
    }

    pub fn device(&self) -> Device {
        self.config.device
    }

    /// Run one batched inference and return one embedding per input tensor,
    /// in input order, each of `vector_dim` length.
    pub fn embed_batch(&self, tensors: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        if tensors.is_empty() {
            return Ok(Vec::new());
        }
        let expected = codec::tensor_len(self.config.image_size);
        for tensor in tensors {
            anyhow::ensure!(
                tensor.len() == expected,
                "input tensor has {} values, expected {expected}",
                tensor.len()
            );
        }
        match &self.backend {
            EmbeddingBackend::Onnx(session) => self.run_onnx(session, tensors),
            EmbeddingBackend::Pseudo => Ok(tensors
                .iter()
                .map(|tensor| pseudo_embed(tensor, self.config.vector_dim))
                .collect()),
        }
    }

    fn run_onnx(&self, session: &Mutex<Session>, tensors: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        let batch = tensors.len();
        let side = i64::from(self.config.image_size);
        let mut flat = Vec::with_capacity(batch * codec::tensor_len(self.config.image_size));
        for tensor in tensors {
            flat.extend_from_slice(tensor);
        }
        let pixels = Tensor::<f32>::from_array((vec![batch as i64, 3, side, side], flat))?;

        let mut session = session
            .lock()
            .map_err(|_| anyhow!("embedding session lock poisoned"))?;
        let mut model_inputs = HashMap::new();
        for input in session.inputs() {
            model_inputs.insert(input.name().to_string(), pixels.clone().upcast());
        }

        let mut outputs = session.run(model_inputs)?;
        let first_key = outputs
            .keys()
            .next()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("embedding model returned no outputs"))?;
        let output = outputs
            .remove(first_key)
            .ok_or_else(|| anyhow!("embedding model output extraction failed"))?;
        let (_, values) = output
            .try_extract_tensor::<f32>()
            .map_err(|err| anyhow!("embedding output decode failed: {err}"))?;

        let rows = partition_output(values, batch)?;
        Ok(rows
            .into_iter()
            .map(|row| fit_vector_dim(&row, self.config.vector_dim))
            .collect())
    }
}

/// Split a flat inference output into `batch` disjoint, contiguous,
/// equal-length sub-vectors in input order. Handles both `[batch, dim]`
/// outputs and a single concatenated vector of `batch * dim` values.
pub fn partition_output(values: &[f32], batch: usize) -> Result<Vec<Vec<f32>>> {
    anyhow::ensure!(batch > 0, "cannot partition output for an empty batch");
    anyhow::ensure!(
        values.len() % batch == 0,
        "output length {} is not divisible by batch size {batch}",
        values.len()
    );
    let width = values.len() / batch;
    anyhow::ensure!(width > 0, "embedding output is empty");
    Ok(values.chunks_exact(width).map(<[f32]>::to_vec).collect())
}

fn fit_vector_dim(values: &[f32], target_dim: usize) -> Vec<f32> {
    if target_dim == 0 {
        return Vec::new();
    }
    if values.len() == target_dim {
        return values.to_vec();
    }
    if values.len() > target_dim {
        return values[..target_dim].to_vec();
    }
    let mut out = vec![0.0f32; target_dim];
    out[..values.len()].copy_from_slice(values);
    out
}

fn build_session(config: &EngineConfig) -> Result<Session> {
    let model_path = Path::new(&config.model_path);
    if !model_path.exists() {
        anyhow::bail!("embedding model not found at {}", model_path.display());
    }
    let builder = Session::builder().context("failed to create ONNX session builder")?;
    let mut builder = match config.device {
        Device::Cpu => builder,
        Device::Cuda(device_id) => cuda_builder(builder, device_id)?,
    };
    builder
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ONNX model {}", model_path.display()))
}

#[cfg(feature = "cuda")]
fn cuda_builder(builder: SessionBuilder, device_id: i32) -> Result<SessionBuilder> {
    use ort::execution_providers::CUDAExecutionProvider;
    builder
        .with_execution_providers([CUDAExecutionProvider::default()
            .with_device_id(device_id)
            .build()])
        .with_context(|| format!("failed registering CUDA execution provider {device_id}"))
}

#[cfg(not(feature = "cuda"))]
fn cuda_builder(_builder: SessionBuilder, device_id: i32) -> Result<SessionBuilder> {
    anyhow::bail!("device cuda:{device_id} requested but this build has no `cuda` feature")
}

/// Deterministic stand-in backend for environments without a model on disk.
fn pseudo_embed(tensor: &[f32], dim: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; dim.max(1)];
    let n = out.len();
    for (idx, value) in tensor.iter().enumerate() {
        out[idx % n] += value;
    }
    out
}
