use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{Device, EMBEDDING_DIM, MiningMode};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub image_dir: String,
    pub labels_path: String,
    pub model_path: String,
    pub data_dir: String,
    pub devices: Vec<String>,
    pub image_size: u32,
    pub embedding_dim: usize,
    pub mining_mode: MiningMode,
    pub semi_hard_margin: f32,
    pub miner_seed: u64,
    /// Fraction of the corpus allowed to be missing from the store before
    /// persistence is aborted. 0.0 means any shortfall fails the run.
    pub max_missing_fraction: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            image_dir: "data/images".to_string(),
            labels_path: "data/labels.json".to_string(),
            model_path: "models/flukeprint.onnx".to_string(),
            data_dir: "data".to_string(),
            devices: vec!["cpu".to_string()],
            image_size: 224,
            embedding_dim: EMBEDDING_DIM,
            mining_mode: MiningMode::SemiHard,
            semi_hard_margin: 0.2,
            miner_seed: 42,
            max_missing_fraction: 0.0,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed reading config file: {}", path.display()))?;
            toml::from_str::<Self>(&raw)
                .with_context(|| format!("failed parsing config file: {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var("FLUKEPRINT_IMAGE_DIR") {
            cfg.image_dir = dir;
        }
        if let Ok(model) = std::env::var("FLUKEPRINT_MODEL_PATH") {
            cfg.model_path = model;
        }
        if let Ok(dir) = std::env::var("FLUKEPRINT_DATA_DIR") {
            cfg.data_dir = dir;
        }
        if let Ok(devices) = std::env::var("FLUKEPRINT_DEVICES") {
            cfg.devices = devices
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }

        Ok(cfg)
    }

    /// Device list parsed into typed accelerators; rejects the run up front
    /// rather than inside a worker thread.
    pub fn parsed_devices(&self) -> Result<Vec<Device>> {
        self.devices.iter().map(|raw| raw.parse()).collect()
    }

    pub fn embeddings_file(&self) -> PathBuf {
        Path::new(&self.data_dir).join("train_embeddings.json")
    }

    pub fn triplets_file(&self) -> PathBuf {
        Path::new(&self.data_dir).join("train_triplets.json")
    }
}
