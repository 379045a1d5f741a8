use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// In-memory mapping from image identifier to embedding vector.
///
/// Built once per run by draining the result queue after the scheduler's
/// join barrier, persisted as a single JSON checkpoint, and treated as
/// read-only input by the distance evaluator and the triplet miner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingStore {
    embeddings: HashMap<String, Vec<f32>>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later writes for the same key overwrite; under the work-distribution
    /// policy a re-submitted identifier re-embeds to an equal value.
    pub fn insert(&mut self, image_name: impl Into<String>, embedding: Vec<f32>) {
        self.embeddings.insert(image_name.into(), embedding);
    }

    pub fn get(&self, image_name: &str) -> Option<&[f32]> {
        self.embeddings.get(image_name).map(Vec::as_slice)
    }

    pub fn contains(&self, image_name: &str) -> bool {
        self.embeddings.contains_key(image_name)
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.embeddings
            .iter()
            .map(|(name, embedding)| (name.as_str(), embedding.as_slice()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating checkpoint directory: {}", parent.display())
            })?;
        }
        let raw = serde_json::to_string(self).context("failed serializing embedding store")?;
        fs::write(path, raw)
            .with_context(|| format!("failed writing embedding checkpoint: {}", path.display()))?;
        Ok(())
    }

    /// Missing or unreadable checkpoints are fatal; downstream stages have
    /// no fallback.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("embedding checkpoint not found: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("embedding checkpoint unreadable: {}", path.display()))
    }
}
