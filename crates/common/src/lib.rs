pub mod config;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Length of every embedding vector produced by the pipeline.
pub const EMBEDDING_DIM: usize = 128;

/// One dispatchable work unit: an anchor/positive/negative identifier triple.
///
/// The work queue carries whole triplets, so a single pop always yields one
/// complete logical triplet regardless of how many workers are pulling.
/// Serde field names match the persisted triplet document (`a`/`p`/`n`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Triplet {
    #[serde(rename = "a")]
    pub anchor: String,
    #[serde(rename = "p")]
    pub positive: String,
    #[serde(rename = "n")]
    pub negative: String,
}

impl Triplet {
    pub fn new(
        anchor: impl Into<String>,
        positive: impl Into<String>,
        negative: impl Into<String>,
    ) -> Self {
        Self {
            anchor: anchor.into(),
            positive: positive.into(),
            negative: negative.into(),
        }
    }

    /// Identifiers in anchor, positive, negative order.
    pub fn images(&self) -> [&str; 3] {
        [&self.anchor, &self.positive, &self.negative]
    }
}

/// Unit flowing on the result queue: one embedding for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub image_name: String,
    pub embedding: Vec<f32>,
}

/// Marker on the signal queue. `TripletDone` carries no payload and counts
/// one triplet's worth of finished work; `Finished` is the end-of-stream
/// marker the orchestrator pushes after every worker has joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    TripletDone,
    Finished,
}

/// Per-worker completion summary, pushed on a dedicated channel so the
/// orchestrator can surface partial failure instead of completing silently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerSummary {
    pub device: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Accelerator a worker is exclusively bound to for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda(i32),
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("cpu") {
            return Ok(Self::Cpu);
        }
        if let Some(id) = raw.strip_prefix("cuda:") {
            let id = id
                .parse::<i32>()
                .map_err(|_| anyhow::anyhow!("invalid cuda device id in {raw:?}"))?;
            return Ok(Self::Cuda(id));
        }
        anyhow::bail!("unrecognized device {raw:?}; expected \"cpu\" or \"cuda:<n>\"")
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}

/// Negative-selection strategy consumed by the triplet miner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MiningMode {
    SemiHard,
    Random,
}

#[cfg(test)]
mod tests {
    use super::{Device, Triplet};

    #[test]
    fn triplet_serializes_with_short_role_keys() {
        let triplet = Triplet::new("w1.jpg", "w2.jpg", "w3.jpg");
        let raw = serde_json::to_string(&triplet).expect("serialize");
        assert_eq!(raw, r#"{"a":"w1.jpg","p":"w2.jpg","n":"w3.jpg"}"#);
        let back: Triplet = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(back, triplet);
    }

    #[test]
    fn device_parses_cpu_and_cuda_ids() {
        assert_eq!("cpu".parse::<Device>().expect("cpu"), Device::Cpu);
        assert_eq!("cuda:2".parse::<Device>().expect("cuda"), Device::Cuda(2));
        assert!("gpu2".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
    }

    #[test]
    fn device_display_round_trips() {
        for device in [Device::Cpu, Device::Cuda(3)] {
            let shown = device.to_string();
            assert_eq!(shown.parse::<Device>().expect("parse"), device);
        }
    }
}
