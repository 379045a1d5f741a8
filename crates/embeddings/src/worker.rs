use std::path::PathBuf;

use anyhow::Result;
use crossbeam_channel::Sender;
use tracing::{info, warn};

use common::{Device, ResultRecord, Signal, Triplet, WorkerSummary};

use crate::{codec, config::EngineConfig, engine::EmbeddingEngine, queue::WorkQueue};

/// One worker per accelerator device, running a strictly sequential
/// pull-compute-publish loop on its own thread.
pub struct InferenceWorker {
    device: Device,
    image_dir: PathBuf,
    engine_config: EngineConfig,
}

impl InferenceWorker {
    pub fn new(device: Device, image_dir: PathBuf, engine_config: EngineConfig) -> Self {
        Self {
            device,
            image_dir,
            engine_config,
        }
    }

    /// Pull loop. Per iteration: pop one triplet, codec-load its three
    /// images, run one batched inference, publish three results and one
    /// signal token. A codec/inference error skips the whole triplet (never
    /// a partial result) and the loop continues; an empty queue ends it.
    pub fn run(
        &self,
        work: &WorkQueue,
        results: &Sender<ResultRecord>,
        signals: &Sender<Signal>,
        summaries: &Sender<WorkerSummary>,
    ) {
        // Device binding happens inside the engine constructor, before the
        // model session is committed.
        let engine = match EmbeddingEngine::new(self.engine_config.clone()) {
            Ok(engine) => engine,
            Err(err) => {
                warn!(device = %self.device, error = %err, "engine construction failed; worker exiting");
                let _ = summaries.send(self.summary(0, 0, 0));
                return;
            }
        };
        info!(device = %self.device, "inference worker started");

        let mut attempted = 0usize;
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        while let Some(triplet) = work.try_pop() {
            attempted += 1;
            match self.process(&engine, &triplet) {
                Ok(records) => {
                    for record in records {
                        let _ = results.send(record);
                    }
                    let _ = signals.send(Signal::TripletDone);
                    succeeded += 1;
                }
                Err(err) => {
                    warn!(
                        device = %self.device,
                        anchor = %triplet.anchor,
                        error = %err,
                        "skipping triplet after codec/inference error"
                    );
                    failed += 1;
                }
            }
        }

        let _ = summaries.send(self.summary(attempted, succeeded, failed));
        info!(device = %self.device, attempted, succeeded, failed, "inference worker done");
    }

    fn process(&self, engine: &EmbeddingEngine, triplet: &Triplet) -> Result<Vec<ResultRecord>> {
        let mut batch = Vec::with_capacity(3);
        for image_name in triplet.images() {
            batch.push(codec::load_image_tensor(
                &self.image_dir,
                image_name,
                self.engine_config.image_size,
            )?);
        }

        let vectors = engine.embed_batch(&batch)?;
        anyhow::ensure!(
            vectors.len() == 3,
            "expected 3 embeddings from batch, got {}",
            vectors.len()
        );

        Ok(triplet
            .images()
            .into_iter()
            .zip(vectors)
            .map(|(image_name, embedding)| ResultRecord {
                image_name: image_name.to_string(),
                embedding,
            })
            .collect())
    }

    fn summary(&self, attempted: usize, succeeded: usize, failed: usize) -> WorkerSummary {
        WorkerSummary {
            device: self.device.to_string(),
            attempted,
            succeeded,
            failed,
        }
    }
}
