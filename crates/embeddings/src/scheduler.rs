use std::{collections::HashSet, path::PathBuf, thread};

use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use tracing::{error, info};

use common::{Device, Signal, Triplet, WorkerSummary, store::EmbeddingStore};

use crate::{config::EngineConfig, progress, queue::WorkQueue, worker::InferenceWorker};

/// Orchestrates one embedding-computation run: seed the work queue, start
/// one worker per device, wait for all of them, drain results.
pub struct Scheduler {
    devices: Vec<Device>,
    image_dir: PathBuf,
    engine_config: EngineConfig,
}

/// Outcome of a run. The store can be smaller than `expected_images` when
/// triplets failed; callers check `missing_fraction` before persisting.
pub struct RunReport {
    pub store: EmbeddingStore,
    pub summaries: Vec<WorkerSummary>,
    pub expected_images: usize,
    pub triplets_completed: u64,
}

impl RunReport {
    pub fn missing_fraction(&self) -> f32 {
        if self.expected_images == 0 {
            return 0.0;
        }
        let missing = self.expected_images.saturating_sub(self.store.len());
        missing as f32 / self.expected_images as f32
    }
}

impl Scheduler {
    pub fn new(devices: Vec<Device>, image_dir: PathBuf, engine_config: EngineConfig) -> Self {
        Self {
            devices,
            image_dir,
            engine_config,
        }
    }

    /// Runs to the join barrier: every worker has returned before the result
    /// queue is drained, so aggregation sees a race-free snapshot. Failed
    /// work is never retried or redistributed.
    pub fn run(&self, triplets: &[Triplet]) -> Result<RunReport> {
        let work = WorkQueue::seeded(triplets);
        let (results_tx, results_rx) = unbounded();
        let (signals_tx, signals_rx) = unbounded();
        let (summaries_tx, summaries_rx) = unbounded();

        let expected_triplets = triplets.len() as u64;
        let listener = thread::Builder::new()
            .name("progress-listener".to_string())
            .spawn(move || progress::run_progress_listener(signals_rx, expected_triplets))
            .context("failed spawning progress listener thread")?;

        let mut handles = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            let worker = InferenceWorker::new(
                *device,
                self.image_dir.clone(),
                EngineConfig {
                    device: *device,
                    ..self.engine_config.clone()
                },
            );
            let work = work.clone();
            let results_tx = results_tx.clone();
            let signals_tx = signals_tx.clone();
            let summaries_tx = summaries_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("inference-{device}"))
                .spawn(move || worker.run(&work, &results_tx, &signals_tx, &summaries_tx))
                .context("failed spawning inference worker thread")?;
            handles.push(handle);
        }
        drop(results_tx);
        drop(summaries_tx);

        // Join barrier: wait unconditionally for every worker, regardless of
        // whether the queue drained or workers exited early on errors.
        for handle in handles {
            if handle.join().is_err() {
                error!("inference worker thread panicked");
            }
        }

        let _ = signals_tx.send(Signal::Finished);
        drop(signals_tx);
        let triplets_completed = listener.join().unwrap_or_else(|_| {
            error!("progress listener thread panicked");
            0
        });

        // Single-threaded drain after the barrier; no concurrent writer
        // exists at this point.
        let mut store = EmbeddingStore::new();
        while let Ok(record) = results_rx.try_recv() {
            store.insert(record.image_name, record.embedding);
        }
        let summaries: Vec<WorkerSummary> = summaries_rx.try_iter().collect();

        let expected_images = unique_image_count(triplets);
        info!(
            embedded = store.len(),
            expected = expected_images,
            triplets_completed,
            workers = summaries.len(),
            "scheduler run complete"
        );

        Ok(RunReport {
            store,
            summaries,
            expected_images,
            triplets_completed,
        })
    }
}

fn unique_image_count(triplets: &[Triplet]) -> usize {
    let mut seen = HashSet::new();
    for triplet in triplets {
        for image in triplet.images() {
            seen.insert(image);
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use common::{Device, Triplet};

    use crate::config::EngineConfig;

    use super::Scheduler;

    fn test_engine_config() -> EngineConfig {
        EngineConfig {
            model_path: "/tmp/does-not-exist.onnx".to_string(),
            device: Device::Cpu,
            image_size: 4,
            vector_dim: 16,
            allow_pseudo_fallback: true,
        }
    }

    fn write_corpus(dir: &std::path::Path, count: usize) -> Vec<String> {
        (0..count)
            .map(|idx| {
                let name = format!("whale_{idx:02}.png");
                let shade = u8::try_from((37 * idx + 11) % 256).unwrap_or(0);
                let image =
                    image::RgbImage::from_pixel(4, 4, image::Rgb([shade, 255 - shade, 128]));
                image.save(dir.join(&name)).expect("write png");
                name
            })
            .collect()
    }

    fn chunk_triplets(names: &[String]) -> Vec<Triplet> {
        names
            .chunks_exact(3)
            .map(|c| Triplet::new(&*c[0], &*c[1], &*c[2]))
            .collect()
    }

    #[test]
    fn nine_images_three_devices_fill_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let names = write_corpus(dir.path(), 9);
        let triplets = chunk_triplets(&names);

        let scheduler = Scheduler::new(
            vec![Device::Cpu; 3],
            dir.path().to_path_buf(),
            test_engine_config(),
        );
        let report = scheduler.run(&triplets).expect("run");

        assert_eq!(report.store.len(), 9);
        assert_eq!(report.expected_images, 9);
        assert_eq!(report.triplets_completed, 3);
        assert_eq!(report.summaries.len(), 3);
        let attempted: usize = report.summaries.iter().map(|s| s.attempted).sum();
        let succeeded: usize = report.summaries.iter().map(|s| s.succeeded).sum();
        assert_eq!(attempted, 3);
        assert_eq!(succeeded, 3);
        assert!((report.missing_fraction() - 0.0).abs() < f32::EPSILON);
        for name in &names {
            let embedding = report.store.get(name).expect("embedding present");
            assert_eq!(embedding.len(), 16);
        }
    }

    #[test]
    fn failing_image_drops_its_whole_triplet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let names = write_corpus(dir.path(), 9);
        // One identifier's codec call always fails: the triplet's other two
        // identifiers are dropped with it.
        std::fs::remove_file(dir.path().join(&names[4])).expect("remove");
        let triplets = chunk_triplets(&names);

        let scheduler = Scheduler::new(
            vec![Device::Cpu; 3],
            dir.path().to_path_buf(),
            test_engine_config(),
        );
        let report = scheduler.run(&triplets).expect("run");

        assert_eq!(report.store.len(), 6);
        assert_eq!(report.triplets_completed, 2);
        let failed: usize = report.summaries.iter().map(|s| s.failed).sum();
        assert_eq!(failed, 1);
        assert!(report.missing_fraction() > 0.0);
    }

    #[test]
    fn empty_corpus_completes_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = Scheduler::new(
            vec![Device::Cpu; 3],
            dir.path().to_path_buf(),
            test_engine_config(),
        );
        let report = scheduler.run(&[]).expect("run");

        assert!(report.store.is_empty());
        assert_eq!(report.triplets_completed, 0);
        assert_eq!(report.expected_images, 0);
        assert!((report.missing_fraction() - 0.0).abs() < f32::EPSILON);
        assert!(report.summaries.iter().all(|s| s.attempted == 0));
    }

    #[test]
    fn rerun_is_idempotent_for_unchanged_corpus() {
        let dir = tempfile::tempdir().expect("tempdir");
        let names = write_corpus(dir.path(), 6);
        let triplets = chunk_triplets(&names);
        let scheduler = Scheduler::new(
            vec![Device::Cpu; 2],
            dir.path().to_path_buf(),
            test_engine_config(),
        );

        let first = scheduler.run(&triplets).expect("first run");
        let second = scheduler.run(&triplets).expect("second run");
        for name in &names {
            assert_eq!(first.store.get(name), second.store.get(name));
        }
    }
}
