use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use common::{config::AppConfig, store::EmbeddingStore};
use embeddings::{EngineConfig, Scheduler};
use mining::{ClassAwareMiner, TripletMiner, distance, load_triplets, save_triplets};

use crate::corpus;

/// Compute embeddings for the whole corpus and persist the checkpoint,
/// refusing to persist when the completeness check fails.
pub fn run_embed(cfg: &AppConfig) -> Result<()> {
    let image_dir = Path::new(&cfg.image_dir);
    let listing = corpus::scan_corpus(image_dir);
    info!(images = listing.len(), dir = %image_dir.display(), "scanned corpus");
    let triplets = corpus::seed_triplets(&listing);

    let devices = cfg.parsed_devices()?;
    anyhow::ensure!(!devices.is_empty(), "no devices configured");
    let engine_config = EngineConfig::from_app(cfg, devices[0]);
    let scheduler = Scheduler::new(devices, PathBuf::from(&cfg.image_dir), engine_config);
    let report = scheduler.run(&triplets)?;

    for summary in &report.summaries {
        info!(
            device = %summary.device,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "worker summary"
        );
    }

    let missing = report.missing_fraction();
    if missing > cfg.max_missing_fraction {
        anyhow::bail!(
            "embedding run left {:.2}% of {} expected images missing (threshold {:.2}%); refusing to persist",
            f64::from(missing) * 100.0,
            report.expected_images,
            f64::from(cfg.max_missing_fraction) * 100.0,
        );
    }

    let checkpoint = cfg.embeddings_file();
    report.store.save(&checkpoint)?;
    info!(
        path = %checkpoint.display(),
        embeddings = report.store.len(),
        "persisted embedding checkpoint"
    );
    Ok(())
}

/// Mine training triplets from the persisted checkpoint and persist them.
pub fn run_mine(cfg: &AppConfig) -> Result<()> {
    let store = EmbeddingStore::load(&cfg.embeddings_file())?;
    let miner = ClassAwareMiner::from_labels_file(
        Path::new(&cfg.labels_path),
        cfg.semi_hard_margin,
        cfg.miner_seed,
    )?;
    let triplets = miner.mine(&store, cfg.mining_mode)?;
    let triplet_file = cfg.triplets_file();
    save_triplets(&triplet_file, &triplets)?;
    info!(
        path = %triplet_file.display(),
        triplets = triplets.len(),
        "persisted training triplets"
    );
    Ok(())
}

/// Print the anchor-positive / anchor-negative distance diagnostic for the
/// persisted triplets.
pub fn run_stats(cfg: &AppConfig) -> Result<()> {
    let store = EmbeddingStore::load(&cfg.embeddings_file())?;
    let triplets = load_triplets(&cfg.triplets_file())?;
    let report = distance::triplet_distance_report(&store, &triplets)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Full pipeline: embed and persist, mine and persist, report distances.
pub fn run_all(cfg: &AppConfig) -> Result<()> {
    run_embed(cfg)?;
    run_mine(cfg)?;
    run_stats(cfg)
}
