use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use tracing::info;

use common::{MiningMode, Triplet, store::EmbeddingStore};

use crate::distance::squared_euclidean;

/// Boundary to the triplet-selection strategy: given the read-only embedding
/// store and a mode flag, produce training triplets.
pub trait TripletMiner {
    fn mine(&self, store: &EmbeddingStore, mode: MiningMode) -> Result<Vec<Triplet>>;
}

/// Miner driven by an image-to-class labeling. Every embedded image whose
/// class has at least one other embedded member becomes an anchor once; the
/// positive is a random same-class image, the negative comes from another
/// class per the mining mode. Deterministic under a fixed seed.
pub struct ClassAwareMiner {
    labels: HashMap<String, String>,
    margin: f32,
    seed: u64,
}

impl ClassAwareMiner {
    pub fn new(labels: HashMap<String, String>, margin: f32, seed: u64) -> Self {
        Self {
            labels,
            margin,
            seed,
        }
    }

    /// Labels document: a JSON object mapping image identifier to class id.
    /// A missing or unreadable file is fatal at this point of use.
    pub fn from_labels_file(path: &Path, margin: f32, seed: u64) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("labels file not found: {}", path.display()))?;
        let labels = serde_json::from_str(&raw)
            .with_context(|| format!("labels file unreadable: {}", path.display()))?;
        Ok(Self::new(labels, margin, seed))
    }
}

impl TripletMiner for ClassAwareMiner {
    fn mine(&self, store: &EmbeddingStore, mode: MiningMode) -> Result<Vec<Triplet>> {
        // BTreeMap plus sorted members keep selection order independent of
        // hash iteration, so a fixed seed yields a fixed output.
        let mut by_class: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (image, class) in &self.labels {
            if store.contains(image) {
                by_class.entry(class.as_str()).or_default().push(image.as_str());
            }
        }
        for members in by_class.values_mut() {
            members.sort_unstable();
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut triplets = Vec::new();
        for (class, members) in &by_class {
            if members.len() < 2 {
                continue;
            }
            let negative_pool: Vec<&str> = by_class
                .iter()
                .filter(|&(&other_class, _)| other_class != *class)
                .flat_map(|(_, images)| images.iter().copied())
                .collect();
            if negative_pool.is_empty() {
                continue;
            }

            for anchor in members {
                let Some(anchor_embedding) = store.get(anchor) else {
                    continue;
                };
                let positives: Vec<&str> =
                    members.iter().copied().filter(|m| m != anchor).collect();
                let Some(&positive) = positives.choose(&mut rng) else {
                    continue;
                };
                let Some(positive_embedding) = store.get(positive) else {
                    continue;
                };
                let d_ap = squared_euclidean(anchor_embedding, positive_embedding);

                let negative = match mode {
                    MiningMode::Random => match negative_pool.choose(&mut rng) {
                        Some(&negative) => negative,
                        None => continue,
                    },
                    MiningMode::SemiHard => {
                        match semi_hard_negative(
                            store,
                            anchor_embedding,
                            d_ap,
                            self.margin,
                            &negative_pool,
                        ) {
                            Some(negative) => negative,
                            None => continue,
                        }
                    }
                };
                triplets.push(Triplet::new(*anchor, positive, negative));
            }
        }

        info!(
            triplets = triplets.len(),
            classes = by_class.len(),
            mode = ?mode,
            "mined training triplets"
        );
        Ok(triplets)
    }
}

/// Nearest negative farther than the positive but within the margin band;
/// falls back to the nearest negative overall when the band is empty.
fn semi_hard_negative<'a>(
    store: &EmbeddingStore,
    anchor: &[f32],
    d_ap: f32,
    margin: f32,
    pool: &[&'a str],
) -> Option<&'a str> {
    let mut in_band: Option<(&'a str, f32)> = None;
    let mut nearest: Option<(&'a str, f32)> = None;
    for &candidate in pool {
        let Some(embedding) = store.get(candidate) else {
            continue;
        };
        let d_an = squared_euclidean(anchor, embedding);
        if nearest.is_none_or(|(_, best)| d_an < best) {
            nearest = Some((candidate, d_an));
        }
        if d_an > d_ap && d_an <= d_ap + margin && in_band.is_none_or(|(_, best)| d_an < best) {
            in_band = Some((candidate, d_an));
        }
    }
    in_band.or(nearest).map(|(name, _)| name)
}

/// Persist mined triplets as a JSON list-of-records document for reuse
/// without re-mining.
pub fn save_triplets(path: &Path, triplets: &[Triplet]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating triplet directory: {}", parent.display()))?;
    }
    let raw = serde_json::to_string(triplets).context("failed serializing triplets")?;
    fs::write(path, raw)
        .with_context(|| format!("failed writing triplet file: {}", path.display()))?;
    Ok(())
}

pub fn load_triplets(path: &Path) -> Result<Vec<Triplet>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("triplet file not found: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("triplet file unreadable: {}", path.display()))
}
