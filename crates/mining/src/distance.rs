use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use common::{Triplet, store::EmbeddingStore};

pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Dense squared distances from `anchor` to every identifier in `corpus`,
/// indexed by corpus order. The corpus listing is an explicit parameter;
/// the same listing that seeded the run indexes this row.
pub fn distance_row(store: &EmbeddingStore, anchor: &str, corpus: &[String]) -> Result<Vec<f32>> {
    let anchor_embedding = store
        .get(anchor)
        .with_context(|| format!("no embedding for anchor {anchor}"))?;
    corpus
        .par_iter()
        .map(|image| {
            let other = store
                .get(image)
                .with_context(|| format!("no embedding for image {image}"))?;
            Ok(squared_euclidean(anchor_embedding, other))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct DistanceStats {
    pub mean: f32,
    pub max: f32,
    pub min: f32,
    pub std: f32,
}

impl DistanceStats {
    pub fn from_samples(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self {
                mean: 0.0,
                max: 0.0,
                min: 0.0,
                std: 0.0,
            };
        }
        let n = samples.len() as f32;
        let mean = samples.iter().sum::<f32>() / n;
        let max = samples.iter().copied().fold(f32::MIN, f32::max);
        let min = samples.iter().copied().fold(f32::MAX, f32::min);
        let variance = samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / n;
        Self {
            mean,
            max,
            min,
            std: variance.sqrt(),
        }
    }
}

/// Summary of the anchor-positive and anchor-negative distance populations
/// over a set of triplets. Good triplets keep the two populations apart.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct TripletDistanceReport {
    pub triplet_count: usize,
    pub positive: DistanceStats,
    pub negative: DistanceStats,
}

/// Triplets referencing identifiers missing from the store are fatal here;
/// downstream diagnostics have no fallback.
pub fn triplet_distance_report(
    store: &EmbeddingStore,
    triplets: &[Triplet],
) -> Result<TripletDistanceReport> {
    let mut positive = Vec::with_capacity(triplets.len());
    let mut negative = Vec::with_capacity(triplets.len());
    for triplet in triplets {
        let anchor = store
            .get(&triplet.anchor)
            .with_context(|| format!("no embedding for anchor {}", triplet.anchor))?;
        let pos = store
            .get(&triplet.positive)
            .with_context(|| format!("no embedding for positive {}", triplet.positive))?;
        let neg = store
            .get(&triplet.negative)
            .with_context(|| format!("no embedding for negative {}", triplet.negative))?;
        positive.push(squared_euclidean(anchor, pos));
        negative.push(squared_euclidean(anchor, neg));
    }
    Ok(TripletDistanceReport {
        triplet_count: triplets.len(),
        positive: DistanceStats::from_samples(&positive),
        negative: DistanceStats::from_samples(&negative),
    })
}

#[cfg(test)]
mod tests {
    use common::{Triplet, store::EmbeddingStore};
    use proptest::prelude::*;

    use super::{DistanceStats, distance_row, squared_euclidean, triplet_distance_report};

    fn small_store() -> EmbeddingStore {
        let mut store = EmbeddingStore::new();
        store.insert("a.jpg", vec![0.0, 0.0]);
        store.insert("b.jpg", vec![3.0, 4.0]);
        store.insert("c.jpg", vec![0.0, 1.0]);
        store
    }

    #[test]
    fn distance_row_follows_corpus_order() {
        let store = small_store();
        let corpus = vec!["a.jpg".to_string(), "b.jpg".to_string(), "c.jpg".to_string()];
        let row = distance_row(&store, "a.jpg", &corpus).expect("row");
        assert_eq!(row, vec![0.0, 25.0, 1.0]);
    }

    #[test]
    fn distance_row_fails_on_missing_embedding() {
        let store = small_store();
        let corpus = vec!["a.jpg".to_string(), "ghost.jpg".to_string()];
        assert!(distance_row(&store, "a.jpg", &corpus).is_err());
        assert!(distance_row(&store, "ghost.jpg", &corpus).is_err());
    }

    #[test]
    fn stats_summarize_sample_population() {
        let stats = DistanceStats::from_samples(&[1.0, 3.0]);
        assert!((stats.mean - 2.0).abs() < 1e-6);
        assert!((stats.max - 3.0).abs() < 1e-6);
        assert!((stats.min - 1.0).abs() < 1e-6);
        assert!((stats.std - 1.0).abs() < 1e-6);
    }

    #[test]
    fn report_splits_positive_and_negative_populations() {
        let store = small_store();
        let triplets = vec![Triplet::new("a.jpg", "c.jpg", "b.jpg")];
        let report = triplet_distance_report(&store, &triplets).expect("report");
        assert_eq!(report.triplet_count, 1);
        assert!((report.positive.mean - 1.0).abs() < 1e-6);
        assert!((report.negative.mean - 25.0).abs() < 1e-6);
    }

    #[test]
    fn report_is_fatal_on_missing_triplet_member() {
        let store = small_store();
        let triplets = vec![Triplet::new("a.jpg", "c.jpg", "ghost.jpg")];
        assert!(triplet_distance_report(&store, &triplets).is_err());
    }

    proptest! {
        #[test]
        fn distance_is_symmetric(
            a in prop::collection::vec(-10.0f32..10.0, 16),
            b in prop::collection::vec(-10.0f32..10.0, 16),
        ) {
            let forward = squared_euclidean(&a, &b);
            let backward = squared_euclidean(&b, &a);
            prop_assert!((forward - backward).abs() < 1e-4);
        }

        #[test]
        fn self_distance_is_zero(a in prop::collection::vec(-10.0f32..10.0, 16)) {
            prop_assert!(squared_euclidean(&a, &a).abs() < f32::EPSILON);
        }
    }
}
