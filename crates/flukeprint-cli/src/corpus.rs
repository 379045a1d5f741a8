use std::path::Path;

use ignore::WalkBuilder;
use tracing::warn;

use common::Triplet;

const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Enumerate the training corpus: image file names under `image_dir` in
/// sorted order. This single listing is threaded through seeding and
/// distance-row indexing; no stage re-lists the directory.
pub fn scan_corpus(image_dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let walker = WalkBuilder::new(image_dir)
        .hidden(false)
        .max_depth(Some(1))
        .build();
    for entry in walker.flatten() {
        let path = entry.path();
        if path.is_dir() || !is_supported_image(path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort_unstable();
    names
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Chunk the ordered corpus into consecutive work-unit triples. A trailing
/// remainder of one or two identifiers cannot form a work unit and is
/// skipped, matching the historical pipeline's behavior.
pub fn seed_triplets(corpus: &[String]) -> Vec<Triplet> {
    let remainder = corpus.len() % 3;
    if remainder != 0 {
        warn!(
            remainder,
            "corpus size is not a multiple of 3; trailing identifiers skipped"
        );
    }
    corpus
        .chunks_exact(3)
        .map(|chunk| Triplet::new(chunk[0].clone(), chunk[1].clone(), chunk[2].clone()))
        .collect()
}
