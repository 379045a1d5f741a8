use assert_cmd::Command;
use predicates::str::contains;

fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let config_path = dir.join("flukeprint.toml");
    let config = format!(
        concat!(
            "image_dir='{images}'\n",
            "labels_path='{labels}'\n",
            "model_path='{model}'\n",
            "data_dir='{data}'\n",
            "devices=['cpu','cpu','cpu']\n",
            "image_size=8\n",
            "embedding_dim=16\n",
            "mining_mode='semi-hard'\n",
            "semi_hard_margin=10.0\n",
            "miner_seed=42\n",
            "max_missing_fraction=0.0\n",
        ),
        images = dir.join("images").display(),
        labels = dir.join("labels.json").display(),
        model = dir.join("missing-model.onnx").display(),
        data = dir.join("data").display(),
    );
    std::fs::write(&config_path, config).expect("write config");
    config_path
}

fn write_corpus(dir: &std::path::Path, count: usize) -> Vec<String> {
    let images = dir.join("images");
    std::fs::create_dir_all(&images).expect("mkdir images");
    (0..count)
        .map(|idx| {
            let name = format!("whale_{idx:02}.png");
            let shade = u8::try_from((29 * idx + 17) % 256).unwrap_or(0);
            let image = image::RgbImage::from_pixel(6, 6, image::Rgb([shade, 255 - shade, 90]));
            image.save(images.join(&name)).expect("write png");
            name
        })
        .collect()
}

fn write_labels(dir: &std::path::Path, names: &[String]) {
    // Three images per class, in corpus order.
    let labels: serde_json::Map<String, serde_json::Value> = names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            (
                name.clone(),
                serde_json::Value::String(format!("whale_class_{}", idx / 3)),
            )
        })
        .collect();
    std::fs::write(
        dir.join("labels.json"),
        serde_json::to_string(&labels).expect("serialize labels"),
    )
    .expect("write labels");
}

fn flukeprint() -> Command {
    let mut cmd = Command::cargo_bin("flukeprint").expect("binary");
    cmd.env("FLUKEPRINT_ALLOW_PSEUDO_EMBED", "true");
    cmd
}

#[test]
fn full_pipeline_embeds_mines_and_reports() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let names = write_corpus(tmp.path(), 9);
    write_labels(tmp.path(), &names);
    let config = write_config(tmp.path());

    flukeprint()
        .args(["--config", &config.display().to_string(), "run"])
        .assert()
        .success()
        .stdout(contains("\"triplet_count\": 9"))
        .stdout(contains("\"positive\""))
        .stdout(contains("\"negative\""));

    assert!(tmp.path().join("data/train_embeddings.json").exists());
    assert!(tmp.path().join("data/train_triplets.json").exists());
}

#[test]
fn embed_refuses_to_persist_on_shortfall() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let names = write_corpus(tmp.path(), 9);
    write_labels(tmp.path(), &names);
    // Corrupt one corpus member: its whole triplet is skipped, tripping the
    // strict completeness gate.
    std::fs::write(tmp.path().join("images").join(&names[4]), b"not a png").expect("corrupt");
    let config = write_config(tmp.path());

    flukeprint()
        .args(["--config", &config.display().to_string(), "embed"])
        .assert()
        .failure()
        .stderr(contains("refusing to persist"));

    assert!(!tmp.path().join("data/train_embeddings.json").exists());
}

#[test]
fn stats_without_checkpoint_is_fatal() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_corpus(tmp.path(), 3);
    write_labels(tmp.path(), &[]);
    let config = write_config(tmp.path());

    flukeprint()
        .args(["--config", &config.display().to_string(), "stats"])
        .assert()
        .failure()
        .stderr(contains("embedding checkpoint not found"));
}
