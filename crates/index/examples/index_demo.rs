use index::{BackendConfig, EmbeddingIndex, IndexConfig};
use serde_json::json;

fn main() -> anyhow::Result<()> {
    std::fs::create_dir_all("data")?;

    let cfg = IndexConfig::new()
        .with_dimension(4)
        .with_backend(BackendConfig::redb("data/faces.redb"));
    let index = EmbeddingIndex::open(cfg)?;

    // Two enrolled faces pointing in clearly different directions.
    let enrolled = [
        ("ada", [0.9, 0.1, 0.0, 0.1], json!({"name": "Ada", "age": 36})),
        ("alan", [0.0, 0.2, 0.9, 0.1], json!({"name": "Alan", "age": 41})),
    ];

    for (key, vector, metadata) in enrolled {
        if index.contains(key)? {
            index.replace(key, &vector, metadata)?;
        } else {
            index.insert(key, &vector, metadata)?;
        }
    }
    println!("Indexed {} faces.", index.len());

    let probe = [0.85, 0.15, 0.05, 0.1];
    for hit in index.query(&probe, 2)? {
        println!(
            "{} similarity={:.3} metadata={}",
            hit.identity_key,
            hit.similarity(),
            hit.metadata
        );
    }

    index.close()?;
    Ok(())
}
