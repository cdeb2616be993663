//! `gitstamp merge` command — fold a shard store into the page store
//!
//! Documentation trees split across CI jobs each produce a partial store;
//! merging them is order-insensitive for disjoint shards, and later shards
//! win when docnames collide.

use anyhow::{Context, Result};
use std::path::Path;

use crate::store::{default_state_path, PageStore};

pub fn run(path: &Path, shard: &Path, state: Option<&Path>) -> Result<()> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    let state_path = match state {
        Some(path) => path.to_path_buf(),
        None => default_state_path(&root),
    };

    if !shard.exists() {
        anyhow::bail!("Shard store not found: {}", shard.display());
    }

    let mut store = PageStore::load(&state_path);
    let incoming = PageStore::load(shard);
    let count = incoming.len();
    store.merge(incoming);
    store
        .save(&state_path)
        .with_context(|| format!("Failed to write page store: {}", state_path.display()))?;

    println!(
        "Merged {} page record{} into {}",
        count,
        if count == 1 { "" } else { "s" },
        state_path.display()
    );
    Ok(())
}
