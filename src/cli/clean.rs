//! `gitstamp clean` command — remove the cached page store

use anyhow::{Context, Result};
use std::path::Path;

use crate::store::default_state_path;

pub fn run(path: &Path, state: Option<&Path>) -> Result<()> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    let state_path = match state {
        Some(path) => path.to_path_buf(),
        None => default_state_path(&root),
    };

    if !state_path.exists() {
        println!("No page store found at {}", state_path.display());
        return Ok(());
    }

    std::fs::remove_file(&state_path)
        .with_context(|| format!("Failed to remove {}", state_path.display()))?;
    // The per-tree cache directory is empty now; drop it too if we can.
    if let Some(parent) = state_path.parent() {
        let _ = std::fs::remove_dir(parent);
    }

    println!("Removed {}", state_path.display());
    Ok(())
}
