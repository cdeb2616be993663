//! Persistent page store - resolved records live in
//! `~/.cache/gitstamp/<root-hash>/state.json` between scans.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::PageRecord;

/// Bumped whenever the record schema changes shape.
const STORE_VERSION: u32 = 1;

/// Every resolved page, keyed by docname. Serialized as sorted JSON so
/// two identical scans produce byte-identical state files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageStore {
    /// Schema version; stores written by an incompatible build start fresh.
    #[serde(default)]
    pub version: u32,
    /// Fingerprint of the resolution settings the records were built
    /// with. A scan under different settings redates every page.
    #[serde(default)]
    pub config_hash: u64,
    pub pages: BTreeMap<String, PageRecord>,
}

impl Default for PageStore {
    fn default() -> Self {
        PageStore {
            version: STORE_VERSION,
            config_hash: 0,
            pages: BTreeMap::new(),
        }
    }
}

impl PageStore {
    /// Load a store from disk. Missing, unreadable, or version-mismatched
    /// state starts fresh; anything but a missing file is worth a warning
    /// because its records are about to be dropped.
    pub fn load(path: &Path) -> Self {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "page store at {} is unreadable ({err}); starting fresh",
                        path.display()
                    );
                }
                return Self::default();
            }
        };
        match serde_json::from_str::<PageStore>(&data) {
            Ok(store) if store.version == STORE_VERSION => store,
            Ok(store) => {
                warn!(
                    "page store at {} has incompatible schema version {}, want {}; starting fresh",
                    path.display(),
                    store.version,
                    STORE_VERSION
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    "page store at {} is unreadable ({err}); starting fresh",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Save the store to disk, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn get(&self, docname: &str) -> Option<&PageRecord> {
        self.pages.get(docname)
    }

    pub fn insert(&mut self, docname: String, record: PageRecord) {
        self.pages.insert(docname, record);
    }

    /// Records in docname order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PageRecord)> {
        self.pages.iter()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Whether the stored record for `docname` still describes the file at
    /// `source` (mtime unchanged since resolution).
    pub fn is_current(&self, docname: &str, source: &Path) -> bool {
        let Some(record) = self.pages.get(docname) else {
            return false;
        };
        mtime_secs(source)
            .map(|mtime| mtime == record.mtime_secs)
            .unwrap_or(false)
    }

    /// Fold another store in; its records win on docname collisions. The
    /// settings fingerprint survives only when both sides agree on it.
    pub fn merge(&mut self, other: PageStore) {
        if self.pages.is_empty() {
            self.config_hash = other.config_hash;
        } else if self.config_hash != other.config_hash {
            self.config_hash = 0;
        }
        self.pages.extend(other.pages);
    }

    /// Drop the record for a removed document.
    pub fn purge(&mut self, docname: &str) {
        self.pages.remove(docname);
    }

    /// Drop every record whose document no longer exists.
    pub fn retain_documents(&mut self, known: &HashSet<String>) {
        self.pages.retain(|docname, _| known.contains(docname));
    }
}

/// File modification time in seconds since epoch.
pub fn mtime_secs(path: impl AsRef<Path>) -> Option<u64> {
    fs::metadata(path.as_ref())
        .ok()?
        .modified()
        .ok()?
        .duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// State directory for a scanned root.
/// `~/.cache/gitstamp/<root-hash>/` on Unix, `%LOCALAPPDATA%/gitstamp/<root-hash>/` on Windows.
pub fn get_state_dir(root: &Path) -> PathBuf {
    let root_hash = hash_path(root);

    let base = if cfg!(windows) {
        std::env::var("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")))
    } else {
        dirs::cache_dir().unwrap_or_else(|| {
            // Fallback to ~/.cache
            dirs::home_dir()
                .map(|h| h.join(".cache"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    };

    base.join("gitstamp").join(&root_hash)
}

/// Default state file for a scanned root.
pub fn default_state_path(root: &Path) -> PathBuf {
    get_state_dir(root).join("state.json")
}

/// Hash a path to create a unique but deterministic directory name.
/// Uses the canonical path to ensure consistency.
fn hash_path(path: &Path) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let path_str = canonical.to_string_lossy();

    let mut hasher = DefaultHasher::new();
    path_str.hash(&mut hasher);
    let hash = hasher.finish();

    // Use the canonical file_name for readable naming (important when path is ".")
    let root_name = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("docs")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(20)
        .collect::<String>();

    format!("{}-{:012x}", root_name, hash)
}
