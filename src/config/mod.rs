//! Scan configuration support
//!
//! Loads per-project configuration from `gitstamp.toml` or
//! `.gitstamprc.json` in the scanned root.
//!
//! # Configuration Format
//!
//! ```toml
//! # gitstamp.toml
//!
//! [source]
//! suffixes = [".md", ".rst"]
//!
//! [git]
//! exclude_patterns = ["drafts/*", "*.gen.md"]
//! exclude_commits = ["0123abcd..."]
//! first_parent = false
//! show_merge_commits = false
//!
//! [untracked]
//! show_sourcelink = false
//! check_dependencies = true
//!
//! [authors]
//! show = true
//! show_all = false
//! follow_renames = true
//! show_manual = false
//! aliases = { "ana" = "Ana Doe" }
//!
//! [warnings]
//! shallow = true
//! ```

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Root configuration for a scan.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GitstampConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub untracked: UntrackedConfig,

    #[serde(default)]
    pub authors: AuthorsConfig,

    #[serde(default)]
    pub warnings: WarningsConfig,
}

/// Which files count as documentation sources.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// File suffixes to scan (default: `.md` and `.rst`).
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            suffixes: default_suffixes(),
        }
    }
}

/// How git history is consulted.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GitConfig {
    /// Shell-style patterns for pages that never get timestamps.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Full hashes of commits that must not contribute dates
    /// (reformatting sweeps, mass renames).
    #[serde(default)]
    pub exclude_commits: Vec<String>,

    /// Follow only the first parent of merges.
    #[serde(default)]
    pub first_parent: bool,

    /// Let merge commits date the files they merged.
    #[serde(default)]
    pub show_merge_commits: bool,
}

/// Handling of pages whose source file is not tracked.
#[derive(Debug, Clone, Deserialize)]
pub struct UntrackedConfig {
    /// Keep offering a source link for untracked pages (default: false).
    #[serde(default)]
    pub show_sourcelink: bool,

    /// Still try to date untracked pages through their dependencies
    /// (default: true).
    #[serde(default = "default_true")]
    pub check_dependencies: bool,
}

impl Default for UntrackedConfig {
    fn default() -> Self {
        UntrackedConfig {
            show_sourcelink: false,
            check_dependencies: true,
        }
    }
}

/// Author display and collection.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorsConfig {
    /// Show the author of the newest commit (default: false).
    #[serde(default)]
    pub show: bool,

    /// Collect and show every author that ever touched a page
    /// (default: false).
    #[serde(default)]
    pub show_all: bool,

    /// Use the per-file rename-following walk for `show_all` instead of
    /// the cheaper batch walk (default: true).
    #[serde(default = "default_true")]
    pub follow_renames: bool,

    /// Honor author directives written inside documents (default: false).
    #[serde(default)]
    pub show_manual: bool,

    /// Raw git name (or its lowercase form) mapped to a display name.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Default for AuthorsConfig {
    fn default() -> Self {
        AuthorsConfig {
            show: false,
            show_all: false,
            follow_renames: true,
            show_manual: false,
            aliases: HashMap::new(),
        }
    }
}

/// Which conditions produce scan warnings.
#[derive(Debug, Clone, Deserialize)]
pub struct WarningsConfig {
    /// Warn when a page's history bottoms out in a shallow clone
    /// (default: true).
    #[serde(default = "default_true")]
    pub shallow: bool,
}

impl Default for WarningsConfig {
    fn default() -> Self {
        WarningsConfig { shallow: true }
    }
}

fn default_suffixes() -> Vec<String> {
    vec![".md".to_string(), ".rst".to_string()]
}

fn default_true() -> bool {
    true
}

impl GitstampConfig {
    /// Exclusion hashes as a set for the resolver.
    pub fn exclude_commit_set(&self) -> HashSet<String> {
        self.git.exclude_commits.iter().cloned().collect()
    }

    /// Compiled exclusion patterns. Bad patterns are skipped with a
    /// warning rather than failing the scan.
    pub fn exclude_globs(&self) -> GlobSet {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.git.exclude_patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => warn!("ignoring bad exclude pattern {:?}: {}", pattern, err),
            }
        }
        builder.build().unwrap_or_else(|err| {
            warn!("exclude patterns disabled: {}", err);
            GlobSet::empty()
        })
    }

    /// Fingerprint of every setting that changes what a scan resolves.
    /// Stored alongside the page store so a settings change redates pages
    /// whose sources never moved. Display-only settings (author aliases,
    /// warning switches) stay out of it.
    pub fn resolution_fingerprint(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.git.exclude_patterns.hash(&mut hasher);
        self.git.exclude_commits.hash(&mut hasher);
        self.git.first_parent.hash(&mut hasher);
        self.git.show_merge_commits.hash(&mut hasher);
        self.untracked.show_sourcelink.hash(&mut hasher);
        self.untracked.check_dependencies.hash(&mut hasher);
        self.authors.show_all.hash(&mut hasher);
        self.authors.follow_renames.hash(&mut hasher);
        self.authors.show_manual.hash(&mut hasher);
        hasher.finish()
    }
}

/// Load configuration for `root`, falling back to defaults when no file
/// exists or a file fails to parse.
pub fn load_config(root: &Path) -> GitstampConfig {
    // Try TOML first (preferred format)
    let toml_path = root.join("gitstamp.toml");
    if toml_path.exists() {
        match load_toml_config(&toml_path) {
            Ok(config) => {
                debug!("Loaded scan config from {}", toml_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", toml_path.display(), e);
            }
        }
    }

    // Try JSON
    let json_path = root.join(".gitstamprc.json");
    if json_path.exists() {
        match load_json_config(&json_path) {
            Ok(config) => {
                debug!("Loaded scan config from {}", json_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", json_path.display(), e);
            }
        }
    }

    debug!("No scan config found, using defaults");
    GitstampConfig::default()
}

fn load_toml_config(path: &Path) -> anyhow::Result<GitstampConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: GitstampConfig = toml::from_str(&content)?;
    Ok(config)
}

fn load_json_config(path: &Path) -> anyhow::Result<GitstampConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: GitstampConfig = serde_json::from_str(&content)?;
    Ok(config)
}
