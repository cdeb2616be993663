//! Core data models shared across gitstamp.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Resolution result for a single file inside one repository directory.
///
/// Produced by the log parser when the newest commit touching the file is
/// found, and later compared against other candidates for the same page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDate {
    /// Author date of the newest commit touching the file, in unix seconds.
    pub timestamp: i64,
    /// True when the commit chain ends at the truncated root of a shallow
    /// clone, meaning the real newest commit may be missing.
    pub too_shallow: bool,
    /// Author name (`%aN`, mailmap-resolved) of that commit.
    pub author: String,
}

/// Per-directory resolution state: file name (relative to the directory)
/// mapped to its resolved date, or `None` while still unresolved.
pub type FileDates = HashMap<String, Option<FileDate>>;

/// Authorship attached to a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthorInfo {
    /// Nothing resolved, or author display disabled.
    #[default]
    None,
    /// Author of the newest commit only.
    Single(String),
    /// Every author that ever touched the page or its dependencies.
    Multiple(BTreeSet<String>),
}

impl AuthorInfo {
    pub fn is_none(&self) -> bool {
        matches!(self, AuthorInfo::None)
    }

    /// Raw names in a stable order. Alias mapping and deduplication happen
    /// at render time, not here.
    pub fn names(&self) -> Vec<&str> {
        match self {
            AuthorInfo::None => Vec::new(),
            AuthorInfo::Single(name) => vec![name.as_str()],
            AuthorInfo::Multiple(set) => set.iter().map(String::as_str).collect(),
        }
    }
}

/// Final per-document record, persisted in the page store and rendered
/// into scan output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Unix timestamp of the newest relevant commit. `None` when the page
    /// is untracked, unresolved, or its history bottomed out in a shallow
    /// clone.
    pub timestamp: Option<i64>,
    /// Whether a source link should still be offered for the page.
    pub show_sourcelink: bool,
    /// Git-derived authorship.
    pub author: AuthorInfo,
    /// Authors declared inside the document itself, in declaration order.
    pub manual_authors: Option<Vec<String>>,
    /// Source file mtime at resolution time; gates reuse on later scans.
    pub mtime_secs: u64,
}

impl PageRecord {
    /// Record for a page that was discovered but never resolved against git
    /// (excluded pages, or scans aborted before resolution).
    pub fn unresolved(manual_authors: Option<Vec<String>>, mtime_secs: u64) -> Self {
        PageRecord {
            timestamp: None,
            show_sourcelink: true,
            author: AuthorInfo::None,
            manual_authors,
            mtime_secs,
        }
    }
}
