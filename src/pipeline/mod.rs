//! Page resolution pipeline
//!
//! Orchestrates one scan:
//! 1. Reuse stored records when the source and resolution settings are unchanged
//! 2. Date source files per directory through streamed `git log`
//! 3. Date dependencies (best effort, untracked pages included)
//! 4. Collect full author sets when configured
//! 5. Assemble records and refresh the page store

pub mod assemble;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::GlobSet;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::GitstampConfig;
use crate::docs::Document;
use crate::git::{self, AuthorIndex, GitError, ResolveOptions};
use crate::models::{FileDate, FileDates, PageRecord};
use crate::pipeline::assemble::assemble_record;
use crate::store::{mtime_secs, PageStore};

/// One document that actually needs git resolution this scan.
struct PendingDoc<'d> {
    doc: &'d Document,
    dir: PathBuf,
    file: String,
    mtime: u64,
}

/// Full scan pipeline over a set of discovered documents.
pub struct Pipeline<'a> {
    root: &'a Path,
    config: &'a GitstampConfig,
    excluded: GlobSet,
    full: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(root: &'a Path, config: &'a GitstampConfig) -> Self {
        Self {
            root,
            config,
            excluded: config.exclude_globs(),
            full: false,
        }
    }

    /// Resolve every document, ignoring reusable store records.
    pub fn with_full_resolve(mut self) -> Self {
        self.full = true;
        self
    }

    /// Run the scan, updating `store` in place.
    pub fn run(
        &self,
        documents: &[Document],
        store: &mut PageStore,
        multi: &MultiProgress,
    ) -> Result<ScanStats> {
        let mut stats = ScanStats {
            documents: documents.len(),
            ..ScanStats::default()
        };
        let options = ResolveOptions {
            first_parent: self.config.git.first_parent,
            show_merge_commits: self.config.git.show_merge_commits,
        };
        let exclude_commits = self.config.exclude_commit_set();

        // Records resolved under different settings cannot be reused.
        let fingerprint = self.config.resolution_fingerprint();
        let stale_config = store.config_hash != fingerprint;
        store.config_hash = fingerprint;

        // Partition into excluded, reusable, and pending documents.
        let mut known: HashSet<String> = HashSet::new();
        let mut pending: Vec<PendingDoc> = Vec::new();
        for doc in documents {
            known.insert(doc.docname.clone());
            let mtime = mtime_secs(&doc.source).unwrap_or(0);
            if self.excluded.is_match(&doc.docname) {
                stats.excluded += 1;
                store.insert(
                    doc.docname.clone(),
                    PageRecord::unresolved(doc.manual_authors.clone(), mtime),
                );
                continue;
            }
            if !self.full && !stale_config && store.is_current(&doc.docname, &doc.source) {
                stats.reused += 1;
                continue;
            }
            let dir = doc.source.parent().unwrap_or(self.root).to_path_buf();
            let Some(file) = doc.source.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            pending.push(PendingDoc {
                doc,
                dir,
                file: file.to_string(),
                mtime,
            });
        }

        if pending.is_empty() {
            store.retain_documents(&known);
            info!("scan complete: {}", stats.summary());
            return Ok(stats);
        }

        // Source pass, one git log per directory.
        let mut src_dates: BTreeMap<PathBuf, FileDates> = BTreeMap::new();
        for item in &pending {
            src_dates
                .entry(item.dir.clone())
                .or_default()
                .insert(item.file.clone(), None);
        }
        stats.directories = src_dates.len();

        let bar = multi.add(ProgressBar::new(src_dates.len() as u64));
        bar.set_style(bar_style());
        bar.set_message("dating sources");
        for (dir, dates) in &mut src_dates {
            bar.inc(1);
            match git::resolve_file_dates(dir, &exclude_commits, dates, &options) {
                Ok(()) => {}
                Err(GitError::ToolNotFound) => {
                    warn!("git executable not found; no timestamps will be resolved");
                    bar.finish_with_message("git missing");
                    for item in &pending {
                        store.insert(
                            item.doc.docname.clone(),
                            PageRecord::unresolved(item.doc.manual_authors.clone(), item.mtime),
                        );
                    }
                    stats.unresolved = pending.len();
                    store.retain_documents(&known);
                    return Ok(stats);
                }
                Err(err @ GitError::Subprocess { .. }) => {
                    // This directory stays undated; the scan goes on.
                    warn!("{err}");
                }
                Err(err) => return Err(err.into()),
            }
        }
        bar.finish_with_message("sources dated");

        // Dependency pass. Whatever a page includes can date it too, which
        // is how untracked pages still get timestamps.
        let mut dep_dates: BTreeMap<PathBuf, FileDates> = BTreeMap::new();
        let mut doc_dep_keys: Vec<Vec<(PathBuf, String)>> = Vec::with_capacity(pending.len());
        for item in &pending {
            let src_resolved = src_dates
                .get(&item.dir)
                .and_then(|dates| dates.get(&item.file))
                .map(|date| date.is_some())
                .unwrap_or(false);
            if !src_resolved && !self.config.untracked.check_dependencies {
                doc_dep_keys.push(Vec::new());
                continue;
            }
            let mut keys = Vec::new();
            for dep in &item.doc.dependencies {
                if let Ok(relative) = dep.strip_prefix(self.root) {
                    let name = relative.to_string_lossy().replace('\\', "/");
                    if self.excluded.is_match(&name) {
                        continue;
                    }
                }
                if !dep.exists() {
                    warn!(
                        "{}: dependency {} not found",
                        item.doc.docname,
                        dep.display()
                    );
                    continue;
                }
                let Some(dir) = dep.parent() else { continue };
                let Some(file) = dep.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                dep_dates
                    .entry(dir.to_path_buf())
                    .or_default()
                    .entry(file.to_string())
                    .or_insert(None);
                keys.push((dir.to_path_buf(), file.to_string()));
            }
            doc_dep_keys.push(keys);
        }

        for (dir, dates) in &mut dep_dates {
            match git::resolve_file_dates(dir, &exclude_commits, dates, &options) {
                Ok(()) => {}
                Err(err @ GitError::Subprocess { .. }) => {
                    // Dependency directories may not be repositories at all.
                    debug!("dependency dating failed in {}: {}", dir.display(), err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        // Author pass over everything that resolved.
        let mut author_index = AuthorIndex::new();
        if self.config.authors.show_all {
            let mut targets: BTreeMap<PathBuf, BTreeSet<String>> = BTreeMap::new();
            for (dir, dates) in src_dates.iter().chain(dep_dates.iter()) {
                for (file, date) in dates {
                    if date.is_some() {
                        targets.entry(dir.clone()).or_default().insert(file.clone());
                    }
                }
            }
            let bar = multi.add(ProgressBar::new(targets.len() as u64));
            bar.set_style(bar_style());
            bar.set_message("collecting authors");
            for (dir, files) in &targets {
                bar.inc(1);
                let files: Vec<String> = files.iter().cloned().collect();
                if self.config.authors.follow_renames {
                    git::collect_authors_follow(dir, &files, &mut author_index);
                } else {
                    git::collect_authors_batch(dir, &files, &mut author_index);
                }
                stats.author_files += files.len();
            }
            bar.finish_with_message("authors collected");
        }

        // Assembly, source candidate first, dependencies in reference order.
        for (item, dep_keys) in pending.iter().zip(&doc_dep_keys) {
            let mut candidates: Vec<FileDate> = Vec::new();
            let src_date = src_dates
                .get(&item.dir)
                .and_then(|dates| dates.get(&item.file))
                .cloned()
                .flatten();
            let show_sourcelink = match src_date {
                Some(date) => {
                    candidates.push(date);
                    true
                }
                None => self.config.untracked.show_sourcelink,
            };
            for (dir, file) in dep_keys {
                if let Some(date) = dep_dates
                    .get(dir)
                    .and_then(|dates| dates.get(file))
                    .cloned()
                    .flatten()
                {
                    candidates.push(date);
                }
            }

            let all_authors: Option<BTreeSet<String>> = if self.config.authors.show_all {
                let mut union = BTreeSet::new();
                if let Some(set) = author_index.get(&(item.dir.clone(), item.file.clone())) {
                    union.extend(set.iter().cloned());
                }
                for (dir, file) in dep_keys {
                    if let Some(set) = author_index.get(&(dir.clone(), file.clone())) {
                        union.extend(set.iter().cloned());
                    }
                }
                Some(union)
            } else {
                None
            };

            let assembled = assemble_record(
                &candidates,
                show_sourcelink,
                all_authors,
                item.doc.manual_authors.clone(),
                item.mtime,
            );
            if assembled.shallow_dropped {
                stats.shallow += 1;
                if self.config.warnings.shallow {
                    warn!(
                        "{}: git clone is too shallow to date this page",
                        item.doc.docname
                    );
                }
            }
            if assembled.record.timestamp.is_some() {
                stats.resolved += 1;
            } else {
                stats.unresolved += 1;
            }
            store.insert(item.doc.docname.clone(), assembled.record);
        }

        store.retain_documents(&known);
        info!("scan complete: {}", stats.summary());
        Ok(stats)
    }
}

/// Create bar progress style
fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap()
        .progress_chars("█▓▒░  ")
}

/// Statistics from one scan.
#[derive(Default, Debug)]
pub struct ScanStats {
    /// Documents discovered
    pub documents: usize,
    /// Records resolved fresh this scan
    pub resolved: usize,
    /// Records reused from the store
    pub reused: usize,
    /// Documents left without a timestamp
    pub unresolved: usize,
    /// Pages whose history bottomed out in a shallow clone
    pub shallow: usize,
    /// Pages skipped by exclusion patterns
    pub excluded: usize,
    /// Distinct directories dated in the source pass
    pub directories: usize,
    /// Files covered by the author pass
    pub author_files: usize,
}

impl ScanStats {
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} documents", self.documents),
            format!("{} resolved", self.resolved),
            format!("{} reused", self.reused),
        ];
        if self.unresolved > 0 {
            parts.push(format!("{} unresolved", self.unresolved));
        }
        if self.shallow > 0 {
            parts.push(format!("{} shallow", self.shallow));
        }
        if self.excluded > 0 {
            parts.push(format!("{} excluded", self.excluded));
        }
        if self.author_files > 0 {
            parts.push(format!("{} files author-scanned", self.author_files));
        }
        parts.join(", ")
    }
}
