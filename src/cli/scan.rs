//! `gitstamp scan` command — resolve and report page metadata

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use console::style;
use indicatif::MultiProgress;
use serde::Serialize;
use std::path::Path;

use crate::attribution::attribution_line;
use crate::config::{load_config, GitstampConfig};
use crate::docs::discover_documents;
use crate::models::AuthorInfo;
use crate::pipeline::{Pipeline, ScanStats};
use crate::store::{default_state_path, PageStore};

pub fn run(
    path: &Path,
    format: &str,
    output: Option<&Path>,
    state: Option<&Path>,
    full: bool,
) -> Result<()> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    let config = load_config(&root);
    let state_path = match state {
        Some(path) => path.to_path_buf(),
        None => default_state_path(&root),
    };

    let documents = discover_documents(&root, &config)?;
    let mut store = PageStore::load(&state_path);

    let multi = MultiProgress::new();
    let mut pipeline = Pipeline::new(&root, &config);
    if full {
        pipeline = pipeline.with_full_resolve();
    }
    let stats = pipeline.run(&documents, &mut store, &multi)?;

    store
        .save(&state_path)
        .with_context(|| format!("Failed to write page store: {}", state_path.display()))?;

    let rendered = match format {
        "json" => render_json(&store, &config)?,
        _ => render_text(&store, &config, &stats),
    };

    match output {
        Some(path) => {
            let plain = console::strip_ansi_codes(&rendered).into_owned();
            std::fs::write(path, plain)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }

    Ok(())
}

/// Store timestamps are UTC seconds; render them as a fixed-width date.
fn format_date(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|moment| moment.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn render_text(store: &PageStore, config: &GitstampConfig, stats: &ScanStats) -> String {
    let mut out = String::new();

    if store.is_empty() {
        out.push_str("No documents found.\n");
        return out;
    }

    out.push_str(&format!("\n{}\n", style("Page metadata").bold()));
    out.push_str(&format!("{}\n", style("─".repeat(38)).dim()));
    for (docname, record) in store.iter() {
        let line = match record.timestamp {
            Some(timestamp) => {
                let date = format_date(timestamp);
                attribution_line(record, &date, &config.authors).unwrap_or(date)
            }
            None => style("no history").dim().to_string(),
        };
        out.push_str(&format!("  {:<40} {}\n", docname, line));
    }
    out.push('\n');
    out.push_str(&format!("{}\n", style(stats.summary()).dim()));
    out
}

#[derive(Serialize)]
struct PageReport<'a> {
    docname: &'a str,
    timestamp: Option<i64>,
    modified_iso: Option<String>,
    attribution: Option<String>,
    show_sourcelink: bool,
    author: &'a AuthorInfo,
    manual_authors: &'a Option<Vec<String>>,
}

fn render_json(store: &PageStore, config: &GitstampConfig) -> Result<String> {
    let pages: Vec<PageReport> = store
        .iter()
        .map(|(docname, record)| {
            let modified_iso = record
                .timestamp
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                .map(|moment| moment.to_rfc3339());
            let attribution = record
                .timestamp
                .map(format_date)
                .and_then(|date| attribution_line(record, &date, &config.authors));
            PageReport {
                docname,
                timestamp: record.timestamp,
                modified_iso,
                attribution,
                show_sourcelink: record.show_sourcelink,
                author: &record.author,
                manual_authors: &record.manual_authors,
            }
        })
        .collect();
    Ok(serde_json::to_string_pretty(&pages)? + "\n")
}
