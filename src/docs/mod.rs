//! Documentation source discovery and directive parsing.
//!
//! A document is any file under the scanned root whose name carries a
//! configured suffix. Its docname is the root-relative path, suffix
//! included. Documents pull in dependencies (included files, images)
//! which are dated alongside the page itself, and may declare manual
//! authors through `author` directives.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use ignore::WalkBuilder;
use regex::Regex;
use tracing::warn;

use crate::config::GitstampConfig;

/// One discovered documentation source.
#[derive(Debug, Clone)]
pub struct Document {
    /// Root-relative path with suffix, `/`-separated.
    pub docname: String,
    /// Absolute path of the source file.
    pub source: PathBuf,
    /// Absolute paths of referenced files, in reference order.
    pub dependencies: Vec<PathBuf>,
    /// Authors declared in the document, when directive parsing is on.
    pub manual_authors: Option<Vec<String>>,
}

static RST_DEPENDENCY: OnceLock<Regex> = OnceLock::new();
static MYST_DEPENDENCY: OnceLock<Regex> = OnceLock::new();
static MD_IMAGE: OnceLock<Regex> = OnceLock::new();
static RST_AUTHOR: OnceLock<Regex> = OnceLock::new();
static MYST_FENCED_AUTHOR: OnceLock<Regex> = OnceLock::new();
static MYST_INLINE_AUTHOR: OnceLock<Regex> = OnceLock::new();

/// File references a document pulls in: reST directives for reST sources,
/// MyST directives plus plain Markdown images for everything else.
/// Web URLs are not file dependencies and are dropped.
fn extract_dependencies(text: &str, is_rst: bool) -> Vec<String> {
    let mut references = Vec::new();
    if is_rst {
        let re = RST_DEPENDENCY.get_or_init(|| {
            Regex::new(r"(?m)^\s*\.\.\s+(?:include|literalinclude|image|figure)::\s*(\S+)")
                .expect("valid regex")
        });
        references.extend(re.captures_iter(text).map(|c| c[1].to_string()));
    } else {
        let fenced = MYST_DEPENDENCY.get_or_init(|| {
            Regex::new(r"(?m)^\s*```+\{(?:include|literalinclude|image|figure)\}\s+(\S+)")
                .expect("valid regex")
        });
        references.extend(fenced.captures_iter(text).map(|c| c[1].to_string()));
        let image = MD_IMAGE
            .get_or_init(|| Regex::new(r"!\[[^\]]*\]\(([^)\s]+)\)").expect("valid regex"));
        references.extend(image.captures_iter(text).map(|c| c[1].to_string()));
    }
    references.retain(|reference| !reference.contains("://"));
    references
}

/// Manual author declarations, in declaration order, deduplicated.
///
/// reST: `.. author:: Name`. MyST: a fenced `` ```{author} `` block or an
/// inline `{author} Name` role.
fn parse_author_directives(text: &str, is_rst: bool) -> Vec<String> {
    let mut authors: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        let name = name.trim();
        if !name.is_empty() && !authors.iter().any(|a| a == name) {
            authors.push(name.to_string());
        }
    };
    if is_rst {
        let re = RST_AUTHOR.get_or_init(|| {
            Regex::new(r"(?m)^\.\.\s+author::\s*(.+?)\s*$").expect("valid regex")
        });
        for capture in re.captures_iter(text) {
            push(&capture[1]);
        }
    } else {
        let fenced = MYST_FENCED_AUTHOR.get_or_init(|| {
            Regex::new(r"(?s)```\{author\}\s*\n?\s*(.+?)\n?\s*```").expect("valid regex")
        });
        for capture in fenced.captures_iter(text) {
            push(&capture[1]);
        }
        let inline = MYST_INLINE_AUTHOR
            .get_or_init(|| Regex::new(r"\{author\}[ \t]+([^\n]+)").expect("valid regex"));
        for capture in inline.captures_iter(text) {
            push(&capture[1]);
        }
    }
    authors
}

/// A reference starting with `/` is rooted at the scan root, anything
/// else at the document's own directory. Canonicalized when the file
/// exists so the same dependency dedupes across documents.
fn resolve_dependency(root: &Path, doc_dir: &Path, reference: &str) -> PathBuf {
    let raw = if let Some(rooted) = reference.strip_prefix('/') {
        root.join(rooted)
    } else {
        doc_dir.join(reference)
    };
    raw.canonicalize().unwrap_or(raw)
}

/// Walks `root` and parses every file with a configured suffix into a
/// [`Document`]. Results are sorted by docname so scans are reproducible.
pub fn discover_documents(root: &Path, config: &GitstampConfig) -> Result<Vec<Document>> {
    let suffixes = &config.source.suffixes;
    let mut documents = Vec::new();

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .build();

    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !suffixes.iter().any(|suffix| name.ends_with(suffix.as_str())) {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let docname = relative.to_string_lossy().replace('\\', "/");

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!("could not read {}: {}", path.display(), err);
                String::new()
            }
        };
        let is_rst = name.ends_with(".rst");
        let doc_dir = path.parent().unwrap_or(root);

        let mut dependencies = Vec::new();
        for reference in extract_dependencies(&text, is_rst) {
            let dep = resolve_dependency(root, doc_dir, &reference);
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }

        let manual_authors = if config.authors.show_manual {
            let authors = parse_author_directives(&text, is_rst);
            (!authors.is_empty()).then_some(authors)
        } else {
            None
        };

        documents.push(Document {
            docname,
            source: path.to_path_buf(),
            dependencies,
            manual_authors,
        });
    }

    documents.sort_by(|a, b| a.docname.cmp(&b.docname));
    Ok(documents)
}
