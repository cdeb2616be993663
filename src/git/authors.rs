//! Full-author collection: who ever touched a file, not just who touched
//! it last.
//!
//! Two strategies with different cost/fidelity trade-offs. The batch walk
//! runs one `git log` per directory and attributes authors from the
//! `--name-only` stream; the follow walk runs one `git log --follow` per
//! file, surviving renames and picking up `Co-authored-by` trailers.
//! Both are best effort: a failing subprocess drops authorship for the
//! affected files and nothing else.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

/// Collected authors, keyed by directory and file name relative to it.
pub type AuthorIndex = HashMap<(PathBuf, String), BTreeSet<String>>;

static EMAIL_TAIL: OnceLock<Regex> = OnceLock::new();

/// Drops a trailing `<email>` from a `Co-authored-by` value.
fn strip_email(value: &str) -> String {
    let re = EMAIL_TAIL.get_or_init(|| Regex::new(r"\s*<[^>]+>\s*$").expect("valid regex"));
    re.replace(value, "").into_owned()
}

/// Attributes authors out of a `--format=%aN%x00 --relative --name-only -z`
/// stream.
///
/// Each commit emits `author NUL NUL`, a newline, then its NUL-separated
/// file list. The next commit's header is glued straight onto that list,
/// so a line ending in the double NUL holds the pending author's files
/// plus the following author, split at the last interior NUL; the final
/// file list closes on a single NUL instead. Commits without a file list
/// leave their author unattributed, and files outside `wanted` are
/// dropped.
fn parse_batch_stream(
    stream: &[u8],
    wanted: &HashSet<String>,
) -> HashMap<String, BTreeSet<String>> {
    let mut attributed: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut dangling: Option<String> = None;

    for line in stream.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        match line.strip_suffix(b"\0\0") {
            Some(head) => {
                let (files, name) = match head.iter().rposition(|&b| b == 0) {
                    Some(cut) => (&head[..cut], &head[cut + 1..]),
                    None => (&head[..0], head),
                };
                attribute_files(files, dangling.as_deref(), wanted, &mut attributed);
                let name = String::from_utf8_lossy(name).trim().to_string();
                dangling = (!name.is_empty()).then_some(name);
            }
            None => {
                attribute_files(line, dangling.take().as_deref(), wanted, &mut attributed);
            }
        }
    }
    attributed
}

fn attribute_files(
    files: &[u8],
    author: Option<&str>,
    wanted: &HashSet<String>,
    attributed: &mut HashMap<String, BTreeSet<String>>,
) {
    let Some(author) = author else { return };
    for file in files.split(|&b| b == 0) {
        if file.is_empty() {
            continue;
        }
        let file = String::from_utf8_lossy(file).into_owned();
        if wanted.contains(&file) {
            attributed.entry(file).or_default().insert(author.to_string());
        }
    }
}

/// Splits one `%aN NUL trailers NUL` record into author names, stripping
/// `<email>` tails from the trailer values.
fn parse_follow_stream(stream: &[u8]) -> BTreeSet<String> {
    let mut authors = BTreeSet::new();
    for line in stream.split(|&b| b == b'\n') {
        let mut fields = line.split(|&b| b == 0);
        if let Some(main) = fields.next() {
            let main = String::from_utf8_lossy(main).trim().to_string();
            if !main.is_empty() {
                authors.insert(main);
            }
        }
        for trailer in fields {
            let co = strip_email(String::from_utf8_lossy(trailer).trim());
            if !co.is_empty() {
                authors.insert(co);
            }
        }
    }
    authors
}

/// One `git log` for the whole directory; cheap, but blind to renames and
/// co-author trailers.
pub fn collect_authors_batch(git_dir: &Path, files: &[String], index: &mut AuthorIndex) {
    let output = match Command::new("git")
        .args(["log", "--format=%aN%x00", "--relative", "--name-only", "-z", "--"])
        .args(files)
        .current_dir(git_dir)
        .output()
    {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            debug!(
                "author walk failed in {}: {}",
                git_dir.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return;
        }
        Err(err) => {
            debug!("author walk failed in {}: {}", git_dir.display(), err);
            return;
        }
    };

    let wanted: HashSet<String> = files.iter().cloned().collect();
    for (file, authors) in parse_batch_stream(&output.stdout, &wanted) {
        index
            .entry((git_dir.to_path_buf(), file))
            .or_default()
            .extend(authors);
    }
}

/// One `git log --follow` per file; follows renames and honors
/// `Co-authored-by` trailers.
pub fn collect_authors_follow(git_dir: &Path, files: &[String], index: &mut AuthorIndex) {
    for file in files {
        let output = match Command::new("git")
            .args([
                "log",
                "--follow",
                "--format=%aN%x00%(trailers:key=Co-authored-by,valueonly,separator=%x00,unfold)%x00",
                "--",
                file,
            ])
            .current_dir(git_dir)
            .output()
        {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                debug!(
                    "author walk for {} failed in {}: {}",
                    file,
                    git_dir.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                continue;
            }
            Err(err) => {
                debug!("author walk for {} failed in {}: {}", file, git_dir.display(), err);
                continue;
            }
        };

        let authors = parse_follow_stream(&output.stdout);
        debug!(
            "{} authors for {} in {}",
            authors.len(),
            file,
            git_dir.display()
        );
        if !authors.is_empty() {
            index
                .entry((git_dir.to_path_buf(), file.clone()))
                .or_default()
                .extend(authors);
        }
    }
}
