//! Per-directory date resolution: tracked-file filtering, the streamed
//! `git log` subprocess, and the shallow-repository probe.

use std::collections::HashSet;
use std::io::BufReader;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use super::log_stream::{parse_log, ShallowCheck};
use super::{GitError, GitResult};
use crate::models::FileDates;

/// Knobs forwarded to the `git log` invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Follow only the first parent of merges.
    pub first_parent: bool,
    /// Let merge commits list the files they merged (`-m`).
    pub show_merge_commits: bool,
}

/// Asks git whether the clone at `git_dir` is shallow.
pub fn is_shallow_repository(git_dir: &Path) -> GitResult<bool> {
    let output = Command::new("git")
        .args(["rev-parse", "--is-shallow-repository"])
        .current_dir(git_dir)
        .output()
        .map_err(GitError::from_spawn)?;
    if !output.status.success() {
        return Err(GitError::Subprocess {
            dir: git_dir.to_path_buf(),
            action: "rev-parse",
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
}

/// Lazy [`ShallowCheck`] backed by [`is_shallow_repository`]. The parser
/// memoizes the answer, so the subprocess runs at most once per
/// resolution call, and only when a root commit actually streams by.
pub struct ShallowProbe<'a> {
    git_dir: &'a Path,
}

impl<'a> ShallowProbe<'a> {
    pub fn new(git_dir: &'a Path) -> Self {
        ShallowProbe { git_dir }
    }
}

impl ShallowCheck for ShallowProbe<'_> {
    fn is_shallow(&mut self) -> GitResult<bool> {
        is_shallow_repository(self.git_dir)
    }
}

/// Which of `files` exist in HEAD, names relative to `git_dir`.
fn list_tracked(git_dir: &Path, files: &[String]) -> GitResult<HashSet<String>> {
    let output = Command::new("git")
        .args(["ls-tree", "--name-only", "-z", "HEAD", "--"])
        .args(files)
        .current_dir(git_dir)
        .output()
        .map_err(GitError::from_spawn)?;
    if !output.status.success() {
        return Err(GitError::Subprocess {
            dir: git_dir.to_path_buf(),
            action: "ls-tree",
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output
        .stdout
        .split(|&b| b == 0)
        .filter(|name| !name.is_empty())
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect())
}

/// Dates every unresolved file in `file_dates` against the history of
/// `git_dir`.
///
/// Untracked files are left at `None` without spawning the log subprocess
/// at all when nothing is tracked. The subprocess streams newest-first and
/// is killed as soon as the parser has everything it needs; its exit
/// status is deliberately ignored.
pub fn resolve_file_dates(
    git_dir: &Path,
    exclude_commits: &HashSet<String>,
    file_dates: &mut FileDates,
    options: &ResolveOptions,
) -> GitResult<()> {
    let mut requested: Vec<String> = file_dates
        .iter()
        .filter(|(_, date)| date.is_none())
        .map(|(file, _)| file.clone())
        .collect();
    requested.sort();
    if requested.is_empty() {
        return Ok(());
    }

    let tracked = list_tracked(git_dir, &requested)?;
    let mut pending: HashSet<String> = requested
        .into_iter()
        .filter(|file| tracked.contains(file))
        .collect();
    if pending.is_empty() {
        debug!("no tracked files to date in {}", git_dir.display());
        return Ok(());
    }

    let mut log_paths: Vec<String> = pending.iter().cloned().collect();
    log_paths.sort();
    debug!(
        "git log over {} files in {}",
        log_paths.len(),
        git_dir.display()
    );

    let mut cmd = Command::new("git");
    cmd.arg("log")
        .arg("--pretty=format:%n%at%x00%H%x00%P%x00%aN")
        .arg("--author-date-order")
        .arg("--relative")
        .arg("--name-only")
        .arg("--no-show-signature")
        .arg("-z");
    if options.show_merge_commits {
        cmd.arg("-m");
    }
    if options.first_parent {
        cmd.arg("--first-parent");
    }
    cmd.arg("--").args(&log_paths);

    let mut child = cmd
        .current_dir(git_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        // Never read alongside stdout; a filling stderr pipe must not be
        // able to stall the stream.
        .stderr(Stdio::null())
        .spawn()
        .map_err(GitError::from_spawn)?;

    let Some(stdout) = child.stdout.take() else {
        child.kill().ok();
        child.wait().ok();
        return Err(GitError::Subprocess {
            dir: git_dir.to_path_buf(),
            action: "log",
            stderr: "stdout pipe missing".into(),
        });
    };

    let mut probe = ShallowProbe::new(git_dir);
    let outcome = parse_log(
        BufReader::new(stdout),
        git_dir,
        &mut pending,
        file_dates,
        exclude_commits,
        &mut probe,
    );

    // The parse usually finishes while the child is still streaming. Its
    // status means nothing once the stream has been read far enough.
    child.kill().ok();
    child.wait().ok();

    outcome.map(|_| ())
}
