//! Git subprocess plumbing: streaming log resolution and author collection.
//!
//! Everything in this module shells out to the `git` binary rather than
//! linking a git library, so behavior matches whatever git the user has on
//! PATH (mailmap handling, pathspec semantics, shallow-clone bookkeeping).
//! Streamed subprocesses get a null stderr so a blocked pipe can never
//! deadlock the reader; short-lived calls capture stderr for diagnostics.

mod authors;
mod log_stream;
mod resolver;

pub use authors::{collect_authors_batch, collect_authors_follow, AuthorIndex};
pub use log_stream::{parse_log, ParseOutcome, ShallowCheck};
pub use resolver::{is_shallow_repository, resolve_file_dates, ResolveOptions, ShallowProbe};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from git subprocess orchestration and stream parsing.
#[derive(Error, Debug)]
pub enum GitError {
    /// The log stream violated the expected record grammar. Either the git
    /// behavior changed or the output was corrupted; resolution cannot
    /// continue safely.
    #[error("unexpected git log output in {}: {detail}", dir.display())]
    StreamFormat { dir: PathBuf, detail: String },

    /// History ended while tracked files were still unresolved and no
    /// commits were excluded, which should be impossible.
    #[error("git history in {} ended without dating tracked files: {files:?}", dir.display())]
    UnhandledFiles { dir: PathBuf, files: Vec<String> },

    /// A git invocation exited non-zero.
    #[error("git {action} failed in {}: {stderr}", dir.display())]
    Subprocess {
        dir: PathBuf,
        action: &'static str,
        stderr: String,
    },

    /// The `git` binary is not on PATH.
    #[error("git executable not found on PATH")]
    ToolNotFound,

    #[error("io error talking to git: {0}")]
    Io(#[from] std::io::Error),
}

pub type GitResult<T> = Result<T, GitError>;

impl GitError {
    /// Maps a spawn/invoke error, folding the missing-binary case into
    /// [`GitError::ToolNotFound`].
    pub(crate) fn from_spawn(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            GitError::ToolNotFound
        } else {
            GitError::Io(err)
        }
    }
}
