//! Streaming parser for the NUL/newline framed `git log` output used to
//! date files.
//!
//! The log subprocess is spawned with
//! `--pretty=format:%n%at%x00%H%x00%P%x00%aN --name-only -z`, which frames
//! each commit as a blank-line separator, a NUL-separated header line, and
//! a NUL-terminated file list. The parser walks that stream newest-first
//! and stops the moment every requested file has a date, leaving the rest
//! of the history unread.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use tracing::warn;

use super::{GitError, GitResult};
use crate::models::{FileDate, FileDates};

/// Answers "is this repository shallow?" on demand.
///
/// [`parse_log`] memoizes the answer, so an implementation is consulted at
/// most once per call even when several root commits stream by.
pub trait ShallowCheck {
    fn is_shallow(&mut self) -> GitResult<bool>;
}

/// How a parse run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Every requested file got a date; the remaining stream was not read.
    Complete,
    /// History ran out first. Only reachable when commits are excluded,
    /// otherwise the same condition is a hard error.
    Exhausted,
}

/// Reads one newline-terminated line into `buf`, stripping the
/// terminator. Returns false at end of stream.
fn fill_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(true)
}

fn stream_format(git_dir: &Path, detail: String) -> GitError {
    GitError::StreamFormat {
        dir: git_dir.to_path_buf(),
        detail,
    }
}

/// History ended while files were still pending. Tolerable when commits
/// were excluded (their diffs may own the leftover files), fatal otherwise.
fn exhausted(
    git_dir: &Path,
    pending: &HashSet<String>,
    exclude_commits: &HashSet<String>,
) -> GitResult<ParseOutcome> {
    let mut files: Vec<String> = pending.iter().cloned().collect();
    files.sort();
    if exclude_commits.is_empty() {
        return Err(GitError::UnhandledFiles {
            dir: git_dir.to_path_buf(),
            files,
        });
    }
    warn!(
        "history of {} ended before dating {:?}; assuming excluded commits touched them",
        git_dir.display(),
        files
    );
    Ok(ParseOutcome::Exhausted)
}

/// Consumes a framed log stream, dating files out of `pending` into
/// `file_dates` until either the pending set empties or history runs out.
///
/// Stream grammar, per commit, newest first:
///
/// * a header line `timestamp NUL hash NUL parents NUL author`, with a
///   fifth empty field when git appends a trailing NUL to merge commits
///   whose diff is suppressed;
/// * a file list line of NUL-terminated names. A line *without* a final
///   NUL is not a file list at all but the next commit's header (merge
///   commits emit no list), so it is held back and re-read as a header.
///   A list of a lone NUL means the commit matched the pathspec but
///   changed nothing.
///
/// Commits named in `exclude_commits` are dropped after their file list
/// is consumed, keeping the stream in sync without contributing dates.
/// A root commit makes the parser ask `shallow` (once) whether the clone
/// is shallow; dates resolved by such a commit are marked `too_shallow`
/// since the true newest commit may have been cut off.
pub fn parse_log<R: BufRead, S: ShallowCheck>(
    mut reader: R,
    git_dir: &Path,
    pending: &mut HashSet<String>,
    file_dates: &mut FileDates,
    exclude_commits: &HashSet<String>,
    shallow: &mut S,
) -> GitResult<ParseOutcome> {
    let mut buf: Vec<u8> = Vec::new();

    // The leading %n makes the very first line blank.
    if fill_line(&mut reader, &mut buf)? && !buf.is_empty() {
        return Err(stream_format(
            git_dir,
            format!(
                "expected blank first line, got {:?}",
                String::from_utf8_lossy(&buf)
            ),
        ));
    }

    let mut lookahead: Option<Vec<u8>> = None;
    let mut shallow_known: Option<bool> = None;

    while !pending.is_empty() {
        let header: Vec<u8> = match lookahead.take() {
            Some(line) if line.is_empty() => {
                return exhausted(git_dir, pending, exclude_commits)
            }
            Some(line) => line,
            None => {
                if !fill_line(&mut reader, &mut buf)? {
                    return exhausted(git_dir, pending, exclude_commits);
                }
                buf.clone()
            }
        };

        let pieces: Vec<&[u8]> = header.split(|&b| b == 0).collect();
        if pieces.len() != 4 && pieces.len() != 5 {
            return Err(stream_format(
                git_dir,
                format!(
                    "commit header with {} fields: {:?}",
                    pieces.len(),
                    String::from_utf8_lossy(&header)
                ),
            ));
        }
        let timestamp: i64 = std::str::from_utf8(pieces[0])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                stream_format(
                    git_dir,
                    format!(
                        "bad author timestamp {:?}",
                        String::from_utf8_lossy(pieces[0])
                    ),
                )
            })?;
        let hash = String::from_utf8_lossy(pieces[1]).into_owned();
        let is_root = pieces[2].is_empty();
        let author = String::from_utf8_lossy(pieces[3]).into_owned();

        if !fill_line(&mut reader, &mut buf)? {
            return exhausted(git_dir, pending, exclude_commits);
        }
        if buf.last() != Some(&0) {
            // No final NUL: this was the next commit's header, not a file
            // list. Re-read it on the next pass.
            lookahead = Some(buf.clone());
            continue;
        }
        while buf.last() == Some(&0) {
            buf.pop();
        }
        if buf.is_empty() {
            // Commit matched the pathspec but changed no files.
            continue;
        }
        let changed: Vec<String> = buf
            .split(|&b| b == 0)
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect();

        // Skip excluded commits only after consuming their file list, and
        // before any shallow probing.
        if exclude_commits.contains(&hash) {
            continue;
        }

        let too_shallow = if is_root {
            match shallow_known {
                Some(flag) => flag,
                None => {
                    let flag = shallow.is_shallow()?;
                    shallow_known = Some(flag);
                    flag
                }
            }
        } else {
            false
        };

        for file in changed {
            if pending.remove(&file) {
                file_dates.insert(
                    file,
                    Some(FileDate {
                        timestamp,
                        too_shallow,
                        author: author.clone(),
                    }),
                );
            }
        }
    }

    Ok(ParseOutcome::Complete)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned {
        value: bool,
        calls: usize,
    }

    impl ShallowCheck for Canned {
        fn is_shallow(&mut self) -> GitResult<bool> {
            self.calls += 1;
            Ok(self.value)
        }
    }

    struct MustNotProbe;

    impl ShallowCheck for MustNotProbe {
        fn is_shallow(&mut self) -> GitResult<bool> {
            panic!("shallow probe must not run");
        }
    }

    /// A commit with a diff: blank separator, header line, NUL-terminated
    /// file list. The next record (or EOF) terminates the list line.
    fn commit(ts: i64, hash: &str, parents: &str, author: &str, files: &[&str]) -> Vec<u8> {
        let mut v = format!("\n{ts}\x00{hash}\x00{parents}\x00{author}\n").into_bytes();
        for f in files {
            v.extend_from_slice(f.as_bytes());
            v.push(0);
        }
        v
    }

    /// A merge commit without a diff: trailing NUL on the header, no file
    /// list line at all.
    fn bare_merge(ts: i64, hash: &str, parents: &str, author: &str) -> Vec<u8> {
        format!("\n{ts}\x00{hash}\x00{parents}\x00{author}\x00").into_bytes()
    }

    fn targets(files: &[&str]) -> (HashSet<String>, FileDates) {
        let pending = files.iter().map(|f| f.to_string()).collect();
        let dates = files.iter().map(|f| (f.to_string(), None)).collect();
        (pending, dates)
    }

    fn dir() -> &'static Path {
        Path::new("/repo/docs")
    }

    #[test]
    fn dates_a_single_file() {
        let stream = commit(1700000100, "aaa", "bbb", "Ana", &["index.md"]);
        let (mut pending, mut dates) = targets(&["index.md"]);
        let out = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut MustNotProbe,
        )
        .unwrap();
        assert_eq!(out, ParseOutcome::Complete);
        assert!(pending.is_empty());
        assert_eq!(
            dates["index.md"],
            Some(FileDate {
                timestamp: 1700000100,
                too_shallow: false,
                author: "Ana".into(),
            })
        );
    }

    #[test]
    fn newest_commit_wins_per_file() {
        let mut stream = commit(300, "aaa", "p", "Ana", &["a.md"]);
        stream.extend(commit(200, "bbb", "q", "Ben", &["a.md", "b.md"]));
        let (mut pending, mut dates) = targets(&["a.md", "b.md"]);
        let out = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut MustNotProbe,
        )
        .unwrap();
        assert_eq!(out, ParseOutcome::Complete);
        assert_eq!(dates["a.md"].as_ref().unwrap().timestamp, 300);
        assert_eq!(dates["a.md"].as_ref().unwrap().author, "Ana");
        assert_eq!(dates["b.md"].as_ref().unwrap().timestamp, 200);
    }

    #[test]
    fn stops_reading_once_done() {
        let mut stream = commit(300, "aaa", "p", "Ana", &["a.md"]);
        stream.extend_from_slice(b"\ncomplete garbage that is not a header");
        let (mut pending, mut dates) = targets(&["a.md"]);
        let out = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut MustNotProbe,
        )
        .unwrap();
        assert_eq!(out, ParseOutcome::Complete);
        assert_eq!(dates["a.md"].as_ref().unwrap().timestamp, 300);
    }

    #[test]
    fn merge_header_is_reread_as_lookahead() {
        let mut stream = bare_merge(400, "mmm", "p1 p2", "Mae");
        stream.extend(commit(300, "ccc", "p", "Ana", &["doc.rst"]));
        let (mut pending, mut dates) = targets(&["doc.rst"]);
        let out = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut MustNotProbe,
        )
        .unwrap();
        assert_eq!(out, ParseOutcome::Complete);
        let date = dates["doc.rst"].as_ref().unwrap();
        assert_eq!(date.timestamp, 300);
        assert_eq!(date.author, "Ana");
    }

    #[test]
    fn lone_nul_file_list_is_an_empty_commit() {
        let mut stream = b"\n400\x00eee\x00p\x00Eve\n\x00".to_vec();
        stream.extend(commit(300, "fff", "q", "Ana", &["a.md"]));
        let (mut pending, mut dates) = targets(&["a.md"]);
        let out = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut MustNotProbe,
        )
        .unwrap();
        assert_eq!(out, ParseOutcome::Complete);
        assert_eq!(dates["a.md"].as_ref().unwrap().author, "Ana");
    }

    #[test]
    fn excluded_commits_keep_stream_in_sync() {
        let mut stream = commit(400, "skipme", "p", "Eve", &["a.md"]);
        stream.extend(commit(300, "keep", "q", "Ana", &["a.md"]));
        let exclude: HashSet<String> = ["skipme".to_string()].into_iter().collect();
        let (mut pending, mut dates) = targets(&["a.md"]);
        let out = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &exclude,
            &mut MustNotProbe,
        )
        .unwrap();
        assert_eq!(out, ParseOutcome::Complete);
        let date = dates["a.md"].as_ref().unwrap();
        assert_eq!(date.timestamp, 300);
        assert_eq!(date.author, "Ana");
    }

    #[test]
    fn excluded_root_commit_never_probes_shallowness() {
        let mut stream = commit(400, "root", "", "Eve", &["a.md"]);
        stream.extend(commit(300, "kid", "root", "Ana", &["a.md"]));
        let exclude: HashSet<String> = ["root".to_string()].into_iter().collect();
        let (mut pending, mut dates) = targets(&["a.md"]);
        let out = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &exclude,
            &mut MustNotProbe,
        )
        .unwrap();
        assert_eq!(out, ParseOutcome::Complete);
        assert_eq!(dates["a.md"].as_ref().unwrap().timestamp, 300);
    }

    #[test]
    fn shallow_probe_runs_once_and_taints_root_dates() {
        let mut stream = commit(400, "r1", "", "Ana", &["a.md"]);
        stream.extend(commit(300, "r2", "", "Ben", &["b.md"]));
        let (mut pending, mut dates) = targets(&["a.md", "b.md"]);
        let mut probe = Canned {
            value: true,
            calls: 0,
        };
        let out = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut probe,
        )
        .unwrap();
        assert_eq!(out, ParseOutcome::Complete);
        assert_eq!(probe.calls, 1);
        assert!(dates["a.md"].as_ref().unwrap().too_shallow);
        assert!(dates["b.md"].as_ref().unwrap().too_shallow);
    }

    #[test]
    fn deep_clone_root_commit_is_not_tainted() {
        let stream = commit(400, "root", "", "Ana", &["a.md"]);
        let (mut pending, mut dates) = targets(&["a.md"]);
        let mut probe = Canned {
            value: false,
            calls: 0,
        };
        parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut probe,
        )
        .unwrap();
        assert_eq!(probe.calls, 1);
        assert!(!dates["a.md"].as_ref().unwrap().too_shallow);
    }

    #[test]
    fn running_out_of_history_is_fatal_without_exclusions() {
        let stream = b"\n".to_vec();
        let (mut pending, mut dates) = targets(&["b.md", "a.md"]);
        let err = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut MustNotProbe,
        )
        .unwrap_err();
        match err {
            GitError::UnhandledFiles { files, .. } => {
                assert_eq!(files, vec!["a.md".to_string(), "b.md".to_string()]);
            }
            other => panic!("expected UnhandledFiles, got {other:?}"),
        }
    }

    #[test]
    fn running_out_of_history_is_tolerated_with_exclusions() {
        let stream = commit(400, "skipme", "p", "Eve", &["a.md"]);
        let exclude: HashSet<String> = ["skipme".to_string()].into_iter().collect();
        let (mut pending, mut dates) = targets(&["a.md"]);
        let out = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &exclude,
            &mut MustNotProbe,
        )
        .unwrap();
        assert_eq!(out, ParseOutcome::Exhausted);
        assert_eq!(dates["a.md"], None);
    }

    #[test]
    fn rejects_malformed_headers() {
        let stream = b"\nnot a header at all\n".to_vec();
        let (mut pending, mut dates) = targets(&["a.md"]);
        let err = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut MustNotProbe,
        )
        .unwrap_err();
        assert!(matches!(err, GitError::StreamFormat { .. }));
    }

    #[test]
    fn rejects_unparsable_timestamps() {
        let stream = commit(0, "h", "p", "Ana", &["a.md"])
            .iter()
            .map(|&b| if b == b'0' { b'x' } else { b })
            .collect::<Vec<u8>>();
        let (mut pending, mut dates) = targets(&["a.md"]);
        let err = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut MustNotProbe,
        )
        .unwrap_err();
        assert!(matches!(err, GitError::StreamFormat { .. }));
    }

    #[test]
    fn rejects_nonblank_first_line() {
        let stream = b"oops\n".to_vec();
        let (mut pending, mut dates) = targets(&["a.md"]);
        let err = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut MustNotProbe,
        )
        .unwrap_err();
        assert!(matches!(err, GitError::StreamFormat { .. }));
    }

    #[test]
    fn ignores_files_nobody_asked_about() {
        let stream = commit(300, "aaa", "p", "Ana", &["other.md", "a.md"]);
        let (mut pending, mut dates) = targets(&["a.md"]);
        let out = parse_log(
            stream.as_slice(),
            dir(),
            &mut pending,
            &mut dates,
            &HashSet::new(),
            &mut MustNotProbe,
        )
        .unwrap();
        assert_eq!(out, ParseOutcome::Complete);
        assert!(!dates.contains_key("other.md"));
        assert_eq!(dates["a.md"].as_ref().unwrap().timestamp, 300);
    }
}
