//! Candidate selection and final record assembly for one page.

use std::collections::BTreeSet;

use crate::models::{AuthorInfo, FileDate, PageRecord};

/// Picks the winning date among a page's candidates (its own source file
/// first, dependencies after, in reference order).
///
/// Largest timestamp wins. On an exact tie a shallow-tainted candidate
/// beats a clean one so the taint cannot be masked, and otherwise the
/// earlier-appended candidate stands.
pub fn pick_latest(candidates: &[FileDate]) -> Option<&FileDate> {
    let mut best: Option<&FileDate> = None;
    for candidate in candidates {
        match best {
            None => best = Some(candidate),
            Some(current) => {
                if candidate.timestamp > current.timestamp
                    || (candidate.timestamp == current.timestamp
                        && candidate.too_shallow
                        && !current.too_shallow)
                {
                    best = Some(candidate);
                }
            }
        }
    }
    best
}

/// [`assemble_record`] output plus whether a timestamp was withheld
/// because of shallow history (callers warn on it).
pub struct AssembledPage {
    pub record: PageRecord,
    pub shallow_dropped: bool,
}

/// Builds the final record for a page.
///
/// A shallow-tainted winner surrenders its timestamp, since commits newer
/// than the truncation point may exist; its author still counts. When
/// full-author collection ran, the union wins, with the latest author as
/// a singleton fallback.
pub fn assemble_record(
    candidates: &[FileDate],
    show_sourcelink: bool,
    all_authors: Option<BTreeSet<String>>,
    manual_authors: Option<Vec<String>>,
    mtime_secs: u64,
) -> AssembledPage {
    let mut shallow_dropped = false;
    let (timestamp, latest_author) = match pick_latest(candidates) {
        Some(date) if date.too_shallow => {
            shallow_dropped = true;
            (None, Some(date.author.clone()))
        }
        Some(date) => (Some(date.timestamp), Some(date.author.clone())),
        None => (None, None),
    };

    let author = match all_authors {
        Some(union) if !union.is_empty() => AuthorInfo::Multiple(union),
        Some(_) => match &latest_author {
            Some(name) => AuthorInfo::Multiple(BTreeSet::from([name.clone()])),
            None => AuthorInfo::None,
        },
        None => match latest_author {
            Some(name) => AuthorInfo::Single(name),
            None => AuthorInfo::None,
        },
    };

    AssembledPage {
        record: PageRecord {
            timestamp,
            show_sourcelink,
            author,
            manual_authors,
            mtime_secs,
        },
        shallow_dropped,
    }
}
