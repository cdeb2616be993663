//! Human-readable attribution: alias mapping, name joining, and the
//! "date, edited by ..." line shown next to each page.

use std::collections::BTreeSet;
use std::collections::HashMap;

use crate::config::AuthorsConfig;
use crate::models::{AuthorInfo, PageRecord};

/// Maps a raw git name through the alias table, first verbatim, then
/// lowercased. Unknown names pass through trimmed.
pub fn display_name(aliases: &HashMap<String, String>, name: &str) -> String {
    let name = name.trim();
    aliases
        .get(name)
        .or_else(|| aliases.get(&name.to_lowercase()))
        .cloned()
        .unwrap_or_else(|| name.to_string())
}

/// English list joining: "A", "A and B", "A, B, and C".
pub fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} and {second}"),
        [head @ .., last] => format!("{}, and {}", head.join(", "), last),
    }
}

/// Builds the attribution line for a page, or `None` when the page has no
/// timestamp (untracked, excluded, or shallow history).
///
/// `date` arrives preformatted; this layer only decides who appears next
/// to it. Manual authors get an `Author:` line of their own with the git
/// authors demoted to editors.
pub fn attribution_line(record: &PageRecord, date: &str, config: &AuthorsConfig) -> Option<String> {
    record.timestamp?;

    // (joined names, whether they render as editors rather than "by X")
    let git_authors: Option<(String, bool)> = if config.show || config.show_all {
        match &record.author {
            AuthorInfo::None => None,
            AuthorInfo::Single(name) => Some((display_name(&config.aliases, name), false)),
            AuthorInfo::Multiple(set) => {
                let mapped: BTreeSet<String> = set
                    .iter()
                    .map(|name| display_name(&config.aliases, name))
                    .collect();
                if mapped.is_empty() {
                    None
                } else {
                    let names: Vec<String> = mapped.into_iter().collect();
                    Some((join_names(&names), true))
                }
            }
        }
    } else {
        None
    };

    let manual = record
        .manual_authors
        .as_deref()
        .filter(|_| config.show_manual)
        .filter(|authors| !authors.is_empty());

    let line = match (manual, git_authors) {
        (Some(manual), Some((git, _))) => {
            format!("Author: {}\n{date}, edited by {git}", join_names(manual))
        }
        (Some(manual), None) => format!("Author: {}\n{date}", join_names(manual)),
        (None, Some((git, true))) => format!("{date}, edited by {git}"),
        (None, Some((git, false))) => format!("{date} by {git}"),
        (None, None) => date.to_string(),
    };
    Some(line)
}
