//! Integration tests for the gitstamp library
//!
//! Each test builds a real git repository in its own temp directory and
//! runs the full discover/resolve/assemble pipeline against it to verify:
//! - Timestamps and authors come from git history, deterministically
//! - Shallow clones withhold timestamps instead of reporting wrong ones
//! - Excluded commits fall back to earlier history
//! - Dependencies, co-authors, and manual authors flow into records
//! - The page store persists, reuses, and merges cleanly

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use indicatif::MultiProgress;
use tempfile::TempDir;

use gitstamp::attribution::attribution_line;
use gitstamp::config::GitstampConfig;
use gitstamp::docs::discover_documents;
use gitstamp::models::AuthorInfo;
use gitstamp::pipeline::{Pipeline, ScanStats};
use gitstamp::store::PageStore;

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn init_repo(dir: &Path) {
    git(dir, &["init"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "Test"]);
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create parent dirs");
    }
    std::fs::write(path, content).expect("failed to write file");
}

fn commit(dir: &Path, author: &str, date: i64, message: &str) {
    git(dir, &["add", "."]);
    let output = Command::new("git")
        .args(["commit", "-m", message])
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", author)
        .env("GIT_AUTHOR_EMAIL", "dev@example.com")
        .env("GIT_AUTHOR_DATE", format!("{date} +0000"))
        .env("GIT_COMMITTER_NAME", author)
        .env("GIT_COMMITTER_EMAIL", "dev@example.com")
        .env("GIT_COMMITTER_DATE", format!("{date} +0000"))
        .output()
        .expect("failed to run git commit");
    assert!(
        output.status.success(),
        "commit failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn head_hash(dir: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(dir)
        .output()
        .expect("failed to run git rev-parse");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn scan(root: &Path, config: &GitstampConfig, store: &mut PageStore) -> ScanStats {
    let documents = discover_documents(root, config).expect("discovery failed");
    Pipeline::new(root, config)
        .run(&documents, store, &MultiProgress::new())
        .expect("scan failed")
}

#[test]
fn dates_come_from_git_and_rescans_reuse_the_store() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    init_repo(root);
    write(root, "index.md", "# index");
    write(root, "guide/setup.md", "# setup");
    commit(root, "Ana", 1700000000, "first");
    write(root, "guide/setup.md", "# setup, revised");
    commit(root, "Ben", 1700000600, "second");

    let config = GitstampConfig::default();
    let mut store = PageStore::default();

    let first = scan(root, &config, &mut store);
    assert_eq!(first.documents, 2);
    assert_eq!(first.resolved, 2);

    let index = store.get("index.md").unwrap();
    assert_eq!(index.timestamp, Some(1700000000));
    assert_eq!(index.author, AuthorInfo::Single("Ana".into()));
    assert!(index.show_sourcelink);

    let setup = store.get("guide/setup.md").unwrap();
    assert_eq!(setup.timestamp, Some(1700000600));
    assert_eq!(setup.author, AuthorInfo::Single("Ben".into()));

    // Unchanged sources are reused, and the serialized store is stable.
    let state = root.join("state.json");
    store.save(&state).unwrap();
    let first_bytes = std::fs::read(&state).unwrap();

    let second = scan(root, &config, &mut store);
    assert_eq!(second.resolved, 0);
    assert_eq!(second.reused, 2);
    store.save(&state).unwrap();
    assert_eq!(std::fs::read(&state).unwrap(), first_bytes);

    // A full scan redates everything and lands on the same answers.
    let full = Pipeline::new(root, &config)
        .with_full_resolve()
        .run(
            &discover_documents(root, &config).unwrap(),
            &mut store,
            &MultiProgress::new(),
        )
        .unwrap();
    assert_eq!(full.resolved, 2);
    assert_eq!(store.get("index.md").unwrap().timestamp, Some(1700000000));
}

#[test]
fn shallow_clones_withhold_timestamps_but_keep_authors() {
    let tmp = TempDir::new().unwrap();
    let origin = tmp.path().join("origin");
    std::fs::create_dir(&origin).unwrap();
    init_repo(&origin);
    write(&origin, "index.md", "# v1");
    commit(&origin, "Ana", 1700000000, "first");
    write(&origin, "index.md", "# v2");
    commit(&origin, "Ben", 1700000600, "second");

    let clone = tmp.path().join("clone");
    git(
        tmp.path(),
        &[
            "clone",
            "--depth",
            "1",
            &format!("file://{}", origin.display()),
            clone.to_str().unwrap(),
        ],
    );

    let config = GitstampConfig::default();
    let mut store = PageStore::default();
    let stats = scan(&clone, &config, &mut store);

    assert_eq!(stats.shallow, 1);
    let record = store.get("index.md").unwrap();
    // The truncated history bottoms out before the real first commit, so
    // any timestamp would be a guess. The author of the visible tip is
    // still trustworthy.
    assert_eq!(record.timestamp, None);
    assert_eq!(record.author, AuthorInfo::Single("Ben".into()));
}

#[test]
fn excluded_commits_fall_back_to_earlier_history() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    init_repo(root);
    write(root, "index.md", "# v1");
    commit(root, "Ana", 1700000000, "first");
    write(root, "index.md", "# v2");
    commit(root, "Bot", 1700000600, "bulk reformat");

    let mut config = GitstampConfig::default();
    config.git.exclude_commits = vec![head_hash(root)];
    let mut store = PageStore::default();
    scan(root, &config, &mut store);

    let record = store.get("index.md").unwrap();
    assert_eq!(record.timestamp, Some(1700000000));
    assert_eq!(record.author, AuthorInfo::Single("Ana".into()));
}

#[test]
fn coauthor_trailers_join_the_full_author_set() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    init_repo(root);
    write(root, "index.md", "# index");
    commit(
        root,
        "Ana",
        1700000000,
        "pair session\n\nCo-authored-by: Zoe <zoe@example.com>",
    );

    let mut config = GitstampConfig::default();
    config.authors.show_all = true;
    let mut store = PageStore::default();
    scan(root, &config, &mut store);

    let record = store.get("index.md").unwrap();
    let expected: BTreeSet<String> = ["Ana".to_string(), "Zoe".to_string()].into();
    assert_eq!(record.author, AuthorInfo::Multiple(expected));
}

#[test]
fn batch_author_walk_attributes_each_file_separately() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    init_repo(root);
    write(root, "a.md", "# a");
    write(root, "b.md", "# b");
    commit(root, "Ana", 1700000000, "first");
    write(root, "a.md", "# a, revised");
    commit(root, "Ben", 1700000600, "touch up a");

    let mut config = GitstampConfig::default();
    config.authors.show_all = true;
    config.authors.follow_renames = false;
    let mut store = PageStore::default();
    scan(root, &config, &mut store);

    let everyone: BTreeSet<String> = ["Ana".to_string(), "Ben".to_string()].into();
    assert_eq!(
        store.get("a.md").unwrap().author,
        AuthorInfo::Multiple(everyone)
    );
    let only_ana: BTreeSet<String> = ["Ana".to_string()].into();
    assert_eq!(
        store.get("b.md").unwrap().author,
        AuthorInfo::Multiple(only_ana)
    );
}

#[test]
fn includes_date_pages_and_manual_authors_render() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    init_repo(root);
    write(
        root,
        "index.rst",
        ".. author:: Maya\n\nIntro\n\n.. include:: parts/body.txt\n",
    );
    write(root, "parts/body.txt", "body v1");
    commit(root, "Ana", 1700000000, "first");
    write(root, "parts/body.txt", "body v2");
    commit(root, "Ben", 1700000600, "body update");

    let mut config = GitstampConfig::default();
    config.authors.show = true;
    config.authors.show_manual = true;
    let mut store = PageStore::default();
    scan(root, &config, &mut store);

    // The included file changed last, so it dates the page.
    let record = store.get("index.rst").unwrap();
    assert_eq!(record.timestamp, Some(1700000600));
    assert_eq!(record.manual_authors, Some(vec!["Maya".to_string()]));

    let line = attribution_line(record, "2023-11-14 22:23", &config.authors).unwrap();
    assert_eq!(line, "Author: Maya\n2023-11-14 22:23, edited by Ben");
}

#[test]
fn dependencies_outside_any_repository_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("docs");
    std::fs::create_dir(&root).unwrap();
    init_repo(&root);
    write(&root, "page.md", "# page\n\n![logo](../assets/logo.png)\n");
    commit(&root, "Ana", 1700000000, "first");
    write(tmp.path(), "assets/logo.png", "png bytes");

    let config = GitstampConfig::default();
    let mut store = PageStore::default();
    let stats = scan(&root, &config, &mut store);

    // The sibling directory has no history to offer, so the page keeps
    // the date of its own source file.
    assert_eq!(stats.resolved, 1);
    let record = store.get("page.md").unwrap();
    assert_eq!(record.timestamp, Some(1700000000));
    assert_eq!(record.author, AuthorInfo::Single("Ana".into()));
}

#[test]
fn stores_merge_shards_and_survive_reload() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("docs");
    std::fs::create_dir(&root).unwrap();
    init_repo(&root);
    write(&root, "a.md", "# a");
    write(&root, "b.md", "# b");
    commit(&root, "Ana", 1700000000, "first");

    let config = GitstampConfig::default();
    let mut store = PageStore::default();
    scan(&root, &config, &mut store);

    let shard_path = tmp.path().join("shard.json");
    store.save(&shard_path).unwrap();

    let mut merged = PageStore::default();
    merged.merge(PageStore::load(&shard_path));
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.get("a.md"), store.get("a.md"));

    // Merging the same shard again changes nothing.
    merged.merge(PageStore::load(&shard_path));
    assert_eq!(merged.len(), 2);
    assert_eq!(
        merged.get("b.md").unwrap().timestamp,
        Some(1700000000)
    );
}
