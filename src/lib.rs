//! Gitstamp - last-updated metadata for documentation trees
//!
//! Walks a documentation tree, asks git when each page (or anything the
//! page includes) last changed and who changed it, and keeps the answers
//! in a small per-tree page store that later runs reuse.

pub mod attribution;
pub mod cli;
pub mod config;
pub mod docs;
pub mod git;
pub mod models;
pub mod pipeline;
pub mod store;
