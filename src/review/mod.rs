//! Checkpoint and review comment access.
//!
//! - [`checkpoint`] - resolve a checkpoint by path, commit or id, with its
//!   unresolved comments and content
//! - [`comments`] - change-level review comments: query and resolve
//! - [`content`] - raw content fetching

pub mod checkpoint;
pub mod comments;
pub mod content;

pub use checkpoint::{
    CheckpointBundle, CheckpointQuery, QueryOptions, Resolution, query, resolve,
};
pub use comments::ResolveReport;
pub use content::{ContentFetcher, HttpContentFetcher, StaticContent};
