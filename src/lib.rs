//! `ledger_sync` - Issue ledger and review checkpoint sync library
//!
//! This crate provides the core functionality for the `ledger-sync` CLI tool:
//! it keeps a JSONL issue ledger consistent with a remote relational store
//! and resolves review checkpoints and their unresolved comments.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Issue, Dependency, Comment, Checkpoint, ReviewComment)
//! - [`storage`] - Remote store traits with REST and in-memory adapters
//! - [`sync`] - Ledger codec, pull and push
//! - [`review`] - Checkpoint resolution and review comment queries
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling
//! - [`logging`] - Tracing subscriber setup
//!
//! Every library operation takes its store explicitly, so the same code runs
//! against [`storage::RestStore`] and [`storage::MemoryStore`].

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod review;
pub mod storage;
pub mod sync;

pub use error::{CheckpointMiss, LedgerError, Result};
