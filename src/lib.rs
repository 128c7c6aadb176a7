//! bugbridge - bidirectional sync between a local bug store and Gitea
//!
//! This crate provides the core functionality for the `bugbridge` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Operation-log bugs, snapshots, identities
//! - [`storage`] - Bug store trait with SQLite and in-memory backends
//! - [`remote`] - Remote tracker trait and the Gitea REST client
//! - [`bridge`] - Import and export drivers
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod storage;
pub mod text;

pub use error::{Error, Result};
