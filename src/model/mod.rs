//! Data models for bugbridge.
//!
//! This module contains the local domain models:
//! - Bug (operation log + snapshot)
//! - Identity
//! - content hashing for operation ids

pub mod bug;
pub mod hash;
pub mod identity;

pub use bug::{Bug, Comment, Metadata, Operation, OperationKind, Snapshot, Status, metadata};
pub use identity::Identity;
