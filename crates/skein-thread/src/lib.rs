//! # skein-thread
//!
//! The thread protocol engine. A thread is a hash-linked DAG of dual-signed
//! blocks (author key + shared thread key). This crate builds and commits
//! blocks, applies inbound ones after back-propagating any missing
//! ancestors, resolves HEAD by fast-forward or merge, and fans blocks out to
//! the other members.
//!
//! Storage and transport are supplied by a [`ThreadHost`]; [`Node`] is the
//! standard one. [`ThreadsService`] is the entry point for a running node.

pub mod config;
pub mod error;
pub mod head;
pub mod host;
pub mod ignores;
pub mod service;
pub mod thread;

mod annotations;
mod data;
mod external_invites;
mod follow;
mod handle;
mod header;
mod invites;
mod joins;
mod leaves;
mod post;

#[cfg(test)]
mod testutil;

pub use config::EngineConfig;
pub use error::{Result, ThreadError};
pub use head::HeadChange;
pub use host::{Node, StoreRequest, ThreadHost, Update};
pub use service::ThreadsService;
pub use thread::{Thread, ThreadInfo};
