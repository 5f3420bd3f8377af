//! # skein-store
//!
//! Local persistence for the thread engine: a SQLite metadata index (threads
//! and their HEAD, blocks, thread peers, notifications) exposed through the
//! [`ThreadIndex`] ports, and content-addressed object storage behind
//! [`ContentStore`].

pub mod blocks;
pub mod content;
pub mod database;
pub mod index;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod peers;
pub mod threads;

mod error;

pub use content::{ContentStore, FsContentStore, MemoryContentStore};
pub use database::Database;
pub use error::{ContentError, StoreError};
pub use index::{
    BlockStore, NotificationStore, SharedDatabase, ThreadIndex, ThreadPeerStore, ThreadStore,
};
pub use models::*;
