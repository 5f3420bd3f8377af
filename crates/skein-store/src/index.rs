//! Storage ports used by the thread engine, and their SQLite adapter.
//!
//! The engine only ever talks to `dyn ThreadIndex`, so tests and embedders
//! can substitute their own storage.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use skein_shared::types::{BlockId, PeerId, ThreadId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Block, BlockQuery, Notification, Thread, ThreadPeer};

/// Thread models and their HEAD pointer.
pub trait ThreadStore: Send + Sync {
    fn add_thread(&self, thread: &Thread) -> Result<()>;

    fn get_thread(&self, id: &ThreadId) -> Result<Option<Thread>>;

    fn list_threads(&self) -> Result<Vec<Thread>>;

    fn delete_thread(&self, id: &ThreadId) -> Result<bool>;

    /// Current HEAD; [`StoreError::NotFound`] if the thread is unknown.
    fn head(&self, id: &ThreadId) -> Result<String>;

    fn update_head(&self, id: &ThreadId, head: &str) -> Result<()>;
}

/// Index of applied blocks.
pub trait BlockStore: Send + Sync {
    /// Atomic insert-if-absent. Returns `true` only for the call that inserted.
    fn add_block(&self, block: &Block) -> Result<bool>;

    fn get_block(&self, id: &BlockId) -> Result<Option<Block>>;

    fn list_blocks(&self, query: &BlockQuery) -> Result<Vec<Block>>;

    fn count_blocks(&self, thread_id: &ThreadId) -> Result<u64>;

    fn blocks_by_data_id(&self, data_id: &str) -> Result<Vec<Block>>;

    fn delete_blocks_by_thread(&self, thread_id: &ThreadId) -> Result<usize>;
}

/// Known thread members.
pub trait ThreadPeerStore: Send + Sync {
    /// Insert-if-absent. Returns `true` only for the call that inserted.
    fn add_peer(&self, peer: &ThreadPeer) -> Result<bool>;

    fn list_peers(&self, thread_id: &ThreadId) -> Result<Vec<ThreadPeer>>;

    fn set_peer_welcomed(&self, id: &PeerId, thread_id: &ThreadId) -> Result<()>;

    fn delete_peer(&self, id: &PeerId, thread_id: &ThreadId) -> Result<bool>;

    fn delete_peers_by_thread(&self, thread_id: &ThreadId) -> Result<usize>;
}

/// UI notifications derived from blocks.
pub trait NotificationStore: Send + Sync {
    fn add_notification(&self, notification: &Notification) -> Result<()>;

    fn list_notifications(&self, limit: usize) -> Result<Vec<Notification>>;

    fn delete_notifications_by_block(&self, block_id: &BlockId) -> Result<usize>;

    fn delete_notifications_by_actor(&self, actor_id: &PeerId) -> Result<usize>;

    fn delete_notifications_by_subject(&self, subject_id: &str) -> Result<usize>;
}

/// Everything the thread engine persists besides content.
pub trait ThreadIndex: ThreadStore + BlockStore + ThreadPeerStore + NotificationStore {}

impl<T> ThreadIndex for T where T: ThreadStore + BlockStore + ThreadPeerStore + NotificationStore {}

// ---------------------------------------------------------------------------
// SQLite adapter
// ---------------------------------------------------------------------------

/// A [`Database`] behind a mutex, shareable across tasks.
pub struct SharedDatabase {
    db: Mutex<Database>,
}

impl SharedDatabase {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open (or create) the index inside `data_dir`.
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        Database::open_in(data_dir).map(Self::new)
    }

    pub fn open_in_memory() -> Result<Self> {
        Database::open_in_memory().map(Self::new)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl ThreadStore for SharedDatabase {
    fn add_thread(&self, thread: &Thread) -> Result<()> {
        self.lock()?.add_thread(thread)
    }

    fn get_thread(&self, id: &ThreadId) -> Result<Option<Thread>> {
        self.lock()?.get_thread(id)
    }

    fn list_threads(&self) -> Result<Vec<Thread>> {
        self.lock()?.list_threads()
    }

    fn delete_thread(&self, id: &ThreadId) -> Result<bool> {
        self.lock()?.delete_thread(id)
    }

    fn head(&self, id: &ThreadId) -> Result<String> {
        self.lock()?.thread_head(id)
    }

    fn update_head(&self, id: &ThreadId, head: &str) -> Result<()> {
        self.lock()?.update_thread_head(id, head)
    }
}

impl BlockStore for SharedDatabase {
    fn add_block(&self, block: &Block) -> Result<bool> {
        self.lock()?.add_block(block)
    }

    fn get_block(&self, id: &BlockId) -> Result<Option<Block>> {
        self.lock()?.get_block(id)
    }

    fn list_blocks(&self, query: &BlockQuery) -> Result<Vec<Block>> {
        self.lock()?.list_blocks(query)
    }

    fn count_blocks(&self, thread_id: &ThreadId) -> Result<u64> {
        self.lock()?.count_blocks(thread_id)
    }

    fn blocks_by_data_id(&self, data_id: &str) -> Result<Vec<Block>> {
        self.lock()?.blocks_by_data_id(data_id)
    }

    fn delete_blocks_by_thread(&self, thread_id: &ThreadId) -> Result<usize> {
        self.lock()?.delete_blocks_by_thread(thread_id)
    }
}

impl ThreadPeerStore for SharedDatabase {
    fn add_peer(&self, peer: &ThreadPeer) -> Result<bool> {
        self.lock()?.add_thread_peer(peer)
    }

    fn list_peers(&self, thread_id: &ThreadId) -> Result<Vec<ThreadPeer>> {
        self.lock()?.list_thread_peers(thread_id)
    }

    fn set_peer_welcomed(&self, id: &PeerId, thread_id: &ThreadId) -> Result<()> {
        self.lock()?.set_thread_peer_welcomed(id, thread_id)
    }

    fn delete_peer(&self, id: &PeerId, thread_id: &ThreadId) -> Result<bool> {
        self.lock()?.delete_thread_peer(id, thread_id)
    }

    fn delete_peers_by_thread(&self, thread_id: &ThreadId) -> Result<usize> {
        self.lock()?.delete_thread_peers_by_thread(thread_id)
    }
}

impl NotificationStore for SharedDatabase {
    fn add_notification(&self, notification: &Notification) -> Result<()> {
        self.lock()?.add_notification(notification)
    }

    fn list_notifications(&self, limit: usize) -> Result<Vec<Notification>> {
        self.lock()?.list_notifications(limit)
    }

    fn delete_notifications_by_block(&self, block_id: &BlockId) -> Result<usize> {
        self.lock()?.delete_notifications_by_block(block_id)
    }

    fn delete_notifications_by_actor(&self, actor_id: &PeerId) -> Result<usize> {
        self.lock()?.delete_notifications_by_actor(actor_id)
    }

    fn delete_notifications_by_subject(&self, subject_id: &str) -> Result<usize> {
        self.lock()?.delete_notifications_by_subject(subject_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn usable_as_trait_object() {
        let dir = tempfile::tempdir().unwrap();
        let index: Arc<dyn ThreadIndex> = Arc::new(SharedDatabase::open_in(dir.path()).unwrap());

        let thread = Thread {
            id: ThreadId([5; 32]),
            name: "t".into(),
            secret_key: [6; 32],
            head: String::new(),
            created_at: chrono::Utc::now(),
        };
        index.add_thread(&thread).unwrap();
        index.update_head(&thread.id, "h1").unwrap();
        assert_eq!(index.head(&thread.id).unwrap(), "h1");

        let peer = ThreadPeer {
            id: PeerId([1; 32]),
            thread_id: thread.id,
            welcomed: false,
        };
        assert!(index.add_peer(&peer).unwrap());
        assert!(!index.add_peer(&peer).unwrap());
    }

    #[test]
    fn concurrent_duplicate_insert_has_one_winner() {
        let index = Arc::new(SharedDatabase::open_in_memory().unwrap());
        let block = Block {
            id: BlockId::from("dup"),
            thread_id: ThreadId([1; 32]),
            author_id: PeerId([2; 32]),
            block_type: crate::models::BlockType::Join,
            date: chrono::Utc::now(),
            parents: Vec::new(),
            author_username_cipher: None,
            data_id: None,
            data_key_cipher: None,
            data_caption_cipher: None,
        };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let index = index.clone();
                let block = block.clone();
                std::thread::spawn(move || index.add_block(&block).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();
        assert_eq!(winners, 1);
    }
}
