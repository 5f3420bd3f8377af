//! The thread aggregate.
//!
//! A [`Thread`] owns the thread keypair and a lock that serializes every
//! operation touching HEAD, inbound or outbound. The block handlers live in
//! their own modules as further `impl Thread` blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use skein_shared::crypto;
use skein_shared::identity::Identity;
use skein_shared::protocol::SignedThreadBlock;
use skein_shared::types::{parents_from_head, BlockId, PeerId, ThreadId};
use skein_store::{
    Block, BlockQuery, BlockType, StoreError, Thread as ThreadModel, ThreadPeer,
};

use crate::config::EngineConfig;
use crate::error::{Result, ThreadError};
use crate::host::{ThreadHost, Update};

/// Summary of a thread for display.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
    pub head: Option<Block>,
    pub block_count: u64,
}

pub struct Thread {
    pub(crate) id: ThreadId,
    pub(crate) name: String,
    pub(crate) key: Identity,
    pub(crate) host: Arc<dyn ThreadHost>,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) lock: Mutex<()>,
    left: AtomicBool,
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Thread {
    /// Bind a stored thread model to its host.
    pub fn new(
        model: &ThreadModel,
        host: Arc<dyn ThreadHost>,
        config: Arc<EngineConfig>,
    ) -> Result<Self> {
        let key = Identity::from_secret_bytes(&model.secret_key);
        if key.thread_id() != model.id {
            return Err(ThreadError::KeyMismatch(model.id));
        }
        Ok(Self {
            id: model.id,
            name: model.name.clone(),
            key,
            host,
            config,
            lock: Mutex::new(()),
            left: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set once the local peer has left; the thread then refuses new blocks.
    pub fn has_left(&self) -> bool {
        self.left.load(Ordering::Acquire)
    }

    pub(crate) fn mark_left(&self) {
        self.left.store(true, Ordering::Release);
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.has_left() {
            return Err(ThreadError::ThreadLeft(self.id));
        }
        Ok(())
    }

    /// Current HEAD, `None` before genesis.
    pub fn head(&self) -> Result<Option<BlockId>> {
        let head = self.host.index().head(&self.id).map_err(|e| match e {
            StoreError::NotFound => ThreadError::ThreadNotFound(self.id),
            other => other.into(),
        })?;
        Ok(parents_from_head(&head).into_iter().next())
    }

    pub(crate) fn update_head(&self, head: &BlockId) -> Result<()> {
        self.host
            .index()
            .update_head(&self.id, head.as_str())
            .map_err(|e| match e {
                StoreError::NotFound => ThreadError::ThreadNotFound(self.id),
                other => other.into(),
            })?;
        debug!(thread = %self.id, head = %head, "Updated HEAD");
        Ok(())
    }

    pub fn info(&self) -> Result<ThreadInfo> {
        let index = self.host.index();
        let head = match self.head()? {
            Some(id) => index.get_block(&id)?,
            None => None,
        };
        Ok(ThreadInfo {
            id: self.id,
            name: self.name.clone(),
            head,
            block_count: index.count_blocks(&self.id)?,
        })
    }

    /// Indexed blocks, newest first. Filtering by type hides ignored blocks.
    pub fn blocks(
        &self,
        offset: usize,
        limit: usize,
        block_type: Option<BlockType>,
    ) -> Result<Vec<Block>> {
        let query = BlockQuery {
            offset,
            block_type,
            ..BlockQuery::new(self.id, limit)
        };
        Ok(self.host.index().list_blocks(&query)?)
    }

    pub fn peers(&self) -> Result<Vec<ThreadPeer>> {
        Ok(self.host.index().list_peers(&self.id)?)
    }

    /// Encrypt to the thread key; any member can decrypt.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(crypto::seal(&self.key.public_key_bytes(), data)?)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(crypto::open(&self.key, data)?)
    }

    /// Check a block's thread signature.
    pub fn verify(&self, signed: &SignedThreadBlock) -> Result<()> {
        signed
            .verify(&self.key.public_key_bytes())
            .map_err(|_| ThreadError::ThreadSignature)
    }

    /// Members to post to. Never includes the local peer.
    pub(crate) fn peer_ids(&self) -> Result<Vec<PeerId>> {
        let local = self.host.peer_id();
        Ok(self
            .peers()?
            .into_iter()
            .map(|peer| peer.id)
            .filter(|id| *id != local)
            .collect())
    }

    pub(crate) fn push_update(&self, block: &Block) {
        self.host.send_update(Update {
            block: block.clone(),
            thread_id: self.id,
            thread_name: self.name.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestNet;

    #[tokio::test]
    async fn test_key_must_match_thread_id() {
        let net = TestNet::new();
        let peer = net.peer().await;
        let model = ThreadModel {
            id: ThreadId([9; 32]),
            name: "wrong".into(),
            secret_key: *Identity::generate().secret_bytes(),
            head: String::new(),
            created_at: chrono::Utc::now(),
        };
        assert!(matches!(
            Thread::new(&model, peer.host(), net.config.clone()),
            Err(ThreadError::KeyMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_and_queries() {
        let net = TestNet::new();
        let peer = net.peer().await;
        let thread = peer.service.create_thread("notes").await.unwrap();

        let sealed = thread.encrypt(b"caption").unwrap();
        assert_eq!(thread.decrypt(&sealed).unwrap(), b"caption");

        let info = thread.info().unwrap();
        assert_eq!(info.name, "notes");
        assert_eq!(info.block_count, 1);
        assert_eq!(info.head.map(|b| b.id), thread.head().unwrap());
        assert_eq!(thread.blocks(0, 10, Some(BlockType::Join)).unwrap().len(), 1);
        assert!(thread.blocks(1, 10, None).unwrap().is_empty());
        assert!(thread.peers().unwrap().is_empty());
    }
}
