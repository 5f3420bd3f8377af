//! The collaborators a thread needs from the node that hosts it.
//!
//! Threads never reach for globals: storage, transport, the local identity
//! and the UI/relay sinks all come through one [`ThreadHost`].

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use skein_net::{MessageSender, NetError};
use skein_shared::identity::Identity;
use skein_shared::protocol::Envelope;
use skein_shared::types::{BlockId, PeerId, ThreadId};
use skein_store::{Block, ContentStore, FsContentStore, SharedDatabase, ThreadIndex};

use crate::config::EngineConfig;
use crate::error::{Result, ThreadError};

const UPDATE_CAPACITY: usize = 256;

/// A newly indexed block, pushed to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct Update {
    pub block: Block,
    pub thread_id: ThreadId,
    pub thread_name: String,
}

/// Asks the relay to keep a copy of a stored object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreRequest {
    pub id: BlockId,
    pub requested_at: DateTime<Utc>,
}

impl StoreRequest {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            requested_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ThreadHost: Send + Sync {
    /// The local node's identity.
    fn identity(&self) -> &Identity;

    fn peer_id(&self) -> PeerId {
        self.identity().peer_id()
    }

    fn index(&self) -> &dyn ThreadIndex;

    fn content(&self) -> &dyn ContentStore;

    async fn send_message(&self, peer: &PeerId, envelope: &Envelope) -> std::result::Result<(), NetError>;

    /// Display name embedded (encrypted) in authored headers.
    fn username(&self) -> Result<Option<String>>;

    /// Fire-and-forget; retries belong to the relay.
    fn enqueue_store_request(&self, request: StoreRequest);

    fn send_update(&self, update: Update);
}

// ---------------------------------------------------------------------------
// Default host
// ---------------------------------------------------------------------------

/// Standard host: pluggable stores and transport, a broadcast channel for UI
/// updates and an unbounded queue of relay store requests.
pub struct Node {
    identity: Identity,
    index: Arc<dyn ThreadIndex>,
    content: Arc<dyn ContentStore>,
    sender: Arc<dyn MessageSender>,
    username: RwLock<Option<String>>,
    updates: broadcast::Sender<Update>,
    store_requests: mpsc::UnboundedSender<StoreRequest>,
}

impl Node {
    /// Returns the node and the receiving end of its store-request queue.
    pub fn new(
        identity: Identity,
        index: Arc<dyn ThreadIndex>,
        content: Arc<dyn ContentStore>,
        sender: Arc<dyn MessageSender>,
    ) -> (Self, mpsc::UnboundedReceiver<StoreRequest>) {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let (store_requests, store_rx) = mpsc::unbounded_channel();
        let node = Self {
            identity,
            index,
            content,
            sender,
            username: RwLock::new(None),
            updates,
            store_requests,
        };
        (node, store_rx)
    }

    /// Open the on-disk index and block store under `config.data_dir`.
    pub async fn open(
        config: &EngineConfig,
        identity: Identity,
        sender: Arc<dyn MessageSender>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<StoreRequest>)> {
        std::fs::create_dir_all(&config.data_dir).map_err(skein_store::StoreError::from)?;
        let index = SharedDatabase::open_in(&config.data_dir)?;
        let content =
            FsContentStore::new(config.data_dir.join("blocks"), config.max_block_size).await?;

        info!(
            peer = %identity.peer_id().short(),
            path = %config.data_dir.display(),
            "Node opened"
        );

        Ok(Self::new(
            identity,
            Arc::new(index),
            Arc::new(content),
            sender,
        ))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Update> {
        self.updates.subscribe()
    }

    pub fn set_username(&self, username: Option<String>) -> Result<()> {
        let mut guard = self
            .username
            .write()
            .map_err(|_| ThreadError::Host("username lock poisoned".into()))?;
        *guard = username;
        Ok(())
    }
}

#[async_trait]
impl ThreadHost for Node {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn index(&self) -> &dyn ThreadIndex {
        self.index.as_ref()
    }

    fn content(&self) -> &dyn ContentStore {
        self.content.as_ref()
    }

    async fn send_message(&self, peer: &PeerId, envelope: &Envelope) -> std::result::Result<(), NetError> {
        self.sender.send_message(peer, envelope).await
    }

    fn username(&self) -> Result<Option<String>> {
        self.username
            .read()
            .map(|name| name.clone())
            .map_err(|_| ThreadError::Host("username lock poisoned".into()))
    }

    fn enqueue_store_request(&self, request: StoreRequest) {
        if self.store_requests.send(request).is_err() {
            debug!("Store request queue closed, dropping request");
        }
    }

    fn send_update(&self, update: Update) {
        // No subscribers is not an error.
        let _ = self.updates.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ThreadsService;
    use skein_net::Switchboard;

    #[tokio::test]
    async fn test_open_persists_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(EngineConfig {
            data_dir: dir.path().join("node"),
            ..EngineConfig::default()
        });
        let identity = Identity::generate();
        let sender = Arc::new(Switchboard::spawn().link(identity.peer_id()));

        let (node, mut store_requests) = Node::open(&config, identity.clone(), sender).await.unwrap();
        let node = Arc::new(node);
        let service = ThreadsService::new(node.clone(), config.clone());
        let thread = service.create_thread("disk").await.unwrap();
        let head = thread.head().unwrap().unwrap();

        assert_eq!(store_requests.try_recv().unwrap().id, head);
        assert!(node.content().get(&head).await.is_ok());
        assert!(config.data_dir.join("blocks").is_dir());

        // A second node over the same directory sees the thread.
        drop(service);
        drop(thread);
        drop(node);
        let sender = Arc::new(Switchboard::spawn().link(identity.peer_id()));
        let (reopened, _) = Node::open(&config, identity, sender).await.unwrap();
        let service = ThreadsService::new(Arc::new(reopened), config);
        assert_eq!(service.load_threads().unwrap(), 1);
    }
}
