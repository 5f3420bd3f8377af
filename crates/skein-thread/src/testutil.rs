//! In-process fixtures: a switchboard network with a shared content store and
//! peers that each have their own index, host and threads service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use skein_net::{Delivery, Switchboard};
use skein_shared::identity::Identity;
use skein_shared::protocol::{Envelope, StoredBlock};
use skein_shared::types::{BlockId, PeerId};
use skein_store::{Block, ContentError, ContentStore, MemoryContentStore, SharedDatabase};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::host::{Node, StoreRequest, ThreadHost};
use crate::service::ThreadsService;
use crate::thread::Thread;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Per-peer view of the shared store that records unpins and can serve
/// tampered bytes.
pub struct CountingContent {
    inner: Arc<MemoryContentStore>,
    unpins: StdMutex<Vec<String>>,
    forged: StdMutex<HashMap<BlockId, Vec<u8>>>,
}

impl CountingContent {
    fn new(inner: Arc<MemoryContentStore>) -> Self {
        Self {
            inner,
            unpins: StdMutex::new(Vec::new()),
            forged: StdMutex::new(HashMap::new()),
        }
    }

    pub fn unpinned(&self) -> Vec<String> {
        self.unpins.lock().unwrap().clone()
    }

    /// Serve `bytes` for `id` regardless of their real address.
    pub fn forge(&self, id: &BlockId, bytes: Vec<u8>) {
        self.forged.lock().unwrap().insert(id.clone(), bytes);
    }
}

#[async_trait]
impl ContentStore for CountingContent {
    async fn put(&self, data: &[u8]) -> std::result::Result<BlockId, ContentError> {
        self.inner.put(data).await
    }

    async fn get(&self, id: &BlockId) -> std::result::Result<Vec<u8>, ContentError> {
        let forged = self.forged.lock().unwrap().get(id).cloned();
        match forged {
            Some(bytes) => Ok(bytes),
            None => self.inner.get(id).await,
        }
    }

    async fn pin(&self, path: &str) -> std::result::Result<(), ContentError> {
        self.inner.pin(path).await
    }

    async fn unpin(&self, path: &str) -> std::result::Result<(), ContentError> {
        self.unpins.lock().unwrap().push(path.to_string());
        self.inner.unpin(path).await
    }

    async fn is_pinned(&self, path: &str) -> bool {
        self.inner.is_pinned(path).await
    }
}

pub struct TestNet {
    pub board: Switchboard,
    pub content: Arc<MemoryContentStore>,
    pub config: Arc<EngineConfig>,
}

impl TestNet {
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_max_block_size(max_block_size: usize) -> Self {
        Self::with_config(EngineConfig {
            max_block_size,
            ..EngineConfig::default()
        })
    }

    pub fn with_follow_limit(follow_limit: usize) -> Self {
        Self::with_config(EngineConfig {
            follow_limit,
            ..EngineConfig::default()
        })
    }

    fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        Self {
            board: Switchboard::spawn(),
            content: Arc::new(MemoryContentStore::new()),
            config: Arc::new(EngineConfig {
                fetch_timeout: Duration::from_secs(5),
                ..config
            }),
        }
    }

    pub async fn peer(&self) -> TestPeer {
        self.peer_with(Identity::generate()).await
    }

    /// Same identity on a fresh node with an empty index. Takes over the
    /// original's switchboard registration.
    pub async fn restore(&self, peer: &TestPeer) -> TestPeer {
        self.peer_with(peer.identity.clone()).await
    }

    async fn peer_with(&self, identity: Identity) -> TestPeer {
        let peer_id = identity.peer_id();
        let inbox = self.board.connect(peer_id).await.unwrap();
        let content = Arc::new(CountingContent::new(self.content.clone()));
        let index = Arc::new(SharedDatabase::open_in_memory().unwrap());
        let sender = Arc::new(self.board.link(peer_id));

        let (node, store_requests) = Node::new(identity.clone(), index, content.clone(), sender);
        let node = Arc::new(node);
        let service = Arc::new(ThreadsService::new(node.clone(), self.config.clone()));

        TestPeer {
            identity,
            node,
            service,
            content,
            inbox: Mutex::new(inbox),
            store_requests,
        }
    }

    /// The stored envelope of an authored block.
    pub async fn envelope(&self, id: &BlockId) -> Envelope {
        let bytes = self.content.get(id).await.unwrap();
        match StoredBlock::from_bytes(&bytes).unwrap() {
            StoredBlock::Envelope(envelope) => envelope,
            StoredBlock::Message(_) => panic!("{id} stored without envelope"),
        }
    }

    /// A registered thread with a fresh key and no genesis.
    pub fn standalone_thread(&self, peer: &TestPeer) -> Arc<Thread> {
        peer.service
            .add_thread("standalone", &Identity::generate())
            .unwrap()
    }

    /// `alice` creates a thread, invites `bob`, bob accepts and alice
    /// handles his join. Both end on the same HEAD.
    pub async fn shared_thread(&self, alice: &TestPeer, bob: &TestPeer) -> (Arc<Thread>, Arc<Thread>) {
        let thread = alice.service.create_thread("shared").await.unwrap();
        let invite = thread.add_invite(&bob.peer_id()).await.unwrap();
        for result in bob.deliver_all().await {
            result.unwrap();
        }

        let bob_thread = bob.service.accept_invite(&invite).await.unwrap();
        for result in alice.deliver_all().await {
            result.unwrap();
        }
        (thread, bob_thread)
    }
}

pub struct TestPeer {
    pub identity: Identity,
    pub node: Arc<Node>,
    pub service: Arc<ThreadsService>,
    pub content: Arc<CountingContent>,
    pub inbox: Mutex<mpsc::Receiver<Delivery>>,
    pub store_requests: mpsc::UnboundedReceiver<StoreRequest>,
}

impl TestPeer {
    pub fn peer_id(&self) -> PeerId {
        self.identity.peer_id()
    }

    pub fn host(&self) -> Arc<dyn ThreadHost> {
        self.node.clone()
    }

    /// Indexed row for `id`; panics if missing.
    pub fn block(&self, id: &BlockId) -> Block {
        self.node.index().get_block(id).unwrap().unwrap()
    }

    /// Handle every pending delivery in arrival order.
    pub async fn deliver_all(&self) -> Vec<Result<Option<BlockId>>> {
        let mut results = Vec::new();
        loop {
            let delivery = match self.inbox.lock().await.try_recv() {
                Ok(delivery) => delivery,
                Err(_) => break,
            };
            let envelope = delivery.envelope().unwrap();
            results.push(self.service.handle(delivery.from, &envelope).await);
        }
        results
    }

    /// Pop the next pending delivery without handling it.
    pub async fn next_envelope(&self) -> Envelope {
        let delivery = self.inbox.lock().await.try_recv().unwrap();
        delivery.envelope().unwrap()
    }

    /// Register `thread` on this peer with the same key and an empty HEAD.
    pub fn adopt_thread(&self, thread: &Thread) -> Arc<Thread> {
        self.service.add_thread(thread.name(), &thread.key).unwrap()
    }
}
