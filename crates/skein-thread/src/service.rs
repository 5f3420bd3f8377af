//! Node-level registry of threads.
//!
//! The service owns every loaded [`Thread`], routes inbound envelopes to the
//! thread they belong to, turns direct invites into notifications and walks
//! the acceptance flow for both invite kinds.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use skein_net::Delivery;
use skein_shared::crypto::{self, SymmetricKey};
use skein_shared::identity::Identity;
use skein_shared::invite::ExternalInviteLink;
use skein_shared::protocol::{BlockContent, BlockHeader, Envelope, StoredBlock, ThreadInvite};
use skein_shared::types::{BlockId, PeerId, ThreadId};
use skein_store::{ContentError, Notification, NotificationKind, Thread as ThreadModel};

use crate::config::EngineConfig;
use crate::error::{Result, ThreadError};
use crate::host::{StoreRequest, ThreadHost};
use crate::thread::Thread;

pub struct ThreadsService {
    host: Arc<dyn ThreadHost>,
    config: Arc<EngineConfig>,
    threads: RwLock<HashMap<ThreadId, Arc<Thread>>>,
}

impl ThreadsService {
    pub fn new(host: Arc<dyn ThreadHost>, config: Arc<EngineConfig>) -> Self {
        Self {
            host,
            config,
            threads: RwLock::new(HashMap::new()),
        }
    }

    /// Bind every stored thread model. Returns the number loaded.
    pub fn load_threads(&self) -> Result<usize> {
        let models = self.host.index().list_threads()?;
        let mut loaded = 0;
        for model in models {
            match Thread::new(&model, self.host.clone(), self.config.clone()) {
                Ok(thread) => {
                    self.register(Arc::new(thread))?;
                    loaded += 1;
                }
                Err(e) => warn!(thread = %model.id, error = %e, "Skipping unloadable thread"),
            }
        }
        info!(count = loaded, "Loaded threads");
        Ok(loaded)
    }

    /// Create a thread with a fresh key and its genesis join.
    pub async fn create_thread(&self, name: &str) -> Result<Arc<Thread>> {
        let key = Identity::generate();
        let thread = self.add_thread(name, &key)?;
        if let Err(e) = thread.join_initial().await {
            self.forget(&thread.id());
            return Err(e);
        }
        info!(thread = %thread.id(), name, "Created thread");
        Ok(thread)
    }

    /// Store a thread model for `key` and register it. HEAD starts empty.
    pub fn add_thread(&self, name: &str, key: &Identity) -> Result<Arc<Thread>> {
        let id = key.thread_id();
        if self.host.index().get_thread(&id)?.is_some() {
            return Err(ThreadError::AlreadyMember(id));
        }

        let model = ThreadModel {
            id,
            name: name.to_string(),
            secret_key: *key.secret_bytes(),
            head: String::new(),
            created_at: Utc::now(),
        };
        self.host.index().add_thread(&model)?;

        let thread = Arc::new(Thread::new(&model, self.host.clone(), self.config.clone())?);
        self.register(thread.clone())?;
        debug!(thread = %id, name, "Added thread");
        Ok(thread)
    }

    pub fn get_thread(&self, id: &ThreadId) -> Option<Arc<Thread>> {
        self.threads.read().ok().and_then(|threads| threads.get(id).cloned())
    }

    pub fn threads(&self) -> Vec<Arc<Thread>> {
        self.threads
            .read()
            .map(|threads| threads.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Leave a thread and drop its model.
    pub async fn remove_thread(&self, id: &ThreadId) -> Result<()> {
        let thread = self.get_thread(id).ok_or(ThreadError::ThreadNotFound(*id))?;
        if !thread.has_left() {
            thread.leave().await?;
        }
        self.host.index().delete_thread(id)?;
        self.unregister(id);
        info!(thread = %id, "Removed thread");
        Ok(())
    }

    /// Newest notifications first.
    pub fn notifications(&self, limit: usize) -> Result<Vec<Notification>> {
        Ok(self.host.index().list_notifications(limit)?)
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Route an envelope from `from` to its thread. Direct invites are kept
    /// for the user to accept; external invites never travel over the wire.
    pub async fn handle(&self, from: PeerId, envelope: &Envelope) -> Result<Option<BlockId>> {
        let content = envelope.message.payload.content()?;
        match &content {
            BlockContent::Invite(invite) => self.receive_invite(envelope, invite).await,
            BlockContent::ExternalInvite(_) => {
                debug!(from = %from.short(), "Dropping external invite received over the wire");
                Ok(None)
            }
            _ => {
                let thread_id = ThreadId(content.thread_pk());
                let thread = self
                    .get_thread(&thread_id)
                    .ok_or(ThreadError::ThreadNotFound(thread_id))?;
                thread.handle_envelope(Some(from), envelope).await
            }
        }
    }

    async fn receive_invite(&self, envelope: &Envelope, invite: &ThreadInvite) -> Result<Option<BlockId>> {
        let local = self.host.peer_id();
        if invite.invitee_id != local {
            return Err(ThreadError::InvalidInvite("addressed to another peer".into()));
        }
        envelope.verify().map_err(|_| ThreadError::AuthorSignature)?;
        check_signer(envelope, &invite.header)?;

        let thread_id = invite.header.thread_id();
        if self.host.index().get_thread(&thread_id)?.is_some() {
            debug!(thread = %thread_id, "Invite for a thread we already belong to");
            return Ok(None);
        }

        let id = self.put_object(&StoredBlock::encode_envelope(envelope)?).await?;

        let index = self.host.index();
        index.delete_notifications_by_block(&id)?;
        index.add_notification(&Notification::new(
            invite.header.author_id(),
            thread_id.to_string(),
            Some(id.clone()),
            NotificationKind::ReceivedInvite,
            invite.suggested_name.clone(),
        ))?;

        info!(
            thread = %thread_id,
            block = %id,
            inviter = %invite.header.author_id().short(),
            "Received invite"
        );
        Ok(Some(id))
    }

    /// Consume deliveries until the inbox closes. Failures are logged.
    pub async fn run(self: Arc<Self>, mut inbox: mpsc::Receiver<Delivery>) {
        info!(peer = %self.host.peer_id().short(), "Threads service running");

        while let Some(delivery) = inbox.recv().await {
            let envelope = match delivery.envelope() {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(from = %delivery.from.short(), error = %e, "Dropping undecodable frame");
                    continue;
                }
            };
            match self.handle(delivery.from, &envelope).await {
                Ok(Some(id)) => debug!(from = %delivery.from.short(), block = %id, "Delivery handled"),
                Ok(None) => debug!(from = %delivery.from.short(), "Delivery was a duplicate"),
                Err(e) => warn!(from = %delivery.from.short(), error = %e, "Failed to handle delivery"),
            }
        }

        info!("Inbox closed, threads service stopped");
    }

    // -----------------------------------------------------------------------
    // Acceptance
    // -----------------------------------------------------------------------

    /// Join the thread of a received direct invite.
    pub async fn accept_invite(&self, id: &BlockId) -> Result<Arc<Thread>> {
        let envelope = self.fetch_invite(id).await?;
        let BlockContent::Invite(invite) = envelope.message.payload.content()? else {
            return Err(ThreadError::InvalidInvite(format!("{id} is not a direct invite")));
        };
        if invite.invitee_id != self.host.peer_id() {
            return Err(ThreadError::InvalidInvite("addressed to another peer".into()));
        }

        let secret = crypto::open(self.host.identity(), &invite.sk_cipher)?;
        let thread = self.admit(&envelope, &invite.header, &secret, &invite.suggested_name)?;

        let joined = async {
            thread.handle_invite_message(&invite).await?;
            thread.join(&invite.header.author_pk, Some(id.clone())).await
        }
        .await;
        self.settle(thread, joined, id)
    }

    /// Join the thread of an external invite with its out-of-band key.
    pub async fn accept_external_invite(&self, id: &BlockId, key: &SymmetricKey) -> Result<Arc<Thread>> {
        let envelope = self.fetch_invite(id).await?;
        let BlockContent::ExternalInvite(invite) = envelope.message.payload.content()? else {
            return Err(ThreadError::InvalidInvite(format!("{id} is not an external invite")));
        };

        let secret = crypto::decrypt(key, &invite.sk_cipher)?;
        let thread = self.admit(&envelope, &invite.header, &secret, &invite.suggested_name)?;

        let joined = async {
            thread.handle_external_invite_message(&invite).await?;
            thread.join(&invite.header.author_pk, Some(id.clone())).await
        }
        .await;
        self.settle(thread, joined, id)
    }

    pub async fn accept_invite_link(&self, code: &str) -> Result<Arc<Thread>> {
        let link = ExternalInviteLink::decode(code)?;
        self.accept_external_invite(&link.block_id, &link.key).await
    }

    // Fetch an invite envelope by address and check its author signature.
    async fn fetch_invite(&self, id: &BlockId) -> Result<Envelope> {
        let fetch = self.host.content().get(id);
        let bytes = tokio::time::timeout(self.config.fetch_timeout, fetch)
            .await
            .map_err(|_| ThreadError::FetchTimeout(id.clone()))??;
        if BlockId::for_bytes(&bytes) != *id {
            return Err(ThreadError::IntegrityMismatch(id.clone()));
        }

        let StoredBlock::Envelope(envelope) = StoredBlock::from_bytes(&bytes)? else {
            return Err(ThreadError::InvalidInvite(format!("{id} has no author envelope")));
        };
        envelope.verify().map_err(|_| ThreadError::AuthorSignature)?;
        if let Some(header) = envelope.message.payload.content()?.header() {
            check_signer(&envelope, header)?;
        }
        Ok(envelope)
    }

    // Recover the thread key from an invite secret and register the thread.
    fn admit(
        &self,
        envelope: &Envelope,
        header: &BlockHeader,
        secret: &[u8],
        name: &str,
    ) -> Result<Arc<Thread>> {
        let key = Identity::from_secret_slice(secret)?;
        if key.thread_id() != header.thread_id() {
            return Err(ThreadError::InvalidInvite(
                "secret does not belong to the invited thread".into(),
            ));
        }
        envelope
            .message
            .payload
            .verify(&key.public_key_bytes())
            .map_err(|_| ThreadError::ThreadSignature)?;
        self.add_thread(name, &key)
    }

    // Keep the thread if joining worked, otherwise roll the model back.
    fn settle(&self, thread: Arc<Thread>, joined: Result<BlockId>, invite: &BlockId) -> Result<Arc<Thread>> {
        match joined {
            Ok(join) => {
                if let Err(e) = self.host.index().delete_notifications_by_block(invite) {
                    warn!(block = %invite, error = %e, "Failed to clear invite notification");
                }
                info!(thread = %thread.id(), join = %join, "Accepted invite");
                Ok(thread)
            }
            Err(e) => {
                self.forget(&thread.id());
                Err(e)
            }
        }
    }

    async fn put_object(&self, bytes: &[u8]) -> Result<BlockId> {
        if bytes.len() > self.config.max_block_size {
            return Err(ContentError::TooLarge {
                size: bytes.len(),
                max: self.config.max_block_size,
            }
            .into());
        }
        let id = self.host.content().put(bytes).await?;
        self.host.enqueue_store_request(StoreRequest::new(id.clone()));
        Ok(id)
    }

    fn register(&self, thread: Arc<Thread>) -> Result<()> {
        let mut threads = self
            .threads
            .write()
            .map_err(|_| ThreadError::Host("thread registry lock poisoned".into()))?;
        threads.insert(thread.id(), thread);
        Ok(())
    }

    fn unregister(&self, id: &ThreadId) {
        if let Ok(mut threads) = self.threads.write() {
            threads.remove(id);
        }
    }

    // Drop a half-created thread: registry entry, model and any rows.
    fn forget(&self, id: &ThreadId) {
        self.unregister(id);
        let index = self.host.index();
        let cleanup = index
            .delete_blocks_by_thread(id)
            .and_then(|_| index.delete_peers_by_thread(id))
            .and_then(|_| index.delete_thread(id));
        match cleanup {
            Ok(_) => debug!(thread = %id, "Rolled back thread"),
            Err(e) => warn!(thread = %id, error = %e, "Failed to roll back thread"),
        }
    }
}

fn check_signer(envelope: &Envelope, header: &BlockHeader) -> Result<()> {
    if header.author_pk != envelope.author_pk {
        return Err(ThreadError::InvalidBlock(
            "envelope signer is not the block author".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestNet;
    use skein_net::encode_frame;
    use skein_shared::protocol::DataType;

    #[tokio::test]
    async fn test_invite_for_someone_else_rejected() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let carol = net.peer().await;
        let thread = alice.service.create_thread("t").await.unwrap();

        let invite = thread.add_invite(&bob.peer_id()).await.unwrap();
        let envelope = bob.next_envelope().await;

        assert!(matches!(
            carol.service.handle(alice.peer_id(), &envelope).await,
            Err(ThreadError::InvalidInvite(_))
        ));
        assert!(matches!(
            carol.service.accept_invite(&invite).await,
            Err(ThreadError::InvalidInvite(_))
        ));
        assert!(carol.service.notifications(10).unwrap().is_empty());
        assert!(carol.service.threads().is_empty());
    }

    #[tokio::test]
    async fn test_received_invite_becomes_notification() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let thread = alice.service.create_thread("holiday").await.unwrap();

        let invite = thread.add_invite(&bob.peer_id()).await.unwrap();
        let results = bob.deliver_all().await;
        assert_eq!(results[0].as_ref().unwrap(), &Some(invite.clone()));

        let notes = bob.service.notifications(10).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::ReceivedInvite);
        assert_eq!(notes[0].actor_id, alice.peer_id());
        assert_eq!(notes[0].body, "holiday");
        assert_eq!(notes[0].block_id, Some(invite.clone()));

        // Accepting clears it.
        let bob_thread = bob.service.accept_invite(&invite).await.unwrap();
        assert_eq!(bob_thread.name(), "holiday");
        assert!(bob.service.notifications(10).unwrap().is_empty());

        // A second accept finds the thread already there.
        assert!(matches!(
            bob.service.accept_invite(&invite).await,
            Err(ThreadError::AlreadyMember(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_thread_rejected() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let carol = net.peer().await;
        let (thread, _bob_thread) = net.shared_thread(&alice, &bob).await;

        thread.add_data(DataType::Text, "x", None, b"k").await.unwrap();
        let envelope = bob.next_envelope().await;

        assert!(matches!(
            carol.service.handle(alice.peer_id(), &envelope).await,
            Err(ThreadError::ThreadNotFound(id)) if id == thread.id()
        ));
    }

    #[tokio::test]
    async fn test_external_invite_link_flow() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let thread = alice.service.create_thread("club").await.unwrap();

        let code = thread.external_invite_link().await.unwrap().encode().unwrap();
        let bob_thread = bob.service.accept_invite_link(&code).await.unwrap();
        assert_eq!(bob_thread.id(), thread.id());
        assert_eq!(bob_thread.name(), "club");

        let results = alice.deliver_all().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(thread.head().unwrap(), bob_thread.head().unwrap());

        let peers: Vec<PeerId> = thread.peers().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(peers, vec![bob.peer_id()]);

        // The wrong key opens nothing and leaves no thread behind.
        let carol = net.peer().await;
        let link = ExternalInviteLink::decode(&code).unwrap();
        assert!(carol
            .service
            .accept_external_invite(&link.block_id, &crypto::generate_symmetric_key())
            .await
            .is_err());
        assert!(carol.service.threads().is_empty());
        assert!(carol.service.get_thread(&thread.id()).is_none());
    }

    #[tokio::test]
    async fn test_remove_thread_leaves_and_forgets() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;
        let id = bob_thread.id();

        bob.service.remove_thread(&id).await.unwrap();
        assert!(bob.service.get_thread(&id).is_none());
        assert!(bob.node.index().get_thread(&id).unwrap().is_none());

        let results = alice.deliver_all().await;
        assert_eq!(results.len(), 1);
        assert!(thread.peers().unwrap().is_empty());

        assert!(matches!(
            bob.service.remove_thread(&id).await,
            Err(ThreadError::ThreadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_threads_from_index() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let thread = alice.service.create_thread("t").await.unwrap();

        let reloaded = ThreadsService::new(alice.host(), net.config.clone());
        assert_eq!(reloaded.load_threads().unwrap(), 1);
        let loaded = reloaded.get_thread(&thread.id()).unwrap();
        assert_eq!(loaded.head().unwrap(), thread.head().unwrap());
    }

    #[tokio::test]
    async fn test_run_loop_handles_deliveries() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;

        let data = thread.add_data(DataType::Text, "x", None, b"k").await.unwrap();
        let envelope = bob.next_envelope().await;

        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(bob.service.clone().run(rx));
        tx.send(Delivery {
            from: alice.peer_id(),
            frame: vec![0xde, 0xad],
        })
        .await
        .unwrap();
        tx.send(Delivery {
            from: alice.peer_id(),
            frame: encode_frame(&envelope).unwrap(),
        })
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(bob_thread.head().unwrap(), Some(data));
    }
}
