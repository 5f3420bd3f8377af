//! Inbound pipeline shared by every chain block type.
//!
//! verify → store → duplicate check → back-propagate → apply → HEAD →
//! welcome. The per-type `apply_*` halves live next to their outbound
//! counterparts.

use tracing::{debug, info, warn};

use skein_shared::protocol::{BlockContent, Envelope, MessageType, StoredBlock};
use skein_shared::types::{BlockId, PeerId};
use skein_store::{Notification, NotificationKind, ThreadPeer};

use crate::error::{Result, ThreadError};
use crate::head::HeadChange;
use crate::thread::Thread;

impl Thread {
    /// Handle an envelope received from `from` (`None` when it did not come
    /// off the wire). Returns the block id, or `None` for a duplicate.
    pub async fn handle_envelope(
        &self,
        from: Option<PeerId>,
        envelope: &Envelope,
    ) -> Result<Option<BlockId>> {
        let _guard = self.lock.lock().await;
        self.ensure_active()?;
        let content = self.verify_envelope(envelope)?;
        self.handle_verified(from, envelope, content).await
    }

    pub async fn handle_join_block(&self, from: Option<PeerId>, envelope: &Envelope) -> Result<Option<BlockId>> {
        self.handle_typed(MessageType::ThreadJoin, from, envelope).await
    }

    pub async fn handle_leave_block(&self, from: Option<PeerId>, envelope: &Envelope) -> Result<Option<BlockId>> {
        self.handle_typed(MessageType::ThreadLeave, from, envelope).await
    }

    pub async fn handle_ignore_block(&self, from: Option<PeerId>, envelope: &Envelope) -> Result<Option<BlockId>> {
        self.handle_typed(MessageType::ThreadIgnore, from, envelope).await
    }

    pub async fn handle_merge_block(&self, from: Option<PeerId>, envelope: &Envelope) -> Result<Option<BlockId>> {
        self.handle_typed(MessageType::ThreadMerge, from, envelope).await
    }

    pub async fn handle_data_block(&self, from: Option<PeerId>, envelope: &Envelope) -> Result<Option<BlockId>> {
        self.handle_typed(MessageType::ThreadData, from, envelope).await
    }

    pub async fn handle_annotation_block(&self, from: Option<PeerId>, envelope: &Envelope) -> Result<Option<BlockId>> {
        self.handle_typed(MessageType::ThreadAnnotation, from, envelope).await
    }

    async fn handle_typed(
        &self,
        expected: MessageType,
        from: Option<PeerId>,
        envelope: &Envelope,
    ) -> Result<Option<BlockId>> {
        if envelope.message.message_type != expected {
            return Err(ThreadError::InvalidBlock(format!(
                "expected {expected}, got {}",
                envelope.message.message_type
            )));
        }
        self.handle_envelope(from, envelope).await
    }

    /// Check both signatures and decode the content.
    fn verify_envelope(&self, envelope: &Envelope) -> Result<BlockContent> {
        envelope.verify().map_err(|_| ThreadError::AuthorSignature)?;
        self.verify(&envelope.message.payload)?;
        let content = envelope.message.payload.content()?;
        self.check_content(&envelope.message, &content, Some(envelope.author_pk))?;
        Ok(content)
    }

    async fn handle_verified(
        &self,
        from: Option<PeerId>,
        envelope: &Envelope,
        content: BlockContent,
    ) -> Result<Option<BlockId>> {
        if matches!(content, BlockContent::Invite(_) | BlockContent::ExternalInvite(_)) {
            return Err(ThreadError::InvalidBlock(
                "invites are not chain blocks".into(),
            ));
        }

        let id = self.store_inbound(envelope, &content).await?;
        if self.is_indexed(&id)? {
            debug!(thread = %self.id, block = %id, "Ignoring duplicate block");
            return Ok(None);
        }

        let mut welcome = self.follow_parents(content.parents(), from).await?;
        let joiner = self.apply_block(&id, &content, from.as_ref(), false).await?;
        let change = self.handle_head(&id, content.parents()).await?;

        // A joiner that forced a merge is missing our side of the history.
        if let (Some(joiner), HeadChange::Merged(_)) = (joiner, &change) {
            if !welcome.contains(&joiner) {
                welcome.push(joiner);
            }
        }

        let local = self.host.peer_id();
        for peer in welcome.iter().filter(|peer| **peer != local) {
            if let Err(e) = self.send_welcome(peer).await {
                warn!(thread = %self.id, peer = %peer.short(), error = %e, "Failed to welcome peer");
            }
        }

        info!(
            thread = %self.id,
            block = %id,
            message_type = %content.message_type(),
            head = ?change,
            "Handled block"
        );
        Ok(Some(id))
    }

    // Merges live at the address of their bare message; everything else at
    // the address of the author's envelope.
    async fn store_inbound(&self, envelope: &Envelope, content: &BlockContent) -> Result<BlockId> {
        let bytes = match content {
            BlockContent::Merge(_) => StoredBlock::encode_message(&envelope.message)?,
            _ => StoredBlock::encode_envelope(envelope)?,
        };
        self.put_object(&bytes).await
    }

    /// Apply one verified block to local state. Returns a peer to welcome
    /// when the block is a join worth answering.
    pub(crate) async fn apply_block(
        &self,
        id: &BlockId,
        content: &BlockContent,
        from: Option<&PeerId>,
        following: bool,
    ) -> Result<Option<PeerId>> {
        if let Some(header) = content.header() {
            if !matches!(content, BlockContent::Leave(_)) {
                self.refresh_peer(&header.author_id());
            }
        }

        match content {
            BlockContent::Join(join) => self.apply_join(id, join, from, following),
            BlockContent::Leave(leave) => self.apply_leave(id, leave, following).map(|_| None),
            BlockContent::Ignore(ignore) => self.apply_ignore(id, ignore).await.map(|_| None),
            BlockContent::Merge(merge) => self.apply_merge(id, merge).map(|_| None),
            BlockContent::Data(data) => self.apply_data(id, data, following).await.map(|_| None),
            BlockContent::Annotation(annotation) => {
                self.apply_annotation(id, annotation, following).map(|_| None)
            }
            BlockContent::Invite(_) | BlockContent::ExternalInvite(_) => Err(
                ThreadError::InvalidBlock("invites are not chain blocks".into()),
            ),
        }
    }

    // Best effort: a failed refresh must not reject an otherwise valid block.
    fn refresh_peer(&self, author: &PeerId) {
        if *author == self.host.peer_id() {
            return;
        }
        let peer = ThreadPeer {
            id: *author,
            thread_id: self.id,
            welcomed: false,
        };
        match self.host.index().add_peer(&peer) {
            Ok(true) => debug!(thread = %self.id, peer = %author.short(), "Added thread peer"),
            Ok(false) => {}
            Err(e) => {
                warn!(thread = %self.id, peer = %author.short(), error = %e, "Failed to add thread peer");
            }
        }
    }

    /// Record a notification about a block authored by someone else.
    pub(crate) fn notify(
        &self,
        actor: PeerId,
        block_id: &BlockId,
        kind: NotificationKind,
        body: &str,
    ) -> Result<()> {
        if actor == self.host.peer_id() {
            return Ok(());
        }
        let notification = Notification::new(
            actor,
            self.id.to_string(),
            Some(block_id.clone()),
            kind,
            format!("{body} in {}", self.name),
        );
        self.host.index().add_notification(&notification)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ThreadHost;
    use crate::testutil::TestNet;
    use chrono::Utc;
    use skein_shared::identity::Identity;
    use skein_shared::protocol::{BlockHeader, DataType, ThreadData};
    use skein_store::BlockType;

    #[tokio::test]
    async fn test_duplicate_delivery_is_a_no_op() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;

        thread.add_data(DataType::Text, "x", None, b"k").await.unwrap();
        let frame = bob.next_envelope().await;

        let first = bob.service.handle(alice.peer_id(), &frame).await.unwrap();
        assert!(first.is_some());
        let count = bob_thread.info().unwrap().block_count;
        let peers = bob_thread.peers().unwrap();
        let notifications = bob.service.notifications(50).unwrap().len();

        let second = bob.service.handle(alice.peer_id(), &frame).await.unwrap();
        assert_eq!(second, None);
        assert_eq!(bob_thread.info().unwrap().block_count, count);
        assert_eq!(bob_thread.peers().unwrap(), peers);
        assert_eq!(bob.service.notifications(50).unwrap().len(), notifications);

        // Nothing went back out either time.
        assert!(alice.deliver_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_thread_signature_rejected() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;
        let head = bob_thread.head().unwrap();

        // Claims to be in the thread but is signed with some other key.
        let content = BlockContent::Data(ThreadData {
            header: BlockHeader {
                date: Utc::now(),
                parents: head.iter().cloned().collect(),
                thread_pk: thread.id().0,
                author_pk: alice.identity.public_key_bytes(),
                author_un_cipher: None,
            },
            data_type: DataType::Text,
            data_id: "forged".into(),
            key_cipher: vec![1, 2, 3],
            caption_cipher: None,
        });
        let forged = Envelope::seal(&alice.identity, &Identity::generate(), &content).unwrap();

        assert!(matches!(
            bob.service.handle(alice.peer_id(), &forged).await,
            Err(ThreadError::ThreadSignature)
        ));
        assert_eq!(bob_thread.head().unwrap(), head);
        assert!(bob_thread.blocks(0, 10, Some(BlockType::Data)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_author_signature_rejected() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;
        let head = bob_thread.head().unwrap();

        thread.add_data(DataType::Text, "x", None, b"k").await.unwrap();
        let mut envelope = bob.next_envelope().await;
        envelope.author_sig[0] ^= 0xff;

        assert!(matches!(
            bob_thread.handle_envelope(Some(alice.peer_id()), &envelope).await,
            Err(ThreadError::AuthorSignature)
        ));
        assert_eq!(bob_thread.head().unwrap(), head);
    }

    #[tokio::test]
    async fn test_typed_handler_rejects_other_types() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;

        thread.add_data(DataType::Text, "x", None, b"k").await.unwrap();
        let envelope = bob.next_envelope().await;

        assert!(matches!(
            bob_thread.handle_join_block(Some(alice.peer_id()), &envelope).await,
            Err(ThreadError::InvalidBlock(_))
        ));
        assert!(bob_thread
            .handle_data_block(Some(alice.peer_id()), &envelope)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_back_propagation_never_adds_self() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;

        // Alice restores her identity on a fresh node with an empty index and
        // re-discovers the thread through a block of bob's that sits on top
        // of her own genesis join.
        let data = bob_thread.add_data(DataType::Text, "x", None, b"k").await.unwrap();
        let envelope = alice.next_envelope().await;

        let restored = net.restore(&alice).await;
        let restored_thread = restored.adopt_thread(&thread);
        let handled = restored_thread
            .handle_envelope(Some(bob.peer_id()), &envelope)
            .await
            .unwrap();
        assert_eq!(handled, Some(data.clone()));

        let peers: Vec<PeerId> = restored_thread.peers().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(peers, vec![bob.peer_id()]);
        assert!(!peers.contains(&alice.peer_id()));
        assert_eq!(restored_thread.head().unwrap(), Some(data));
        assert_eq!(restored.node.identity().peer_id(), alice.peer_id());
        // Alice's own genesis join came back through back-propagation.
        assert_eq!(restored_thread.info().unwrap().block_count, 3);
    }
}
