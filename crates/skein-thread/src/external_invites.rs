use tracing::info;

use skein_shared::crypto::{self, SymmetricKey};
use skein_shared::invite::ExternalInviteLink;
use skein_shared::protocol::{BlockContent, ThreadExternalInvite};
use skein_shared::types::BlockId;

use crate::error::Result;
use crate::thread::Thread;

impl Thread {
    /// Publish the thread secret encrypted under a fresh symmetric key.
    /// Whoever holds the returned key can join; the block itself is only
    /// stored, never posted or chained.
    pub async fn add_external_invite(&self) -> Result<(BlockId, SymmetricKey)> {
        let _guard = self.lock.lock().await;

        let key = crypto::generate_symmetric_key();
        let content = BlockContent::ExternalInvite(ThreadExternalInvite {
            header: self.new_block_header()?,
            sk_cipher: crypto::encrypt(&key, self.key.secret_bytes())?,
            suggested_name: self.name.clone(),
        });
        let (_, id) = self.commit_block(&content).await?;

        info!(thread = %self.id, block = %id, "Added EXTERNAL_INVITE");
        Ok((id, key))
    }

    /// [`add_external_invite`](Self::add_external_invite) packaged as a
    /// shareable link.
    pub async fn external_invite_link(&self) -> Result<ExternalInviteLink> {
        let (id, key) = self.add_external_invite().await?;
        Ok(ExternalInviteLink::new(id, key))
    }

    pub async fn handle_external_invite_message(&self, invite: &ThreadExternalInvite) -> Result<()> {
        self.handle_invite_parents(&invite.header.parents).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestNet;
    use skein_shared::protocol::StoredBlock;
    use skein_store::ContentStore;

    #[tokio::test]
    async fn test_external_invite_is_stored_not_posted() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, _bob_thread) = net.shared_thread(&alice, &bob).await;
        let head = thread.head().unwrap();

        let (id, key) = thread.add_external_invite().await.unwrap();
        assert_eq!(thread.head().unwrap(), head);
        assert!(!thread.is_indexed(&id).unwrap());
        assert!(bob.deliver_all().await.is_empty());

        let bytes = net.content.get(&id).await.unwrap();
        let stored = StoredBlock::from_bytes(&bytes).unwrap();
        let BlockContent::ExternalInvite(invite) = stored.message().payload.content().unwrap() else {
            panic!("not an external invite");
        };
        let secret = crypto::decrypt(&key, &invite.sk_cipher).unwrap();
        assert_eq!(secret.as_slice(), thread.key.secret_bytes());
        assert!(crypto::decrypt(&crypto::generate_symmetric_key(), &invite.sk_cipher).is_err());
    }

    #[tokio::test]
    async fn test_link_round_trips() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let thread = alice.service.create_thread("t").await.unwrap();

        let link = thread.external_invite_link().await.unwrap();
        let decoded = ExternalInviteLink::decode(&link.encode().unwrap()).unwrap();
        assert_eq!(decoded, link);
    }
}
