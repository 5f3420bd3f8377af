use tracing::{debug, info};

use skein_shared::crypto;
use skein_shared::protocol::{BlockContent, ThreadInvite};
use skein_shared::types::{BlockId, PeerId};

use crate::error::Result;
use crate::thread::Thread;

impl Thread {
    /// Invite a peer by sealing the thread secret to their key. The invite is
    /// sent to the invitee alone and never becomes part of the chain.
    pub async fn add_invite(&self, invitee: &PeerId) -> Result<BlockId> {
        let _guard = self.lock.lock().await;

        let content = BlockContent::Invite(ThreadInvite {
            header: self.new_block_header()?,
            sk_cipher: crypto::seal(&invitee.0, self.key.secret_bytes())?,
            suggested_name: self.name.clone(),
            invitee_id: *invitee,
        });
        let (envelope, id) = self.commit_block(&content).await?;

        self.post(&envelope, &id, std::slice::from_ref(invitee)).await;

        info!(thread = %self.id, block = %id, invitee = %invitee.short(), "Added INVITE");
        Ok(id)
    }

    /// Catch up on the history an accepted invite was issued from.
    pub async fn handle_invite_message(&self, invite: &ThreadInvite) -> Result<()> {
        self.handle_invite_parents(&invite.header.parents).await
    }

    /// Back-propagate the invite's parents and start from the first of them.
    /// An invite issued before genesis leaves HEAD alone.
    pub(crate) async fn handle_invite_parents(&self, parents: &[BlockId]) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.ensure_active()?;

        self.follow_parents(parents, None).await?;

        match parents.first() {
            Some(first) if !first.is_genesis() => {
                self.update_head(first)?;
                debug!(thread = %self.id, head = %first, "Started from invite parents");
            }
            _ => {}
        }
        Ok(())
    }
}
