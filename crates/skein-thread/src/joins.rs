use tracing::info;

use skein_shared::protocol::{BlockContent, Envelope, ThreadJoin};
use skein_shared::types::{BlockId, PeerId};
use skein_store::{BlockType, NotificationKind, ThreadPeer};

use crate::error::Result;
use crate::thread::Thread;

impl Thread {
    /// Genesis join of a freshly created thread. Nobody to post to yet.
    pub async fn join_initial(&self) -> Result<BlockId> {
        let _guard = self.lock.lock().await;

        let content = BlockContent::Join(ThreadJoin {
            header: self.new_block_header()?,
            inviter_pk: self.key.public_key_bytes(),
            block_id: None,
        });
        let (_, id) = self.add_chain_block(&content).await?;

        info!(thread = %self.id, block = %id, "Added genesis JOIN");
        Ok(id)
    }

    /// Announce ourselves to a thread we were invited to.
    pub async fn join(&self, inviter_pk: &[u8; 32], invite_id: Option<BlockId>) -> Result<BlockId> {
        let _guard = self.lock.lock().await;

        let content = BlockContent::Join(ThreadJoin {
            header: self.new_block_header()?,
            inviter_pk: *inviter_pk,
            block_id: invite_id,
        });
        let (envelope, id) = self.add_chain_block(&content).await?;

        let inviter = PeerId(*inviter_pk);
        if inviter != self.host.peer_id() {
            self.host.index().add_peer(&ThreadPeer {
                id: inviter,
                thread_id: self.id,
                welcomed: false,
            })?;
        }

        self.post(&envelope, &id, &self.peer_ids()?).await;

        info!(thread = %self.id, block = %id, inviter = %inviter.short(), "Added JOIN");
        Ok(id)
    }

    /// Commit an authored block on top of HEAD, apply it locally and make it
    /// the new HEAD. Callers hold the lock and post the envelope.
    pub(crate) async fn add_chain_block(&self, content: &BlockContent) -> Result<(Envelope, BlockId)> {
        let (envelope, id) = self.commit_block(content).await?;
        self.apply_block(&id, content, None, false).await?;
        self.update_head(&id)?;
        Ok((envelope, id))
    }

    pub(crate) fn apply_join(
        &self,
        id: &BlockId,
        join: &ThreadJoin,
        from: Option<&PeerId>,
        following: bool,
    ) -> Result<Option<PeerId>> {
        self.index_block(&self.block_row(id, BlockType::Join, &join.header))?;

        let author = join.header.author_id();
        if author == self.host.peer_id() {
            return Ok(None);
        }

        if following {
            // Joins met while catching up are only worth a welcome if they
            // are not from the peer feeding us the history.
            return Ok(match from {
                Some(from) if *from != author => Some(author),
                _ => None,
            });
        }

        self.notify(author, id, NotificationKind::PeerJoined, "joined")?;
        Ok(Some(author))
    }
}
