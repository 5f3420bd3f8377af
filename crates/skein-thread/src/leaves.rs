use tracing::info;

use skein_shared::protocol::{BlockContent, ThreadLeave};
use skein_shared::types::BlockId;
use skein_store::{BlockType, NotificationKind};

use crate::error::Result;
use crate::thread::Thread;

impl Thread {
    /// Tell the other members we are leaving, then drop every local row
    /// belonging to the thread. HEAD is reset to empty and the thread
    /// refuses any later block, inbound or outbound. The thread model stays
    /// registered until [`ThreadsService::remove_thread`](crate::ThreadsService::remove_thread).
    pub async fn leave(&self) -> Result<BlockId> {
        let _guard = self.lock.lock().await;

        let content = BlockContent::Leave(ThreadLeave {
            header: self.new_block_header()?,
        });
        let (envelope, id) = self.commit_block(&content).await?;

        self.post(&envelope, &id, &self.peer_ids()?).await;

        let index = self.host.index();
        let blocks = index.delete_blocks_by_thread(&self.id)?;
        let peers = index.delete_peers_by_thread(&self.id)?;
        let notifications = index.delete_notifications_by_subject(&self.id.to_string())?;
        index.update_head(&self.id, "")?;
        self.mark_left();

        info!(
            thread = %self.id,
            block = %id,
            blocks,
            peers,
            notifications,
            "Left thread"
        );
        Ok(id)
    }

    pub(crate) fn apply_leave(&self, id: &BlockId, leave: &ThreadLeave, following: bool) -> Result<()> {
        let author = leave.header.author_id();
        if author != self.host.peer_id() {
            let index = self.host.index();
            index.delete_peer(&author, &self.id)?;
            index.delete_notifications_by_actor(&author)?;
        }

        self.index_block(&self.block_row(id, BlockType::Leave, &leave.header))?;

        if !following {
            self.notify(author, id, NotificationKind::PeerLeft, "left")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThreadError;
    use crate::host::ThreadHost;
    use crate::testutil::TestNet;
    use skein_shared::protocol::DataType;

    #[tokio::test]
    async fn test_local_leave_purges_thread_rows() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;

        bob_thread.add_data(DataType::Text, "x", None, b"k").await.unwrap();
        alice.deliver_all().await;
        assert!(!alice.service.notifications(10).unwrap().is_empty());

        let leave = thread.leave().await.unwrap();

        assert_eq!(thread.info().unwrap().block_count, 0);
        assert!(thread.peers().unwrap().is_empty());
        assert!(alice.service.notifications(10).unwrap().is_empty());
        assert_eq!(thread.head().unwrap(), None);
        assert!(!thread.is_indexed(&leave).unwrap());

        // Bob hears about it and forgets alice.
        let results = bob.deliver_all().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &Some(leave.clone()));
        assert!(bob_thread.peers().unwrap().is_empty());
        assert_eq!(bob_thread.head().unwrap(), Some(leave.clone()));
        assert_eq!(bob.block(&leave).block_type, BlockType::Leave);

        let notes = bob.service.notifications(10).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::PeerLeft);
        assert_eq!(notes[0].actor_id, alice.peer_id());
        assert!(bob.node.index().get_thread(&bob_thread.id()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_left_thread_refuses_blocks_until_removed() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;

        thread.leave().await.unwrap();
        assert!(thread.has_left());
        bob.deliver_all().await;

        // A late block from bob would otherwise rebuild the history.
        let late = bob_thread.add_data(DataType::Text, "late", None, b"k").await.unwrap();
        let envelope = net.envelope(&late).await;
        assert!(matches!(
            alice.service.handle(bob.peer_id(), &envelope).await,
            Err(ThreadError::ThreadLeft(_))
        ));
        assert_eq!(thread.info().unwrap().block_count, 0);
        assert!(thread.peers().unwrap().is_empty());

        assert!(matches!(
            thread.add_data(DataType::Text, "x", None, b"k").await,
            Err(ThreadError::ThreadLeft(_))
        ));
        assert!(matches!(thread.leave().await, Err(ThreadError::ThreadLeft(_))));

        alice.service.remove_thread(&thread.id()).await.unwrap();
        assert!(alice.service.get_thread(&thread.id()).is_none());
        assert!(alice.node.index().get_thread(&thread.id()).unwrap().is_none());
    }
}
