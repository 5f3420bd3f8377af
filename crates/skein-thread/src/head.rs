//! HEAD resolution: fast-forward when possible, merge when histories diverged.

use chrono::Utc;
use tracing::info;

use skein_shared::protocol::{BlockContent, Message, StoredBlock, ThreadMerge};
use skein_shared::types::{BlockId, PeerId};
use skein_store::{Block, BlockType};

use crate::error::Result;
use crate::thread::Thread;

/// What applying an inbound block did to HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadChange {
    FastForward,
    Merged(BlockId),
}

impl Thread {
    /// Move HEAD to `inbound` if it extends the local HEAD, otherwise merge
    /// the two tips.
    pub(crate) async fn handle_head(&self, inbound: &BlockId, parents: &[BlockId]) -> Result<HeadChange> {
        match self.head()? {
            Some(head) if !parents.contains(&head) => {
                let merge = self.merge(head, inbound.clone()).await?;
                Ok(HeadChange::Merged(merge))
            }
            _ => {
                self.update_head(inbound)?;
                Ok(HeadChange::FastForward)
            }
        }
    }

    // Merge content carries no author or date and its parents are sorted, so
    // every peer merging the same tips derives the same block id.
    async fn merge(&self, local: BlockId, inbound: BlockId) -> Result<BlockId> {
        let mut parents = vec![local, inbound];
        parents.sort();
        parents.dedup();

        let merge = ThreadMerge {
            parents,
            thread_pk: self.key.public_key_bytes(),
        };
        let message = Message::seal(&self.key, &BlockContent::Merge(merge.clone()))?;
        let id = self.put_object(&StoredBlock::encode_message(&message)?).await?;

        self.apply_merge(&id, &merge)?;
        self.update_head(&id)?;

        info!(
            thread = %self.id,
            merge = %id,
            parents = ?merge.parents.iter().map(BlockId::as_str).collect::<Vec<_>>(),
            "Merged divergent heads"
        );
        Ok(id)
    }

    /// Index a merge. Merges are attributed to the thread key itself.
    pub(crate) fn apply_merge(&self, id: &BlockId, merge: &ThreadMerge) -> Result<()> {
        self.index_block(&Block {
            id: id.clone(),
            thread_id: self.id,
            author_id: PeerId(merge.thread_pk),
            block_type: BlockType::Merge,
            date: Utc::now(),
            parents: merge.parents.clone(),
            author_username_cipher: None,
            data_id: None,
            data_key_cipher: None,
            data_caption_cipher: None,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestNet;
    use skein_shared::protocol::DataType;

    #[tokio::test]
    async fn test_fast_forward_from_empty_and_from_head() {
        let net = TestNet::new();
        let peer = net.peer().await;
        let thread = net.standalone_thread(&peer);
        assert_eq!(thread.head().unwrap(), None);

        let a = BlockId::from("a");
        assert_eq!(thread.handle_head(&a, &[]).await.unwrap(), HeadChange::FastForward);
        assert_eq!(thread.head().unwrap(), Some(a.clone()));

        let b = BlockId::from("b");
        assert_eq!(thread.handle_head(&b, &[a]).await.unwrap(), HeadChange::FastForward);
        assert_eq!(thread.head().unwrap(), Some(b));
    }

    #[tokio::test]
    async fn test_divergent_peers_converge_on_same_merge() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;
        let base = thread.head().unwrap().unwrap();
        assert_eq!(bob_thread.head().unwrap(), Some(base.clone()));

        // Both extend the same HEAD before hearing from each other.
        let x = thread.add_data(DataType::Text, "x", None, b"k").await.unwrap();
        let y = bob_thread.add_data(DataType::Text, "y", None, b"k").await.unwrap();

        let bob_results = bob.deliver_all().await;
        let alice_results = alice.deliver_all().await;
        assert_eq!(bob_results.len(), 1);
        assert_eq!(alice_results.len(), 1);

        let alice_head = thread.head().unwrap().unwrap();
        let bob_head = bob_thread.head().unwrap().unwrap();
        assert_eq!(alice_head, bob_head);
        assert_ne!(alice_head, x);
        assert_ne!(alice_head, y);

        let merge = bob.block(&bob_head);
        assert_eq!(merge.block_type, BlockType::Merge);
        assert!(merge.parents.contains(&x));
        assert!(merge.parents.contains(&y));

        // Both tips stay indexed on both sides.
        for id in [&x, &y] {
            assert!(thread.is_indexed(id).unwrap());
            assert!(bob_thread.is_indexed(id).unwrap());
        }
    }

    #[tokio::test]
    async fn test_merge_is_welcomed_as_wrapped_envelope() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;

        thread.add_data(DataType::Text, "x", None, b"k").await.unwrap();
        bob_thread.add_data(DataType::Text, "y", None, b"k").await.unwrap();
        bob.deliver_all().await;
        let merge = bob_thread.head().unwrap().unwrap();

        // A third node with the thread key but no history catches up from
        // bob's welcome, which carries the merge signed by bob.
        let carol = net.peer().await;
        let carol_thread = carol.adopt_thread(&thread);
        bob_thread.send_welcome(&carol.peer_id()).await.unwrap();
        let results = carol.deliver_all().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &Some(merge.clone()));
        assert_eq!(carol_thread.head().unwrap(), Some(merge));
        assert_eq!(
            carol_thread.info().unwrap().block_count,
            bob_thread.info().unwrap().block_count
        );
    }
}
