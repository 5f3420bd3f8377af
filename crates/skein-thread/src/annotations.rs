use tracing::info;

use skein_shared::protocol::{AnnotationType, BlockContent, ThreadAnnotation};
use skein_shared::types::BlockId;
use skein_store::{Block, BlockType, NotificationKind};

use crate::error::{Result, ThreadError};
use crate::thread::Thread;

impl Thread {
    /// Comment on a block of this thread.
    pub async fn add_comment(&self, target: &BlockId, body: &str) -> Result<BlockId> {
        self.add_annotation(AnnotationType::Comment, target, Some(body)).await
    }

    pub async fn add_like(&self, target: &BlockId) -> Result<BlockId> {
        self.add_annotation(AnnotationType::Like, target, None).await
    }

    async fn add_annotation(
        &self,
        annotation_type: AnnotationType,
        target: &BlockId,
        body: Option<&str>,
    ) -> Result<BlockId> {
        let _guard = self.lock.lock().await;

        if !self.is_indexed(target)? {
            return Err(ThreadError::BlockNotFound(target.clone()));
        }

        let caption_cipher = match body {
            Some(body) => Some(self.encrypt(body.as_bytes())?),
            None => None,
        };
        let content = BlockContent::Annotation(ThreadAnnotation {
            header: self.new_block_header()?,
            annotation_type,
            data_id: target.to_string(),
            caption_cipher,
        });
        let (envelope, id) = self.add_chain_block(&content).await?;

        self.post(&envelope, &id, &self.peer_ids()?).await;

        info!(
            thread = %self.id,
            block = %id,
            target = %target,
            kind = ?annotation_type,
            "Added ANNOTATION"
        );
        Ok(id)
    }

    pub(crate) fn apply_annotation(
        &self,
        id: &BlockId,
        annotation: &ThreadAnnotation,
        following: bool,
    ) -> Result<()> {
        let (block_type, kind, body) = match annotation.annotation_type {
            AnnotationType::Comment => (BlockType::Comment, NotificationKind::CommentAdded, "commented"),
            AnnotationType::Like => (BlockType::Like, NotificationKind::LikeAdded, "liked"),
        };

        self.index_block(&Block {
            data_id: Some(annotation.data_id.clone()),
            data_caption_cipher: annotation.caption_cipher.clone(),
            ..self.block_row(id, block_type, &annotation.header)
        })?;

        if !following {
            self.notify(annotation.header.author_id(), id, kind, body)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestNet;
    use skein_shared::protocol::DataType;

    #[tokio::test]
    async fn test_comment_and_like_reach_peer() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let bob = net.peer().await;
        let (thread, bob_thread) = net.shared_thread(&alice, &bob).await;

        let photo = thread.add_data(DataType::Photo, "p", None, b"k").await.unwrap();
        bob.deliver_all().await;

        let comment = bob_thread.add_comment(&photo, "nice").await.unwrap();
        let like = bob_thread.add_like(&photo).await.unwrap();

        let results = alice.deliver_all().await;
        assert_eq!(results.len(), 2);
        assert_eq!(thread.head().unwrap(), Some(like.clone()));

        let block = alice.block(&comment);
        assert_eq!(block.block_type, BlockType::Comment);
        assert_eq!(block.data_id, Some(photo.to_string()));
        assert_eq!(thread.decrypt(&block.data_caption_cipher.unwrap()).unwrap(), b"nice");

        let block = alice.block(&like);
        assert_eq!(block.block_type, BlockType::Like);
        assert!(block.data_caption_cipher.is_none());

        let kinds: Vec<NotificationKind> = alice
            .service
            .notifications(10)
            .unwrap()
            .into_iter()
            .filter(|n| n.actor_id == bob.peer_id())
            .map(|n| n.kind)
            .collect();
        assert!(kinds.contains(&NotificationKind::CommentAdded));
        assert!(kinds.contains(&NotificationKind::LikeAdded));
    }

    #[tokio::test]
    async fn test_annotation_target_must_exist() {
        let net = TestNet::new();
        let alice = net.peer().await;
        let thread = alice.service.create_thread("t").await.unwrap();

        assert!(matches!(
            thread.add_like(&BlockId::from("nope")).await,
            Err(ThreadError::BlockNotFound(_))
        ));
    }
}
