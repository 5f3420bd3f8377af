//! Header construction, commit and local indexing.

use chrono::Utc;
use tracing::debug;

use skein_shared::protocol::{BlockContent, BlockHeader, Envelope, StoredBlock};
use skein_shared::types::BlockId;
use skein_store::{Block, BlockType, ContentError};

use crate::error::Result;
use crate::host::StoreRequest;
use crate::thread::Thread;

impl Thread {
    /// Header extending the current HEAD, authored by the local node.
    pub(crate) fn new_block_header(&self) -> Result<BlockHeader> {
        self.ensure_active()?;
        let parents = self.head()?.into_iter().collect();

        let author_un_cipher = match self.host.username()? {
            Some(username) => Some(self.encrypt(username.as_bytes())?),
            None => None,
        };

        Ok(BlockHeader {
            date: Utc::now(),
            parents,
            thread_pk: self.key.public_key_bytes(),
            author_pk: self.host.identity().public_key_bytes(),
            author_un_cipher,
        })
    }

    /// Sign `content` with both keys and store the resulting envelope.
    pub(crate) async fn commit_block(&self, content: &BlockContent) -> Result<(Envelope, BlockId)> {
        let envelope = Envelope::seal(self.host.identity(), &self.key, content)?;
        let id = self.add_block(&envelope).await?;
        debug!(
            thread = %self.id,
            block = %id,
            message_type = %content.message_type(),
            "Committed block"
        );
        Ok((envelope, id))
    }

    pub(crate) async fn add_block(&self, envelope: &Envelope) -> Result<BlockId> {
        let bytes = StoredBlock::encode_envelope(envelope)?;
        self.put_object(&bytes).await
    }

    /// Store and pin serialized bytes, then ask the relay to keep a copy.
    pub(crate) async fn put_object(&self, bytes: &[u8]) -> Result<BlockId> {
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

    /// Index a block row. Returns `false` if it was already indexed.
    pub(crate) fn index_block(&self, block: &Block) -> Result<bool> {
        let inserted = self.host.index().add_block(block)?;
        if inserted {
            debug!(
                thread = %self.id,
                block = %block.id,
                block_type = %block.block_type,
                "Indexed block"
            );
            self.push_update(block);
        }
        Ok(inserted)
    }

    pub(crate) fn is_indexed(&self, id: &BlockId) -> Result<bool> {
        Ok(self.host.index().get_block(id)?.is_some())
    }

    pub(crate) fn block_row(&self, id: &BlockId, block_type: BlockType, header: &BlockHeader) -> Block {
        Block {
            id: id.clone(),
            thread_id: self.id,
            author_id: header.author_id(),
            block_type,
            date: header.date,
            parents: header.parents.clone(),
            author_username_cipher: header.author_un_cipher.clone(),
            data_id: None,
            data_key_cipher: None,
            data_caption_cipher: None,
        }
    }
}
