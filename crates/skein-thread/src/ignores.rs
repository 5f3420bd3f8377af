use tracing::{debug, info, warn};

use skein_shared::constants::IGNORE_PREFIX;
use skein_shared::protocol::{BlockContent, ThreadIgnore};
use skein_shared::types::BlockId;
use skein_store::{Block, BlockType};

use crate::error::{Result, ThreadError};
use crate::thread::Thread;

/// Derived files kept alongside a data object.
pub const DATA_LINKS: [&str; 4] = ["thumb", "small", "meta", "key"];

impl Thread {
    /// Hide a block from the thread and release its data.
    pub async fn ignore(&self, target: &BlockId) -> Result<BlockId> {
        let _guard = self.lock.lock().await;

        if self.own_block(target)?.is_none() {
            return Err(ThreadError::BlockNotFound(target.clone()));
        }

        let content = BlockContent::Ignore(ThreadIgnore {
            header: self.new_block_header()?,
            data_id: format!("{IGNORE_PREFIX}{target}"),
        });
        let (envelope, id) = self.add_chain_block(&content).await?;

        self.post(&envelope, &id, &self.peer_ids()?).await;

        info!(thread = %self.id, block = %id, target = %target, "Added IGNORE");
        Ok(id)
    }

    pub(crate) async fn apply_ignore(&self, id: &BlockId, ignore: &ThreadIgnore) -> Result<()> {
        let target = ignore
            .data_id
            .strip_prefix(IGNORE_PREFIX)
            .filter(|target| !target.is_empty())
            .map(BlockId::from)
            .ok_or_else(|| {
                ThreadError::InvalidBlock(format!("malformed ignore target: {}", ignore.data_id))
            })?;

        let index = self.host.index();
        let repeated = index
            .blocks_by_data_id(&ignore.data_id)?
            .iter()
            .any(|block| block.id != *id && block.thread_id == self.id);

        self.index_block(&Block {
            data_id: Some(ignore.data_id.clone()),
            ..self.block_row(id, BlockType::Ignore, &ignore.header)
        })?;

        // Targets outside this thread are treated as unknown.
        let Some(block) = self.own_block(&target)? else {
            debug!(thread = %self.id, target = %target, "Ignore target not in thread");
            return Ok(());
        };
        index.delete_notifications_by_block(&target)?;

        // Data is released once, by the first ignore of its block.
        if repeated {
            debug!(thread = %self.id, target = %target, "Target already ignored");
            return Ok(());
        }
        if block.block_type != BlockType::Data {
            return Ok(());
        }
        if let Some(data_id) = &block.data_id {
            let shared = index
                .blocks_by_data_id(data_id)?
                .iter()
                .any(|other| other.id != block.id);
            if shared {
                debug!(thread = %self.id, data = %data_id, "Data still referenced, keeping pins");
            } else {
                self.unpin_data(data_id).await;
            }
        }
        Ok(())
    }

    fn own_block(&self, id: &BlockId) -> Result<Option<Block>> {
        Ok(self
            .host
            .index()
            .get_block(id)?
            .filter(|block| block.thread_id == self.id))
    }

    pub(crate) async fn unpin_data(&self, data_id: &str) {
        for link in DATA_LINKS {
            let path = format!("{data_id}/{link}");
            if let Err(e) = self.host.content().unpin(&path).await {
                warn!(thread = %self.id, path = %path, error = %e, "Failed to unpin");
            }
        }
        debug!(thread = %self.id, data = %data_id, "Released data pins");
    }
}
