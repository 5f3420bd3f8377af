use tracing::{debug, info, warn};

use skein_shared::constants::IGNORE_PREFIX;
use skein_shared::protocol::{BlockContent, DataType, ThreadData};
use skein_shared::types::BlockId;
use skein_store::{Block, BlockType, NotificationKind};

use crate::error::{Result, ThreadError};
use crate::ignores::DATA_LINKS;
use crate::thread::Thread;

impl Thread {
    /// Publish an off-chain data object. `key` decrypts the object and is
    /// only ever stored encrypted to the thread.
    pub async fn add_data(
        &self,
        data_type: DataType,
        data_id: &str,
        caption: Option<&str>,
        key: &[u8],
    ) -> Result<BlockId> {
        if data_id.is_empty() {
            return Err(ThreadError::InvalidBlock("data id is empty".into()));
        }

        let _guard = self.lock.lock().await;

        let caption_cipher = match caption {
            Some(caption) => Some(self.encrypt(caption.as_bytes())?),
            None => None,
        };
        let content = BlockContent::Data(ThreadData {
            header: self.new_block_header()?,
            data_type,
            data_id: data_id.to_string(),
            key_cipher: self.encrypt(key)?,
            caption_cipher,
        });
        let (envelope, id) = self.add_chain_block(&content).await?;

        self.post(&envelope, &id, &self.peer_ids()?).await;

        info!(thread = %self.id, block = %id, data = %data_id, "Added DATA");
        Ok(id)
    }

    pub(crate) async fn apply_data(&self, id: &BlockId, data: &ThreadData, following: bool) -> Result<()> {
        self.index_block(&Block {
            data_id: Some(data.data_id.clone()),
            data_key_cipher: Some(data.key_cipher.clone()),
            data_caption_cipher: data.caption_cipher.clone(),
            ..self.block_row(id, BlockType::Data, &data.header)
        })?;

        if data.data_type == DataType::Photo {
            let ignored_later = self
                .host
                .index()
                .blocks_by_data_id(&format!("{IGNORE_PREFIX}{id}"))?
                .iter()
                .any(|ignore| ignore.thread_id == self.id && ignore.date > data.header.date);
            if ignored_later {
                debug!(thread = %self.id, block = %id, "Data already ignored, not pinning");
            } else {
                self.pin_data(&data.data_id).await;
            }
        }

        if !following {
            self.notify(data.header.author_id(), id, NotificationKind::DataAdded, "added data")?;
        }
        Ok(())
    }

    // Pins are a cache hint; a failed pin does not reject the block.
    async fn pin_data(&self, data_id: &str) {
        for link in DATA_LINKS {
            let path = format!("{data_id}/{link}");
            if let Err(e) = self.host.content().pin(&path).await {
                warn!(thread = %self.id, path = %path, error = %e, "Failed to pin");
            }
        }
    }
}
