//! Back-propagation: catching up on ancestors we have never seen.
//!
//! The walk is an explicit post-order work-list. Every missing ancestor is
//! fetched and verified before anything is applied, then the batch is applied
//! oldest-first. A bad or unreachable ancestor aborts the walk with nothing
//! indexed.

use std::collections::HashSet;

use tracing::{debug, info};

use skein_shared::protocol::{BlockContent, Message, StoredBlock};
use skein_shared::types::{BlockId, PeerId};

use crate::error::{Result, ThreadError};
use crate::thread::Thread;

enum Step {
    Visit(BlockId),
    Apply(BlockId, BlockContent),
}

impl Thread {
    /// Apply every unknown ancestor of `parents`. Returns the peers whose
    /// joins were discovered on the way and should be welcomed once HEAD is
    /// settled.
    pub(crate) async fn follow_parents(
        &self,
        parents: &[BlockId],
        from: Option<PeerId>,
    ) -> Result<Vec<PeerId>> {
        let missing = self.collect_missing(parents).await?;
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let count = missing.len();
        let mut joined = Vec::new();
        for (id, content) in missing {
            if let Some(peer) = self.apply_block(&id, &content, from.as_ref(), true).await? {
                if !joined.contains(&peer) {
                    joined.push(peer);
                }
            }
        }

        info!(thread = %self.id, blocks = count, joined = joined.len(), "Back-propagated ancestors");
        Ok(joined)
    }

    // Missing ancestors in application order (parents before children).
    async fn collect_missing(&self, parents: &[BlockId]) -> Result<Vec<(BlockId, BlockContent)>> {
        let mut stack: Vec<Step> = parents.iter().rev().cloned().map(Step::Visit).collect();
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let limit = self.config.follow_limit;
        let mut fetched = 0usize;

        while let Some(step) = stack.pop() {
            match step {
                Step::Apply(id, content) => ordered.push((id, content)),
                Step::Visit(id) => {
                    if id.is_genesis() || !seen.insert(id.clone()) || self.is_indexed(&id)? {
                        continue;
                    }
                    if limit > 0 && fetched >= limit {
                        return Err(ThreadError::FollowLimit(limit));
                    }
                    fetched += 1;

                    let content = self.fetch_verified(&id).await?;
                    let grandparents = content.parents().to_vec();
                    stack.push(Step::Apply(id, content));
                    stack.extend(grandparents.into_iter().rev().map(Step::Visit));
                }
            }
        }

        Ok(ordered)
    }

    // Fetch an ancestor and check its address, signatures and thread.
    async fn fetch_verified(&self, id: &BlockId) -> Result<BlockContent> {
        let fetch = self.host.content().get(id);
        let bytes = tokio::time::timeout(self.config.fetch_timeout, fetch)
            .await
            .map_err(|_| ThreadError::FetchTimeout(id.clone()))??;

        if BlockId::for_bytes(&bytes) != *id {
            return Err(ThreadError::IntegrityMismatch(id.clone()));
        }

        let (message, author_pk) = match StoredBlock::from_bytes(&bytes)? {
            StoredBlock::Envelope(envelope) => {
                envelope.verify().map_err(|_| ThreadError::AuthorSignature)?;
                (envelope.message, Some(envelope.author_pk))
            }
            StoredBlock::Message(message) => (message, None),
        };
        self.verify(&message.payload)?;
        let content = message.payload.content()?;
        self.check_content(&message, &content, author_pk)?;

        if matches!(content, BlockContent::Invite(_) | BlockContent::ExternalInvite(_)) {
            return Err(ThreadError::InvalidBlock(format!(
                "{id} is an invite, not a chain block"
            )));
        }

        debug!(thread = %self.id, block = %id, message_type = %content.message_type(), "Fetched ancestor");
        Ok(content)
    }

    /// Structural checks on verified content: it must belong to this thread,
    /// match its declared type, and authored blocks must be signed by their
    /// header's author. Only merges may travel without an author.
    pub(crate) fn check_content(
        &self,
        message: &Message,
        content: &BlockContent,
        author_pk: Option<[u8; 32]>,
    ) -> Result<()> {
        if content.thread_pk() != self.key.public_key_bytes() {
            return Err(ThreadError::InvalidBlock("block belongs to another thread".into()));
        }
        if content.message_type() != message.message_type {
            return Err(ThreadError::InvalidBlock(format!(
                "declared {} but carries {}",
                message.message_type,
                content.message_type()
            )));
        }
        match (content.header(), author_pk) {
            (Some(header), Some(author)) if header.author_pk != author => Err(
                ThreadError::InvalidBlock("envelope signer is not the block author".into()),
            ),
            (Some(_), None) => Err(ThreadError::InvalidBlock(
                "authored block stored without an envelope".into(),
            )),
            _ => Ok(()),
        }
    }
}
