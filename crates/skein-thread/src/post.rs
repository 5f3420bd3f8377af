//! Outbound fan-out and welcomes.

use futures::future::join_all;
use tracing::{debug, info, warn};

use skein_shared::protocol::{Envelope, Message, StoredBlock};
use skein_shared::types::{BlockId, PeerId};

use crate::error::Result;
use crate::thread::Thread;

impl Thread {
    /// Send `envelope` to every peer concurrently and wait for all attempts.
    /// Failed sends are logged; delivery to offline peers is the relay's job.
    pub(crate) async fn post(&self, envelope: &Envelope, id: &BlockId, peers: &[PeerId]) {
        if peers.is_empty() {
            return;
        }

        let handles = peers.iter().map(|peer| {
            let host = self.host.clone();
            let envelope = envelope.clone();
            let peer = *peer;
            let thread = self.id;
            let id = id.clone();
            tokio::spawn(async move {
                match host.send_message(&peer, &envelope).await {
                    Ok(()) => {
                        debug!(thread = %thread, block = %id, peer = %peer.short(), "Posted block");
                    }
                    Err(e) => {
                        warn!(
                            thread = %thread,
                            block = %id,
                            peer = %peer.short(),
                            error = %e,
                            "Failed to post block"
                        );
                    }
                }
            })
        });

        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(thread = %self.id, error = %e, "Post task failed");
            }
        }
    }

    /// Send our current HEAD to `peer` so it can back-propagate to it.
    pub(crate) async fn send_welcome(&self, peer: &PeerId) -> Result<()> {
        let Some(head) = self.head()? else {
            return Ok(());
        };

        let bytes = self.host.content().get(&head).await?;
        let envelope = match StoredBlock::from_bytes(&bytes)? {
            StoredBlock::Envelope(envelope) => envelope,
            StoredBlock::Message(message) => self.wrap_message(message)?,
        };

        self.post(&envelope, &head, std::slice::from_ref(peer)).await;
        self.host.index().set_peer_welcomed(peer, &self.id)?;

        info!(thread = %self.id, peer = %peer.short(), head = %head, "Welcomed peer");
        Ok(())
    }

    /// Merge blocks are stored without an author; sign one for the wire.
    fn wrap_message(&self, message: Message) -> Result<Envelope> {
        Ok(Envelope::wrap(self.host.identity(), message)?)
    }
}
