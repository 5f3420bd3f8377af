use async_trait::async_trait;

use skein_shared::protocol::Envelope;
use skein_shared::types::PeerId;

use crate::error::NetError;

/// Delivers a single envelope to a single peer.
///
/// Implementations report whether the hand-off succeeded; durable delivery
/// to offline peers is not their concern.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, peer: &PeerId, envelope: &Envelope) -> Result<(), NetError>;
}
