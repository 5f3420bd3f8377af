use thiserror::Error;

use skein_shared::types::PeerId;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Peer {0} is not reachable")]
    PeerUnreachable(PeerId),

    #[error("Inbox of peer {0} is full")]
    InboxFull(PeerId),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Frame codec error: {0}")]
    Codec(String),

    #[error("Transport shut down")]
    Closed,
}
