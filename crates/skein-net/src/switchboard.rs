//! In-process envelope routing with the tokio mpsc command pattern.
//!
//! The switchboard loop runs in a dedicated tokio task and owns the table of
//! registered peers. Nodes talk to it through a cloneable [`Switchboard`]
//! handle; each registered peer receives frames on its own inbox channel.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use skein_shared::protocol::Envelope;
use skein_shared::types::PeerId;

use crate::error::NetError;
use crate::messages::{decode_frame, encode_frame};
use crate::peers::PeerTracker;
use crate::sender::MessageSender;

/// Capacity of every peer inbox.
pub const INBOX_CAPACITY: usize = 256;

const COMMAND_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Command / delivery types
// ---------------------------------------------------------------------------

/// Commands sent *into* the switchboard task.
#[derive(Debug)]
pub enum SwitchboardCommand {
    /// Register a peer and the inbox its frames go to.
    Connect {
        peer_id: PeerId,
        inbox: mpsc::Sender<Delivery>,
    },
    /// Unregister a peer; frames addressed to it fail from now on.
    Disconnect(PeerId),
    /// Hand a frame to a peer's inbox.
    Route {
        from: PeerId,
        to: PeerId,
        frame: Vec<u8>,
        reply: oneshot::Sender<Result<(), NetError>>,
    },
    /// Request a snapshot of currently registered peers.
    GetPeers(oneshot::Sender<Vec<PeerId>>),
    /// Stop the routing loop.
    Shutdown,
}

/// A frame received from another peer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub from: PeerId,
    pub frame: Vec<u8>,
}

impl Delivery {
    pub fn envelope(&self) -> Result<Envelope, NetError> {
        decode_frame(&self.frame)
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to a running switchboard task.
#[derive(Debug, Clone)]
pub struct Switchboard {
    cmd_tx: mpsc::Sender<SwitchboardCommand>,
}

impl Switchboard {
    /// Spawn the routing loop in a background tokio task.
    pub fn spawn() -> Self {
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<SwitchboardCommand>(COMMAND_CAPACITY);

        tokio::spawn(async move {
            let mut inboxes: HashMap<PeerId, mpsc::Sender<Delivery>> = HashMap::new();
            let mut tracker = PeerTracker::new();

            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    SwitchboardCommand::Connect { peer_id, inbox } => {
                        tracker.register(peer_id);
                        inboxes.insert(peer_id, inbox);
                        info!(peer = %peer_id.short(), "Peer connected");
                    }
                    SwitchboardCommand::Disconnect(peer_id) => {
                        tracker.unregister(&peer_id);
                        inboxes.remove(&peer_id);
                        info!(peer = %peer_id.short(), "Peer disconnected");
                    }
                    SwitchboardCommand::Route {
                        from,
                        to,
                        frame,
                        reply,
                    } => {
                        let result = route(&inboxes, from, to, frame);
                        tracker.record(&to, result.is_ok());
                        let _ = reply.send(result);
                    }
                    SwitchboardCommand::GetPeers(reply) => {
                        let _ = reply.send(tracker.peers());
                    }
                    SwitchboardCommand::Shutdown => {
                        info!("Switchboard shutdown requested");
                        break;
                    }
                }
            }

            info!("Switchboard loop terminated");
        });

        Self { cmd_tx }
    }

    /// Register `peer_id` and return the inbox its frames arrive on.
    pub async fn connect(&self, peer_id: PeerId) -> anyhow::Result<mpsc::Receiver<Delivery>> {
        let (inbox, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        self.cmd_tx
            .send(SwitchboardCommand::Connect { peer_id, inbox })
            .await
            .map_err(|_| anyhow::anyhow!("Switchboard command channel closed"))?;
        Ok(inbox_rx)
    }

    pub async fn disconnect(&self, peer_id: PeerId) -> anyhow::Result<()> {
        self.cmd_tx
            .send(SwitchboardCommand::Disconnect(peer_id))
            .await
            .map_err(|_| anyhow::anyhow!("Switchboard command channel closed"))
    }

    pub async fn peers(&self) -> anyhow::Result<Vec<PeerId>> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SwitchboardCommand::GetPeers(reply))
            .await
            .map_err(|_| anyhow::anyhow!("Switchboard command channel closed"))?;
        Ok(rx.await?)
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SwitchboardCommand::Shutdown).await;
    }

    /// A sender that routes envelopes as `local`.
    pub fn link(&self, local: PeerId) -> PeerLink {
        PeerLink {
            local,
            cmd_tx: self.cmd_tx.clone(),
        }
    }
}

// Never blocks the loop: a full inbox is reported as a failed send.
fn route(
    inboxes: &HashMap<PeerId, mpsc::Sender<Delivery>>,
    from: PeerId,
    to: PeerId,
    frame: Vec<u8>,
) -> Result<(), NetError> {
    let inbox = inboxes.get(&to).ok_or(NetError::PeerUnreachable(to))?;
    let len = frame.len();
    match inbox.try_send(Delivery { from, frame }) {
        Ok(()) => {
            debug!(from = %from.short(), to = %to.short(), len, "Routed frame");
            Ok(())
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(to = %to.short(), "Inbox full, dropping frame");
            Err(NetError::InboxFull(to))
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Err(NetError::PeerUnreachable(to)),
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// [`MessageSender`] bound to one local peer on a switchboard.
#[derive(Debug, Clone)]
pub struct PeerLink {
    local: PeerId,
    cmd_tx: mpsc::Sender<SwitchboardCommand>,
}

impl PeerLink {
    pub fn local_peer(&self) -> PeerId {
        self.local
    }
}

#[async_trait]
impl MessageSender for PeerLink {
    async fn send_message(&self, peer: &PeerId, envelope: &Envelope) -> Result<(), NetError> {
        let frame = encode_frame(envelope)?;
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SwitchboardCommand::Route {
                from: self.local,
                to: *peer,
                frame,
                reply,
            })
            .await
            .map_err(|_| NetError::Closed)?;
        rx.await.map_err(|_| NetError::Closed)?
    }
}
