//! Per-peer routing statistics kept by the switchboard loop.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use skein_shared::types::PeerId;

/// Routing counters for one registered peer.
#[derive(Debug, Clone)]
pub struct RouteStats {
    pub registered_at: Instant,
    /// Frames handed to the peer's inbox.
    pub delivered: u64,
    /// Frames refused because the inbox was full or closed.
    pub dropped: u64,
}

impl RouteStats {
    fn new() -> Self {
        Self {
            registered_at: Instant::now(),
            delivered: 0,
            dropped: 0,
        }
    }
}

/// Registered peers and their counters. Owned by the routing task, so no
/// locking.
#[derive(Debug, Clone, Default)]
pub struct PeerTracker {
    routes: HashMap<PeerId, RouteStats>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering again resets the counters.
    pub fn register(&mut self, peer_id: PeerId) {
        debug!(peer = %peer_id.short(), "Tracking peer");
        self.routes.insert(peer_id, RouteStats::new());
    }

    pub fn unregister(&mut self, peer_id: &PeerId) -> bool {
        self.routes.remove(peer_id).is_some()
    }

    pub fn record(&mut self, peer_id: &PeerId, delivered: bool) {
        if let Some(stats) = self.routes.get_mut(peer_id) {
            if delivered {
                stats.delivered += 1;
            } else {
                stats.dropped += 1;
            }
        }
    }

    pub fn stats(&self, peer_id: &PeerId) -> Option<&RouteStats> {
        self.routes.get(peer_id)
    }

    /// Registered peers, sorted.
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.routes.keys().copied().collect();
        peers.sort();
        peers
    }
}
