//! Domain model structs persisted in the local metadata index.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use skein_shared::types::{BlockId, PeerId, ThreadId};

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

/// A thread this node is a member of.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thread {
    /// Thread public key.
    pub id: ThreadId,
    /// Local display name.
    pub name: String,
    /// Thread secret key (32 bytes), stored as hex in SQLite.
    pub secret_key: [u8; 32],
    /// Current HEAD, comma-joined block ids. Empty before genesis.
    pub head: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// Kind of an indexed block. Invites are never indexed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BlockType {
    Merge,
    Ignore,
    Join,
    Leave,
    Data,
    Comment,
    Like,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Ignore => "ignore",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Data => "data",
            Self::Comment => "comment",
            Self::Like => "like",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "merge" => Self::Merge,
            "ignore" => Self::Ignore,
            "join" => Self::Join,
            "leave" => Self::Leave,
            "data" => Self::Data,
            "comment" => Self::Comment,
            "like" => Self::Like,
            _ => return None,
        })
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local index row for a block in a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Content address of the stored block.
    pub id: BlockId,
    pub thread_id: ThreadId,
    pub author_id: PeerId,
    pub block_type: BlockType,
    pub date: DateTime<Utc>,
    pub parents: Vec<BlockId>,
    /// Author username, encrypted to the thread key.
    pub author_username_cipher: Option<Vec<u8>>,
    /// Off-chain data root (data blocks), annotated block (comments/likes),
    /// or `ignore-<target>` (ignores).
    pub data_id: Option<String>,
    pub data_key_cipher: Option<Vec<u8>>,
    pub data_caption_cipher: Option<Vec<u8>>,
}

/// Filter for listing a thread's blocks, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockQuery {
    pub thread_id: ThreadId,
    /// Number of matching blocks to skip.
    pub offset: usize,
    pub limit: usize,
    /// Only blocks of this type. Blocks hidden by an ignore are left out.
    pub block_type: Option<BlockType>,
}

impl BlockQuery {
    pub fn new(thread_id: ThreadId, limit: usize) -> Self {
        Self {
            thread_id,
            offset: 0,
            limit,
            block_type: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ThreadPeer
// ---------------------------------------------------------------------------

/// A known member of a thread other than the local node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadPeer {
    pub id: PeerId,
    pub thread_id: ThreadId,
    /// Whether we have sent this peer our HEAD.
    pub welcomed: bool,
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationKind {
    ReceivedInvite,
    PeerJoined,
    PeerLeft,
    DataAdded,
    CommentAdded,
    LikeAdded,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceivedInvite => "received_invite",
            Self::PeerJoined => "peer_joined",
            Self::PeerLeft => "peer_left",
            Self::DataAdded => "data_added",
            Self::CommentAdded => "comment_added",
            Self::LikeAdded => "like_added",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "received_invite" => Self::ReceivedInvite,
            "peer_joined" => Self::PeerJoined,
            "peer_left" => Self::PeerLeft,
            "data_added" => Self::DataAdded,
            "comment_added" => Self::CommentAdded,
            "like_added" => Self::LikeAdded,
            _ => return None,
        })
    }
}

/// A UI-facing record derived from a block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub actor_id: PeerId,
    /// Thread id for thread-level events.
    pub subject_id: String,
    /// Originating block.
    pub block_id: Option<BlockId>,
    pub kind: NotificationKind,
    pub body: String,
    pub read: bool,
}

impl Notification {
    pub fn new(
        actor_id: PeerId,
        subject_id: impl Into<String>,
        block_id: Option<BlockId>,
        kind: NotificationKind,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date: Utc::now(),
            actor_id,
            subject_id: subject_id.into(),
            block_id,
            kind,
            body: body.into(),
            read: false,
        }
    }
}
