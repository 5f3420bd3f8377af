use thiserror::Error;

use skein_shared::types::{BlockId, ThreadId};
use skein_shared::{CryptoError, IdentityError, InviteError};
use skein_store::{ContentError, StoreError};

#[derive(Error, Debug)]
pub enum ThreadError {
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Author signature verification failed")]
    AuthorSignature,

    #[error("Thread signature verification failed")]
    ThreadSignature,

    #[error("Thread not found: {0}")]
    ThreadNotFound(ThreadId),

    #[error("Thread {0} has been left")]
    ThreadLeft(ThreadId),

    #[error("Block not found: {0}")]
    BlockNotFound(BlockId),

    #[error("Block {0} does not match its content address")]
    IntegrityMismatch(BlockId),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Invalid invite: {0}")]
    InvalidInvite(String),

    #[error("Already a member of thread {0}")]
    AlreadyMember(ThreadId),

    #[error("Thread key does not match thread {0}")]
    KeyMismatch(ThreadId),

    #[error("Timed out fetching block {0}")]
    FetchTimeout(BlockId),

    #[error("Back-propagation exceeded {0} blocks")]
    FollowLimit(usize),

    #[error("Host error: {0}")]
    Host(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Invite error: {0}")]
    Invite(#[from] InviteError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),
}

pub type Result<T> = std::result::Result<T, ThreadError>;
