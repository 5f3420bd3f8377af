use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::identity::{verify_signature, Identity};
use crate::types::{BlockId, PeerId, ThreadId};

/// Wire message types of the thread protocol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageType {
    ThreadJoin,
    ThreadLeave,
    ThreadInvite,
    ThreadExternalInvite,
    ThreadIgnore,
    ThreadMerge,
    ThreadData,
    ThreadAnnotation,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ThreadJoin => "THREAD_JOIN",
            Self::ThreadLeave => "THREAD_LEAVE",
            Self::ThreadInvite => "THREAD_INVITE",
            Self::ThreadExternalInvite => "THREAD_EXTERNAL_INVITE",
            Self::ThreadIgnore => "THREAD_IGNORE",
            Self::ThreadMerge => "THREAD_MERGE",
            Self::ThreadData => "THREAD_DATA",
            Self::ThreadAnnotation => "THREAD_ANNOTATION",
        };
        f.write_str(name)
    }
}

/// Header embedded in every authored block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    pub date: DateTime<Utc>,
    /// The HEAD this block extends (empty for genesis)
    pub parents: Vec<BlockId>,
    pub thread_pk: [u8; 32],
    pub author_pk: [u8; 32],
    /// Author username, sealed to the thread key
    pub author_un_cipher: Option<Vec<u8>>,
}

impl BlockHeader {
    pub fn thread_id(&self) -> ThreadId {
        ThreadId(self.thread_pk)
    }

    pub fn author_id(&self) -> PeerId {
        PeerId(self.author_pk)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadJoin {
    pub header: BlockHeader,
    pub inviter_pk: [u8; 32],
    /// The invite this join answers (none for the founder's join)
    pub block_id: Option<BlockId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadLeave {
    pub header: BlockHeader,
}

/// Direct invite, delivered to a single invitee and never chained
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadInvite {
    pub header: BlockHeader,
    /// Thread secret key sealed to the invitee's public key
    pub sk_cipher: Vec<u8>,
    pub suggested_name: String,
    pub invitee_id: PeerId,
}

/// Invite whose secret is encrypted under a key shared out of band
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadExternalInvite {
    pub header: BlockHeader,
    /// Thread secret key encrypted with the out-of-band symmetric key
    pub sk_cipher: Vec<u8>,
    pub suggested_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadIgnore {
    pub header: BlockHeader,
    /// `ignore-<target block id>`
    pub data_id: String,
}

/// Merge of two divergent tips. Carries no author so that peers merging the
/// same tips derive the same block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadMerge {
    pub parents: Vec<BlockId>,
    pub thread_pk: [u8; 32],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataType {
    Photo,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadData {
    pub header: BlockHeader,
    pub data_type: DataType,
    /// Root of the off-chain data
    pub data_id: String,
    /// Data key sealed to the thread key
    pub key_cipher: Vec<u8>,
    pub caption_cipher: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnnotationType {
    Comment,
    Like,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadAnnotation {
    pub header: BlockHeader,
    pub annotation_type: AnnotationType,
    /// Block id of the annotated data block
    pub data_id: String,
    pub caption_cipher: Option<Vec<u8>>,
}

/// Content of a thread block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BlockContent {
    Join(ThreadJoin),
    Leave(ThreadLeave),
    Invite(ThreadInvite),
    ExternalInvite(ThreadExternalInvite),
    Ignore(ThreadIgnore),
    Merge(ThreadMerge),
    Data(ThreadData),
    Annotation(ThreadAnnotation),
}

impl BlockContent {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Join(_) => MessageType::ThreadJoin,
            Self::Leave(_) => MessageType::ThreadLeave,
            Self::Invite(_) => MessageType::ThreadInvite,
            Self::ExternalInvite(_) => MessageType::ThreadExternalInvite,
            Self::Ignore(_) => MessageType::ThreadIgnore,
            Self::Merge(_) => MessageType::ThreadMerge,
            Self::Data(_) => MessageType::ThreadData,
            Self::Annotation(_) => MessageType::ThreadAnnotation,
        }
    }

    /// Authored header (merge blocks have none)
    pub fn header(&self) -> Option<&BlockHeader> {
        match self {
            Self::Join(c) => Some(&c.header),
            Self::Leave(c) => Some(&c.header),
            Self::Invite(c) => Some(&c.header),
            Self::ExternalInvite(c) => Some(&c.header),
            Self::Ignore(c) => Some(&c.header),
            Self::Merge(_) => None,
            Self::Data(c) => Some(&c.header),
            Self::Annotation(c) => Some(&c.header),
        }
    }

    pub fn parents(&self) -> &[BlockId] {
        match self {
            Self::Merge(c) => &c.parents,
            other => other.header().map(|h| h.parents.as_slice()).unwrap_or(&[]),
        }
    }

    pub fn thread_pk(&self) -> [u8; 32] {
        match self {
            Self::Merge(c) => c.thread_pk,
            other => other.header().map(|h| h.thread_pk).unwrap_or_default(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

/// Serialized block content plus the thread key's signature over it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedThreadBlock {
    pub block: Vec<u8>,
    pub thread_sig: Vec<u8>,
}

impl SignedThreadBlock {
    pub fn seal(thread: &Identity, content: &BlockContent) -> Result<Self, bincode::Error> {
        let block = content.to_bytes()?;
        let thread_sig = thread.sign(&block).to_bytes().to_vec();
        Ok(Self { block, thread_sig })
    }

    pub fn verify(&self, thread_pk: &[u8; 32]) -> Result<(), IdentityError> {
        verify_signature(thread_pk, &self.block, &self.thread_sig)
    }

    pub fn content(&self) -> Result<BlockContent, bincode::Error> {
        BlockContent::from_bytes(&self.block)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub payload: SignedThreadBlock,
}

impl Message {
    /// Sign `content` with the thread key.
    pub fn seal(thread: &Identity, content: &BlockContent) -> Result<Self, bincode::Error> {
        Ok(Self {
            message_type: content.message_type(),
            payload: SignedThreadBlock::seal(thread, content)?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }
}

/// Author-signed wire wrapper around a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub message: Message,
    pub author_pk: [u8; 32],
    pub author_sig: Vec<u8>,
}

impl Envelope {
    /// Wrap a message with the author's signature over its bytes.
    pub fn wrap(author: &Identity, message: Message) -> Result<Self, bincode::Error> {
        let author_sig = author.sign(&message.to_bytes()?).to_bytes().to_vec();
        Ok(Self {
            message,
            author_pk: author.public_key_bytes(),
            author_sig,
        })
    }

    /// Build a dual-signed envelope: thread signature over the content,
    /// author signature over the message.
    pub fn seal(
        author: &Identity,
        thread: &Identity,
        content: &BlockContent,
    ) -> Result<Self, bincode::Error> {
        Self::wrap(author, Message::seal(thread, content)?)
    }

    pub fn author_id(&self) -> PeerId {
        PeerId(self.author_pk)
    }

    /// Check the author signature over the message bytes.
    pub fn verify(&self) -> Result<(), IdentityError> {
        let bytes = self
            .message
            .to_bytes()
            .map_err(|_| IdentityError::InvalidSignature)?;
        verify_signature(&self.author_pk, &bytes, &self.author_sig)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

/// What the content store holds at a block's address. Authored blocks are
/// stored as envelopes; merge blocks as bare thread-signed messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StoredBlock {
    Envelope(Envelope),
    Message(Message),
}

// Borrowing twin of `StoredBlock`; serializes to identical bytes.
#[derive(Serialize)]
enum StoredBlockRef<'a> {
    Envelope(&'a Envelope),
    Message(&'a Message),
}

impl StoredBlock {
    pub fn message(&self) -> &Message {
        match self {
            Self::Envelope(env) => &env.message,
            Self::Message(message) => message,
        }
    }

    pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&StoredBlockRef::Envelope(envelope))
    }

    pub fn encode_message(message: &Message) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&StoredBlockRef::Message(message))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
