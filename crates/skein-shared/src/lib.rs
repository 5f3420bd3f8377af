//! # skein-shared
//!
//! Identities, content addresses, wire types and crypto primitives shared by
//! every skein crate.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod invite;
pub mod protocol;
pub mod types;

pub use error::{CryptoError, IdentityError, InviteError};
pub use identity::Identity;
pub use invite::ExternalInviteLink;
pub use protocol::*;
pub use types::{parents_from_head, BlockId, PeerId, ThreadId};
