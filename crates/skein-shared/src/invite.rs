use serde::{Deserialize, Serialize};

use crate::crypto::SymmetricKey;
use crate::error::InviteError;
use crate::types::BlockId;

/// Everything a recipient needs to accept an external invite: where the
/// invite block lives and the key that opens its secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalInviteLink {
    pub block_id: BlockId,
    pub key: SymmetricKey,
}

impl ExternalInviteLink {
    pub fn new(block_id: BlockId, key: SymmetricKey) -> Self {
        Self { block_id, key }
    }

    /// Encode the link as a base64url string (copiable code).
    pub fn encode(&self) -> Result<String, InviteError> {
        let bytes = bincode::serialize(self).map_err(|_| InviteError::InvalidFormat)?;
        Ok(base64_url_encode(&bytes))
    }

    /// Decode a base64url string back into a link.
    pub fn decode(code: &str) -> Result<Self, InviteError> {
        let bytes = base64_url_decode(code)?;
        let link: Self = bincode::deserialize(&bytes).map_err(|_| InviteError::InvalidFormat)?;
        if link.block_id.is_genesis() {
            return Err(InviteError::InvalidFormat);
        }
        Ok(link)
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

fn base64_url_decode(s: &str) -> Result<Vec<u8>, InviteError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD
        .decode(s.trim())
        .map_err(|_| InviteError::Base64Decode)
}
