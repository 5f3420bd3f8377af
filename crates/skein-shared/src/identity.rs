use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::IdentityError;
use crate::types::{PeerId, ThreadId};

/// An Ed25519 keypair.
///
/// The same type backs both a node's identity (whose public key is its
/// [`PeerId`]) and a thread's shared secret (whose public key is its
/// [`ThreadId`]). Every member of a thread holds the thread keypair.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        Self { signing_key }
    }

    /// For secrets read back from the index or opened from an invite.
    pub fn from_secret_slice(secret: &[u8]) -> Result<Self, IdentityError> {
        let secret: [u8; 32] = secret
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyBytes)?;
        Ok(Self::from_secret_bytes(&secret))
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId(self.public_key_bytes())
    }

    pub fn thread_id(&self) -> ThreadId {
        ThreadId(self.public_key_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The 32-byte seed; this is what invites carry.
    pub fn secret_bytes(&self) -> &[u8; 32] {
        self.signing_key.as_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    // Clamped X25519 scalar matching the Ed25519 public key (used by sealed boxes).
    pub(crate) fn scalar_bytes(&self) -> [u8; 32] {
        self.signing_key.to_scalar_bytes()
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.peer_id())
            .finish_non_exhaustive()
    }
}

/// Check a detached Ed25519 signature made by `pubkey_bytes`.
pub fn verify_signature(
    pubkey_bytes: &[u8; 32],
    message: &[u8],
    signature: &[u8],
) -> Result<(), IdentityError> {
    let verifying_key =
        VerifyingKey::from_bytes(pubkey_bytes).map_err(|_| IdentityError::InvalidKeyBytes)?;
    let signature =
        Signature::from_slice(signature).map_err(|_| IdentityError::InvalidSignature)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| IdentityError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_restore() {
        let id = Identity::generate();
        let restored = Identity::from_secret_bytes(id.secret_bytes());
        assert_eq!(id.peer_id(), restored.peer_id());

        let from_slice = Identity::from_secret_slice(&id.secret_bytes()[..]).unwrap();
        assert_eq!(id.public_key_bytes(), from_slice.public_key_bytes());
        assert!(Identity::from_secret_slice(&[1u8; 16]).is_err());
    }

    #[test]
    fn test_sign_verify() {
        let id = Identity::generate();
        let message = b"Hello, thread!";
        let signature = id.sign(message).to_bytes();

        assert!(verify_signature(&id.public_key_bytes(), message, &signature).is_ok());

        assert!(verify_signature(&id.public_key_bytes(), b"wrong", &signature).is_err());

        assert!(verify_signature(&id.public_key_bytes(), message, &signature[..10]).is_err());
    }

    #[test]
    fn test_ids_share_public_key() {
        let id = Identity::generate();
        assert_eq!(id.peer_id().0, id.thread_id().0);
    }
}
