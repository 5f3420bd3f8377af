use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use ed25519_dalek::VerifyingKey;
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::constants::{EPHEMERAL_KEY_SIZE, KDF_CONTEXT_SEALED_BOX, NONCE_SIZE};
use crate::error::CryptoError;
use crate::identity::Identity;

pub type SymmetricKey = [u8; 32];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Parse a symmetric key of unchecked length.
pub fn symmetric_key_from_slice(key: &[u8]) -> Result<SymmetricKey, CryptoError> {
    key.try_into().map_err(|_| CryptoError::InvalidKeyLength)
}

/// Encrypt under a thread or invite key. Output: nonce (24) || ciphertext.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    encrypt_after(key, &[], plaintext)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
    XChaCha20Poly1305::new(key.into())
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

// prefix || nonce || ciphertext, with a fresh random nonce
fn encrypt_after(key: &SymmetricKey, prefix: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let sealed = XChaCha20Poly1305::new(key.into())
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok([prefix, nonce.as_slice(), sealed.as_slice()].concat())
}

// BLAKE3 KDF over the DH output, bound to both public halves
fn derive_sealing_key(shared: &[u8], ephemeral: &[u8], recipient: &[u8]) -> SymmetricKey {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_SEALED_BOX);
    hasher.update(shared);
    hasher.update(ephemeral);
    hasher.update(recipient);
    *hasher.finalize().as_bytes()
}

/// Encrypt to the holder of an Ed25519 public key.
///
/// The key is mapped to its X25519 (Montgomery) form, a fresh ephemeral
/// X25519 key agrees a shared secret with it, and the payload is sealed with
/// XChaCha20-Poly1305 under a BLAKE3-derived key.
///
/// Output: ephemeral public key (32) || nonce (24) || ciphertext.
pub fn seal(recipient_pk: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let verifying_key =
        VerifyingKey::from_bytes(recipient_pk).map_err(|_| CryptoError::InvalidPublicKey)?;
    let recipient = PublicKey::from(verifying_key.to_montgomery().to_bytes());

    let ephemeral = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_pk = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient);

    let key = derive_sealing_key(shared.as_bytes(), ephemeral_pk.as_bytes(), recipient.as_bytes());
    encrypt_after(&key, ephemeral_pk.as_bytes(), plaintext)
}

/// Open a box produced by [`seal`] for this identity's public key.
pub fn open(identity: &Identity, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < EPHEMERAL_KEY_SIZE + NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (ephemeral_bytes, ciphertext) = data.split_at(EPHEMERAL_KEY_SIZE);
    let mut ephemeral = [0u8; EPHEMERAL_KEY_SIZE];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let ephemeral_pk = PublicKey::from(ephemeral);

    let secret = StaticSecret::from(identity.scalar_bytes());
    let recipient = PublicKey::from(&secret);
    let shared = secret.diffie_hellman(&ephemeral_pk);

    let key = derive_sealing_key(shared.as_bytes(), ephemeral_pk.as_bytes(), recipient.as_bytes());
    decrypt(&key, ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_layout_and_round_trip() {
        let key = generate_symmetric_key();
        let secret = Identity::generate();

        let sealed = encrypt(&key, secret.secret_bytes()).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + 32 + 16);
        assert_eq!(decrypt(&key, &sealed).unwrap(), secret.secret_bytes());

        // Fresh nonce each time.
        assert_ne!(encrypt(&key, b"caption").unwrap(), encrypt(&key, b"caption").unwrap());
    }

    #[test]
    fn test_symmetric_rejects_bad_input() {
        let key = generate_symmetric_key();
        let mut sealed = encrypt(&key, b"username").unwrap();

        assert!(decrypt(&generate_symmetric_key(), &sealed).is_err());
        assert!(decrypt(&key, &sealed[..NONCE_SIZE - 1]).is_err());

        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(decrypt(&key, &sealed).is_err());
    }

    #[test]
    fn test_sealed_box_opens_only_for_recipient() {
        let recipient = Identity::generate();
        let stranger = Identity::generate();
        let sealed = seal(&recipient.public_key_bytes(), b"thread key").unwrap();

        assert_eq!(open(&recipient, &sealed).unwrap(), b"thread key");
        assert!(open(&stranger, &sealed).is_err());
        assert!(open(&recipient, &sealed[..EPHEMERAL_KEY_SIZE]).is_err());
    }

    #[test]
    fn test_symmetric_key_from_slice() {
        assert!(symmetric_key_from_slice(&[0u8; 32]).is_ok());
        assert!(symmetric_key_from_slice(&[0u8; 31]).is_err());
    }
}
