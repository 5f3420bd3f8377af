/// Protocol version carried by peers that speak the thread protocol
pub const PROTOCOL_VERSION: &str = "/skein/thread/1.0.0";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Ed25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Ed25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// X25519 ephemeral public key prepended to sealed boxes
pub const EPHEMERAL_KEY_SIZE: usize = 32;

/// Maximum serialized envelope size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Multihash code for BLAKE3 (256-bit output)
pub const MULTIHASH_BLAKE3: u8 = 0x1e;

/// Multihash digest length for BLAKE3
pub const MULTIHASH_BLAKE3_LEN: u8 = 32;

/// Prefix of the data id carried by an ignore block
pub const IGNORE_PREFIX: &str = "ignore-";

/// Key derivation context for sealed boxes (BLAKE3)
pub const KDF_CONTEXT_SEALED_BOX: &str = "skein-sealed-box-v1";
