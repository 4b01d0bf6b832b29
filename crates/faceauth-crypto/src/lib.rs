//! faceauth-crypto: file encryption keyed by a biometric feature vector
//!
//! The key is never stored. Every encrypt/decrypt re-derives it from the
//! caller's feature vector, the salt in the file header, and the file's stored
//! name.
//!
//! Pipeline:
//! ```text
//! FeatureVector ─ normalize ─► NormalizedEmbedding
//!                                  │  + salt (header) + SHA-256(original name)
//!                                  ▼
//!                     PBKDF2 | scrypt | Argon2id | Combined ─► DerivedKey (zeroized)
//!                                  │
//! plaintext ─ 1 MiB chunks ─ AES-256-GCM(nonce = base[0..8] || index BE32) ─► body
//! ```
//!
//! File layout (little-endian integers):
//! ```text
//! [368-byte header: magic, version, kdf id, salt, base nonce, name, size, SHA-256]
//! [u32 len][ciphertext || 16-byte tag]  (repeated per chunk)
//! ```

pub mod chunk;
pub mod embedding;
pub mod engine;
pub mod header;
pub mod kdf;
pub mod observer;
pub mod secret;
pub mod secure;

pub use chunk::{
    decrypt_stream, decrypt_stream_with, encrypt_stream, encrypt_stream_with, StreamControl,
    StreamStats,
};
pub use embedding::{normalize, FeatureVector, NormalizedEmbedding};
pub use engine::{DecryptedFile, EncryptedFile, Engine, FileOptions};
pub use header::{decode_header, encode_header, key_context, FileHeader, HEADER_LEN, MAGIC};
pub use kdf::{derive_key, generate_salt, verify_key, DerivedKey, KdfParams};
pub use observer::{CryptoObserver, NoopObserver, TracingObserver};
pub use secret::SecretSource;

pub use faceauth_core::{FaceauthError, FaceauthResult, KdfAlgorithm};

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the per-file KDF salt
pub const SALT_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Maximum plaintext bytes per chunk (1 MiB)
pub const CHUNK_SIZE: usize = 1024 * 1024;
