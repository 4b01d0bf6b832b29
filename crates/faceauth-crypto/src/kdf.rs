//! Key derivation: normalized embedding + salt (+ context) → 256-bit file key

use argon2::{Algorithm, Argon2, Version};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use faceauth_core::{FaceauthError, FaceauthResult, KdfAlgorithm};

use crate::embedding::NormalizedEmbedding;
use crate::{KEY_SIZE, SALT_SIZE};

/// A 256-bit symmetric key derived for a single file operation.
///
/// Never persisted. [`secure_erase`](Self::secure_erase) overwrites the
/// backing bytes with random data and then zeroes them; it runs at most once
/// and is repeated automatically on drop, so every exit path scrubs the key.
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
    erased: bool,
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self {
            bytes,
            erased: false,
        }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub fn is_erased(&self) -> bool {
        self.erased
    }

    /// Scrub the key material. Idempotent.
    pub fn secure_erase(&mut self) {
        if self.erased {
            return;
        }
        rand::thread_rng().fill_bytes(&mut self.bytes);
        self.bytes.zeroize();
        self.erased = true;
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.secure_erase();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .field("erased", &self.erased)
            .finish()
    }
}

/// Cost parameters for every KDF variant.
///
/// The defaults are part of the on-disk format: a file can only be decrypted
/// with the costs it was encrypted with, and the header does not record them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// PBKDF2-HMAC-SHA256 iterations (default: 100,000)
    pub pbkdf2_iterations: u32,
    /// scrypt log2(N) (default: 14, N = 16384)
    pub scrypt_log_n: u8,
    /// scrypt block size r (default: 8)
    pub scrypt_r: u32,
    /// scrypt parallelism p (default: 1)
    pub scrypt_p: u32,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (default: 2)
    pub argon2_time_cost: u32,
    /// Argon2id lanes (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: 100_000,
            scrypt_log_n: 14,
            scrypt_r: 8,
            scrypt_p: 1,
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
        }
    }
}

/// Generate a fresh random salt for one encryption.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from a normalized embedding.
///
/// When `context` is given, `SHA-256(context)` is appended to the embedding
/// bytes before derivation, so the same embedding and salt yield a different
/// key per context. `Some(b"")` and `None` are distinct contexts.
pub fn derive_key(
    embedding: &NormalizedEmbedding,
    salt: &[u8; SALT_SIZE],
    context: Option<&[u8]>,
    algorithm: KdfAlgorithm,
    params: &KdfParams,
) -> FaceauthResult<DerivedKey> {
    let secret = key_material(embedding, context);
    let mut out = Zeroizing::new([0u8; KEY_SIZE]);

    match algorithm {
        KdfAlgorithm::Pbkdf2Sha256 => pbkdf2_into(&secret, salt, params, &mut out)?,
        KdfAlgorithm::Scrypt => scrypt_into(&secret, salt, params, &mut out)?,
        KdfAlgorithm::Argon2id => argon2_into(&secret, salt, params, &mut out)?,
        KdfAlgorithm::Combined => combined_into(&secret, salt, params, &mut out)?,
    }

    Ok(DerivedKey::from_bytes(*out))
}

/// Re-derive and compare against `expected` in constant time.
///
/// Never fails: any derivation error reads as a mismatch.
pub fn verify_key(
    embedding: &NormalizedEmbedding,
    salt: &[u8; SALT_SIZE],
    context: Option<&[u8]>,
    algorithm: KdfAlgorithm,
    params: &KdfParams,
    expected: &[u8],
) -> bool {
    match derive_key(embedding, salt, context, algorithm, params) {
        Ok(key) => key.as_bytes().as_slice().ct_eq(expected).into(),
        Err(e) => {
            tracing::debug!(algorithm = %algorithm, "key verification derivation failed: {e}");
            false
        }
    }
}

/// embedding bytes || SHA-256(context)
fn key_material(embedding: &NormalizedEmbedding, context: Option<&[u8]>) -> Zeroizing<Vec<u8>> {
    let mut material = Zeroizing::new(Vec::with_capacity(embedding.as_bytes().len() + 32));
    material.extend_from_slice(embedding.as_bytes());
    if let Some(context) = context {
        material.extend_from_slice(&Sha256::digest(context));
    }
    material
}

fn pbkdf2_into(
    secret: &[u8],
    salt: &[u8],
    params: &KdfParams,
    out: &mut [u8; KEY_SIZE],
) -> FaceauthResult<()> {
    if params.pbkdf2_iterations == 0 {
        return Err(FaceauthError::KeyDerivation(
            "PBKDF2 iteration count must be positive".into(),
        ));
    }
    pbkdf2::pbkdf2::<Hmac<Sha256>>(secret, salt, params.pbkdf2_iterations, out)
        .map_err(|e| FaceauthError::KeyDerivation(format!("PBKDF2-SHA256 failed: {e}")))
}

fn scrypt_into(
    secret: &[u8],
    salt: &[u8],
    params: &KdfParams,
    out: &mut [u8; KEY_SIZE],
) -> FaceauthResult<()> {
    let scrypt_params =
        scrypt::Params::new(params.scrypt_log_n, params.scrypt_r, params.scrypt_p, KEY_SIZE)
            .map_err(|e| FaceauthError::KeyDerivation(format!("invalid scrypt params: {e}")))?;
    scrypt::scrypt(secret, salt, &scrypt_params, out)
        .map_err(|e| FaceauthError::KeyDerivation(format!("scrypt failed: {e}")))
}

fn argon2_into(
    secret: &[u8],
    salt: &[u8],
    params: &KdfParams,
    out: &mut [u8; KEY_SIZE],
) -> FaceauthResult<()> {
    let argon2_params = argon2::Params::new(
        params.argon2_mem_cost_kib,
        params.argon2_time_cost,
        params.argon2_parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| FaceauthError::KeyDerivation(format!("invalid Argon2id params: {e}")))?;

    Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params)
        .hash_password_into(secret, salt, out)
        .map_err(|e| FaceauthError::KeyDerivation(format!("Argon2id failed: {e}")))
}

/// PBKDF2 over salt[0..16], scrypt over salt[16..32], Argon2id over the whole
/// salt, folded as HMAC-SHA256(key = salt, k1 || k2 || k3).
fn combined_into(
    secret: &[u8],
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
    out: &mut [u8; KEY_SIZE],
) -> FaceauthResult<()> {
    let (salt_lo, salt_hi) = salt.split_at(SALT_SIZE / 2);

    let mut k1 = Zeroizing::new([0u8; KEY_SIZE]);
    let mut k2 = Zeroizing::new([0u8; KEY_SIZE]);
    let mut k3 = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2_into(secret, salt_lo, params, &mut k1)?;
    scrypt_into(secret, salt_hi, params, &mut k2)?;
    argon2_into(secret, salt, params, &mut k3)?;

    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(salt)
        .map_err(|e| FaceauthError::KeyDerivation(format!("HMAC init failed: {e}")))?;
    mac.update(k1.as_slice());
    mac.update(k2.as_slice());
    mac.update(k3.as_slice());

    let mut folded = mac.finalize().into_bytes();
    out.copy_from_slice(&folded);
    folded.as_mut_slice().zeroize();
    Ok(())
}
