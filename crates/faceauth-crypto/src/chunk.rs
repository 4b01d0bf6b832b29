//! Chunked AES-256-GCM body stream
//!
//! Body format (binary), repeated once per chunk:
//! ```text
//! [4 bytes: ciphertext length, u32 LE][ciphertext][16 bytes: GCM tag]
//! nonce_i = base_nonce[0..8] || i (u32, big-endian)
//! ```
//!
//! Plaintext is cut into [`CHUNK_SIZE`] pieces; only the last may be shorter
//! and empty input produces no chunks. Each (key, base nonce) pair encrypts
//! exactly one file, and within a file each index is used once, so no nonce
//! ever repeats under a key. Files needing more than 2^32 chunks are refused.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use std::io::{self, Read, Write};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use faceauth_core::{FaceauthError, FaceauthResult};

use crate::kdf::DerivedKey;
use crate::observer::{CryptoObserver, NoopObserver};
use crate::{CHUNK_SIZE, NONCE_SIZE, TAG_SIZE};

/// Width of the per-chunk length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest legal value of a length prefix.
pub const MAX_CHUNK_CIPHERTEXT: usize = CHUNK_SIZE + TAG_SIZE;

/// Totals reported by [`encrypt_stream`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub chunk_count: u64,
    /// Body bytes written: length prefixes, ciphertext and tags.
    pub ciphertext_bytes: u64,
    pub plaintext_bytes: u64,
}

/// Hooks consulted between chunks.
#[derive(Clone, Copy)]
pub struct StreamControl<'a> {
    pub observer: &'a dyn CryptoObserver,
    /// Checked before every chunk; a cancelled token stops the stream.
    pub cancel: Option<&'a CancellationToken>,
}

impl Default for StreamControl<'_> {
    fn default() -> Self {
        Self {
            observer: &NoopObserver,
            cancel: None,
        }
    }
}

impl StreamControl<'_> {
    fn check_cancelled(&self) -> FaceauthResult<()> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(FaceauthError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Generate a fresh random base nonce for one encryption.
pub fn generate_base_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Nonce for chunk `index`: the first 8 bytes of the base nonce followed by
/// the index as a big-endian u32. The last 4 base-nonce bytes are unused.
pub fn chunk_nonce(base_nonce: &[u8; NONCE_SIZE], index: u32) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..8].copy_from_slice(&base_nonce[..8]);
    nonce[8..].copy_from_slice(&index.to_be_bytes());
    nonce
}

/// AES-256-GCM bound to one file's key and base nonce.
pub struct ChunkCipher {
    cipher: Aes256Gcm,
    base_nonce: [u8; NONCE_SIZE],
}

impl ChunkCipher {
    pub fn new(key: &DerivedKey, base_nonce: &[u8; NONCE_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
            base_nonce: *base_nonce,
        }
    }

    /// Encrypt one chunk. Returns `ciphertext || tag`.
    pub fn seal(&self, index: u32, plaintext: &[u8]) -> FaceauthResult<Vec<u8>> {
        let nonce = chunk_nonce(&self.base_nonce, index);
        self.cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| {
                FaceauthError::Resource(io::Error::other(format!(
                    "chunk {index} encryption failed"
                )))
            })
    }

    /// Decrypt and authenticate one chunk.
    pub fn open(&self, index: u32, sealed: &[u8]) -> FaceauthResult<Zeroizing<Vec<u8>>> {
        if sealed.len() < TAG_SIZE {
            return Err(FaceauthError::Authentication);
        }
        let nonce = chunk_nonce(&self.base_nonce, index);
        self.cipher
            .decrypt(Nonce::from_slice(&nonce), sealed)
            .map(Zeroizing::new)
            .map_err(|_| FaceauthError::Authentication)
    }
}

/// Encrypt everything `reader` yields into length-prefixed chunks.
pub fn encrypt_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    key: &DerivedKey,
    base_nonce: &[u8; NONCE_SIZE],
) -> FaceauthResult<StreamStats> {
    encrypt_stream_with(reader, writer, key, base_nonce, StreamControl::default())
}

/// [`encrypt_stream`] with an observer and cancellation.
pub fn encrypt_stream_with<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    key: &DerivedKey,
    base_nonce: &[u8; NONCE_SIZE],
    control: StreamControl<'_>,
) -> FaceauthResult<StreamStats> {
    let cipher = ChunkCipher::new(key, base_nonce);
    let mut buf = Zeroizing::new(vec![0u8; CHUNK_SIZE]);
    let mut stats = StreamStats::default();

    loop {
        control.check_cancelled()?;

        let n = read_full(reader, &mut buf)?;
        if n == 0 {
            break;
        }

        let index = u32::try_from(stats.chunk_count).map_err(|_| {
            FaceauthError::Resource(io::Error::new(
                io::ErrorKind::InvalidInput,
                "input exceeds the maximum chunk count",
            ))
        })?;
        let sealed = cipher.seal(index, &buf[..n])?;
        let len = sealed.len() as u32;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&sealed)?;

        control.observer.chunk_processed(index, n);
        stats.chunk_count += 1;
        stats.plaintext_bytes += n as u64;
        stats.ciphertext_bytes += (LENGTH_PREFIX_LEN + sealed.len()) as u64;

        // read_full only comes up short at end of input
        if n < CHUNK_SIZE {
            break;
        }
    }

    Ok(stats)
}

/// Decrypt length-prefixed chunks until `expected_plaintext_size` bytes have
/// been written. Returns the number of plaintext bytes written.
///
/// Fails with `Authentication` on the first bad tag or malformed chunk frame,
/// and with `TruncatedFile` when input ends cleanly before the promised size.
/// Output written before a failure must be discarded by the caller.
pub fn decrypt_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    key: &DerivedKey,
    base_nonce: &[u8; NONCE_SIZE],
    expected_plaintext_size: u64,
) -> FaceauthResult<u64> {
    decrypt_stream_with(
        reader,
        writer,
        key,
        base_nonce,
        expected_plaintext_size,
        StreamControl::default(),
    )
}

/// [`decrypt_stream`] with an observer and cancellation.
pub fn decrypt_stream_with<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    key: &DerivedKey,
    base_nonce: &[u8; NONCE_SIZE],
    expected_plaintext_size: u64,
    control: StreamControl<'_>,
) -> FaceauthResult<u64> {
    let cipher = ChunkCipher::new(key, base_nonce);
    let mut sealed = Vec::with_capacity(MAX_CHUNK_CIPHERTEXT);
    let mut written = 0u64;
    let mut index = 0u64;

    while written < expected_plaintext_size {
        control.check_cancelled()?;

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        match read_full(reader, &mut prefix)? {
            0 => {
                return Err(FaceauthError::TruncatedFile {
                    expected: expected_plaintext_size,
                    actual: written,
                })
            }
            LENGTH_PREFIX_LEN => {}
            // A torn prefix means the chunk frame itself is damaged.
            _ => return Err(FaceauthError::Authentication),
        }

        let len = u32::from_le_bytes(prefix) as usize;
        if !(TAG_SIZE..=MAX_CHUNK_CIPHERTEXT).contains(&len) {
            return Err(FaceauthError::Authentication);
        }
        sealed.resize(len, 0);
        if read_full(reader, &mut sealed)? < len {
            return Err(FaceauthError::Authentication);
        }

        let chunk_index = u32::try_from(index).map_err(|_| FaceauthError::Authentication)?;
        let plaintext = cipher.open(chunk_index, &sealed)?;

        let remaining = expected_plaintext_size - written;
        let take = (plaintext.len() as u64).min(remaining) as usize;
        writer.write_all(&plaintext[..take])?;

        control.observer.chunk_processed(chunk_index, take);
        written += take as u64;
        index += 1;
    }

    let mut probe = [0u8; 1];
    if read_full(reader, &mut probe)? > 0 {
        tracing::warn!(
            chunks = index,
            "ignoring trailing data after the final chunk"
        );
    }

    Ok(written)
}

/// Fill `buf` from `reader`, stopping early only at end of input.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
