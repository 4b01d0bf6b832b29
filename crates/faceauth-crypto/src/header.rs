//! Fixed-size file header
//!
//! Binary format (all integers little-endian):
//! ```text
//! offset  size  field
//! 0       8     magic "FACEAUTH"
//! 8       4     format version (u32)
//! 12      16    KDF algorithm id (ASCII, NUL-padded)
//! 28      32    salt
//! 60      12    base nonce
//! 72      256   original file name (UTF-8, NUL-padded, truncated on a char boundary)
//! 328     8     plaintext size (u64)
//! 336     32    SHA-256 over bytes 0..336
//! ```
//!
//! Every field sits at a constant offset, so the body always starts at
//! [`HEADER_LEN`]. Decoding is deliberately cheap: foreign or corrupted files
//! are rejected before any key derivation is attempted.

use sha2::{Digest, Sha256};
use std::io::Read;
use subtle::ConstantTimeEq;

use faceauth_core::{FaceauthError, FaceauthResult, KdfAlgorithm};

use crate::{NONCE_SIZE, SALT_SIZE};

pub const MAGIC: &[u8; 8] = b"FACEAUTH";
pub const FORMAT_VERSION: u32 = 1;

pub const ALGORITHM_FIELD_LEN: usize = 16;
pub const NAME_FIELD_LEN: usize = 256;
pub const CHECKSUM_LEN: usize = 32;

const OFF_VERSION: usize = 8;
const OFF_ALGORITHM: usize = 12;
const OFF_SALT: usize = OFF_ALGORITHM + ALGORITHM_FIELD_LEN;
const OFF_NONCE: usize = OFF_SALT + SALT_SIZE;
const OFF_NAME: usize = OFF_NONCE + NONCE_SIZE;
const OFF_SIZE: usize = OFF_NAME + NAME_FIELD_LEN;
const OFF_CHECKSUM: usize = OFF_SIZE + 8;

/// Total header length; the first chunk starts here.
pub const HEADER_LEN: usize = OFF_CHECKSUM + CHECKSUM_LEN;

/// A decoded, checksum-verified header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub algorithm: KdfAlgorithm,
    pub salt: [u8; SALT_SIZE],
    pub base_nonce: [u8; NONCE_SIZE],
    /// Name as stored (possibly truncated). Also the KDF context.
    pub original_name: String,
    pub plaintext_size: u64,
    pub checksum: [u8; CHECKSUM_LEN],
}

/// Longest prefix of `name` that fits the name field without splitting a
/// UTF-8 sequence, cut at the first NUL.
pub fn stored_name(name: &str) -> &str {
    let name = name.split('\0').next().unwrap_or_default();
    if name.len() <= NAME_FIELD_LEN {
        return name;
    }
    let mut end = NAME_FIELD_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Serialize a header. The checksum is computed here.
pub fn encode_header(
    salt: &[u8; SALT_SIZE],
    base_nonce: &[u8; NONCE_SIZE],
    algorithm: KdfAlgorithm,
    original_name: &str,
    plaintext_size: u64,
) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[..OFF_VERSION].copy_from_slice(MAGIC);
    buf[OFF_VERSION..OFF_ALGORITHM].copy_from_slice(&FORMAT_VERSION.to_le_bytes());

    let id = algorithm.header_id().as_bytes();
    buf[OFF_ALGORITHM..OFF_ALGORITHM + id.len()].copy_from_slice(id);

    buf[OFF_SALT..OFF_NONCE].copy_from_slice(salt);
    buf[OFF_NONCE..OFF_NAME].copy_from_slice(base_nonce);

    let name = stored_name(original_name).as_bytes();
    buf[OFF_NAME..OFF_NAME + name.len()].copy_from_slice(name);

    buf[OFF_SIZE..OFF_CHECKSUM].copy_from_slice(&plaintext_size.to_le_bytes());

    let checksum = Sha256::digest(&buf[..OFF_CHECKSUM]);
    buf[OFF_CHECKSUM..].copy_from_slice(&checksum);
    buf
}

/// Parse and verify a header.
///
/// Only `bytes[..HEADER_LEN]` is examined; anything after it is body.
pub fn decode_header(bytes: &[u8]) -> FaceauthResult<FileHeader> {
    if bytes.len() < HEADER_LEN {
        return Err(FaceauthError::MalformedHeader(format!(
            "input is {} bytes, header needs {HEADER_LEN}",
            bytes.len()
        )));
    }
    let buf = &bytes[..HEADER_LEN];

    if &buf[..OFF_VERSION] != MAGIC {
        return Err(FaceauthError::MalformedHeader(
            "magic marker mismatch: not a faceauth file".into(),
        ));
    }

    let version = u32::from_le_bytes(field(buf, OFF_VERSION));
    if version != FORMAT_VERSION {
        return Err(FaceauthError::MalformedHeader(format!(
            "unsupported format version {version} (expected {FORMAT_VERSION})"
        )));
    }

    let expected = Sha256::digest(&buf[..OFF_CHECKSUM]);
    let checksum: [u8; CHECKSUM_LEN] = field(buf, OFF_CHECKSUM);
    if !bool::from(expected.as_slice().ct_eq(&checksum)) {
        return Err(FaceauthError::MalformedHeader("header checksum mismatch".into()));
    }

    let algorithm_field = trim_nul(&buf[OFF_ALGORITHM..OFF_SALT]);
    let algorithm = std::str::from_utf8(algorithm_field)
        .ok()
        .and_then(KdfAlgorithm::from_header_id)
        .ok_or_else(|| {
            FaceauthError::MalformedHeader(format!(
                "unknown KDF algorithm id {:?}",
                String::from_utf8_lossy(algorithm_field)
            ))
        })?;

    let original_name = std::str::from_utf8(trim_nul(&buf[OFF_NAME..OFF_SIZE]))
        .map_err(|_| FaceauthError::MalformedHeader("original name is not UTF-8".into()))?
        .to_string();

    Ok(FileHeader {
        version,
        algorithm,
        salt: field(buf, OFF_SALT),
        base_nonce: field(buf, OFF_NONCE),
        original_name,
        plaintext_size: u64::from_le_bytes(field(buf, OFF_SIZE)),
        checksum,
    })
}

/// KDF context for a file: the stored name followed by the plaintext size
/// (u64 LE). Every header field except the checksum then feeds the key or the
/// nonces, so editing any of them makes decryption fail authentication.
pub fn key_context(original_name: &str, plaintext_size: u64) -> Vec<u8> {
    let name = stored_name(original_name).as_bytes();
    let mut context = Vec::with_capacity(name.len() + 8);
    context.extend_from_slice(name);
    context.extend_from_slice(&plaintext_size.to_le_bytes());
    context
}

/// Read exactly one header from the start of a stream.
pub fn read_header<R: Read>(reader: &mut R) -> FaceauthResult<FileHeader> {
    let mut buf = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    decode_header(&buf[..filled])
}

fn field<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

fn trim_nul(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> [u8; HEADER_LEN] {
        encode_header(
            &[0x11u8; SALT_SIZE],
            &[0x22u8; NONCE_SIZE],
            KdfAlgorithm::Argon2id,
            "notes.txt",
            45,
        )
    }

    #[test]
    fn test_key_context_binds_name_and_size() {
        let ctx = key_context("notes.txt", 45);
        assert_eq!(&ctx[..9], b"notes.txt");
        assert_eq!(&ctx[9..], &45u64.to_le_bytes());

        assert_ne!(key_context("notes.txt", 45), key_context("notes.txt", 10));
        assert_ne!(key_context("notes.txt", 45), key_context("notes.tx", 45));
        assert_eq!(key_context("a\0b", 1), key_context("a", 1));
    }

    #[test]
    fn test_layout_offsets() {
        assert_eq!(OFF_ALGORITHM, 12);
        assert_eq!(OFF_SALT, 28);
        assert_eq!(OFF_NONCE, 60);
        assert_eq!(OFF_NAME, 72);
        assert_eq!(OFF_SIZE, 328);
        assert_eq!(OFF_CHECKSUM, 336);
        assert_eq!(HEADER_LEN, 368);
    }

    #[test]
    fn test_encode_decode() {
        let bytes = sample();
        assert_eq!(&bytes[..8], b"FACEAUTH");
        assert_eq!(&bytes[12..20], b"ARGON2ID");
        assert_eq!(&bytes[20..28], &[0u8; 8]);

        let header = decode_header(&bytes).unwrap();
        assert_eq!(header.version, FORMAT_VERSION);
        assert_eq!(header.algorithm, KdfAlgorithm::Argon2id);
        assert_eq!(header.salt, [0x11u8; SALT_SIZE]);
        assert_eq!(header.base_nonce, [0x22u8; NONCE_SIZE]);
        assert_eq!(header.original_name, "notes.txt");
        assert_eq!(header.plaintext_size, 45);
        assert_eq!(&header.checksum[..], &bytes[336..]);
    }

    #[test]
    fn test_every_algorithm_survives() {
        for alg in KdfAlgorithm::ALL {
            let bytes = encode_header(&[0u8; SALT_SIZE], &[0u8; NONCE_SIZE], alg, "f", 0);
            assert_eq!(decode_header(&bytes).unwrap().algorithm, alg);
        }
    }

    #[test]
    fn test_long_name_truncated_on_char_boundary() {
        // 255 ASCII bytes + a 2-byte char straddles the 256-byte limit
        let name = format!("{}é.txt", "a".repeat(255));
        let bytes = encode_header(&[0u8; SALT_SIZE], &[0u8; NONCE_SIZE], KdfAlgorithm::Scrypt, &name, 1);

        let header = decode_header(&bytes).unwrap();
        assert_eq!(header.original_name, "a".repeat(255));
        assert_eq!(header.original_name, stored_name(&name));
    }

    #[test]
    fn test_name_stops_at_nul() {
        assert_eq!(stored_name("abc\0def"), "abc");
        let bytes = encode_header(&[0u8; SALT_SIZE], &[0u8; NONCE_SIZE], KdfAlgorithm::Scrypt, "abc\0def", 1);
        assert_eq!(decode_header(&bytes).unwrap().original_name, "abc");
    }

    #[test]
    fn test_short_input_rejected() {
        let bytes = sample();
        let err = decode_header(&bytes[..HEADER_LEN - 1]).unwrap_err();
        assert!(matches!(err, FaceauthError::MalformedHeader(_)));
        assert!(decode_header(&[]).is_err());
    }

    #[test]
    fn test_trailing_body_ignored() {
        let mut bytes = sample().to_vec();
        bytes.extend_from_slice(&[0xFFu8; 64]);
        assert!(decode_header(&bytes).is_ok());
    }

    #[test]
    fn test_every_byte_is_protected() {
        let bytes = sample();
        for i in 0..HEADER_LEN {
            let mut corrupted = bytes;
            corrupted[i] ^= 0x01;
            let err = decode_header(&corrupted).unwrap_err();
            assert!(
                matches!(err, FaceauthError::MalformedHeader(_)),
                "byte {i} flip must be rejected"
            );
        }
    }

    #[test]
    fn test_foreign_file_message() {
        let mut bytes = sample();
        bytes[..8].copy_from_slice(b"\x89PNG\r\n\x1a\n");
        let err = decode_header(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = sample();
        bytes[8..12].copy_from_slice(&2u32.to_le_bytes());
        let err = decode_header(&bytes).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_unknown_algorithm_with_valid_checksum() {
        let mut bytes = sample();
        bytes[12..28].copy_from_slice(b"BCRYPT\0\0\0\0\0\0\0\0\0\0");
        let checksum = Sha256::digest(&bytes[..OFF_CHECKSUM]);
        bytes[OFF_CHECKSUM..].copy_from_slice(&checksum);

        let err = decode_header(&bytes).unwrap_err();
        assert!(err.to_string().contains("KDF algorithm"));
    }

    #[test]
    fn test_read_header_from_stream() {
        let mut data = sample().to_vec();
        data.extend_from_slice(b"body");
        let mut cursor = std::io::Cursor::new(data);

        let header = read_header(&mut cursor).unwrap();
        assert_eq!(header.plaintext_size, 45);
        assert_eq!(cursor.position(), HEADER_LEN as u64);

        let mut short = std::io::Cursor::new(vec![0u8; 100]);
        assert!(matches!(
            read_header(&mut short).unwrap_err(),
            FaceauthError::MalformedHeader(_)
        ));
    }
}
