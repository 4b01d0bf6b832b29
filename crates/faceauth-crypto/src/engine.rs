//! File-level encrypt / decrypt / inspect / rekey
//!
//! One call drives one file through the pipeline synchronously. The engine
//! holds no mutable state, so a shared `Engine` may serve concurrent calls
//! on distinct paths. Keys are derived fresh on every call and scrubbed on
//! every exit path.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use faceauth_core::config::FaceauthConfig;
use faceauth_core::{FaceauthError, FaceauthResult, KdfAlgorithm};

use crate::chunk::{decrypt_stream_with, encrypt_stream_with, generate_base_nonce, StreamControl};
use crate::embedding::{normalize, FeatureVector, NormalizedEmbedding};
use crate::header::{
    decode_header, encode_header, key_context, read_header, stored_name, FileHeader,
};
use crate::kdf::{derive_key, generate_salt, DerivedKey, KdfParams};
use crate::observer::{CryptoObserver, NoopObserver};
use crate::secret::SecretSource;
use crate::secure::{parent_dir, ScopedOutput, ScrubbedTempFile};

/// Per-call options shared by encrypt and decrypt.
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    /// Explicit output path. Defaults to `<input>.<extension>` when encrypting
    /// and to the stored original name (beside the input) when decrypting.
    pub output: Option<PathBuf>,
    /// Checked between chunks; cancelling scrubs the partial output.
    pub cancel: Option<CancellationToken>,
}

/// Result of a successful encryption.
#[derive(Debug, Clone)]
pub struct EncryptedFile {
    pub path: PathBuf,
    pub header: FileHeader,
    pub chunk_count: u64,
    /// Total size on disk: header plus body.
    pub file_size: u64,
}

/// Result of a successful decryption.
#[derive(Debug, Clone)]
pub struct DecryptedFile {
    pub path: PathBuf,
    pub header: FileHeader,
    pub bytes_written: u64,
}

/// The encryption engine.
#[derive(Clone)]
pub struct Engine {
    config: FaceauthConfig,
    params: KdfParams,
    observer: Arc<dyn CryptoObserver>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(FaceauthConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Engine with the format's standard KDF costs.
    pub fn new(config: FaceauthConfig) -> Self {
        Self::with_params(config, KdfParams::default())
    }

    /// Engine with explicit KDF costs. Files written with non-default costs
    /// can only be read by an engine using the same costs.
    pub fn with_params(config: FaceauthConfig, params: KdfParams) -> Self {
        Self {
            config,
            params,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CryptoObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &FaceauthConfig {
        &self.config
    }

    pub fn default_algorithm(&self) -> KdfAlgorithm {
        self.config.crypto.default_algorithm
    }

    /// Encrypt `path` under a key derived from `vector`.
    pub fn encrypt_file(
        &self,
        path: &Path,
        vector: &FeatureVector,
        algorithm: KdfAlgorithm,
        options: &FileOptions,
    ) -> FaceauthResult<EncryptedFile> {
        let embedding = self.normalize(vector)?;

        let input = File::open(path)?;
        let plaintext_size = input.metadata()?.len();
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let destination = match &options.output {
            Some(output) => output.clone(),
            None => self.encrypted_path(path)?,
        };
        reject_same_path(path, &destination)?;

        let encrypted = self.seal(
            &mut BufReader::new(input),
            plaintext_size,
            &original_name,
            &embedding,
            algorithm,
            ScopedOutput::create(&destination, self.config.output.overwrite)?,
            options.cancel.as_ref(),
        )?;

        info!(
            input = %path.display(),
            output = %encrypted.path.display(),
            algorithm = %algorithm,
            chunks = encrypted.chunk_count,
            bytes = plaintext_size,
            "file encrypted"
        );
        Ok(encrypted)
    }

    /// Decrypt `path` with a key re-derived from `vector`.
    ///
    /// The header is validated before any key derivation happens.
    pub fn decrypt_file(
        &self,
        path: &Path,
        vector: &FeatureVector,
        options: &FileOptions,
    ) -> FaceauthResult<DecryptedFile> {
        let mut input = BufReader::new(File::open(path)?);
        let header = read_header(&mut input)?;
        debug!(
            path = %path.display(),
            algorithm = %header.algorithm,
            plaintext_size = header.plaintext_size,
            "header verified"
        );

        let embedding = self.normalize(vector)?;

        let destination = match &options.output {
            Some(output) => output.clone(),
            None => decrypted_path(path, &header.original_name)?,
        };
        reject_same_path(path, &destination)?;

        let output = ScopedOutput::create(&destination, self.config.output.overwrite)?;

        let mut key = self.derive(&embedding, &header)?;
        drop(embedding);

        let mut writer = BufWriter::new(output);
        let bytes_written = decrypt_stream_with(
            &mut input,
            &mut writer,
            &key,
            &header.base_nonce,
            header.plaintext_size,
            self.control(options.cancel.as_ref()),
        )?;
        key.secure_erase();

        let output = writer.into_inner().map_err(|e| FaceauthError::Resource(e.into_error()))?;
        let path_out = output.commit()?;

        info!(
            input = %path.display(),
            output = %path_out.display(),
            bytes = bytes_written,
            "file decrypted"
        );
        Ok(DecryptedFile {
            path: path_out,
            header,
            bytes_written,
        })
    }

    /// Read and verify the header of `path` without deriving any key.
    pub fn inspect_file(&self, path: &Path) -> FaceauthResult<FileHeader> {
        let mut input = BufReader::new(File::open(path)?);
        read_header(&mut input)
    }

    /// Re-encrypt `path` in place under `new_vector`, with a fresh salt and
    /// nonce. The plaintext passes through a temporary file that is scrubbed
    /// on every path; the encrypted file is replaced atomically.
    pub fn rekey_file(
        &self,
        path: &Path,
        old_vector: &FeatureVector,
        new_vector: &FeatureVector,
        algorithm: KdfAlgorithm,
    ) -> FaceauthResult<EncryptedFile> {
        let mut input = BufReader::new(File::open(path)?);
        let header = read_header(&mut input)?;

        let old_embedding = self.normalize(old_vector)?;
        let new_embedding = self.normalize(new_vector)?;

        let mut plaintext = ScrubbedTempFile::new_in(parent_dir(path))?;
        {
            let mut key = self.derive(&old_embedding, &header)?;
            let mut writer = BufWriter::new(&mut plaintext);
            decrypt_stream_with(
                &mut input,
                &mut writer,
                &key,
                &header.base_nonce,
                header.plaintext_size,
                self.control(None),
            )?;
            writer.flush()?;
            key.secure_erase();
        }
        drop(old_embedding);
        plaintext.seek(SeekFrom::Start(0))?;

        let encrypted = self.seal(
            &mut BufReader::new(&mut plaintext),
            header.plaintext_size,
            &header.original_name,
            &new_embedding,
            algorithm,
            ScopedOutput::create(path, true)?,
            None,
        )?;

        info!(
            path = %path.display(),
            from = %header.algorithm,
            to = %algorithm,
            "file rekeyed"
        );
        Ok(encrypted)
    }

    /// [`encrypt_file`](Self::encrypt_file) with the vector obtained from
    /// `source` and the configured default algorithm.
    pub fn encrypt_file_for(
        &self,
        source: &dyn SecretSource,
        identity: &str,
        path: &Path,
        options: &FileOptions,
    ) -> FaceauthResult<EncryptedFile> {
        let vector = source.obtain_secret(identity)?;
        self.encrypt_file(path, &vector, self.default_algorithm(), options)
    }

    /// [`decrypt_file`](Self::decrypt_file) with the vector obtained from
    /// `source`. The header is checked before the collaborator is asked.
    pub fn decrypt_file_for(
        &self,
        source: &dyn SecretSource,
        identity: &str,
        path: &Path,
        options: &FileOptions,
    ) -> FaceauthResult<DecryptedFile> {
        self.inspect_file(path)?;
        let vector = source.obtain_secret(identity)?;
        self.decrypt_file(path, &vector, options)
    }

    /// Header + body into `output`, committed only when every byte promised
    /// by the header was encrypted.
    #[allow(clippy::too_many_arguments)]
    fn seal<R: Read>(
        &self,
        reader: &mut R,
        plaintext_size: u64,
        original_name: &str,
        embedding: &NormalizedEmbedding,
        algorithm: KdfAlgorithm,
        output: ScopedOutput,
        cancel: Option<&CancellationToken>,
    ) -> FaceauthResult<EncryptedFile> {
        let salt = generate_salt();
        let base_nonce = generate_base_nonce();
        let name = stored_name(original_name);
        let header_bytes = encode_header(&salt, &base_nonce, algorithm, name, plaintext_size);
        let header = decode_header(&header_bytes)?;

        let mut key = self.derive(embedding, &header)?;

        let mut writer = BufWriter::new(output);
        writer.write_all(&header_bytes)?;
        let stats = encrypt_stream_with(reader, &mut writer, &key, &base_nonce, self.control(cancel))?;
        key.secure_erase();

        if stats.plaintext_bytes != plaintext_size {
            return Err(FaceauthError::Resource(std::io::Error::other(format!(
                "input changed while encrypting: expected {plaintext_size} bytes, read {}",
                stats.plaintext_bytes
            ))));
        }

        let output = writer.into_inner().map_err(|e| FaceauthError::Resource(e.into_error()))?;
        let path = output.commit()?;

        Ok(EncryptedFile {
            path,
            header,
            chunk_count: stats.chunk_count,
            file_size: header_bytes.len() as u64 + stats.ciphertext_bytes,
        })
    }

    fn normalize(&self, vector: &FeatureVector) -> FaceauthResult<NormalizedEmbedding> {
        if let Some(expected) = self.config.crypto.expected_dimension {
            if vector.dimension() != expected {
                return Err(FaceauthError::InvalidVector(format!(
                    "expected dimension {expected}, got {}",
                    vector.dimension()
                )));
            }
        }
        normalize(vector)
    }

    /// Derive the key for the file described by `header`, reporting to the
    /// observer.
    fn derive(
        &self,
        embedding: &NormalizedEmbedding,
        header: &FileHeader,
    ) -> FaceauthResult<DerivedKey> {
        let algorithm = header.algorithm;
        let context = key_context(&header.original_name, header.plaintext_size);
        self.observer.derivation_started(algorithm);
        let started = Instant::now();
        let result = derive_key(embedding, &header.salt, Some(context.as_slice()), algorithm, &self.params);
        let elapsed = started.elapsed();
        self.observer.derivation_finished(algorithm, elapsed);

        debug!(
            algorithm = %algorithm,
            elapsed_ms = elapsed.as_millis() as u64,
            ok = result.is_ok(),
            "key derivation"
        );
        result
    }

    fn control<'a>(&'a self, cancel: Option<&'a CancellationToken>) -> StreamControl<'a> {
        StreamControl {
            observer: self.observer.as_ref(),
            cancel,
        }
    }

    fn encrypted_path(&self, path: &Path) -> FaceauthResult<PathBuf> {
        let name = path.file_name().ok_or_else(|| {
            FaceauthError::Resource(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a file path: {}", path.display()),
            ))
        })?;
        let extension = self.config.output.extension.trim_start_matches('.');
        let mut encrypted = name.to_os_string();
        encrypted.push(".");
        encrypted.push(extension);
        Ok(path.with_file_name(encrypted))
    }
}

/// Destination for a decrypted file: the stored name's final component,
/// beside the encrypted file. Directory parts in the stored name are ignored.
fn decrypted_path(encrypted: &Path, original_name: &str) -> FaceauthResult<PathBuf> {
    let name = Path::new(original_name)
        .file_name()
        .map(|n| n.to_os_string())
        .or_else(|| encrypted.file_stem().map(|s| s.to_os_string()))
        .ok_or_else(|| {
            FaceauthError::Resource(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot choose an output name; pass an explicit output path",
            ))
        })?;
    Ok(encrypted.with_file_name(name))
}

/// Refuse an output that resolves to the input file, however it is spelled.
fn reject_same_path(input: &Path, output: &Path) -> FaceauthResult<()> {
    let resolved_input = std::fs::canonicalize(input)?;
    let resolved_output = std::fs::canonicalize(output).ok().or_else(|| {
        let name = output.file_name()?;
        std::fs::canonicalize(parent_dir(output))
            .ok()
            .map(|dir| dir.join(name))
    });
    if input == output || resolved_output.as_deref() == Some(resolved_input.as_path()) {
        return Err(FaceauthError::Resource(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("output would replace input: {}", input.display()),
        )));
    }
    Ok(())
}
