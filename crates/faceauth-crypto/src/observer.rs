//! Instrumentation hooks
//!
//! The engine calls an explicitly injected observer at fixed points. There is
//! no global monitor; the default does nothing.

use std::time::Duration;

use faceauth_core::KdfAlgorithm;

/// Callbacks invoked by the engine. Every method defaults to a no-op.
pub trait CryptoObserver: Send + Sync {
    fn derivation_started(&self, _algorithm: KdfAlgorithm) {}

    fn derivation_finished(&self, _algorithm: KdfAlgorithm, _elapsed: Duration) {}

    /// `plaintext_len` is the plaintext consumed (encrypt) or emitted (decrypt).
    fn chunk_processed(&self, _index: u32, _plaintext_len: usize) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CryptoObserver for NoopObserver {}

/// Observer that forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CryptoObserver for TracingObserver {
    fn derivation_started(&self, algorithm: KdfAlgorithm) {
        tracing::debug!(algorithm = %algorithm, "key derivation started");
    }

    fn derivation_finished(&self, algorithm: KdfAlgorithm, elapsed: Duration) {
        tracing::debug!(
            algorithm = %algorithm,
            elapsed_ms = elapsed.as_millis() as u64,
            "key derivation finished"
        );
    }

    fn chunk_processed(&self, index: u32, plaintext_len: usize) {
        tracing::trace!(index, plaintext_len, "chunk processed");
    }
}
