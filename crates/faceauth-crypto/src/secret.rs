//! Boundary with the capture-and-match collaborator
//!
//! The collaborator compares a live capture against an enrolled template and
//! either returns a normalized feature vector or refuses. The engine asks
//! exactly once per operation; retrying is the caller's decision.

use faceauth_core::FaceauthResult;

use crate::embedding::FeatureVector;

/// Source of the secret feature vector for an identity.
///
/// Implementations report a refused or failed match as
/// `FaceauthError::SecretUnavailable`.
pub trait SecretSource {
    fn obtain_secret(&self, identity: &str) -> FaceauthResult<FeatureVector>;
}

impl<F> SecretSource for F
where
    F: Fn(&str) -> FaceauthResult<FeatureVector>,
{
    fn obtain_secret(&self, identity: &str) -> FaceauthResult<FeatureVector> {
        self(identity)
    }
}
