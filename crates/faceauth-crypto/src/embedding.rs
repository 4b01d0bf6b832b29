//! Feature vector canonicalization
//!
//! A raw vector is L2-normalized, each component rounded to 6 decimal digits,
//! and the rounded value stored as a count of millionths (`i32`, little-endian).
//! Fixed-point storage keeps the byte layout exact: no `-0.0`, no platform
//! float formatting. The rounding is the only tolerance margin; deciding
//! whether two captures belong to the same person happens upstream.

use secrecy::{ExposeSecret, SecretBox};
use zeroize::Zeroizing;

use faceauth_core::{FaceauthError, FaceauthResult};

/// Decimal digits kept per normalized component.
pub const PRECISION_DIGITS: i32 = 6;

/// Bytes per serialized component.
pub const COMPONENT_WIDTH: usize = 4;

const SCALE: f64 = 1_000_000.0;

/// Secret feature vector from the capture-and-match collaborator.
///
/// Zeroized on drop; `Debug` only reveals the dimension.
pub struct FeatureVector {
    values: SecretBox<Vec<f32>>,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values: SecretBox::new(Box::new(values)),
        }
    }

    pub fn dimension(&self) -> usize {
        self.values.expose_secret().len()
    }

    pub(crate) fn values(&self) -> &[f32] {
        self.values.expose_secret()
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

impl std::fmt::Debug for FeatureVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureVector")
            .field("dimension", &self.dimension())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

/// Canonical byte form of a feature vector. Zeroized on drop.
pub struct NormalizedEmbedding {
    bytes: Zeroizing<Vec<u8>>,
}

impl NormalizedEmbedding {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dimension(&self) -> usize {
        self.bytes.len() / COMPONENT_WIDTH
    }
}

impl std::fmt::Debug for NormalizedEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedEmbedding")
            .field("dimension", &self.dimension())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Normalize a feature vector into its canonical byte layout.
///
/// Fails with `InvalidVector` for an empty vector, any non-finite component,
/// or zero magnitude.
pub fn normalize(vector: &FeatureVector) -> FaceauthResult<NormalizedEmbedding> {
    let values = vector.values();
    if values.is_empty() {
        return Err(FaceauthError::InvalidVector("vector is empty".into()));
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(FaceauthError::InvalidVector(format!(
            "component {index} is not finite"
        )));
    }

    // f64 accumulation: squares of any finite f32 neither overflow nor
    // underflow to zero here.
    let norm = values
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt();
    if norm <= 0.0 {
        return Err(FaceauthError::InvalidVector("vector has zero magnitude".into()));
    }

    let mut bytes = Zeroizing::new(Vec::with_capacity(values.len() * COMPONENT_WIDTH));
    for &v in values {
        let micros = quantize(f64::from(v) / norm);
        bytes.extend_from_slice(&micros.to_le_bytes());
    }
    Ok(NormalizedEmbedding { bytes })
}

/// Round a unit-range component to millionths. |unit| <= 1, so the result
/// always fits in an i32.
fn quantize(unit: f64) -> i32 {
    (unit * SCALE).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn components(embedding: &NormalizedEmbedding) -> Vec<i32> {
        embedding
            .as_bytes()
            .chunks_exact(COMPONENT_WIDTH)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_known_vector_layout() {
        let embedding = normalize(&FeatureVector::new(vec![3.0, 4.0])).unwrap();

        assert_eq!(components(&embedding), vec![600_000, 800_000]);
        assert_eq!(embedding.as_bytes().len(), 8);
        assert_eq!(embedding.dimension(), 2);
    }

    #[test]
    fn test_small_jitter_is_absorbed() {
        let a = normalize(&FeatureVector::new(vec![3.0, 4.0])).unwrap();
        let b = normalize(&FeatureVector::new(vec![3.000_000_2, 4.0])).unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes(), "sub-precision noise must not change bytes");
    }

    #[test]
    fn test_negative_zero_component() {
        let embedding = normalize(&FeatureVector::new(vec![-0.0, 1.0])).unwrap();
        assert_eq!(components(&embedding), vec![0, 1_000_000]);
    }

    #[test]
    fn test_empty_vector_rejected() {
        let err = normalize(&FeatureVector::new(vec![])).unwrap_err();
        assert!(matches!(err, FaceauthError::InvalidVector(_)));
    }

    #[test]
    fn test_non_finite_rejected() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let err = normalize(&FeatureVector::new(vec![1.0, bad, 2.0])).unwrap_err();
            assert!(matches!(err, FaceauthError::InvalidVector(_)));
        }
    }

    #[test]
    fn test_zero_magnitude_rejected() {
        let err = normalize(&FeatureVector::new(vec![0.0; 128])).unwrap_err();
        assert!(matches!(err, FaceauthError::InvalidVector(_)));
    }

    #[test]
    fn test_debug_is_redacted() {
        let vector = FeatureVector::new(vec![0.123_456, 0.654_321]);
        let rendered = format!("{vector:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("0.123"));
    }

    fn arb_vector() -> impl Strategy<Value = Vec<f32>> {
        proptest::collection::vec(-100.0f32..100.0, 1..=256)
            .prop_filter("non-zero magnitude", |v| v.iter().any(|x| *x != 0.0))
    }

    proptest! {
        #[test]
        fn normalize_is_deterministic(values in arb_vector()) {
            let a = normalize(&FeatureVector::new(values.clone())).unwrap();
            let b = normalize(&FeatureVector::new(values)).unwrap();
            prop_assert_eq!(a.as_bytes(), b.as_bytes());
        }

        /// Power-of-two scaling is exact in floating point, so the canonical
        /// bytes must not move at all.
        #[test]
        fn normalize_is_scale_invariant(values in arb_vector(), exp in -4i32..=4) {
            let factor = 2f32.powi(exp);
            let scaled: Vec<f32> = values.iter().map(|v| v * factor).collect();
            let a = normalize(&FeatureVector::new(values)).unwrap();
            let b = normalize(&FeatureVector::new(scaled)).unwrap();
            prop_assert_eq!(a.as_bytes(), b.as_bytes());
        }

        #[test]
        fn components_stay_in_unit_range(values in arb_vector()) {
            let embedding = normalize(&FeatureVector::new(values.clone())).unwrap();
            prop_assert_eq!(embedding.dimension(), values.len());
            for c in components(&embedding) {
                prop_assert!((-1_000_000..=1_000_000).contains(&c));
            }
        }
    }
}
