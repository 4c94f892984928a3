// Key Transposition — deterministic per-hop key blinding
//
// Flow:
// 1. try = serialize(base public key)
// 2. t = HMAC-SHA256(secret, try), read as a scalar
// 3. candidate = t × base public key; accept if on-curve
// 4. otherwise try = SHA-256(try) and go again (at most 1000 times)
//
// The private side multiplies the base private scalar by the same t, so
// both paths agree on the transposed public key. t depends only on the
// public key and the secret.

use crate::crypto::curve::TransposeCurve;
use crate::crypto::random::RandomError;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Upper bound on candidate scalars tried for one transposition.
pub const MAX_TRANSPOSE_ATTEMPTS: usize = 1000;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransposeError {
    /// No usable candidate in [`MAX_TRANSPOSE_ATTEMPTS`] tries. The curve
    /// backend is broken; retrying with the same inputs cannot succeed.
    #[error("No on-curve transposition found after {attempts} attempts")]
    SearchExhausted { attempts: usize },
    #[error("Transposed private key is degenerate")]
    DegeneratePrivateKey,
    /// HMAC key rejected. HMAC-SHA256 accepts any key length, so this is
    /// not produced in practice.
    #[error("Invalid transpose secret")]
    InvalidSecret,
    #[error("Invalid public key encoding")]
    InvalidPoint,
    #[error("Invalid private key encoding")]
    InvalidScalar,
}

/// Secret shared out-of-band between the key owner and anyone transposing
/// the public key. Wiped on drop, compared in constant time, never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TransposeSecret(Vec<u8>);

impl TransposeSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for TransposeSecret {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl From<Vec<u8>> for TransposeSecret {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for TransposeSecret {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes())
    }
}

impl PartialEq for TransposeSecret {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

impl Eq for TransposeSecret {}

impl fmt::Debug for TransposeSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransposeSecret([REDACTED; {}])", self.0.len())
    }
}

/// Public point with an optional private scalar.
///
/// Third parties transposing someone else's key hold only the public half.
#[derive(Clone)]
pub struct KeyPair<C: TransposeCurve> {
    pub public: C::Point,
    pub private: Option<C::Scalar>,
}

impl<C: TransposeCurve> KeyPair<C> {
    pub fn from_private(curve: &C, private: C::Scalar) -> Self {
        Self {
            public: curve.public_key(&private),
            private: Some(private),
        }
    }

    pub fn public_only(public: C::Point) -> Self {
        Self {
            public,
            private: None,
        }
    }

    /// Fresh keypair with a private scalar drawn by rejection sampling.
    pub fn generate<R: RngCore + ?Sized>(curve: &C, rng: &mut R) -> Result<Self, RandomError> {
        let mut bytes = Zeroizing::new([0u8; 32]);
        loop {
            rng.try_fill_bytes(&mut bytes[..])
                .map_err(|e| RandomError::Entropy(e.to_string()))?;
            if let Some(private) = curve.parse_scalar(&bytes[..]) {
                return Ok(Self::from_private(curve, private));
            }
        }
    }

    pub fn from_private_bytes(curve: &C, bytes: &[u8]) -> Result<Self, TransposeError> {
        let private = curve.parse_scalar(bytes).ok_or(TransposeError::InvalidScalar)?;
        Ok(Self::from_private(curve, private))
    }

    pub fn from_public_bytes(curve: &C, bytes: &[u8]) -> Result<Self, TransposeError> {
        let public = curve.parse_point(bytes).ok_or(TransposeError::InvalidPoint)?;
        Ok(Self::public_only(public))
    }

    pub fn has_private(&self) -> bool {
        self.private.is_some()
    }
}

impl<C: TransposeCurve> fmt::Debug for KeyPair<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &self.private.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Result of a transposition. `private` is set only when the base private
/// scalar was supplied, and then `public == private × G`.
#[derive(Clone)]
pub struct TransposedKeyPair<C: TransposeCurve> {
    pub public: C::Point,
    pub private: Option<C::Scalar>,
}

impl<C: TransposeCurve> fmt::Debug for TransposedKeyPair<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransposedKeyPair")
            .field("public", &self.public)
            .field("private", &self.private.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Transposes keys over one curve backend.
#[derive(Debug, Clone, Default)]
pub struct KeyTransposer<C> {
    curve: C,
}

impl<C: TransposeCurve> KeyTransposer<C> {
    pub fn new(curve: C) -> Self {
        Self { curve }
    }

    pub fn curve(&self) -> &C {
        &self.curve
    }

    /// Transposed public key plus the transposition scalar `t`.
    pub fn transpose_public_key(
        &self,
        base_public: &C::Point,
        secret: &TransposeSecret,
    ) -> Result<(C::Point, C::Scalar), TransposeError> {
        // Unreachable for HMAC: any key length is accepted.
        let keyed = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| TransposeError::InvalidSecret)?;
        let mut input = self.curve.serialize_point(base_public);

        for attempt in 0..MAX_TRANSPOSE_ATTEMPTS {
            if let Some(found) = self.try_candidate(&keyed, base_public, &input) {
                if attempt > 0 {
                    tracing::debug!(
                        curve = self.curve.name(),
                        attempt,
                        "Transposition accepted after rehashing"
                    );
                }
                return Ok(found);
            }
            input = Sha256::digest(&input).to_vec();
        }

        tracing::error!(
            curve = self.curve.name(),
            attempts = MAX_TRANSPOSE_ATTEMPTS,
            "Transposition search exhausted"
        );
        Err(TransposeError::SearchExhausted {
            attempts: MAX_TRANSPOSE_ATTEMPTS,
        })
    }

    /// Transposed public key plus the matching transposed private scalar.
    pub fn transpose_private_key(
        &self,
        base_public: &C::Point,
        base_private: &C::Scalar,
        secret: &TransposeSecret,
    ) -> Result<(C::Point, C::Scalar), TransposeError> {
        let (public, transpose) = self.transpose_public_key(base_public, secret)?;
        let private = self
            .curve
            .mul_scalar(&transpose, base_private)
            .ok_or(TransposeError::DegeneratePrivateKey)?;
        Ok((public, private))
    }

    /// Transpose whatever half of `pair` is available.
    pub fn transpose(
        &self,
        pair: &KeyPair<C>,
        secret: &TransposeSecret,
    ) -> Result<TransposedKeyPair<C>, TransposeError> {
        match &pair.private {
            Some(private) => {
                let (public, private) = self.transpose_private_key(&pair.public, private, secret)?;
                Ok(TransposedKeyPair {
                    public,
                    private: Some(private),
                })
            }
            None => {
                let (public, _) = self.transpose_public_key(&pair.public, secret)?;
                Ok(TransposedKeyPair {
                    public,
                    private: None,
                })
            }
        }
    }

    fn try_candidate(
        &self,
        keyed: &HmacSha256,
        base_public: &C::Point,
        input: &[u8],
    ) -> Option<(C::Point, C::Scalar)> {
        let mut mac = keyed.clone();
        mac.update(input);
        let mut digest: [u8; 32] = mac.finalize().into_bytes().into();
        let transpose = self.curve.scalar_from_digest(&digest);
        digest.zeroize();

        let transpose = transpose?;
        let candidate = self.curve.mul_point(base_public, &transpose)?;
        self.curve
            .is_on_curve(&candidate)
            .then_some((candidate, transpose))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::curve::{Ristretto, Secp256k1Curve};
    use curve25519_dalek::scalar::Scalar;

    /// Backend whose candidates never pass the membership test.
    #[derive(Clone)]
    struct NeverOnCurve;

    impl TransposeCurve for NeverOnCurve {
        type Point = u64;
        type Scalar = u64;

        fn name(&self) -> &'static str {
            "never"
        }
        fn serialize_point(&self, point: &u64) -> Vec<u8> {
            point.to_be_bytes().to_vec()
        }
        fn parse_point(&self, _bytes: &[u8]) -> Option<u64> {
            None
        }
        fn scalar_from_digest(&self, digest: &[u8; 32]) -> Option<u64> {
            Some(u64::from(digest[0]) + 1)
        }
        fn serialize_scalar(&self, scalar: &u64) -> [u8; 32] {
            let mut out = [0u8; 32];
            out[24..].copy_from_slice(&scalar.to_be_bytes());
            out
        }
        fn parse_scalar(&self, _bytes: &[u8]) -> Option<u64> {
            None
        }
        fn mul_point(&self, point: &u64, scalar: &u64) -> Option<u64> {
            Some(point.wrapping_mul(*scalar))
        }
        fn is_on_curve(&self, _point: &u64) -> bool {
            false
        }
        fn mul_scalar(&self, a: &u64, b: &u64) -> Option<u64> {
            Some(a.wrapping_mul(*b))
        }
        fn public_key(&self, private: &u64) -> u64 {
            *private
        }
    }

    fn ristretto_pair(seed: u8) -> KeyPair<Ristretto> {
        KeyPair::from_private(&Ristretto, Scalar::from_bytes_mod_order_wide(&[seed; 64]))
    }

    #[test]
    fn test_transpose_changes_public_key() {
        let transposer = KeyTransposer::new(Ristretto);
        let pair = ristretto_pair(1);
        let secret = TransposeSecret::from("Random Secret Value");

        let (public, _) = transposer.transpose_public_key(&pair.public, &secret).unwrap();
        assert_ne!(public, pair.public);
        assert!(Ristretto.is_on_curve(&public));
    }

    #[test]
    fn test_private_path_matches_public_path() {
        let transposer = KeyTransposer::new(Ristretto);
        let pair = ristretto_pair(2);
        let secret = TransposeSecret::from("Random Secret Value");
        let private = pair.private.unwrap();

        let (public_only, _) = transposer.transpose_public_key(&pair.public, &secret).unwrap();
        let (public, transposed_private) = transposer
            .transpose_private_key(&pair.public, &private, &secret)
            .unwrap();

        assert_eq!(public, public_only);
        assert_ne!(transposed_private, private);
        assert_eq!(Ristretto.public_key(&transposed_private), public);
    }

    #[test]
    fn test_transposition_scalar_is_returned() {
        let transposer = KeyTransposer::new(Ristretto);
        let pair = ristretto_pair(3);
        let secret = TransposeSecret::from("hop-3");

        let (public, transpose) = transposer.transpose_public_key(&pair.public, &secret).unwrap();
        assert_eq!(pair.public * transpose, public);
    }

    #[test]
    fn test_transpose_dispatches_on_private_half() {
        let transposer = KeyTransposer::new(Secp256k1Curve::new());
        let curve = Secp256k1Curve::new();
        let mut bytes = [0u8; 32];
        bytes[31] = 77;
        let full = KeyPair::from_private_bytes(&curve, &bytes).unwrap();
        let public_only = KeyPair::<Secp256k1Curve>::public_only(full.public);
        let secret = TransposeSecret::from("dispatch");

        let with_private = transposer.transpose(&full, &secret).unwrap();
        let without_private = transposer.transpose(&public_only, &secret).unwrap();

        assert_eq!(with_private.public, without_private.public);
        assert!(without_private.private.is_none());
        let private = with_private.private.unwrap();
        assert_eq!(curve.public_key(&private), with_private.public);
    }

    #[test]
    fn test_search_exhaustion_is_an_error() {
        let transposer = KeyTransposer::new(NeverOnCurve);
        let secret = TransposeSecret::from("anything");

        let result = transposer.transpose_public_key(&5, &secret);
        assert_eq!(
            result.unwrap_err(),
            TransposeError::SearchExhausted {
                attempts: MAX_TRANSPOSE_ATTEMPTS
            }
        );
        assert!(transposer.transpose_private_key(&5, &3, &secret).is_err());
    }

    #[test]
    fn test_generate_key_pairs() {
        let mut random = crate::crypto::random::SecureRandomSource::from_os().unwrap();

        let ristretto = KeyPair::generate(&Ristretto, &mut random).unwrap();
        let private = ristretto.private.unwrap();
        assert_eq!(Ristretto.public_key(&private), ristretto.public);

        let curve = Secp256k1Curve::new();
        let first = KeyPair::generate(&curve, &mut random).unwrap();
        let second = KeyPair::generate(&curve, &mut random).unwrap();
        assert!(first.has_private());
        assert_ne!(first.public, second.public);
    }

    #[test]
    fn test_invalid_key_bytes() {
        let curve = Secp256k1Curve::new();
        assert_eq!(
            KeyPair::from_private_bytes(&curve, &[0u8; 32]).unwrap_err(),
            TransposeError::InvalidScalar
        );
        assert_eq!(
            KeyPair::from_public_bytes(&curve, &[2u8; 10]).unwrap_err(),
            TransposeError::InvalidPoint
        );
    }

    #[test]
    fn test_any_secret_length_is_accepted() {
        let transposer = KeyTransposer::new(Ristretto);
        let pair = KeyPair::from_private(&Ristretto, Scalar::from(9u64));

        // Empty, shorter than a block, and longer than the 64-byte block
        for len in [0usize, 1, 64, 65, 1000] {
            let secret = TransposeSecret::new(vec![0x5a; len]);
            let result = transposer.transpose(&pair, &secret);
            assert!(result.is_ok(), "secret of {} bytes rejected", len);
        }
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = TransposeSecret::from("do not print me");
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("do not print me"));
        assert!(printed.contains("REDACTED"));

        let pair = ristretto_pair(4);
        assert!(format!("{:?}", pair).contains("[REDACTED]"));
    }

    #[test]
    fn test_secret_equality() {
        assert_eq!(TransposeSecret::from("abc"), TransposeSecret::from(&b"abc"[..]));
        assert_ne!(TransposeSecret::from("abc"), TransposeSecret::from("abd"));
        assert_ne!(TransposeSecret::from("abc"), TransposeSecret::from("abcd"));
        assert_eq!(TransposeSecret::from(vec![1, 2, 3]).len(), 3);
        assert!(TransposeSecret::new(Vec::new()).is_empty());
    }
}
