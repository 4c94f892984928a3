// Curve backends for key transposition
//
// Transposition only needs a handful of group operations. They are collected
// in `TransposeCurve` so the same derivation runs over Ristretto255
// (curve25519-dalek) or secp256k1 (libsecp256k1 bindings).

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Group operations used by [`crate::crypto::KeyTransposer`].
///
/// Operations that can land on a degenerate value (zero scalar, identity
/// point, out-of-range encoding) return `None` instead of failing, so the
/// caller can decide whether to retry.
pub trait TransposeCurve {
    type Point: Clone + PartialEq + fmt::Debug;
    type Scalar: Clone;

    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Canonical point encoding; the transposition input.
    fn serialize_point(&self, point: &Self::Point) -> Vec<u8>;

    fn parse_point(&self, bytes: &[u8]) -> Option<Self::Point>;

    /// Scalar from a 32-byte big- or little-endian digest, as the backend
    /// defines it. `None` if the digest does not give a usable scalar.
    fn scalar_from_digest(&self, digest: &[u8; 32]) -> Option<Self::Scalar>;

    fn serialize_scalar(&self, scalar: &Self::Scalar) -> [u8; 32];

    fn parse_scalar(&self, bytes: &[u8]) -> Option<Self::Scalar>;

    /// `scalar * point`. `None` if the product is degenerate.
    fn mul_point(&self, point: &Self::Point, scalar: &Self::Scalar) -> Option<Self::Point>;

    /// Curve-membership test.
    fn is_on_curve(&self, point: &Self::Point) -> bool;

    /// `a * b mod n`. `None` if the product is zero.
    fn mul_scalar(&self, a: &Self::Scalar, b: &Self::Scalar) -> Option<Self::Scalar>;

    /// `scalar * G`.
    fn public_key(&self, private: &Self::Scalar) -> Self::Point;
}

/// Which backend a caller wants, for configuration files and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveKind {
    Ristretto,
    Secp256k1,
}

impl Default for CurveKind {
    fn default() -> Self {
        CurveKind::Ristretto
    }
}

impl fmt::Display for CurveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveKind::Ristretto => write!(f, "ristretto"),
            CurveKind::Secp256k1 => write!(f, "secp256k1"),
        }
    }
}

/// Ristretto255 prime-order group.
///
/// Digests are read little-endian and reduced mod l.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ristretto;

impl TransposeCurve for Ristretto {
    type Point = RistrettoPoint;
    type Scalar = Scalar;

    fn name(&self) -> &'static str {
        "ristretto255"
    }

    fn serialize_point(&self, point: &RistrettoPoint) -> Vec<u8> {
        point.compress().to_bytes().to_vec()
    }

    fn parse_point(&self, bytes: &[u8]) -> Option<RistrettoPoint> {
        let point = CompressedRistretto::from_slice(bytes).ok()?.decompress()?;
        (!point.is_identity()).then_some(point)
    }

    fn scalar_from_digest(&self, digest: &[u8; 32]) -> Option<Scalar> {
        let scalar = Scalar::from_bytes_mod_order(*digest);
        (scalar != Scalar::ZERO).then_some(scalar)
    }

    fn serialize_scalar(&self, scalar: &Scalar) -> [u8; 32] {
        scalar.to_bytes()
    }

    fn parse_scalar(&self, bytes: &[u8]) -> Option<Scalar> {
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        let scalar = Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes))?;
        (scalar != Scalar::ZERO).then_some(scalar)
    }

    fn mul_point(&self, point: &RistrettoPoint, scalar: &Scalar) -> Option<RistrettoPoint> {
        let product = point * scalar;
        (!product.is_identity()).then_some(product)
    }

    fn is_on_curve(&self, point: &RistrettoPoint) -> bool {
        if point.is_identity() {
            return false;
        }
        point
            .compress()
            .decompress()
            .map_or(false, |decoded| decoded == *point)
    }

    fn mul_scalar(&self, a: &Scalar, b: &Scalar) -> Option<Scalar> {
        let product = a * b;
        (product != Scalar::ZERO).then_some(product)
    }

    fn public_key(&self, private: &Scalar) -> RistrettoPoint {
        RISTRETTO_BASEPOINT_POINT * private
    }
}

/// secp256k1 via libsecp256k1.
///
/// Digests are read big-endian. Unlike the Ristretto backend they are not
/// reduced: a digest of zero or >= n is a degenerate candidate.
#[derive(Clone)]
pub struct Secp256k1Curve {
    ctx: Secp256k1<All>,
}

impl Secp256k1Curve {
    pub fn new() -> Self {
        Self {
            ctx: Secp256k1::new(),
        }
    }
}

impl Default for Secp256k1Curve {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Secp256k1Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secp256k1Curve")
    }
}

impl TransposeCurve for Secp256k1Curve {
    type Point = PublicKey;
    type Scalar = SecretKey;

    fn name(&self) -> &'static str {
        "secp256k1"
    }

    fn serialize_point(&self, point: &PublicKey) -> Vec<u8> {
        point.serialize().to_vec()
    }

    fn parse_point(&self, bytes: &[u8]) -> Option<PublicKey> {
        PublicKey::from_slice(bytes).ok()
    }

    fn scalar_from_digest(&self, digest: &[u8; 32]) -> Option<SecretKey> {
        SecretKey::from_slice(digest).ok()
    }

    fn serialize_scalar(&self, scalar: &SecretKey) -> [u8; 32] {
        scalar.secret_bytes()
    }

    fn parse_scalar(&self, bytes: &[u8]) -> Option<SecretKey> {
        SecretKey::from_slice(bytes).ok()
    }

    fn mul_point(&self, point: &PublicKey, scalar: &SecretKey) -> Option<PublicKey> {
        let tweak = secp256k1::Scalar::from_be_bytes(scalar.secret_bytes()).ok()?;
        point.mul_tweak(&self.ctx, &tweak).ok()
    }

    fn is_on_curve(&self, point: &PublicKey) -> bool {
        PublicKey::from_slice(&point.serialize_uncompressed())
            .map_or(false, |decoded| decoded == *point)
    }

    fn mul_scalar(&self, a: &SecretKey, b: &SecretKey) -> Option<SecretKey> {
        let tweak = secp256k1::Scalar::from_be_bytes(b.secret_bytes()).ok()?;
        a.mul_tweak(&tweak).ok()
    }

    fn public_key(&self, private: &SecretKey) -> PublicKey {
        PublicKey::from_secret_key(&self.ctx, private)
    }
}
