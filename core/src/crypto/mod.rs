// Cryptography module — per-hop key transposition and reseeding randomness

pub mod curve;
pub mod random;
pub mod transpose;

pub use curve::{CurveKind, Ristretto, Secp256k1Curve, TransposeCurve};
pub use random::{
    random_permutation, random_u64, random_u64_max, RandomError, SecureRandomSource,
    SharedEntropy, SharedRandom,
};
pub use transpose::{
    KeyPair, KeyTransposer, TransposeError, TransposeSecret, TransposedKeyPair,
    MAX_TRANSPOSE_ATTEMPTS,
};
