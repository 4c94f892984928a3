// mixhop core — privacy primitives for a mix-network hop
//
// Two building blocks:
// - key transposition: per-hop blinding of a keypair with a shared secret
// - a randomized, time-sliced delay queue for outgoing messages
//
// Transport, persistence and wire formats live outside this crate.

pub mod crypto;
pub mod privacy;

pub use crypto::{
    CurveKind, KeyPair, KeyTransposer, RandomError, Ristretto, Secp256k1Curve,
    SecureRandomSource, TransposeCurve, TransposeError, TransposeSecret, TransposedKeyPair,
};
pub use privacy::{QueueConfig, QueueError, RandomQueue};
