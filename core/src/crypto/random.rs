// Secure Random Source — reseeding HKDF-SHA512 expansion streams
//
// Every component that needs randomness owns one of these, handed in at
// construction. A source draws a 64-byte seed from its parent and expands it
// with HKDF-Expand (HMAC-SHA512). When the expansion runs dry it reseeds from
// the parent. Children of a source reseed from that source, so sibling
// sub-streams never share raw entropy draws.

use hkdf::Hkdf;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use rand_core::impls;
use sha2::Sha512;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

/// Bytes drawn from the parent on every (re)seed.
pub const SEED_SIZE: usize = 64;

/// Domain-separation label for the expansion step.
/// Changing this changes every derived stream.
const EXPANSION_INFO: &[u8] = b"mixhop reseeding random source 2026-10-15";

/// SHA-512 output size.
const BLOCK_SIZE: usize = 64;

/// HKDF-Expand may produce at most 255 blocks per seed.
const MAX_EXPANSION_BLOCKS: u8 = 255;

/// Largest single read a freshly seeded stream can satisfy.
pub const MAX_READ_SIZE: usize = BLOCK_SIZE * MAX_EXPANSION_BLOCKS as usize;

/// Parent entropy handle. Shared so that children can reseed from it.
pub type SharedEntropy = Arc<Mutex<dyn RngCore + Send>>;

/// A [`SecureRandomSource`] that other sources can be seeded from.
pub type SharedRandom = Arc<Mutex<SecureRandomSource>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RandomError {
    #[error("Entropy source failed: {0}")]
    Entropy(String),
    #[error("Expansion stream exhausted")]
    StreamExhausted,
}

/// HKDF-Expand (RFC 5869, step 2) output served as a pull stream.
///
/// The whole 255-block output is expanded once per seed. Reads are all or
/// nothing: a request larger than what is left fails without consuming.
struct ExpansionStream {
    okm: Zeroizing<Vec<u8>>,
    offset: usize,
}

impl ExpansionStream {
    fn new(seed: &[u8]) -> Result<Self, RandomError> {
        let hkdf = Hkdf::<Sha512>::from_prk(seed)
            .map_err(|e| RandomError::Entropy(format!("invalid seed: {}", e)))?;
        let mut okm = Zeroizing::new(vec![0u8; MAX_READ_SIZE]);
        hkdf.expand(EXPANSION_INFO, &mut okm[..])
            .map_err(|_| RandomError::StreamExhausted)?;
        Ok(Self { okm, offset: 0 })
    }

    fn remaining(&self) -> usize {
        self.okm.len() - self.offset
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), RandomError> {
        if buf.len() > self.remaining() {
            return Err(RandomError::StreamExhausted);
        }
        let end = self.offset + buf.len();
        buf.copy_from_slice(&self.okm[self.offset..end]);
        self.offset = end;
        Ok(())
    }
}

/// Reseeding pseudorandom byte stream.
///
/// Single owner: wrap it in a [`SharedRandom`] only when other sources need
/// to be seeded from it.
pub struct SecureRandomSource {
    parent: SharedEntropy,
    stream: Option<ExpansionStream>,
    reseeds: u64,
}

impl SecureRandomSource {
    /// Create a source over `parent` and seed it immediately, so a broken
    /// parent is reported here rather than on first use.
    pub fn new(parent: SharedEntropy) -> Result<Self, RandomError> {
        let mut source = Self {
            parent,
            stream: None,
            reseeds: 0,
        };
        source.reseed()?;
        Ok(source)
    }

    /// Source seeded from the operating system.
    pub fn from_os() -> Result<Self, RandomError> {
        Self::with_parent(OsRng)
    }

    /// Source seeded from an owned generator.
    pub fn with_parent<R>(rng: R) -> Result<Self, RandomError>
    where
        R: RngCore + Send + 'static,
    {
        Self::new(Arc::new(Mutex::new(rng)))
    }

    /// Sub-stream seeded from, and reseeding from, `parent`.
    pub fn child_of(parent: &SharedRandom) -> Result<Self, RandomError> {
        let parent: SharedEntropy = parent.clone();
        Self::new(parent)
    }

    pub fn into_shared(self) -> SharedRandom {
        Arc::new(Mutex::new(self))
    }

    /// Number of seeds drawn from the parent so far (construction included).
    pub fn reseed_count(&self) -> u64 {
        self.reseeds
    }

    /// Fill `buf` from the expansion stream, reseeding and retrying once on
    /// failure. A second failure means the parent itself is broken.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), RandomError> {
        if self.read_stream(buf).is_ok() {
            return Ok(());
        }
        let retried = self.reseed().and_then(|()| self.read_stream(buf));
        if let Err(err) = &retried {
            tracing::error!("Random source failed after reseed: {}", err);
        }
        retried
    }

    fn read_stream(&mut self, buf: &mut [u8]) -> Result<(), RandomError> {
        self.stream
            .as_mut()
            .ok_or(RandomError::StreamExhausted)?
            .read(buf)
    }

    fn reseed(&mut self) -> Result<(), RandomError> {
        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
        self.parent
            .lock()
            .try_fill_bytes(&mut seed[..])
            .map_err(|e| RandomError::Entropy(e.to_string()))?;
        self.stream = Some(ExpansionStream::new(&seed[..])?);
        self.reseeds += 1;
        tracing::debug!(reseeds = self.reseeds, "Random source reseeded");
        Ok(())
    }
}

impl fmt::Debug for SecureRandomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureRandomSource")
            .field("reseeds", &self.reseeds)
            .finish_non_exhaustive()
    }
}

impl RngCore for SecureRandomSource {
    fn next_u32(&mut self) -> u32 {
        impls::next_u32_via_fill(self)
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_fill(self)
    }

    /// Infallible by the `RngCore` contract: panics if the parent is broken.
    /// Use [`RngCore::try_fill_bytes`] or [`SecureRandomSource::read`] to
    /// handle that case.
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if let Err(err) = self.read(dest) {
            panic!("secure random source failed: {}", err);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.read(dest).map_err(rand::Error::new)
    }
}

impl CryptoRng for SecureRandomSource {}

/// Random u64 from 8 big-endian bytes of `rng`.
pub fn random_u64<R: RngCore + ?Sized>(rng: &mut R) -> Result<u64, RandomError> {
    let mut bytes = [0u8; 8];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| RandomError::Entropy(e.to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Random value in `[0, max)`, or 0 when `max == 0`.
///
/// Plain modulo reduction: for `max` not a power of two smaller values are
/// very slightly favoured. Output compatibility depends on keeping it.
pub fn random_u64_max<R: RngCore + ?Sized>(rng: &mut R, max: u64) -> Result<u64, RandomError> {
    if max == 0 {
        return Ok(0);
    }
    Ok(random_u64(rng)? % max)
}

/// Permutation of `[0, n)` by online random insertion.
///
/// Each `i` is placed at a random `j <= i` and the previous occupant of `j`
/// moves to `i`. Not a textbook Fisher-Yates; its bias profile is relied on.
pub fn random_permutation<R: RngCore + ?Sized>(
    rng: &mut R,
    n: usize,
) -> Result<Vec<usize>, RandomError> {
    let mut permutation = vec![0usize; n];
    for i in 0..n {
        let j = random_u64_max(rng, i as u64 + 1)? as usize;
        permutation[i] = permutation[j];
        permutation[j] = i;
    }
    Ok(permutation)
}
