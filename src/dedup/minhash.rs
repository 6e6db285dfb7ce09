//! MinHash signatures over token shingles, plus LSH banding.
//!
//! Each shingle is hashed once with blake3; the `num_perm` permutations are
//! simulated with universal hashing `(a·x + b) mod p` over the Mersenne
//! prime `2^61 − 1`. Coefficients are derived from the permutation index,
//! so signatures are stable across processes and runs.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::text;

/// Mersenne prime 2^61 − 1.
const PRIME: u64 = (1u64 << 61) - 1;

/// A fixed-size MinHash signature. Used only for similarity, never identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u64>);

impl Signature {
    /// Number of permutations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the signature has no slots.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw slot values.
    pub fn values(&self) -> &[u64] {
        &self.0
    }

    /// Estimated Jaccard similarity: the fraction of equal slots.
    ///
    /// Signatures of different lengths are never similar.
    pub fn similarity(&self, other: &Signature) -> f64 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let equal = self.0.iter().zip(&other.0).filter(|(a, b)| a == b).count();
        equal as f64 / self.0.len() as f64
    }
}

impl From<Vec<u64>> for Signature {
    fn from(values: Vec<u64>) -> Self {
        Self(values)
    }
}

/// Builds signatures with fixed permutation coefficients.
#[derive(Debug, Clone)]
pub struct MinHasher {
    shingle_size: usize,
    coefficients: Vec<(u64, u64)>,
}

impl MinHasher {
    /// Create a hasher with `num_perm` permutations over `shingle_size`-token shingles.
    pub fn new(num_perm: usize, shingle_size: usize) -> Self {
        let coefficients = (0..num_perm as u64)
            .map(|seed| {
                let a = seed
                    .wrapping_mul(0x517c_c1b7_2722_0a95)
                    .wrapping_add(0x6c62_272e_07bb_0142)
                    % PRIME
                    | 1;
                let b = seed
                    .wrapping_mul(0x6c62_272e_07bb_0142)
                    .wrapping_add(0x517c_c1b7_2722_0a95)
                    % PRIME;
                (a, b)
            })
            .collect();
        Self {
            shingle_size: shingle_size.max(1),
            coefficients,
        }
    }

    /// Number of permutations.
    pub fn num_perm(&self) -> usize {
        self.coefficients.len()
    }

    /// Signature of `text`, or `None` when it has no tokens.
    pub fn signature(&self, text: &str) -> Option<Signature> {
        let shingles = shingles(&text::tokens(text), self.shingle_size);
        if shingles.is_empty() {
            return None;
        }

        let mut slots = vec![u64::MAX; self.coefficients.len()];
        for shingle in &shingles {
            let x = base_hash(shingle);
            for (slot, &(a, b)) in slots.iter_mut().zip(&self.coefficients) {
                let h = ((a as u128 * x as u128 + b as u128) % PRIME as u128) as u64;
                *slot = (*slot).min(h);
            }
        }
        Some(Signature(slots))
    }
}

/// Contiguous `k`-token windows joined by spaces. Texts shorter than `k`
/// yield a single shingle of every token.
pub fn shingles(tokens: &[String], k: usize) -> HashSet<String> {
    if tokens.is_empty() {
        return HashSet::new();
    }
    if tokens.len() <= k {
        return HashSet::from([tokens.join(" ")]);
    }
    tokens.windows(k).map(|w| w.join(" ")).collect()
}

fn base_hash(shingle: &str) -> u64 {
    let digest = blake3::hash(shingle.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes) % PRIME
}

/// Locality-sensitive hashing over signature bands.
///
/// Two signatures become candidates when any band of `rows` consecutive
/// slots hashes to the same bucket.
#[derive(Debug, Clone)]
pub struct LshIndex {
    bands: usize,
    rows: usize,
    buckets: HashMap<(usize, u64), Vec<usize>>,
}

impl LshIndex {
    /// Create an index splitting `num_perm` slots into `bands` bands.
    /// `bands` is clamped so that every band has at least one row.
    pub fn new(num_perm: usize, bands: usize) -> Self {
        let bands = bands.clamp(1, num_perm.max(1));
        Self {
            bands,
            rows: (num_perm / bands).max(1),
            buckets: HashMap::new(),
        }
    }

    fn band_key(&self, signature: &Signature, band: usize) -> Option<u64> {
        let start = band * self.rows;
        let slice = signature.values().get(start..start + self.rows)?;
        Some(
            slice
                .iter()
                .fold(0u64, |acc, &v| acc.wrapping_mul(31).wrapping_add(v)),
        )
    }

    /// Register `id` under every band of `signature`.
    pub fn insert(&mut self, id: usize, signature: &Signature) {
        for band in 0..self.bands {
            if let Some(key) = self.band_key(signature, band) {
                self.buckets.entry((band, key)).or_default().push(id);
            }
        }
    }

    /// Ids sharing at least one bucket with `signature`, ascending.
    pub fn candidates(&self, signature: &Signature) -> BTreeSet<usize> {
        (0..self.bands)
            .filter_map(|band| {
                let key = self.band_key(signature, band)?;
                self.buckets.get(&(band, key))
            })
            .flatten()
            .copied()
            .collect()
    }
}
