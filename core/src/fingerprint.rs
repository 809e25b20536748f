//! SimHash fingerprints and a banded LSH store for near-duplicate detection.
//!
//! The 64 fingerprint bits are cut into `threshold + 1` disjoint bands. Two
//! fingerprints within `threshold` bits of each other cannot differ in every
//! band, so at least one band table always lists the stored neighbour and the
//! full Hamming check only runs on that candidate set.

use crate::tokenizer::Token;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;

pub const FINGERPRINT_BITS: u32 = 64;

pub type Fingerprint = u64;

fn shingle_hash(shingle: &str) -> u64 {
    let digest = Sha1::digest(shingle.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// SimHash over consecutive token pairs.
pub fn compute_fingerprint(tokens: &[Token]) -> Fingerprint {
    let mut shingles: Vec<String> = tokens.windows(2).map(|w| format!("{} {}", w[0].value, w[1].value)).collect();
    if shingles.is_empty() {
        shingles.extend(tokens.first().map(|t| t.value.clone()));
    }
    simhash(shingles.iter().map(String::as_str))
}

pub fn simhash<'a>(shingles: impl IntoIterator<Item = &'a str>) -> Fingerprint {
    let mut acc = [0i64; FINGERPRINT_BITS as usize];
    for shingle in shingles {
        let h = shingle_hash(shingle);
        for (bit, slot) in acc.iter_mut().enumerate() {
            if h & (1u64 << bit) != 0 {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }
    acc.iter()
        .enumerate()
        .filter(|(_, v)| **v > 0)
        .fold(0u64, |fp, (bit, _)| fp | (1u64 << bit))
}

pub fn hamming_distance(a: Fingerprint, b: Fingerprint) -> u32 {
    (a ^ b).count_ones()
}

#[derive(Debug, Clone, Copy)]
struct Band {
    shift: u32,
    mask: u64,
}

impl Band {
    fn key(&self, fp: Fingerprint) -> u64 {
        (fp >> self.shift) & self.mask
    }
}

/// Contiguous bands covering all bits, widths differing by at most one.
fn make_bands(count: u32) -> Vec<Band> {
    let count = count.clamp(1, FINGERPRINT_BITS);
    let base = FINGERPRINT_BITS / count;
    let extra = FINGERPRINT_BITS % count;
    let mut shift = 0;
    (0..count)
        .map(|i| {
            let width = base + u32::from(i < extra);
            let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
            let band = Band { shift, mask };
            shift += width;
            band
        })
        .collect()
}

#[derive(Serialize, Deserialize)]
pub(crate) struct FingerprintFile {
    pub hamming_threshold: u32,
    pub fingerprints: Vec<Fingerprint>,
}

/// Append-only set of registered fingerprints.
pub struct FingerprintStore {
    hamming_threshold: u32,
    bands: Vec<Band>,
    tables: Vec<HashMap<u64, Vec<Fingerprint>>>,
    fingerprints: Vec<Fingerprint>,
}

impl FingerprintStore {
    pub fn new(hamming_threshold: u32) -> Self {
        let bands = make_bands(hamming_threshold + 1);
        let tables = vec![HashMap::new(); bands.len()];
        Self { hamming_threshold, bands, tables, fingerprints: Vec::new() }
    }

    pub fn hamming_threshold(&self) -> u32 { self.hamming_threshold }

    pub fn len(&self) -> usize { self.fingerprints.len() }

    pub fn is_empty(&self) -> bool { self.fingerprints.is_empty() }

    pub fn is_duplicate(&self, fp: Fingerprint) -> bool {
        self.bands.iter().zip(&self.tables).any(|(band, table)| {
            table
                .get(&band.key(fp))
                .is_some_and(|bucket| bucket.iter().any(|&c| hamming_distance(fp, c) <= self.hamming_threshold))
        })
    }

    /// Register `fp` unless it is a near duplicate. Returns whether it was added.
    pub fn add(&mut self, fp: Fingerprint) -> bool {
        if self.is_duplicate(fp) {
            return false;
        }
        self.insert(fp);
        true
    }

    fn insert(&mut self, fp: Fingerprint) {
        for (band, table) in self.bands.iter().zip(self.tables.iter_mut()) {
            table.entry(band.key(fp)).or_default().push(fp);
        }
        self.fingerprints.push(fp);
    }

    pub(crate) fn to_file(&self) -> FingerprintFile {
        FingerprintFile { hamming_threshold: self.hamming_threshold, fingerprints: self.fingerprints.clone() }
    }

    /// Rebuild from persisted fingerprints, banded for `hamming_threshold`.
    pub(crate) fn from_fingerprints(hamming_threshold: u32, fingerprints: Vec<Fingerprint>) -> Self {
        let mut store = Self::new(hamming_threshold);
        for fp in fingerprints {
            store.insert(fp);
        }
        store
    }
}
