//! Bloom filter (§4.6): a standard double-hashing variant sized from an
//! expected item count and a target false-positive rate. No false
//! negatives; possible false positives.
//!
//! Hash function: `h_i(x) = h1(x) + i * h2(x) mod m`, so only two hash
//! computations are needed regardless of `k`.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const HEADER_LEN: usize = 12;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    inserted_count: u64,
}

impl BloomFilter {
    /// `m = ceil(-n * ln(p) / ln(2)^2)`, `k = ceil((m/n) * ln(2))`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(f64::EPSILON, 1.0 - f64::EPSILON);
        let m = (-n * p.ln() / (std::f64::consts::LN_2.powi(2))).ceil().max(8.0);
        let k = ((m / n) * std::f64::consts::LN_2).ceil().max(1.0);

        let num_bits = m as u64;
        let num_words = num_bits.div_ceil(64).max(1);
        Self {
            bits: vec![0u64; num_words as usize],
            num_bits,
            num_hashes: k as u32,
            inserted_count: 0,
        }
    }

    fn hash_pair<T: Hash>(item: &T) -> (u64, u64) {
        let mut h1 = DefaultHasher::new();
        item.hash(&mut h1);
        let a = h1.finish();

        let mut h2 = DefaultHasher::new();
        a.hash(&mut h2);
        item.hash(&mut h2);
        let b = h2.finish() | 1; // keep odd so it shares no common factor with a power-of-two m

        (a, b)
    }

    fn bit_indices<T: Hash>(&self, item: &T) -> impl Iterator<Item = u64> + '_ {
        let (h1, h2) = Self::hash_pair(item);
        (0..self.num_hashes as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2))) % self.num_bits)
    }

    pub fn add<T: Hash>(&mut self, item: &T) {
        let indices: Vec<u64> = self.bit_indices(item).collect();
        for index in indices {
            let word = (index / 64) as usize;
            let bit = index % 64;
            self.bits[word] |= 1 << bit;
        }
        self.inserted_count += 1;
    }

    pub fn might_contain<T: Hash>(&self, item: &T) -> bool {
        self.bit_indices(item).all(|index| {
            let word = (index / 64) as usize;
            let bit = index % 64;
            self.bits[word] & (1 << bit) != 0
        })
    }

    pub fn estimated_count(&self) -> u64 {
        self.inserted_count
    }

    /// Theoretical false-positive rate given the current fill ratio:
    /// `(1 - e^(-k*n/m))^k`.
    pub fn false_positive_rate(&self) -> f64 {
        let n = self.inserted_count as f64;
        let m = self.num_bits as f64;
        let k = self.num_hashes as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|w| *w = 0);
        self.inserted_count = 0;
    }

    /// 12-byte header `{size: u32, hashCount: u32, insertedCount: u32}`,
    /// little-endian, followed by the raw bit array.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.bits.len() * 8);
        out.extend_from_slice(&(self.num_bits as u32).to_le_bytes());
        out.extend_from_slice(&self.num_hashes.to_le_bytes());
        out.extend_from_slice(&(self.inserted_count as u32).to_le_bytes());
        for word in &self.bits {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn deserialize(data: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(data.len() >= HEADER_LEN, "bloom filter buffer shorter than header");
        let num_bits = u32::from_le_bytes(data[0..4].try_into()?) as u64;
        let num_hashes = u32::from_le_bytes(data[4..8].try_into()?);
        let inserted_count = u32::from_le_bytes(data[8..12].try_into()?) as u64;

        let body = &data[HEADER_LEN..];
        anyhow::ensure!(body.len() % 8 == 0, "bloom filter bit array is not word-aligned");
        let bits = body
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
            .collect();

        Ok(Self {
            bits,
            num_bits,
            num_hashes,
            inserted_count,
        })
    }
}

/// Composes one global bloom and one per-entity-type bloom, so a
/// negative on either short-circuits a store lookup.
#[derive(Clone, Debug)]
pub struct EntityFilter {
    global: BloomFilter,
    by_type: std::collections::HashMap<String, BloomFilter>,
    expected_items: usize,
    false_positive_rate: f64,
}

impl EntityFilter {
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        Self {
            global: BloomFilter::new(expected_items, false_positive_rate),
            by_type: std::collections::HashMap::new(),
            expected_items,
            false_positive_rate,
        }
    }

    pub fn add(&mut self, entity_type: &str, key: &str) {
        self.global.add(&key);
        self.by_type
            .entry(entity_type.to_string())
            .or_insert_with(|| BloomFilter::new(self.expected_items, self.false_positive_rate))
            .add(&key);
    }

    pub fn might_contain(&self, entity_type: &str, key: &str) -> bool {
        if !self.global.might_contain(&key) {
            return false;
        }
        self.by_type
            .get(entity_type)
            .map(|f| f.might_contain(&key))
            .unwrap_or(true)
    }

    /// `{expectedItems: u32, falsePositiveRate: f64}` header, then the
    /// global bloom, then `{entryCount: u32}` followed by
    /// `{nameLen: u32, name bytes, bloom}` per `by_type` entry. Each
    /// embedded `BloomFilter` is length-prefixed so entries can be
    /// read back without knowing their size in advance.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.expected_items as u32).to_le_bytes());
        out.extend_from_slice(&self.false_positive_rate.to_le_bytes());

        let global_bytes = self.global.serialize();
        out.extend_from_slice(&(global_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&global_bytes);

        out.extend_from_slice(&(self.by_type.len() as u32).to_le_bytes());
        for (name, filter) in &self.by_type {
            let name_bytes = name.as_bytes();
            out.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(name_bytes);
            let filter_bytes = filter.serialize();
            out.extend_from_slice(&(filter_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&filter_bytes);
        }
        out
    }

    pub fn deserialize(data: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(data.len() >= 16, "entity filter buffer shorter than header");
        let mut offset = 0usize;

        let expected_items = u32::from_le_bytes(data[offset..offset + 4].try_into()?) as usize;
        offset += 4;
        let false_positive_rate = f64::from_le_bytes(data[offset..offset + 8].try_into()?);
        offset += 8;

        let global_len = u32::from_le_bytes(data[offset..offset + 4].try_into()?) as usize;
        offset += 4;
        anyhow::ensure!(data.len() >= offset + global_len, "entity filter buffer truncated in global bloom");
        let global = BloomFilter::deserialize(&data[offset..offset + global_len])?;
        offset += global_len;

        anyhow::ensure!(data.len() >= offset + 4, "entity filter buffer truncated before entry count");
        let entry_count = u32::from_le_bytes(data[offset..offset + 4].try_into()?);
        offset += 4;

        let mut by_type = std::collections::HashMap::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            anyhow::ensure!(data.len() >= offset + 4, "entity filter buffer truncated before entry name length");
            let name_len = u32::from_le_bytes(data[offset..offset + 4].try_into()?) as usize;
            offset += 4;
            anyhow::ensure!(data.len() >= offset + name_len, "entity filter buffer truncated in entry name");
            let name = String::from_utf8(data[offset..offset + name_len].to_vec())?;
            offset += name_len;

            anyhow::ensure!(data.len() >= offset + 4, "entity filter buffer truncated before entry bloom length");
            let filter_len = u32::from_le_bytes(data[offset..offset + 4].try_into()?) as usize;
            offset += 4;
            anyhow::ensure!(data.len() >= offset + filter_len, "entity filter buffer truncated in entry bloom");
            let filter = BloomFilter::deserialize(&data[offset..offset + filter_len])?;
            offset += filter_len;

            by_type.insert(name, filter);
        }

        Ok(Self {
            global,
            by_type,
            expected_items,
            false_positive_rate,
        })
    }
}
