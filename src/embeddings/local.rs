//! Local TF-IDF embedder with sparse random projection
//!
//! Produces fixed-length vectors without any model or network access:
//!
//! 1. Tokenize (see [`super::text`]) into unigrams and adjacent bigrams
//! 2. Update the rolling document-frequency table
//! 3. Weight each term by augmented TF × smoothed IDF,
//!    `(0.5 + 0.5·tf/max_tf) × (ln((N+1)/(df+1)) + 1)`
//! 4. Project each term into [`EMBEDDING_DIM`] dimensions: a PRNG seeded from
//!    the term's 32-bit hash picks ⌊√dim⌋ coordinates and adds `weight × U(-1, 1)`
//! 5. L2-normalize
//!
//! The projection approximately preserves cosine similarity of the sparse
//! TF-IDF space. Because IDF depends on the documents seen so far, the same
//! text can map to slightly different vectors as the corpus grows.

use super::text::{term_frequencies, tokenize};
use std::collections::HashMap;

/// Output dimensionality of local embeddings.
pub const EMBEDDING_DIM: usize = 384;

/// Large odd multiplier spreading a term's coordinates over the vector.
const SPREAD: u64 = 2_654_435_761;

/// 32-bit FNV-1a.
pub fn hash32(term: &str) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for b in term.bytes() {
        h ^= b as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

/// mulberry32 PRNG; small, fast and fully deterministic.
struct Mulberry32(u32);

impl Mulberry32 {
    fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_add(0x6D2B_79F5);
        let mut t = self.0;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        ((t ^ (t >> 14)) as f64 / 4_294_967_296.0) as f32
    }

    /// Uniform in [-1, 1)
    fn next_signed(&mut self) -> f32 {
        self.next_f32() * 2.0 - 1.0
    }
}

/// Local embedder holding the document-frequency corpus.
#[derive(Debug, Default, Clone)]
pub struct LocalEmbedder {
    doc_freq: HashMap<String, u32>,
    total_docs: u64,
}

impl LocalEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents embedded so far.
    pub fn total_docs(&self) -> u64 {
        self.total_docs
    }

    /// Number of distinct terms seen so far.
    pub fn vocabulary_size(&self) -> usize {
        self.doc_freq.len()
    }

    /// Embed `text`, adding it to the corpus.
    ///
    /// Empty or stop-word-only input yields the zero vector and does not
    /// count as a document.
    pub fn embed(&mut self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vec![0.0; EMBEDDING_DIM];
        }
        let tf = term_frequencies(&tokens);

        self.total_docs += 1;
        for term in tf.keys() {
            *self.doc_freq.entry(term.clone()).or_default() += 1;
        }

        let max_tf = tf.values().copied().max().unwrap_or(1) as f64;
        let n = self.total_docs as f64;

        let mut acc = vec![0.0f32; EMBEDDING_DIM];
        let touches = (EMBEDDING_DIM as f64).sqrt().floor() as u64;

        // Iterate in a fixed order so float accumulation is reproducible
        let mut terms: Vec<(&String, &u32)> = tf.iter().collect();
        terms.sort_unstable_by(|a, b| a.0.cmp(b.0));

        for (term, freq) in terms {
            let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
            let idf = ((n + 1.0) / (df + 1.0)).ln() + 1.0;
            let weight = ((0.5 + 0.5 * (*freq as f64) / max_tf) * idf) as f32;

            let seed = hash32(term);
            let mut rng = Mulberry32(seed);
            for i in 0..touches {
                let dim = ((seed as u64).wrapping_add(i.wrapping_mul(SPREAD)) % EMBEDDING_DIM as u64)
                    as usize;
                acc[dim] += weight * rng.next_signed();
            }
        }

        l2_normalize(&mut acc);
        acc
    }

    /// Forget every document seen so far.
    pub fn reset(&mut self) {
        self.doc_freq.clear();
        self.total_docs = 0;
    }
}

/// Scale `v` to unit length in place; the zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
