use serde::{Deserialize, Serialize};

/// Sparse TF-IDF vector over a vocabulary
///
/// Entries are `(vocabulary index, weight)` sorted by index with no duplicates
/// and no zero weights. A vector produced by the vocabulary is either unit
/// length or empty (the zero vector).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WeightedVector {
    dim: usize,
    entries: Vec<(u32, f32)>,
}

impl WeightedVector {
    /// Zero vector of the given dimensionality
    #[inline]
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            entries: Vec::new(),
        }
    }

    /// Build from unsorted `(index, weight)` pairs; duplicates are summed,
    /// zeros dropped. Indices must be below `dim`.
    pub fn from_pairs(dim: usize, mut pairs: Vec<(u32, f32)>) -> Self {
        pairs.sort_unstable_by_key(|(idx, _)| *idx);
        let mut entries: Vec<(u32, f32)> = Vec::with_capacity(pairs.len());
        for (idx, weight) in pairs {
            debug_assert!((idx as usize) < dim);
            match entries.last_mut() {
                Some((last, acc)) if *last == idx => *acc += weight,
                _ => entries.push((idx, weight)),
            }
        }
        entries.retain(|(_, w)| *w != 0.0);
        Self { dim, entries }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of non-zero entries
    #[inline]
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn entries(&self) -> &[(u32, f32)] {
        &self.entries
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.entries.iter().map(|(idx, w)| (*idx as usize, *w))
    }

    pub fn get(&self, index: usize) -> f32 {
        self.entries
            .binary_search_by_key(&(index as u32), |(idx, _)| *idx)
            .map(|pos| self.entries[pos].1)
            .unwrap_or(0.0)
    }

    pub fn norm(&self) -> f32 {
        self.entries
            .iter()
            .map(|(_, w)| (*w as f64) * (*w as f64))
            .sum::<f64>()
            .sqrt() as f32
    }

    /// Scale to unit L2 length; the zero vector stays zero
    pub fn l2_normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for (_, w) in &mut self.entries {
                *w /= norm;
            }
        }
    }

    /// Sparse-sparse dot product (merge join on sorted indices)
    pub fn dot(&self, other: &WeightedVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut acc = 0.0f32;
        while i < self.entries.len() && j < other.entries.len() {
            let (a_idx, a_w) = self.entries[i];
            let (b_idx, b_w) = other.entries[j];
            match a_idx.cmp(&b_idx) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += a_w * b_w;
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }
}
