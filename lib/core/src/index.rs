use crate::document::DocumentId;
use crate::vector::{self, Vector};
use crate::{Error, Result};
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One scored search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocumentId,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
enum IndexState {
    #[default]
    Empty,
    Built {
        dim: usize,
        ids: Vec<DocumentId>,
        /// Unit-normalized embeddings, flattened row-major
        vectors: Vec<f32>,
        positions: AHashMap<DocumentId, usize>,
    },
}

/// Exact cosine-similarity index over document embeddings
///
/// Every search scores the query against every stored embedding.
#[derive(Debug, Clone, Default)]
pub struct SimilarityIndex {
    state: IndexState,
}

impl SimilarityIndex {
    /// An index with nothing built yet; searching it fails with `NotReady`
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from embeddings and their document ids (same order)
    pub fn build(embeddings: &[Vector], ids: &[DocumentId]) -> Result<Self> {
        if embeddings.len() != ids.len() {
            return Err(Error::InvalidDimension {
                expected: ids.len(),
                actual: embeddings.len(),
            });
        }
        let dim = embeddings.first().map(Vector::dim).unwrap_or(0);

        let mut positions = AHashMap::with_capacity(ids.len());
        let mut vectors = Vec::with_capacity(dim * embeddings.len());
        for (pos, (embedding, id)) in embeddings.iter().zip(ids).enumerate() {
            if embedding.dim() != dim {
                return Err(Error::InvalidDimension {
                    expected: dim,
                    actual: embedding.dim(),
                });
            }
            if positions.insert(id.clone(), pos).is_some() {
                return Err(Error::DuplicateDocument(id.to_string()));
            }
            vectors.extend_from_slice(embedding.normalized().as_slice());
        }

        Ok(Self {
            state: IndexState::Built {
                dim,
                ids: ids.to_vec(),
                vectors,
                positions,
            },
        })
    }

    /// Top `top_k` documents by cosine similarity to `query`
    ///
    /// Ordered by score descending, ties by ascending document id; at most
    /// `min(top_k, len)` hits. A zero query scores 0.0 against everything.
    pub fn search(&self, query: &Vector, top_k: usize) -> Result<Vec<SearchHit>> {
        let IndexState::Built { dim, ids, vectors, .. } = &self.state else {
            return Err(Error::NotReady);
        };
        if query.dim() != *dim {
            return Err(Error::InvalidDimension {
                expected: *dim,
                actual: query.dim(),
            });
        }
        if top_k == 0 || ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = query.normalized();
        let q = query.as_slice();
        let scores: Vec<f32> = if *dim == 0 {
            vec![0.0; ids.len()]
        } else {
            vectors
                .par_chunks_exact(*dim)
                .map(|row| vector::dot(row, q))
                .collect()
        };

        let mut order: Vec<usize> = (0..ids.len()).collect();
        let rank = |a: &usize, b: &usize| {
            OrderedFloat(scores[*b])
                .cmp(&OrderedFloat(scores[*a]))
                .then_with(|| ids[*a].cmp(&ids[*b]))
        };
        let k = top_k.min(ids.len());
        if k < order.len() {
            order.select_nth_unstable_by(k - 1, rank);
            order.truncate(k);
        }
        order.sort_by(rank);

        Ok(order
            .into_iter()
            .map(|pos| SearchHit {
                id: ids[pos].clone(),
                score: scores[pos],
            })
            .collect())
    }

    #[inline]
    pub fn is_built(&self) -> bool {
        matches!(self.state, IndexState::Built { .. })
    }

    #[inline]
    pub fn len(&self) -> usize {
        match &self.state {
            IndexState::Empty => 0,
            IndexState::Built { ids, .. } => ids.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> Option<usize> {
        match &self.state {
            IndexState::Empty => None,
            IndexState::Built { dim, .. } => Some(*dim),
        }
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.position(id).is_some()
    }

    /// Build-order position of a document
    pub fn position(&self, id: &DocumentId) -> Option<usize> {
        match &self.state {
            IndexState::Empty => None,
            IndexState::Built { positions, .. } => positions.get(id).copied(),
        }
    }

    /// Stored (unit-normalized) embedding of a document
    pub fn embedding(&self, id: &DocumentId) -> Option<&[f32]> {
        match &self.state {
            IndexState::Empty => None,
            IndexState::Built {
                dim,
                vectors,
                positions,
                ..
            } => positions
                .get(id)
                .map(|pos| &vectors[pos * dim..(pos + 1) * dim]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<DocumentId> {
        names.iter().map(|n| DocumentId::from(*n)).collect()
    }

    fn sample() -> SimilarityIndex {
        let embeddings = vec![
            Vector::new(vec![1.0, 0.0]),
            Vector::new(vec![2.0, 0.1]),
            Vector::new(vec![0.0, 1.0]),
            Vector::new(vec![-1.0, 0.0]),
        ];
        SimilarityIndex::build(&embeddings, &ids(&["a", "b", "c", "d"])).unwrap()
    }

    #[test]
    fn test_search_before_build() {
        let index = SimilarityIndex::empty();
        assert!(matches!(
            index.search(&Vector::new(vec![1.0]), 3),
            Err(Error::NotReady)
        ));
    }

    #[test]
    fn test_ordering_and_count() {
        let index = sample();
        let hits = index.search(&Vector::new(vec![1.0, 0.0]), 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id.as_str(), "a");
        assert_eq!(hits[1].id.as_str(), "b");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        let all = index.search(&Vector::new(vec![1.0, 0.0]), 100).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].id.as_str(), "d");
        assert!((all[3].score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_self_similarity_is_one() {
        let index = sample();
        let hits = index.search(&Vector::new(vec![2.0, 0.1]), 1).unwrap();
        assert_eq!(hits[0].id.as_str(), "b");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_query_ties_by_id() {
        let index = sample();
        let hits = index.search(&Vector::zeros(2), 4).unwrap();
        assert!(hits.iter().all(|h| h.score == 0.0));
        let order: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_build_errors() {
        let embeddings = vec![Vector::new(vec![1.0]), Vector::new(vec![2.0])];
        assert!(matches!(
            SimilarityIndex::build(&embeddings, &ids(&["x", "x"])),
            Err(Error::DuplicateDocument(_))
        ));
        assert!(matches!(
            SimilarityIndex::build(&embeddings, &ids(&["x"])),
            Err(Error::InvalidDimension { .. })
        ));
    }

    #[test]
    fn test_stored_embeddings_are_normalized() {
        let index = sample();
        let stored = index.embedding(&DocumentId::from("b")).unwrap();
        assert!((vector::dot(stored, stored) - 1.0).abs() < 1e-6);
        assert!(index.contains(&DocumentId::from("c")));
        assert!(!index.contains(&DocumentId::from("z")));
        assert_eq!(index.position(&DocumentId::from("c")), Some(2));
        assert_eq!(SimilarityIndex::empty().position(&DocumentId::from("a")), None);
    }
}
