//! Latent semantic projection (truncated SVD of the weighted document matrix).
//!
//! The fitted basis maps a sparse weighted vector `x` over the vocabulary to
//! the k-dimensional embedding `x · V_k`, where `V_k` holds the first k right
//! singular vectors as columns. For a fit document this equals its row of
//! `U_k · Σ_k`.

use crate::config::ProjectionConfig;
use crate::linalg;
use crate::sparse::WeightedVector;
use crate::vector::Vector;
use crate::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Extra sketch columns beyond the requested component count
pub const OVERSAMPLING: usize = 10;

/// Singular values at or below `RANK_TOLERANCE * σ_max` count as zero
pub const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionBasis {
    vocabulary_size: usize,
    requested_k: usize,
    effective_k: usize,
    /// Row-major `vocabulary_size x effective_k`
    components: Vec<f32>,
    singular_values: Vec<f64>,
    explained_variance_ratio: Vec<f64>,
}

impl ProjectionBasis {
    /// Fit on the weighted document matrix (one row per document)
    pub fn fit(vectors: &[WeightedVector], config: &ProjectionConfig) -> Result<Self> {
        let requested_k = config.num_components;
        if requested_k == 0 {
            return Err(Error::InvalidComponentCount(0));
        }
        let first = vectors.first().ok_or(Error::EmptyCorpus)?;
        let dim = first.dim();
        if let Some(bad) = vectors.iter().find(|v| v.dim() != dim) {
            return Err(Error::InvalidDimension {
                expected: dim,
                actual: bad.dim(),
            });
        }
        if dim == 0 || vectors.iter().all(WeightedVector::is_zero) {
            return Err(Error::DegenerateMatrix);
        }

        let start = Instant::now();
        let max_rank = vectors.len().min(dim);
        let width = (requested_k + OVERSAMPLING).min(max_rank);
        let svd = linalg::truncated_svd(
            vectors,
            dim,
            width,
            config.power_iterations,
            config.random_seed,
        );

        let sigma_max = svd.singular_values.first().copied().unwrap_or(0.0);
        let rank = svd
            .singular_values
            .iter()
            .take_while(|s| **s > RANK_TOLERANCE * sigma_max)
            .count();
        if rank == 0 {
            return Err(Error::DegenerateMatrix);
        }

        let effective_k = requested_k.min(rank);
        if effective_k < requested_k {
            warn!(
                requested = requested_k,
                effective = effective_k,
                "num_components exceeds the rank of the document matrix; clamping"
            );
        }

        let mut components = vec![0.0f32; dim * effective_k];
        for (c, v) in svd.right_vectors.iter().take(effective_k).enumerate() {
            for (term, x) in v.iter().enumerate() {
                components[term * effective_k + c] = *x as f32;
            }
        }

        let mut basis = Self {
            vocabulary_size: dim,
            requested_k,
            effective_k,
            components,
            singular_values: svd.singular_values[..effective_k].to_vec(),
            explained_variance_ratio: Vec::new(),
        };
        basis.explained_variance_ratio = basis.variance_ratio(vectors);

        info!(
            documents = vectors.len(),
            vocabulary = dim,
            components = effective_k,
            explained = basis.explained_variance_ratio.iter().sum::<f64>(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "projection fitted"
        );
        Ok(basis)
    }

    /// Variance of each projected component over total per-term variance
    fn variance_ratio(&self, vectors: &[WeightedVector]) -> Vec<f64> {
        let n = vectors.len() as f64;
        let k = self.effective_k;

        let mut column_sum = vec![0.0f64; self.vocabulary_size];
        let mut total_sq = 0.0f64;
        for v in vectors {
            for (idx, w) in v.iter() {
                column_sum[idx] += w as f64;
                total_sq += (w as f64) * (w as f64);
            }
        }
        let total_variance =
            total_sq / n - column_sum.iter().map(|s| (s / n) * (s / n)).sum::<f64>();
        if total_variance <= 0.0 {
            return vec![0.0; k];
        }

        let mut sum = vec![0.0f64; k];
        let mut sum_sq = vec![0.0f64; k];
        for v in vectors {
            let projected = self.project(v);
            for c in 0..k {
                sum[c] += projected[c];
                sum_sq[c] += projected[c] * projected[c];
            }
        }
        (0..k)
            .map(|c| {
                let mean = sum[c] / n;
                (sum_sq[c] / n - mean * mean).max(0.0) / total_variance
            })
            .collect()
    }

    fn project(&self, vector: &WeightedVector) -> Vec<f64> {
        let k = self.effective_k;
        let mut out = vec![0.0f64; k];
        for (idx, w) in vector.iter() {
            let row = &self.components[idx * k..(idx + 1) * k];
            for (o, c) in out.iter_mut().zip(row) {
                *o += w as f64 * *c as f64;
            }
        }
        out
    }

    /// Project a weighted vector into the semantic space
    pub fn transform(&self, vector: &WeightedVector) -> Result<Vector> {
        if vector.dim() != self.vocabulary_size {
            return Err(Error::InvalidDimension {
                expected: self.vocabulary_size,
                actual: vector.dim(),
            });
        }
        Ok(Vector::new(
            self.project(vector).into_iter().map(|x| x as f32).collect(),
        ))
    }

    pub fn transform_batch(&self, vectors: &[WeightedVector]) -> Result<Vec<Vector>> {
        vectors.par_iter().map(|v| self.transform(v)).collect()
    }

    #[inline]
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    #[inline]
    pub fn requested_k(&self) -> usize {
        self.requested_k
    }

    /// Dimensionality of the embeddings this basis produces
    #[inline]
    pub fn effective_k(&self) -> usize {
        self.effective_k
    }

    #[inline]
    pub fn was_clamped(&self) -> bool {
        self.effective_k < self.requested_k
    }

    #[inline]
    pub fn singular_values(&self) -> &[f64] {
        &self.singular_values
    }

    #[inline]
    pub fn explained_variance_ratio(&self) -> &[f64] {
        &self.explained_variance_ratio
    }

    /// Column `c` of the basis (one right singular vector over the vocabulary)
    pub fn component(&self, c: usize) -> Option<Vec<f32>> {
        if c >= self.effective_k {
            return None;
        }
        Some(
            (0..self.vocabulary_size)
                .map(|term| self.components[term * self.effective_k + c])
                .collect(),
        )
    }
}

/// Projection stage of the pipeline
#[derive(Debug, Clone, Default)]
pub struct SemanticProjector {
    config: ProjectionConfig,
    basis: Option<ProjectionBasis>,
}

impl SemanticProjector {
    pub fn new(config: ProjectionConfig) -> Self {
        Self {
            config,
            basis: None,
        }
    }

    pub fn from_basis(config: ProjectionConfig, basis: ProjectionBasis) -> Self {
        Self {
            config,
            basis: Some(basis),
        }
    }

    pub fn fit(&mut self, vectors: &[WeightedVector]) -> Result<&ProjectionBasis> {
        let basis = ProjectionBasis::fit(vectors, &self.config)?;
        Ok(self.basis.insert(basis))
    }

    pub fn transform(&self, vector: &WeightedVector) -> Result<Vector> {
        self.basis()?.transform(vector)
    }

    pub fn basis(&self) -> Result<&ProjectionBasis> {
        self.basis.as_ref().ok_or(Error::NotFitted("projector"))
    }

    #[inline]
    pub fn is_fitted(&self) -> bool {
        self.basis.is_some()
    }

    pub fn into_basis(self) -> Result<ProjectionBasis> {
        self.basis.ok_or(Error::NotFitted("projector"))
    }
}
