//! KMeans partitioning of document embeddings.
//!
//! Minimizes the within-cluster sum of squares
//!
//! ```text
//! J = Σ_c Σ_{x ∈ C_c} ||x - μ_c||²
//! ```
//!
//! with Lloyd iterations from k-means++ seeds. `num_init` independently seeded
//! runs are made and the lowest-inertia run is kept (earliest run on ties).

use crate::config::ClusterConfig;
use crate::document::DocumentId;
use crate::sparse::WeightedVector;
use crate::vector::{self, Vector};
use crate::vocabulary::Vocabulary;
use crate::{Error, Result};
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A term and its mean weight over a cluster's members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermWeight {
    pub term: String,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: usize,
    pub centroid: Vector,
    /// Member ids in corpus order
    pub members: Vec<DocumentId>,
    positions: Vec<usize>,
}

impl Cluster {
    #[inline]
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ClusterData", into = "ClusterData")]
pub struct ClusterModel {
    clusters: Vec<Cluster>,
    ids: Vec<DocumentId>,
    labels: Vec<usize>,
    /// Squared distance of each document to its own centroid
    distances: Vec<f32>,
    lookup: AHashMap<DocumentId, usize>,
    inertia: f64,
    iterations: usize,
    converged: bool,
}

#[derive(Serialize, Deserialize)]
struct ClusterData {
    centroids: Vec<Vector>,
    ids: Vec<DocumentId>,
    labels: Vec<usize>,
    distances: Vec<f32>,
    inertia: f64,
    iterations: usize,
    converged: bool,
}

impl ClusterData {
    /// Labels and distances cover every id, and every label names a centroid
    fn validate(&self) -> Result<()> {
        let n = self.ids.len();
        for len in [self.labels.len(), self.distances.len()] {
            if len != n {
                return Err(Error::InvalidDimension {
                    expected: n,
                    actual: len,
                });
            }
        }
        let dim = self.centroids.first().map_or(0, Vector::dim);
        if let Some(bad) = self.centroids.iter().find(|c| c.dim() != dim) {
            return Err(Error::InvalidDimension {
                expected: dim,
                actual: bad.dim(),
            });
        }
        let k = self.centroids.len();
        if let Some((id, label)) = self.ids.iter().zip(&self.labels).find(|(_, l)| **l >= k) {
            return Err(Error::Persistence(format!(
                "document {id} labelled {label}, but the model has {k} clusters"
            )));
        }
        Ok(())
    }
}

impl TryFrom<ClusterData> for ClusterModel {
    type Error = Error;

    fn try_from(data: ClusterData) -> Result<Self> {
        data.validate()?;
        Ok(ClusterModel::assemble(
            data.centroids,
            data.ids,
            data.labels,
            data.distances,
            data.inertia,
            data.iterations,
            data.converged,
        ))
    }
}

impl From<ClusterModel> for ClusterData {
    fn from(model: ClusterModel) -> Self {
        ClusterData {
            centroids: model.clusters.into_iter().map(|c| c.centroid).collect(),
            ids: model.ids,
            labels: model.labels,
            distances: model.distances,
            inertia: model.inertia,
            iterations: model.iterations,
            converged: model.converged,
        }
    }
}

/// Outcome of one seeded Lloyd run
struct Run {
    centroids: Vec<Vector>,
    labels: Vec<usize>,
    distances: Vec<f32>,
    inertia: f64,
    iterations: usize,
    converged: bool,
}

/// Nearest centroid by squared Euclidean distance; lowest id wins ties
fn nearest<'a>(centroids: impl Iterator<Item = &'a Vector>, point: &[f32]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (id, centroid) in centroids.enumerate() {
        let d = vector::squared_l2(centroid.as_slice(), point);
        if d < best.1 {
            best = (id, d);
        }
    }
    best
}

fn assign_all(centroids: &[Vector], points: &[Vector]) -> (Vec<usize>, Vec<f32>) {
    points
        .par_iter()
        .map(|p| nearest(centroids.iter(), p.as_slice()))
        .unzip()
}

/// k-means++ seeding: each next seed is drawn with probability proportional
/// to its squared distance from the seeds chosen so far
fn kmeans_plus_plus(points: &[Vector], k: usize, rng: &mut StdRng) -> Vec<Vector> {
    let n = points.len();
    let mut chosen = vec![false; n];
    let first = rng.random_range(0..n);
    chosen[first] = true;
    let mut centroids = vec![points[first].clone()];
    let mut d2: Vec<f64> = points
        .iter()
        .map(|p| vector::squared_l2(p.as_slice(), points[first].as_slice()) as f64)
        .collect();

    while centroids.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut pick = None;
            for (i, d) in d2.iter().enumerate() {
                if *d <= 0.0 {
                    continue;
                }
                cumulative += d;
                pick = Some(i);
                if cumulative > target {
                    break;
                }
            }
            pick
        } else {
            None
        };
        // all remaining points coincide with a seed: take the first unused one
        let next = next
            .or_else(|| chosen.iter().position(|c| !c))
            .unwrap_or(0);

        chosen[next] = true;
        let seed = points[next].clone();
        for (i, p) in points.iter().enumerate() {
            let d = vector::squared_l2(p.as_slice(), seed.as_slice()) as f64;
            if d < d2[i] {
                d2[i] = d;
            }
        }
        centroids.push(seed);
    }
    centroids
}

/// Means of the assigned points; an empty cluster keeps its previous centroid
fn recompute_centroids(points: &[Vector], labels: &[usize], previous: &[Vector]) -> Vec<Vector> {
    let dim = previous.first().map(Vector::dim).unwrap_or(0);
    let mut sums = vec![vec![0.0f64; dim]; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (p, label) in points.iter().zip(labels) {
        counts[*label] += 1;
        for (s, x) in sums[*label].iter_mut().zip(p.as_slice()) {
            *s += *x as f64;
        }
    }
    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((sum, count), prev)| {
            if count == 0 {
                prev.clone()
            } else {
                Vector::new(sum.into_iter().map(|s| (s / count as f64) as f32).collect())
            }
        })
        .collect()
}

fn lloyd(points: &[Vector], k: usize, max_iterations: usize, seed: u64) -> Run {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = kmeans_plus_plus(points, k, &mut rng);
    let mut labels: Vec<usize> = Vec::new();
    let mut distances: Vec<f32> = Vec::new();
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..max_iterations {
        iterations = iter + 1;
        let (new_labels, new_distances) = assign_all(&centroids, points);
        distances = new_distances;
        if new_labels == labels {
            converged = true;
            break;
        }
        labels = new_labels;
        centroids = recompute_centroids(points, &labels, &centroids);
    }

    if !converged {
        let (final_labels, final_distances) = assign_all(&centroids, points);
        converged = final_labels == labels;
        labels = final_labels;
        distances = final_distances;
    }

    let inertia = distances.iter().map(|d| *d as f64).sum();
    Run {
        centroids,
        labels,
        distances,
        inertia,
        iterations,
        converged,
    }
}

impl ClusterModel {
    /// Partition `embeddings` (one per id, same order) into `num_clusters` groups
    pub fn fit(embeddings: &[Vector], ids: &[DocumentId], config: &ClusterConfig) -> Result<Self> {
        let n = embeddings.len();
        if n == 0 {
            return Err(Error::EmptyCorpus);
        }
        if config.num_clusters == 0 || config.num_clusters > n {
            return Err(Error::InvalidClusterCount {
                requested: config.num_clusters,
                documents: n,
            });
        }
        if ids.len() != n {
            return Err(Error::InvalidDimension {
                expected: n,
                actual: ids.len(),
            });
        }
        let dim = embeddings[0].dim();
        if let Some(bad) = embeddings.iter().find(|e| e.dim() != dim) {
            return Err(Error::InvalidDimension {
                expected: dim,
                actual: bad.dim(),
            });
        }

        let start = Instant::now();
        let mut master = StdRng::seed_from_u64(config.random_seed);
        let seeds: Vec<u64> = (0..config.num_init.max(1)).map(|_| master.random()).collect();

        let runs: Vec<Run> = seeds
            .par_iter()
            .map(|seed| lloyd(embeddings, config.num_clusters, config.max_iterations, *seed))
            .collect();

        let mut best: Option<Run> = None;
        for (i, run) in runs.into_iter().enumerate() {
            debug!(
                run = i,
                inertia = run.inertia,
                iterations = run.iterations,
                converged = run.converged,
                "kmeans run finished"
            );
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        let best = best.ok_or(Error::EmptyCorpus)?;

        if !best.converged {
            warn!(
                max_iterations = config.max_iterations,
                inertia = best.inertia,
                "kmeans did not converge"
            );
        }

        let model = Self::assemble(
            best.centroids,
            ids.to_vec(),
            best.labels,
            best.distances,
            best.inertia,
            best.iterations,
            best.converged,
        );
        info!(
            clusters = model.num_clusters(),
            documents = n,
            inertia = model.inertia,
            iterations = model.iterations,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "clusters fitted"
        );
        Ok(model)
    }

    fn assemble(
        centroids: Vec<Vector>,
        ids: Vec<DocumentId>,
        labels: Vec<usize>,
        distances: Vec<f32>,
        inertia: f64,
        iterations: usize,
        converged: bool,
    ) -> Self {
        let mut clusters: Vec<Cluster> = centroids
            .into_iter()
            .enumerate()
            .map(|(id, centroid)| Cluster {
                id,
                centroid,
                members: Vec::new(),
                positions: Vec::new(),
            })
            .collect();
        let mut lookup = AHashMap::with_capacity(ids.len());
        for (pos, (id, label)) in ids.iter().zip(&labels).enumerate() {
            if let Some(cluster) = clusters.get_mut(*label) {
                cluster.members.push(id.clone());
                cluster.positions.push(pos);
            }
            lookup.insert(id.clone(), pos);
        }
        Self {
            clusters,
            ids,
            labels,
            distances,
            lookup,
            inertia,
            iterations,
            converged,
        }
    }

    /// Nearest centroid for an arbitrary embedding
    pub fn assign(&self, embedding: &Vector) -> Result<usize> {
        let dim = self.dim();
        if embedding.dim() != dim {
            return Err(Error::InvalidDimension {
                expected: dim,
                actual: embedding.dim(),
            });
        }
        let centroids = self.clusters.iter().map(|c| &c.centroid);
        Ok(nearest(centroids, embedding.as_slice()).0)
    }

    pub fn cluster_of(&self, id: &DocumentId) -> Option<usize> {
        self.lookup.get(id).map(|pos| self.labels[*pos])
    }

    pub fn cluster(&self, cluster_id: usize) -> Result<&Cluster> {
        self.clusters
            .get(cluster_id)
            .ok_or(Error::ClusterNotFound(cluster_id))
    }

    pub fn members(&self, cluster_id: usize) -> Result<&[DocumentId]> {
        Ok(&self.cluster(cluster_id)?.members)
    }

    /// The `m` members closest to the centroid, ties by ascending id
    pub fn representative_members(&self, cluster_id: usize, m: usize) -> Result<Vec<DocumentId>> {
        let cluster = self.cluster(cluster_id)?;
        let mut ranked: Vec<usize> = cluster.positions.clone();
        ranked.sort_by(|a, b| {
            OrderedFloat(self.distances[*a])
                .cmp(&OrderedFloat(self.distances[*b]))
                .then_with(|| self.ids[*a].cmp(&self.ids[*b]))
        });
        Ok(ranked
            .into_iter()
            .take(m)
            .map(|pos| self.ids[pos].clone())
            .collect())
    }

    /// Highest mean-weight terms over a cluster's members
    ///
    /// `weighted` holds the weighted vectors of the fit corpus in fit order.
    pub fn top_terms(
        &self,
        cluster_id: usize,
        n: usize,
        vocabulary: &Vocabulary,
        weighted: &[WeightedVector],
    ) -> Result<Vec<TermWeight>> {
        let cluster = self.cluster(cluster_id)?;
        if weighted.len() != self.ids.len() {
            return Err(Error::InvalidDimension {
                expected: self.ids.len(),
                actual: weighted.len(),
            });
        }
        if cluster.positions.is_empty() {
            return Ok(Vec::new());
        }

        let mut sums = vec![0.0f64; vocabulary.len()];
        for pos in &cluster.positions {
            for (idx, w) in weighted[*pos].iter() {
                if let Some(s) = sums.get_mut(idx) {
                    *s += w as f64;
                }
            }
        }
        let count = cluster.positions.len() as f64;

        let mut terms: Vec<TermWeight> = sums
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s != 0.0)
            .filter_map(|(idx, s)| {
                vocabulary.term(idx).map(|t| TermWeight {
                    term: t.term.clone(),
                    weight: (s / count) as f32,
                })
            })
            .collect();
        terms.sort_by(|a, b| {
            OrderedFloat(b.weight)
                .cmp(&OrderedFloat(a.weight))
                .then_with(|| a.term.cmp(&b.term))
        });
        terms.truncate(n);
        Ok(terms)
    }

    #[inline]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    #[inline]
    pub fn num_clusters(&self) -> usize {
        self.clusters.len()
    }

    /// Number of documents partitioned
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.clusters.first().map(|c| c.centroid.dim()).unwrap_or(0)
    }

    #[inline]
    pub fn ids(&self) -> &[DocumentId] {
        &self.ids
    }

    #[inline]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Within-cluster sum of squared distances
    #[inline]
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    #[inline]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    #[inline]
    pub fn converged(&self) -> bool {
        self.converged
    }
}
