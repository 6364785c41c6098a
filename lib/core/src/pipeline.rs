//! End-to-end fit and the immutable fitted state that serves queries.
//!
//! A fit runs normalizer -> vocabulary -> projection -> {index, clusters} as
//! one sequential batch. The resulting [`FittedState`] is never mutated;
//! re-fitting produces a new state which is swapped into a [`ModelHandle`].

use crate::cluster::ClusterModel;
use crate::config::PipelineConfig;
use crate::document::{Document, DocumentId};
use crate::index::SimilarityIndex;
use crate::normalizer::Normalizer;
use crate::projector::ProjectionBasis;
use crate::report::{ClusterSummary, SimilarityHit};
use crate::sparse::WeightedVector;
use crate::vector::Vector;
use crate::vocabulary::Vocabulary;
use crate::{Error, Result};
use ahash::AHashSet;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Summary of what a fit consumed and produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitInfo {
    /// Documents handed to fit, including blank ones
    pub input_documents: usize,
    /// Documents dropped because their raw text was blank
    pub dropped_blank: usize,
    pub documents: usize,
    /// Documents whose weighted vector is zero (all tokens stopwords or OOV)
    pub zero_vector_documents: usize,
    pub vocabulary_size: usize,
    pub requested_components: usize,
    pub effective_components: usize,
    pub num_clusters: usize,
    pub inertia: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// The complete fitted model plus the corpus it was fitted on
#[derive(Debug)]
pub struct FittedState {
    config: PipelineConfig,
    normalizer: Normalizer,
    vocabulary: Vocabulary,
    basis: ProjectionBasis,
    index: SimilarityIndex,
    clusters: ClusterModel,
    documents: Vec<Document>,
    weighted: Vec<WeightedVector>,
    embeddings: Vec<Vector>,
    info: FitInfo,
}

/// Stored parts a state can be reassembled from without re-fitting
pub struct StateParts {
    pub config: PipelineConfig,
    pub normalizer: Normalizer,
    pub vocabulary: Vocabulary,
    pub basis: ProjectionBasis,
    pub clusters: ClusterModel,
    pub documents: Vec<Document>,
    pub weighted: Vec<WeightedVector>,
    pub embeddings: Vec<Vector>,
    pub info: FitInfo,
}

fn check_unique(documents: &[Document]) -> Result<()> {
    let mut seen = AHashSet::with_capacity(documents.len());
    for doc in documents {
        if !seen.insert(&doc.id) {
            return Err(Error::DuplicateDocument(doc.id.to_string()));
        }
    }
    Ok(())
}

/// Fit the full pipeline with the built-in English normalizer
pub fn fit(documents: Vec<Document>, config: &PipelineConfig) -> Result<FittedState> {
    fit_with_normalizer(documents, config, Normalizer::default())
}

pub fn fit_with_normalizer(
    documents: Vec<Document>,
    config: &PipelineConfig,
    normalizer: Normalizer,
) -> Result<FittedState> {
    config.validate()?;
    let start = Instant::now();

    let input_documents = documents.len();
    let documents: Vec<Document> = documents.into_iter().filter(|d| !d.is_blank()).collect();
    let dropped_blank = input_documents - documents.len();
    if dropped_blank > 0 {
        warn!(dropped = dropped_blank, "skipping documents with blank text");
    }
    if documents.is_empty() {
        return Err(Error::EmptyCorpus);
    }
    if config.num_clusters > documents.len() {
        return Err(Error::InvalidClusterCount {
            requested: config.num_clusters,
            documents: documents.len(),
        });
    }
    check_unique(&documents)?;

    let tokens: Vec<Vec<String>> = documents
        .par_iter()
        .map(|d| normalizer.normalize(&d.text))
        .collect();
    info!(documents = documents.len(), "documents normalized");

    let vocabulary = Vocabulary::fit(&tokens, &config.vocabulary())?;
    let weighted: Vec<WeightedVector> = tokens.par_iter().map(|t| vocabulary.transform(t)).collect();
    let zero_vector_documents = weighted.iter().filter(|w| w.is_zero()).count();
    if zero_vector_documents > 0 {
        warn!(
            documents = zero_vector_documents,
            "documents have no vocabulary terms and embed to the zero vector"
        );
    }

    let basis = ProjectionBasis::fit(&weighted, &config.projection())?;
    let embeddings = basis.transform_batch(&weighted)?;

    let ids: Vec<DocumentId> = documents.iter().map(|d| d.id.clone()).collect();
    let index = SimilarityIndex::build(&embeddings, &ids)?;
    let clusters = ClusterModel::fit(&embeddings, &ids, &config.clustering())?;

    let info = FitInfo {
        input_documents,
        dropped_blank,
        documents: documents.len(),
        zero_vector_documents,
        vocabulary_size: vocabulary.len(),
        requested_components: basis.requested_k(),
        effective_components: basis.effective_k(),
        num_clusters: clusters.num_clusters(),
        inertia: clusters.inertia(),
        iterations: clusters.iterations(),
        converged: clusters.converged(),
    };
    info!(
        documents = info.documents,
        vocabulary = info.vocabulary_size,
        components = info.effective_components,
        clusters = info.num_clusters,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "pipeline fitted"
    );

    Ok(FittedState {
        config: config.clone(),
        normalizer,
        vocabulary,
        basis,
        index,
        clusters,
        documents,
        weighted,
        embeddings,
        info,
    })
}

impl FittedState {
    /// Reassemble a state from stored parts; the index is rebuilt from the
    /// stored embeddings
    pub fn from_parts(parts: StateParts) -> Result<Self> {
        let n = parts.documents.len();
        for len in [parts.weighted.len(), parts.embeddings.len(), parts.clusters.len()] {
            if len != n {
                return Err(Error::InvalidDimension {
                    expected: n,
                    actual: len,
                });
            }
        }
        if parts.basis.vocabulary_size() != parts.vocabulary.len() {
            return Err(Error::InvalidDimension {
                expected: parts.vocabulary.len(),
                actual: parts.basis.vocabulary_size(),
            });
        }
        if parts.clusters.dim() != parts.basis.effective_k() {
            return Err(Error::InvalidDimension {
                expected: parts.basis.effective_k(),
                actual: parts.clusters.dim(),
            });
        }

        let ids: Vec<DocumentId> = parts.documents.iter().map(|d| d.id.clone()).collect();
        if parts.clusters.ids() != ids.as_slice() {
            return Err(Error::Persistence(
                "cluster model disagrees with document order".to_string(),
            ));
        }
        let index = SimilarityIndex::build(&parts.embeddings, &ids)?;

        Ok(Self {
            config: parts.config,
            normalizer: parts.normalizer,
            vocabulary: parts.vocabulary,
            basis: parts.basis,
            index,
            clusters: parts.clusters,
            documents: parts.documents,
            weighted: parts.weighted,
            embeddings: parts.embeddings,
            info: parts.info,
        })
    }

    /// Text -> tokens -> weighted vector -> embedding
    pub fn embed(&self, text: &str) -> Result<Vector> {
        let tokens = self.normalizer.normalize(text);
        let weighted = self.vocabulary.transform(&tokens);
        self.basis.transform(&weighted)
    }

    /// The `top_k` fitted documents most similar to `query_text`
    ///
    /// A query with no vocabulary terms is not an error: every score is 0.0
    /// and ties are broken by document id.
    pub fn similarity_search(&self, query_text: &str, top_k: usize) -> Result<Vec<SimilarityHit>> {
        let query = self.embed(query_text)?;
        let hits = self.index.search(&query, top_k)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let doc = self.document(&hit.id)?;
                Some(SimilarityHit {
                    document_id: hit.id,
                    score: hit.score,
                    text: doc.text.clone(),
                    metadata: doc.metadata.clone(),
                })
            })
            .collect())
    }

    /// Per-cluster size, representative documents and top terms
    pub fn cluster_report(&self, representatives: usize, top_terms: usize) -> Result<Vec<ClusterSummary>> {
        self.clusters
            .clusters()
            .iter()
            .map(|cluster| {
                Ok(ClusterSummary {
                    cluster_id: cluster.id,
                    size: cluster.size(),
                    representative_document_ids: self
                        .clusters
                        .representative_members(cluster.id, representatives)?,
                    top_terms: self.clusters.top_terms(
                        cluster.id,
                        top_terms,
                        &self.vocabulary,
                        &self.weighted,
                    )?,
                })
            })
            .collect()
    }

    /// Cluster a fitted document belongs to
    pub fn assign_cluster(&self, id: &DocumentId) -> Result<usize> {
        self.clusters
            .cluster_of(id)
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    /// Nearest cluster for an unseen text
    pub fn predict_cluster(&self, text: &str) -> Result<usize> {
        self.clusters.assign(&self.embed(text)?)
    }

    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.index.position(id).map(|pos| &self.documents[pos])
    }

    /// Stored (raw, unnormalized) embedding of a fitted document
    pub fn embedding(&self, id: &DocumentId) -> Option<&Vector> {
        self.index.position(id).map(|pos| &self.embeddings[pos])
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[inline]
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    #[inline]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    #[inline]
    pub fn basis(&self) -> &ProjectionBasis {
        &self.basis
    }

    #[inline]
    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    #[inline]
    pub fn clusters(&self) -> &ClusterModel {
        &self.clusters
    }

    #[inline]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    #[inline]
    pub fn weighted(&self) -> &[WeightedVector] {
        &self.weighted
    }

    #[inline]
    pub fn embeddings(&self) -> &[Vector] {
        &self.embeddings
    }

    #[inline]
    pub fn info(&self) -> &FitInfo {
        &self.info
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Shared, swappable reference to the currently published state
///
/// Readers clone the `Arc` and keep a consistent snapshot for the duration
/// of their query even if a new state is published meanwhile.
#[derive(Debug, Default)]
pub struct ModelHandle {
    current: RwLock<Option<Arc<FittedState>>>,
    generation: AtomicU64,
}

impl ModelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: FittedState) -> Self {
        let handle = Self::new();
        handle.publish(state);
        handle
    }

    /// Swap in a new state; returns the new generation number
    pub fn publish(&self, state: FittedState) -> u64 {
        let state = Arc::new(state);
        let mut current = self.current.write();
        *current = Some(state);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "fitted state published");
        generation
    }

    pub fn current(&self) -> Result<Arc<FittedState>> {
        self.current.read().clone().ok_or(Error::NotReady)
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// Number of states published so far
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("1", "Loud music and party noise all night"),
            Document::new("2", "Noise from loud party next door"),
            Document::new("3", "Car blocking driveway illegal parking"),
            Document::new("4", "Illegal parking blocking hydrant car"),
        ]
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            min_document_frequency: 1,
            num_components: 2,
            num_clusters: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_and_search() {
        let state = fit(corpus(), &config()).unwrap();
        assert_eq!(state.len(), 4);
        assert_eq!(state.basis().effective_k(), 2);

        let hits = state.similarity_search("loud party noise", 4).unwrap();
        assert_eq!(hits.len(), 4);
        assert!(hits[0].document_id.as_str() == "1" || hits[0].document_id.as_str() == "2");
        assert!(hits[0].score > hits[2].score);
        assert!(!hits[0].text.is_empty());
    }

    #[test]
    fn test_blank_documents_dropped() {
        let mut docs = corpus();
        docs.push(Document::new("5", "   "));
        let state = fit(docs, &config()).unwrap();
        assert_eq!(state.info().dropped_blank, 1);
        assert_eq!(state.info().input_documents, 5);
        assert!(matches!(
            state.assign_cluster(&DocumentId::from("5")),
            Err(Error::DocumentNotFound(_))
        ));

        let blanks = vec![Document::new("a", ""), Document::new("b", "\t")];
        assert!(matches!(fit(blanks, &config()), Err(Error::EmptyCorpus)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut docs = corpus();
        docs.push(Document::new("1", "noise again"));
        assert!(matches!(fit(docs, &config()), Err(Error::DuplicateDocument(_))));
    }

    #[test]
    fn test_cluster_report_partitions_corpus() {
        let state = fit(corpus(), &config()).unwrap();
        let report = state.cluster_report(2, 3).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report.iter().map(|c| c.size).sum::<usize>(), 4);
        assert_eq!(
            state.assign_cluster(&DocumentId::from("1")).unwrap(),
            state.assign_cluster(&DocumentId::from("2")).unwrap()
        );
        assert_ne!(
            state.assign_cluster(&DocumentId::from("1")).unwrap(),
            state.assign_cluster(&DocumentId::from("3")).unwrap()
        );
    }

    fn parts_of(state: &FittedState) -> StateParts {
        StateParts {
            config: state.config().clone(),
            normalizer: state.normalizer().clone(),
            vocabulary: state.vocabulary().clone(),
            basis: state.basis().clone(),
            clusters: state.clusters().clone(),
            documents: state.documents().to_vec(),
            weighted: state.weighted().to_vec(),
            embeddings: state.embeddings().to_vec(),
            info: state.info().clone(),
        }
    }

    #[test]
    fn test_from_parts_rebuilds_lookups() {
        let state = fit(corpus(), &config()).unwrap();
        let rebuilt = FittedState::from_parts(parts_of(&state)).unwrap();
        let id = DocumentId::from("3");
        assert_eq!(rebuilt.document(&id).unwrap().text, state.document(&id).unwrap().text);
        assert_eq!(rebuilt.embedding(&id), state.embedding(&id));
        assert_eq!(rebuilt.assign_cluster(&id).unwrap(), state.assign_cluster(&id).unwrap());
        assert!(rebuilt.document(&DocumentId::from("42")).is_none());
    }

    #[test]
    fn test_from_parts_rejects_reordered_clusters() {
        let state = fit(corpus(), &config()).unwrap();
        let mut parts = parts_of(&state);
        parts.documents.reverse();
        parts.weighted.reverse();
        parts.embeddings.reverse();
        assert!(matches!(
            FittedState::from_parts(parts),
            Err(Error::Persistence(_))
        ));
    }

    #[test]
    fn test_handle_publish_and_snapshot() {
        let handle = ModelHandle::new();
        assert!(matches!(handle.current(), Err(Error::NotReady)));
        assert_eq!(handle.generation(), 0);

        handle.publish(fit(corpus(), &config()).unwrap());
        let snapshot = handle.current().unwrap();
        assert_eq!(handle.generation(), 1);

        let mut docs = corpus();
        docs.push(Document::new("9", "noise party loud"));
        handle.publish(fit(docs, &config()).unwrap());
        assert_eq!(handle.generation(), 2);
        // in-flight readers keep their snapshot
        assert_eq!(snapshot.len(), 4);
        assert_eq!(handle.current().unwrap().len(), 5);
    }
}
