//! # semdex Core
//!
//! Core library for semdex, a semantic index over short incident texts.
//!
//! This crate provides the fitting stages and the query engine:
//!
//! - [`Normalizer`] - Lowercasing, punctuation stripping, stopword removal
//! - [`Vocabulary`] - Frozen TF-IDF vocabulary and weighting
//! - [`ProjectionBasis`] - LSI projection via truncated SVD
//! - [`SimilarityIndex`] - Exact cosine-similarity search over embeddings
//! - [`ClusterModel`] - KMeans partition with per-cluster characterization
//! - [`FittedState`] / [`ModelHandle`] - Immutable fitted model and its
//!   swappable shared reference
//!
//! ## Example
//!
//! ```rust
//! use semdex_core::{pipeline, Document, PipelineConfig};
//!
//! let docs = vec![
//!     Document::new("1", "Loud music party noise"),
//!     Document::new("2", "Noise from a loud party"),
//!     Document::new("3", "Car blocking driveway, illegal parking"),
//!     Document::new("4", "Illegal parking in front of hydrant"),
//! ];
//! let config = PipelineConfig {
//!     min_document_frequency: 1,
//!     num_components: 2,
//!     num_clusters: 2,
//!     ..Default::default()
//! };
//! let state = pipeline::fit(docs, &config).unwrap();
//!
//! let hits = state.similarity_search("loud party noise", 2).unwrap();
//! assert_eq!(hits.len(), 2);
//! ```

pub mod cluster;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod linalg;
pub mod normalizer;
pub mod pipeline;
pub mod projector;
pub mod report;
pub mod sparse;
pub mod vector;
pub mod vocabulary;

pub use cluster::{Cluster, ClusterModel, TermWeight};
pub use config::{ClusterConfig, PipelineConfig, ProjectionConfig, VocabularyConfig};
pub use document::{Document, DocumentId};
pub use error::{Error, Result};
pub use index::{SearchHit, SimilarityIndex};
pub use normalizer::Normalizer;
pub use pipeline::{FitInfo, FittedState, ModelHandle, StateParts};
pub use projector::{ProjectionBasis, SemanticProjector};
pub use report::{location_summary, ClusterSummary, LocationSummary, SimilarityHit, ValueCount};
pub use sparse::WeightedVector;
pub use vector::Vector;
pub use vocabulary::{Term, Vocabulary, VocabularyModel};
