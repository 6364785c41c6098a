//! # semdex
//!
//! Semantic indexing of short incident descriptions: a frozen TF-IDF
//! vocabulary, an LSI projection, exact cosine-similarity search over the
//! projected space, and KMeans topic clusters with per-cluster top terms.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! semdex --data-dir ./model fit --input complaints.jsonl
//! semdex --data-dir ./model search "loud party next door" --limit 5
//! semdex --data-dir ./model clusters --top-terms 10
//! semdex --data-dir ./model serve --http-port 6333
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use semdex::prelude::*;
//!
//! let docs = vec![
//!     Document::new("1", "Noise - Residential - Loud Music/Party"),
//!     Document::new("2", "Illegal Parking - Blocked Hydrant"),
//! ];
//! let config = PipelineConfig { min_document_frequency: 1, num_clusters: 2, ..Default::default() };
//! let state = semdex::pipeline::fit(docs, &config).unwrap();
//!
//! let store = ArtifactStore::open("./model").unwrap();
//! store.save_state(&state).unwrap();
//!
//! let hits = state.similarity_search("party noise", 5).unwrap();
//! ```
//!
//! ## Crate Structure
//!
//! - `semdex-core` - Normalizer, vocabulary, projection, index, clustering, fitted state
//! - `semdex-storage` - Versioned artifacts and CSV / JSON-Lines ingestion
//! - `semdex-api` - REST API

// Re-export core types
pub use semdex_core::{
    location_summary, pipeline, ClusterModel, ClusterSummary, Document, DocumentId, Error,
    FittedState, LocationSummary, ModelHandle, Normalizer, PipelineConfig, ProjectionBasis,
    Result, SimilarityHit, SimilarityIndex, Vector, Vocabulary, WeightedVector,
};

// Re-export storage
pub use semdex_storage::{read_csv_documents, read_documents_file, ArtifactStore};

// Re-export API
pub use semdex_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ArtifactStore, ClusterModel, ClusterSummary, Document, DocumentId, Error, FittedState,
        ModelHandle, Normalizer, PipelineConfig, Result, SimilarityHit, SimilarityIndex, Vector,
    };
}
