//! # semdex Storage
//!
//! Persistence for fitted models and document ingestion:
//!
//! - [`ArtifactStore`] - Versioned, checksummed artifacts with atomic writes
//! - [`ingest`] - CSV and JSON-Lines document readers

pub mod artifact;
pub mod ingest;
pub mod store;

pub use artifact::{ArtifactKind, Manifest, SCHEMA_VERSION};
pub use ingest::{read_csv_documents, read_documents, read_documents_file, IngestReport};
pub use store::ArtifactStore;
