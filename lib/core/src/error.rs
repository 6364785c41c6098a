use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Corpus is empty: no documents with usable text")]
    EmptyCorpus,

    #[error(
        "Vocabulary is empty: none of {distinct_terms} distinct terms reached min_document_frequency={min_document_frequency} (max_features={max_features})"
    )]
    EmptyVocabulary {
        min_document_frequency: usize,
        max_features: usize,
        distinct_terms: usize,
    },

    #[error("Invalid component count: {0} (must be at least 1)")]
    InvalidComponentCount(usize),

    #[error("Invalid cluster count: requested {requested} clusters for {documents} documents")]
    InvalidClusterCount { requested: usize, documents: usize },

    #[error("Weighted document matrix has rank 0; nothing to project")]
    DegenerateMatrix,

    #[error("{0} used before fit")]
    NotFitted(&'static str),

    #[error("Index not ready: build it or publish a fitted state first")]
    NotReady,

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Duplicate document id: {0}")]
    DuplicateDocument(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Cluster not found: {0}")]
    ClusterNotFound(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Incompatible artifact {artifact}: found schema version {found}, expected {expected}")]
    IncompatibleArtifact {
        artifact: String,
        found: u32,
        expected: u32,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
