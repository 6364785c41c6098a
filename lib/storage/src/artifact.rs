// Versioned on-disk artifact formats
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use semdex_core::{
    Document, DocumentId, Error, FitInfo, Normalizer, PipelineConfig, Result, Vocabulary,
    WeightedVector,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Bumped whenever any payload layout changes; readers reject other versions
pub const SCHEMA_VERSION: u32 = 1;

pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    /// bincode, gzip-compressed
    BincodeGz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArtifactKind {
    Vocabulary,
    Projection,
    Clusters,
    Embeddings,
    Weighted,
    Documents,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::Vocabulary,
        ArtifactKind::Projection,
        ArtifactKind::Clusters,
        ArtifactKind::Embeddings,
        ArtifactKind::Weighted,
        ArtifactKind::Documents,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Vocabulary => "vocabulary.json",
            ArtifactKind::Projection => "projection.bin.gz",
            ArtifactKind::Clusters => "clusters.json",
            ArtifactKind::Embeddings => "embeddings.bin.gz",
            ArtifactKind::Weighted => "weighted.bin.gz",
            ArtifactKind::Documents => "documents.json",
        }
    }

    /// Format tag stored in the envelope
    pub fn format(self) -> &'static str {
        match self {
            ArtifactKind::Vocabulary => "semdex.vocabulary",
            ArtifactKind::Projection => "semdex.projection",
            ArtifactKind::Clusters => "semdex.clusters",
            ArtifactKind::Embeddings => "semdex.embeddings",
            ArtifactKind::Weighted => "semdex.weighted",
            ArtifactKind::Documents => "semdex.documents",
        }
    }

    pub fn encoding(self) -> Encoding {
        match self {
            ArtifactKind::Projection | ArtifactKind::Embeddings | ArtifactKind::Weighted => {
                Encoding::BincodeGz
            }
            _ => Encoding::Json,
        }
    }
}

/// Wrapper every artifact is written in
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub format: String,
    pub schema_version: u32,
    pub payload: T,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    format: String,
    schema_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyArtifact {
    /// Whether the built-in English stopword list was used
    pub default_stopwords: bool,
    pub normalizer: Normalizer,
    pub vocabulary: Vocabulary,
}

/// Per-document vectors keyed by id, in fit order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsArtifact {
    pub ids: Vec<DocumentId>,
    pub dim: usize,
    pub embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedArtifact {
    pub ids: Vec<DocumentId>,
    pub vectors: Vec<WeightedVector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsArtifact {
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub file: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Description of a saved model; written last
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub pipeline_version: String,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub config: PipelineConfig,
    pub dataset: FitInfo,
    pub artifacts: BTreeMap<String, ArtifactEntry>,
}

fn bincode_error(err: bincode::Error) -> Error {
    Error::Serialization(err.to_string())
}

/// Serialize a payload into its envelope with the kind's encoding
pub fn encode<T: Serialize>(kind: ArtifactKind, payload: &T) -> Result<Vec<u8>> {
    let envelope = Envelope {
        format: kind.format().to_string(),
        schema_version: SCHEMA_VERSION,
        payload,
    };
    match kind.encoding() {
        Encoding::Json => Ok(serde_json::to_vec_pretty(&envelope)?),
        Encoding::BincodeGz => {
            let raw = bincode::serialize(&envelope).map_err(bincode_error)?;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&raw)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Decode an artifact, rejecting a foreign format tag or schema version
/// before the payload is touched
pub fn decode<T: DeserializeOwned>(kind: ArtifactKind, bytes: &[u8]) -> Result<T> {
    let raw;
    let bytes = match kind.encoding() {
        Encoding::Json => bytes,
        Encoding::BincodeGz => {
            let mut decoded = Vec::new();
            GzDecoder::new(bytes).read_to_end(&mut decoded)?;
            raw = decoded;
            &raw[..]
        }
    };

    let header: EnvelopeHeader = match kind.encoding() {
        Encoding::Json => serde_json::from_slice(bytes)?,
        Encoding::BincodeGz => bincode::deserialize(bytes).map_err(bincode_error)?,
    };
    if header.format != kind.format() {
        return Err(Error::Persistence(format!(
            "{} holds '{}', expected '{}'",
            kind.file_name(),
            header.format,
            kind.format()
        )));
    }
    if header.schema_version != SCHEMA_VERSION {
        return Err(Error::IncompatibleArtifact {
            artifact: kind.file_name().to_string(),
            found: header.schema_version,
            expected: SCHEMA_VERSION,
        });
    }

    let envelope: Envelope<T> = match kind.encoding() {
        Encoding::Json => serde_json::from_slice(bytes)?,
        Encoding::BincodeGz => bincode::deserialize(bytes).map_err(bincode_error)?,
    };
    Ok(envelope.payload)
}
