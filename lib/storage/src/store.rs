use crate::artifact::{
    self, ArtifactEntry, ArtifactKind, DocumentsArtifact, EmbeddingsArtifact, Manifest,
    VocabularyArtifact, WeightedArtifact, MANIFEST_FILE, PIPELINE_VERSION, SCHEMA_VERSION,
};
use atomicwrites::{AllowOverwrite, AtomicFile};
use chrono::Utc;
use semdex_core::{
    ClusterModel, Error, FittedState, ProjectionBasis, Result, StateParts, Vector,
};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Directory of model artifacts plus the manifest describing them
///
/// Every file is replaced atomically. The manifest is written after all
/// artifacts, so a directory with a manifest always holds a complete model.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

impl ArtifactStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True when a complete model has been saved here
    pub fn exists(&self) -> bool {
        self.dir.join(MANIFEST_FILE).exists()
    }

    fn write_atomic(&self, file: &str, bytes: &[u8]) -> Result<()> {
        let path = self.dir.join(file);
        AtomicFile::new(&path, AllowOverwrite)
            .write(|f| f.write_all(bytes))
            .map_err(|e| Error::Persistence(format!("failed to write {}: {}", path.display(), e)))
    }

    fn write_artifact<T: serde::Serialize>(
        &self,
        kind: ArtifactKind,
        payload: &T,
        entries: &mut BTreeMap<String, ArtifactEntry>,
    ) -> Result<()> {
        let bytes = artifact::encode(kind, payload)?;
        self.write_atomic(kind.file_name(), &bytes)?;
        debug!(file = kind.file_name(), bytes = bytes.len(), "artifact written");
        entries.insert(
            kind.format().to_string(),
            ArtifactEntry {
                file: kind.file_name().to_string(),
                sha256: checksum(&bytes),
                bytes: bytes.len() as u64,
            },
        );
        Ok(())
    }

    /// Persist every artifact of a fitted state and then its manifest
    pub fn save_state(&self, state: &FittedState) -> Result<Manifest> {
        let start = Instant::now();
        let mut entries = BTreeMap::new();
        let ids: Vec<_> = state.documents().iter().map(|d| d.id.clone()).collect();

        self.write_artifact(
            ArtifactKind::Vocabulary,
            &VocabularyArtifact {
                default_stopwords: state.normalizer().is_english(),
                normalizer: state.normalizer().clone(),
                vocabulary: state.vocabulary().clone(),
            },
            &mut entries,
        )?;
        self.write_artifact(ArtifactKind::Projection, state.basis(), &mut entries)?;
        self.write_artifact(ArtifactKind::Clusters, state.clusters(), &mut entries)?;
        self.write_artifact(
            ArtifactKind::Embeddings,
            &EmbeddingsArtifact {
                ids: ids.clone(),
                dim: state.basis().effective_k(),
                embeddings: state
                    .embeddings()
                    .iter()
                    .map(|e| e.as_slice().to_vec())
                    .collect(),
            },
            &mut entries,
        )?;
        self.write_artifact(
            ArtifactKind::Weighted,
            &WeightedArtifact {
                ids,
                vectors: state.weighted().to_vec(),
            },
            &mut entries,
        )?;
        self.write_artifact(
            ArtifactKind::Documents,
            &DocumentsArtifact {
                documents: state.documents().to_vec(),
            },
            &mut entries,
        )?;

        let manifest = Manifest {
            pipeline_version: PIPELINE_VERSION.to_string(),
            schema_version: SCHEMA_VERSION,
            created_at: Utc::now(),
            config: state.config().clone(),
            dataset: state.info().clone(),
            artifacts: entries,
        };
        self.write_atomic(MANIFEST_FILE, &serde_json::to_vec_pretty(&manifest)?)?;

        info!(
            dir = %self.dir.display(),
            documents = state.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model saved"
        );
        Ok(manifest)
    }

    pub fn manifest(&self) -> Result<Manifest> {
        let path = self.dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(Error::Persistence(format!(
                "no saved model in {}",
                self.dir.display()
            )));
        }
        let manifest: Manifest = serde_json::from_slice(&fs::read(&path)?)?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(Error::IncompatibleArtifact {
                artifact: MANIFEST_FILE.to_string(),
                found: manifest.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(manifest)
    }

    /// Read one artifact, verifying its checksum against the manifest
    pub fn load_artifact<T: DeserializeOwned>(&self, manifest: &Manifest, kind: ArtifactKind) -> Result<T> {
        let entry = manifest.artifacts.get(kind.format()).ok_or_else(|| {
            Error::Persistence(format!("manifest does not list {}", kind.file_name()))
        })?;
        let bytes = fs::read(self.dir.join(&entry.file))?;
        let actual = checksum(&bytes);
        if actual != entry.sha256 {
            return Err(Error::Persistence(format!(
                "checksum mismatch for {}: expected {}, got {}",
                entry.file, entry.sha256, actual
            )));
        }
        artifact::decode(kind, &bytes)
    }

    /// Rebuild a fitted state from the saved artifacts without re-fitting
    pub fn load_state(&self) -> Result<FittedState> {
        let start = Instant::now();
        let manifest = self.manifest()?;

        let vocabulary: VocabularyArtifact = self.load_artifact(&manifest, ArtifactKind::Vocabulary)?;
        let basis: ProjectionBasis = self.load_artifact(&manifest, ArtifactKind::Projection)?;
        let clusters: ClusterModel = self.load_artifact(&manifest, ArtifactKind::Clusters)?;
        let embeddings: EmbeddingsArtifact = self.load_artifact(&manifest, ArtifactKind::Embeddings)?;
        let weighted: WeightedArtifact = self.load_artifact(&manifest, ArtifactKind::Weighted)?;
        let documents: DocumentsArtifact = self.load_artifact(&manifest, ArtifactKind::Documents)?;

        let doc_ids: Vec<_> = documents.documents.iter().map(|d| &d.id).collect();
        if embeddings.ids.iter().collect::<Vec<_>>() != doc_ids
            || weighted.ids.iter().collect::<Vec<_>>() != doc_ids
        {
            return Err(Error::Persistence(
                "artifacts disagree on document order".to_string(),
            ));
        }
        if let Some(bad) = embeddings.embeddings.iter().find(|e| e.len() != embeddings.dim) {
            return Err(Error::InvalidDimension {
                expected: embeddings.dim,
                actual: bad.len(),
            });
        }

        let state = FittedState::from_parts(StateParts {
            config: manifest.config,
            normalizer: vocabulary.normalizer,
            vocabulary: vocabulary.vocabulary,
            basis,
            clusters,
            documents: documents.documents,
            weighted: weighted.vectors,
            embeddings: embeddings.embeddings.into_iter().map(Vector::new).collect(),
            info: manifest.dataset,
        })?;

        info!(
            dir = %self.dir.display(),
            documents = state.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model loaded"
        );
        Ok(state)
    }
}
