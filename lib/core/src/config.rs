use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration recognized by a pipeline fit
///
/// Defaults follow the production pipeline: 5000 features, df >= 2, 150 LSI
/// components, 7 clusters, seed 42.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cap on vocabulary size
    pub max_features: usize,
    /// Minimum number of documents a term must appear in
    pub min_document_frequency: usize,
    /// Requested projection dimensionality (k)
    pub num_components: usize,
    pub num_clusters: usize,
    pub random_seed: u64,
    /// Lloyd iteration cap per clustering run
    pub max_iterations: usize,
    /// Number of seeded clustering restarts; best inertia wins
    pub num_init: usize,
    /// Subspace iterations of the randomized SVD range finder
    pub power_iterations: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_features: 5000,
            min_document_frequency: 2,
            num_components: 150,
            num_clusters: 7,
            random_seed: 42,
            max_iterations: 300,
            num_init: 10,
            power_iterations: 5,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: PipelineConfig = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_features == 0 {
            return Err(Error::InvalidConfig("max_features must be at least 1".into()));
        }
        if self.min_document_frequency == 0 {
            return Err(Error::InvalidConfig(
                "min_document_frequency must be at least 1".into(),
            ));
        }
        if self.num_components == 0 {
            return Err(Error::InvalidComponentCount(0));
        }
        if self.num_clusters == 0 {
            return Err(Error::InvalidClusterCount {
                requested: 0,
                documents: 0,
            });
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig("max_iterations must be at least 1".into()));
        }
        if self.num_init == 0 {
            return Err(Error::InvalidConfig("num_init must be at least 1".into()));
        }
        Ok(())
    }

    pub fn vocabulary(&self) -> VocabularyConfig {
        VocabularyConfig {
            max_features: self.max_features,
            min_document_frequency: self.min_document_frequency,
        }
    }

    pub fn projection(&self) -> ProjectionConfig {
        ProjectionConfig {
            num_components: self.num_components,
            power_iterations: self.power_iterations,
            random_seed: self.random_seed,
        }
    }

    pub fn clustering(&self) -> ClusterConfig {
        ClusterConfig {
            num_clusters: self.num_clusters,
            max_iterations: self.max_iterations,
            num_init: self.num_init,
            random_seed: self.random_seed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyConfig {
    pub max_features: usize,
    pub min_document_frequency: usize,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        PipelineConfig::default().vocabulary()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub num_components: usize,
    pub power_iterations: usize,
    pub random_seed: u64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        PipelineConfig::default().projection()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub num_clusters: usize,
    pub max_iterations: usize,
    pub num_init: usize,
    pub random_seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        PipelineConfig::default().clustering()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vocabulary().max_features, 5000);
        assert_eq!(config.clustering().num_clusters, 7);
    }

    #[test]
    fn test_zero_components_rejected() {
        let config = PipelineConfig {
            num_components: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidComponentCount(0))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"num_clusters": 3, "min_document_frequency": 1}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.num_clusters, 3);
        assert_eq!(config.min_document_frequency, 1);
        assert_eq!(config.num_components, 150);
    }
}
