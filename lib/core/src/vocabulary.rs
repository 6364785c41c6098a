//! Frozen TF-IDF vocabulary.
//!
//! Inverse document frequency uses the smoothed form
//!
//! ```text
//! idf(t) = ln((1 + N) / (1 + df(t))) + 1
//! ```
//!
//! where `N` is the number of documents the vocabulary was fitted on
//! (documents with no surviving tokens included) and `df(t)` the number of
//! those documents containing `t`. Every implementation reading the persisted
//! vocabulary must use the stored idf values rather than recomputing them.

use crate::config::VocabularyConfig;
use crate::sparse::WeightedVector;
use crate::{Error, Result};
use ahash::AHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One retained vocabulary term; its vector index is its position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub term: String,
    /// Number of fit documents containing the term
    pub df: u32,
    pub idf: f64,
}

/// Smoothed inverse document frequency
#[inline]
pub fn smoothed_idf(num_documents: usize, df: usize) -> f64 {
    ((1.0 + num_documents as f64) / (1.0 + df as f64)).ln() + 1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "VocabularyData", into = "VocabularyData")]
pub struct Vocabulary {
    terms: Vec<Term>,
    lookup: AHashMap<Box<str>, u32>,
    num_documents: usize,
}

#[derive(Serialize, Deserialize)]
struct VocabularyData {
    num_documents: usize,
    terms: Vec<Term>,
}

impl From<VocabularyData> for Vocabulary {
    fn from(data: VocabularyData) -> Self {
        Vocabulary::from_terms(data.terms, data.num_documents)
    }
}

impl From<Vocabulary> for VocabularyData {
    fn from(vocabulary: Vocabulary) -> Self {
        VocabularyData {
            num_documents: vocabulary.num_documents,
            terms: vocabulary.terms,
        }
    }
}

#[derive(Default)]
struct TermStats {
    df: u32,
    total: u64,
}

impl Vocabulary {
    /// Fit on a tokenized corpus
    ///
    /// Terms below `min_document_frequency` are discarded, the rest ranked by
    /// corpus frequency (descending, ties lexicographic) and cut at
    /// `max_features`. The retained terms are indexed in lexicographic order.
    pub fn fit<T>(corpus: &[T], config: &VocabularyConfig) -> Result<Self>
    where
        T: AsRef<[String]> + Sync,
    {
        if corpus.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        if config.max_features == 0 {
            return Err(Error::InvalidConfig("max_features must be at least 1".into()));
        }

        let stats: AHashMap<&str, TermStats> = corpus
            .par_iter()
            .fold(AHashMap::new, |mut acc: AHashMap<&str, TermStats>, doc| {
                let mut seen: AHashMap<&str, u64> = AHashMap::new();
                for token in doc.as_ref() {
                    *seen.entry(token.as_str()).or_insert(0) += 1;
                }
                for (token, count) in seen {
                    let entry = acc.entry(token).or_default();
                    entry.df += 1;
                    entry.total += count;
                }
                acc
            })
            .reduce(AHashMap::new, |mut left, right| {
                for (token, stats) in right {
                    let entry = left.entry(token).or_default();
                    entry.df += stats.df;
                    entry.total += stats.total;
                }
                left
            });

        let distinct_terms = stats.len();
        let mut candidates: Vec<(&str, TermStats)> = stats
            .into_iter()
            .filter(|(_, s)| s.df as usize >= config.min_document_frequency)
            .collect();

        if candidates.is_empty() {
            return Err(Error::EmptyVocabulary {
                min_document_frequency: config.min_document_frequency,
                max_features: config.max_features,
                distinct_terms,
            });
        }

        candidates.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(b.0)));
        let dropped = candidates.len().saturating_sub(config.max_features);
        candidates.truncate(config.max_features);
        candidates.sort_by(|a, b| a.0.cmp(b.0));

        let num_documents = corpus.len();
        let terms: Vec<Term> = candidates
            .into_iter()
            .map(|(term, s)| Term {
                term: term.to_string(),
                df: s.df,
                idf: smoothed_idf(num_documents, s.df as usize),
            })
            .collect();

        debug!(dropped, "vocabulary truncated to max_features");
        info!(
            documents = num_documents,
            distinct_terms,
            retained = terms.len(),
            "vocabulary fitted"
        );

        Ok(Self::from_terms(terms, num_documents))
    }

    fn from_terms(terms: Vec<Term>, num_documents: usize) -> Self {
        let lookup = terms
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.term.clone().into_boxed_str(), idx as u32))
            .collect();
        Self {
            terms,
            lookup,
            num_documents,
        }
    }

    /// Weighted vector for a token sequence
    ///
    /// Raw counts times idf, L2-normalized. Out-of-vocabulary tokens are
    /// dropped; if none survive the result is the zero vector.
    pub fn transform<S: AsRef<str>>(&self, tokens: &[S]) -> WeightedVector {
        let mut counts: AHashMap<u32, u32> = AHashMap::new();
        for token in tokens {
            if let Some(idx) = self.lookup.get(token.as_ref()) {
                *counts.entry(*idx).or_insert(0) += 1;
            }
        }

        let pairs = counts
            .into_iter()
            .map(|(idx, count)| (idx, (count as f64 * self.terms[idx as usize].idf) as f32))
            .collect();
        let mut vector = WeightedVector::from_pairs(self.terms.len(), pairs);
        vector.l2_normalize();
        vector
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of documents the vocabulary was fitted on
    #[inline]
    pub fn num_documents(&self) -> usize {
        self.num_documents
    }

    #[inline]
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    #[inline]
    pub fn term(&self, index: usize) -> Option<&Term> {
        self.terms.get(index)
    }

    #[inline]
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.lookup.get(term).map(|idx| *idx as usize)
    }
}

/// Vocabulary stage of the pipeline: unfitted until `fit` succeeds
#[derive(Debug, Clone, Default)]
pub struct VocabularyModel {
    config: VocabularyConfig,
    vocabulary: Option<Vocabulary>,
}

impl VocabularyModel {
    pub fn new(config: VocabularyConfig) -> Self {
        Self {
            config,
            vocabulary: None,
        }
    }

    /// Wrap an already fitted (e.g. reloaded) vocabulary
    pub fn from_vocabulary(config: VocabularyConfig, vocabulary: Vocabulary) -> Self {
        Self {
            config,
            vocabulary: Some(vocabulary),
        }
    }

    /// Fit on a corpus; on error the previous state is left untouched
    pub fn fit<T>(&mut self, corpus: &[T]) -> Result<&Vocabulary>
    where
        T: AsRef<[String]> + Sync,
    {
        let vocabulary = Vocabulary::fit(corpus, &self.config)?;
        Ok(self.vocabulary.insert(vocabulary))
    }

    pub fn transform<S: AsRef<str>>(&self, tokens: &[S]) -> Result<WeightedVector> {
        Ok(self.vocabulary()?.transform(tokens))
    }

    pub fn vocabulary(&self) -> Result<&Vocabulary> {
        self.vocabulary.as_ref().ok_or(Error::NotFitted("vocabulary"))
    }

    #[inline]
    pub fn is_fitted(&self) -> bool {
        self.vocabulary.is_some()
    }

    #[inline]
    pub fn config(&self) -> &VocabularyConfig {
        &self.config
    }

    pub fn into_vocabulary(self) -> Result<Vocabulary> {
        self.vocabulary.ok_or(Error::NotFitted("vocabulary"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(docs: &[&str]) -> Vec<Vec<String>> {
        docs.iter()
            .map(|d| d.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    fn config(max_features: usize, min_df: usize) -> VocabularyConfig {
        VocabularyConfig {
            max_features,
            min_document_frequency: min_df,
        }
    }

    #[test]
    fn test_idf_formula() {
        let docs = corpus(&["noise loud", "noise party", "parking"]);
        let vocab = Vocabulary::fit(&docs, &config(10, 1)).unwrap();

        let noise = &vocab.terms()[vocab.index_of("noise").unwrap()];
        assert_eq!(noise.df, 2);
        assert!((noise.idf - ((4.0f64 / 3.0).ln() + 1.0)).abs() < 1e-12);

        let parking = &vocab.terms()[vocab.index_of("parking").unwrap()];
        assert!((parking.idf - (2.0f64.ln() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_min_df_and_lexicographic_index() {
        let docs = corpus(&["b a c", "a b", "a d"]);
        let vocab = Vocabulary::fit(&docs, &config(10, 2)).unwrap();
        let terms: Vec<&str> = vocab.terms().iter().map(|t| t.term.as_str()).collect();
        assert_eq!(terms, vec!["a", "b"]);
    }

    #[test]
    fn test_max_features_ranks_by_frequency_then_term() {
        // corpus frequencies: z=3, y=2, x=2, w=1
        let docs = corpus(&["z z y", "z x", "y x w"]);
        let vocab = Vocabulary::fit(&docs, &config(2, 1)).unwrap();
        let terms: Vec<&str> = vocab.terms().iter().map(|t| t.term.as_str()).collect();
        assert_eq!(terms, vec!["x", "z"]);
    }

    #[test]
    fn test_empty_vocabulary_names_threshold() {
        let docs = corpus(&["alpha", "beta"]);
        let err = Vocabulary::fit(&docs, &config(10, 2)).unwrap_err();
        match err {
            Error::EmptyVocabulary {
                min_document_frequency,
                distinct_terms,
                ..
            } => {
                assert_eq!(min_document_frequency, 2);
                assert_eq!(distinct_terms, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(Vocabulary::fit::<Vec<String>>(&[], &config(10, 1)).is_err());
    }

    #[test]
    fn test_transform_is_unit_and_drops_oov() {
        let docs = corpus(&["noise loud", "noise party", "parking"]);
        let vocab = Vocabulary::fit(&docs, &config(10, 1)).unwrap();

        let v = vocab.transform(&["noise", "noise", "unknown", "loud"]);
        assert_eq!(v.nnz(), 2);
        assert!((v.norm() - 1.0).abs() < 1e-6);
        assert_eq!(v, vocab.transform(&["noise", "noise", "unknown", "loud"]));

        let zero = vocab.transform(&["unknown"]);
        assert!(zero.is_zero());
        assert_eq!(zero.dim(), vocab.len());
    }

    #[test]
    fn test_model_not_fitted() {
        let model = VocabularyModel::new(config(10, 1));
        assert!(matches!(
            model.transform(&["noise"]),
            Err(Error::NotFitted("vocabulary"))
        ));
    }

    #[test]
    fn test_serde_roundtrip_restores_lookup() {
        let docs = corpus(&["noise loud", "noise party"]);
        let vocab = Vocabulary::fit(&docs, &config(10, 1)).unwrap();
        let json = serde_json::to_string(&vocab).unwrap();
        let restored: Vocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.index_of("party"), vocab.index_of("party"));
        assert_eq!(restored.transform(&["party"]), vocab.transform(&["party"]));
    }
}
