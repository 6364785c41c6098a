// Deterministic text -> token sequence transform
use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// English stopword list (the NLTK corpus list)
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're",
    "you've", "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he",
    "him", "his", "himself", "she", "she's", "her", "hers", "herself", "it", "it's",
    "its", "itself", "they", "them", "their", "theirs", "themselves", "what",
    "which", "who", "whom", "this", "that", "that'll", "these", "those", "am", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "having",
    "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about",
    "against", "between", "into", "through", "during", "before", "after", "above",
    "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
    "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some",
    "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very",
    "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn",
    "couldn't", "didn", "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn",
    "hasn't", "haven", "haven't", "isn", "isn't", "ma", "mightn", "mightn't",
    "mustn", "mustn't", "needn", "needn't", "shan", "shan't", "shouldn",
    "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
    "wouldn't",
];

/// Lowercases, strips everything but ASCII letters, splits on whitespace and
/// drops stopwords.
///
/// The stopword set is part of the fitted state: a query must be normalized
/// with the same set the corpus was normalized with, so the normalizer is
/// serialized alongside the vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "NormalizerData", into = "NormalizerData")]
pub struct Normalizer {
    stopwords: AHashSet<Box<str>>,
}

#[derive(Serialize, Deserialize)]
struct NormalizerData {
    stopwords: Vec<String>,
}

impl From<NormalizerData> for Normalizer {
    fn from(data: NormalizerData) -> Self {
        Normalizer::with_stopwords(data.stopwords)
    }
}

impl From<Normalizer> for NormalizerData {
    fn from(normalizer: Normalizer) -> Self {
        let mut stopwords: Vec<String> = normalizer
            .stopwords
            .iter()
            .map(|s| s.to_string())
            .collect();
        stopwords.sort();
        NormalizerData { stopwords }
    }
}

impl Normalizer {
    /// Normalizer with the built-in English stopword list
    pub fn english() -> Self {
        Self::with_stopwords(ENGLISH_STOPWORDS.iter().copied())
    }

    /// Normalizer with a caller-supplied stopword list
    pub fn with_stopwords<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stopwords: stopwords
                .into_iter()
                .map(|s| s.as_ref().to_lowercase().into_boxed_str())
                .collect(),
        }
    }

    #[inline]
    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    #[inline]
    pub fn stopword_count(&self) -> usize {
        self.stopwords.len()
    }

    /// True when the stopword set is exactly the built-in English list
    pub fn is_english(&self) -> bool {
        self.stopwords.len() == ENGLISH_STOPWORDS.len()
            && ENGLISH_STOPWORDS.iter().all(|w| self.is_stopword(w))
    }

    /// Normalize a raw text into its token sequence
    ///
    /// Never fails; a text made only of stopwords, digits or punctuation
    /// yields an empty sequence.
    pub fn normalize(&self, text: &str) -> Vec<String> {
        let cleaned: String = text
            .chars()
            .flat_map(char::to_lowercase)
            .map(|c| if c.is_ascii_lowercase() { c } else { ' ' })
            .collect();

        cleaned
            .split_whitespace()
            .filter(|token| !self.is_stopword(token))
            .map(str::to_string)
            .collect()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::english()
    }
}
