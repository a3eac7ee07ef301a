// TF-IDF Vectorizer
// Word n-gram TF-IDF with document-frequency pruning and L2-normalized sparse rows

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tracing::debug;

use super::error::DetectionError;

/// Sparse feature row as `(feature index, value)`, sorted by index.
pub type SparseRow = Vec<(usize, f64)>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorizerParams {
    pub max_vocabulary_size: usize,
    /// Minimum number of documents a term must occur in.
    pub min_doc_frequency: usize,
    /// Maximum share of documents a term may occur in.
    pub max_doc_frequency: f64,
    pub ngram_range: (usize, usize),
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("valid token regex"))
}

/// Word n-grams of `text` for every n in `range`, joined by a single space.
pub fn extract_ngrams(text: &str, range: (usize, usize)) -> Vec<String> {
    let words: Vec<&str> = token_re().find_iter(text).map(|m| m.as_str()).collect();
    let (min_n, max_n) = range;
    let mut grams = Vec::new();
    for n in min_n.max(1)..=max_n {
        if n > words.len() {
            break;
        }
        for window in words.windows(n) {
            grams.push(window.join(" "));
        }
    }
    grams
}

/// Fitted vectorizer. `vocabulary` is sorted; a term's feature index is its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TfidfVectorizer {
    ngram_range: (usize, usize),
    vocabulary: Vec<String>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn fit(documents: &[String], params: &VectorizerParams) -> Result<Self, DetectionError> {
        if documents.is_empty() {
            return Err(DetectionError::InsufficientData("no documents to vectorize".to_string()));
        }

        let n_docs = documents.len();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut corpus_freq: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let mut seen: HashSet<String> = HashSet::new();
            for gram in extract_ngrams(doc, params.ngram_range) {
                *corpus_freq.entry(gram.clone()).or_insert(0) += 1;
                if seen.insert(gram.clone()) {
                    *doc_freq.entry(gram).or_insert(0) += 1;
                }
            }
        }

        if doc_freq.is_empty() {
            return Err(DetectionError::InsufficientData(
                "empty vocabulary; documents contain no word tokens".to_string(),
            ));
        }

        let max_doc_count = params.max_doc_frequency * n_docs as f64;
        let mut kept: Vec<(String, usize)> = doc_freq
            .iter()
            .filter(|(_, &df)| df >= params.min_doc_frequency && (df as f64) <= max_doc_count)
            .map(|(term, _)| (term.clone(), corpus_freq.get(term).copied().unwrap_or(0)))
            .collect();

        if kept.is_empty() {
            return Err(DetectionError::InsufficientData(
                "no terms remain after document-frequency pruning".to_string(),
            ));
        }

        // Highest corpus frequency first, ties alphabetical.
        kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        kept.truncate(params.max_vocabulary_size.max(1));

        let mut vocabulary: Vec<String> = kept.into_iter().map(|(term, _)| term).collect();
        vocabulary.sort();

        let idf = vocabulary
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs as f64) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        debug!(
            "[vectorizer] Fitted {} features over {} documents",
            vocabulary.len(),
            n_docs
        );

        Ok(Self {
            ngram_range: params.ngram_range,
            vocabulary,
            idf,
        })
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn feature_index(&self, term: &str) -> Option<usize> {
        self.vocabulary.binary_search_by(|t| t.as_str().cmp(term)).ok()
    }

    pub fn feature_name(&self, index: usize) -> Option<&str> {
        self.vocabulary.get(index).map(String::as_str)
    }

    pub fn transform(&self, document: &str) -> SparseRow {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for gram in extract_ngrams(document, self.ngram_range) {
            if let Some(idx) = self.feature_index(&gram) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut row: SparseRow = counts
            .into_iter()
            .map(|(idx, count)| (idx, count * self.idf[idx]))
            .collect();
        row.sort_by_key(|(idx, _)| *idx);

        let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in row.iter_mut() {
                *v /= norm;
            }
        }
        row
    }

    pub fn transform_batch(&self, documents: &[String]) -> Vec<SparseRow> {
        documents.iter().map(|d| self.transform(d)).collect()
    }

    /// Internal consistency check for deserialized models.
    pub fn validate(&self) -> Result<(), DetectionError> {
        if self.vocabulary.len() != self.idf.len() {
            return Err(DetectionError::ModelFormat(
                "vocabulary and idf tables differ in length".to_string(),
            ));
        }
        if self.vocabulary.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DetectionError::ModelFormat("vocabulary is not sorted".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> VectorizerParams {
        VectorizerParams {
            max_vocabulary_size: 8000,
            min_doc_frequency: 1,
            max_doc_frequency: 1.0,
            ngram_range: (1, 2),
        }
    }

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ngrams_skip_single_chars() {
        let grams = extract_ngrams("a molar superior y canino", (1, 2));
        assert_eq!(
            grams,
            vec!["molar", "superior", "canino", "molar superior", "superior canino"]
        );
    }

    #[test]
    fn test_vocabulary_is_alphabetical() {
        let v = TfidfVectorizer::fit(&docs(&["molar canino", "canino incisivo"]), &params()).unwrap();
        assert_eq!(v.feature_name(0), Some("canino"));
        assert_eq!(v.feature_index("molar canino"), Some(4));
        assert!(v.validate().is_ok());
    }

    #[test]
    fn test_idf_matches_smooth_formula() {
        let v = TfidfVectorizer::fit(&docs(&["molar canino", "canino"]), &params()).unwrap();
        let canino = v.feature_index("canino").unwrap();
        let molar = v.feature_index("molar").unwrap();
        assert!((v.idf[canino] - 1.0).abs() < 1e-12);
        assert!((v.idf[molar] - ((3.0f64 / 2.0).ln() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_rows_are_l2_normalized() {
        let v = TfidfVectorizer::fit(&docs(&["molar canino", "canino incisivo", "diente"]), &params()).unwrap();
        let row = v.transform("molar molar canino desconocido");
        let norm: f64 = row.iter().map(|(_, x)| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
        assert!(row.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(v.transform("nada conocido").is_empty());
    }

    #[test]
    fn test_max_df_prunes_common_terms() {
        let mut p = params();
        p.max_doc_frequency = 0.5;
        p.ngram_range = (1, 1);
        let v = TfidfVectorizer::fit(&docs(&["diente molar", "diente canino", "diente premolar"]), &p).unwrap();
        assert!(v.feature_index("diente").is_none());
        assert_eq!(v.vocabulary_size(), 3);
    }

    #[test]
    fn test_max_features_keeps_most_frequent() {
        let mut p = params();
        p.max_vocabulary_size = 2;
        p.ngram_range = (1, 1);
        let v = TfidfVectorizer::fit(&docs(&["molar molar canino", "molar zeta", "alfa"]), &p).unwrap();
        // molar (3) wins, then alfa/canino/zeta tie at 1 -> alfa alphabetically.
        assert_eq!(v.vocabulary, vec!["alfa", "molar"]);
    }

    #[test]
    fn test_empty_vocabulary_is_insufficient_data() {
        let err = TfidfVectorizer::fit(&docs(&["a b", "c"]), &params()).unwrap_err();
        assert!(matches!(err, DetectionError::InsufficientData(_)));
        let mut p = params();
        p.max_doc_frequency = 0.1;
        let err = TfidfVectorizer::fit(&docs(&["diente", "diente"]), &p).unwrap_err();
        assert!(matches!(err, DetectionError::InsufficientData(_)));
    }
}
