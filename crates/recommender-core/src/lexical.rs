/// Okapi BM25 index over the lexical projection of every catalog record.
///
/// Scoring follows the `BM25Okapi` variant: terms whose raw IDF is negative (present in more
/// than half of the documents) are floored to `epsilon * mean_idf` instead of being allowed to
/// subtract from the score.
use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::catalog::Catalog;
use crate::error::RecommendError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

impl Bm25Params {
    /// k1 and epsilon must be finite and non-negative; b must lie in `[0, 1]`.
    pub fn validate(&self) -> Result<(), RecommendError> {
        let Self { k1, b, epsilon } = *self;
        if !k1.is_finite() || k1 < 0.0 {
            return Err(RecommendError::Configuration(format!(
                "bm25 k1 must be a finite non-negative number, got {k1}"
            )));
        }
        if !b.is_finite() || !(0.0..=1.0).contains(&b) {
            return Err(RecommendError::Configuration(format!(
                "bm25 b must be between 0 and 1, got {b}"
            )));
        }
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(RecommendError::Configuration(format!(
                "bm25 epsilon must be a finite non-negative number, got {epsilon}"
            )));
        }
        Ok(())
    }
}

/// Lower-case and split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// A shortlisted record: its catalog position, its BM25 score and its rank in the shortlist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shortlisted {
    pub index: usize,
    pub rank: usize,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct LexicalIndex {
    params: Bm25Params,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lengths: Vec<usize>,
    avg_doc_len: f64,
    idf: HashMap<String, f64>,
}

impl LexicalIndex {
    pub fn from_catalog(catalog: &Catalog, params: Bm25Params) -> Result<Self, RecommendError> {
        let documents: Vec<Vec<String>> = catalog
            .records()
            .iter()
            .map(|record| tokenize(&record.lexical_projection()))
            .collect();
        Self::build(&documents, params)
    }

    /// Build the index over pre-tokenized documents. Document order defines catalog order.
    pub fn build(documents: &[Vec<String>], params: Bm25Params) -> Result<Self, RecommendError> {
        if documents.is_empty() {
            return Err(RecommendError::Configuration(
                "cannot build a lexical index over an empty catalog".to_string(),
            ));
        }
        params.validate()?;

        let mut term_freqs = Vec::with_capacity(documents.len());
        let mut doc_lengths = Vec::with_capacity(documents.len());
        // Ordered so the idf mean is summed in the same order on every run.
        let mut doc_freqs: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_len = 0usize;

        for document in documents {
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in document {
                *freqs.entry(token.clone()).or_default() += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_default() += 1;
            }
            total_len += document.len();
            doc_lengths.push(document.len());
            term_freqs.push(freqs);
        }

        let corpus_size = documents.len() as f64;
        let avg_doc_len = total_len as f64 / corpus_size;

        let mut idf = HashMap::with_capacity(doc_freqs.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (term, df) in doc_freqs {
            let df = df as f64;
            let value = (corpus_size - df + 0.5).ln() - (df + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term, value);
        }

        if !idf.is_empty() {
            let floor = params.epsilon * idf_sum / idf.len() as f64;
            for term in negative {
                idf.insert(term, floor);
            }
        }

        debug!(
            documents = documents.len(),
            terms = idf.len(),
            avg_doc_len,
            "lexical index built"
        );

        Ok(Self {
            params,
            term_freqs,
            doc_lengths,
            avg_doc_len,
            idf,
        })
    }

    /// BM25 score of every document against the query, in catalog order.
    ///
    /// Query tokens are used as given, so a repeated token counts once per occurrence.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f64> {
        let Bm25Params { k1, b, .. } = self.params;
        // Only reachable when every document is empty.
        let avg_doc_len = if self.avg_doc_len > 0.0 {
            self.avg_doc_len
        } else {
            1.0
        };

        self.term_freqs
            .iter()
            .zip(&self.doc_lengths)
            .map(|(freqs, &doc_len)| {
                let length_norm = 1.0 - b + b * doc_len as f64 / avg_doc_len;
                query_tokens
                    .iter()
                    .map(|token| {
                        let tf = freqs.get(token).copied().unwrap_or(0) as f64;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let idf = self.idf.get(token).copied().unwrap_or(0.0);
                        idf * (tf * (k1 + 1.0)) / (tf + k1 * length_norm)
                    })
                    .sum()
            })
            .collect()
    }

    /// Top `k` documents by score, `k` clamped into `1..=len`.
    ///
    /// Equal scores keep catalog order so that shortlists are reproducible.
    pub fn shortlist(&self, query_tokens: &[String], k: usize) -> Vec<Shortlisted> {
        let scores = self.scores(query_tokens);
        let k = k.clamp(1, scores.len());

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

        order
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, index)| Shortlisted {
                index,
                rank,
                score: scores[index],
            })
            .collect()
    }
}
