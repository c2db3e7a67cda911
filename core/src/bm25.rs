//! BM25 and classic TF-IDF scoring over an [`InvertedIndex`].
//!
//! The free functions hold the formulas; the `InvertedIndex` methods resolve
//! corpus statistics and take un-normalized input terms.

use crate::document::DocId;
use crate::error::{Error, Result};
use crate::index::InvertedIndex;
use serde::{Deserialize, Serialize};

/// BM25 tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization strength, 0 disables it.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl Bm25Params {
    pub fn new(k1: f64, b: f64) -> Result<Self> {
        let params = Self { k1, b };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(Error::InvalidParameter { name: "k1", reason: format!("must be a finite value >= 0, got {}", self.k1) });
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(Error::InvalidParameter { name: "b", reason: format!("must be within [0, 1], got {}", self.b) });
        }
        Ok(())
    }
}

/// Smoothed BM25 IDF, `ln((N - df + 0.5) / (df + 0.5) + 1)`. Non-negative for `df <= N`.
pub fn bm25_idf_value(num_docs: usize, df: usize) -> f64 {
    let n = num_docs as f64;
    let df = df.min(num_docs) as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Classic IDF, `ln((N + 1) / (df + 1))`.
pub fn idf_value(num_docs: usize, df: usize) -> f64 {
    ((num_docs as f64 + 1.0) / (df as f64 + 1.0)).ln()
}

/// Saturated, length-normalized term frequency. Returns 0 when the corpus has
/// no tokens at all, since the length ratio is undefined there.
pub fn saturated_tf(tf: u32, doc_len: u32, avg_doc_len: f64, params: Bm25Params) -> f64 {
    if tf == 0 || avg_doc_len <= 0.0 {
        return 0.0;
    }
    let tf = f64::from(tf);
    let length_norm = (1.0 - params.b) + params.b * (f64::from(doc_len) / avg_doc_len);
    (tf * (params.k1 + 1.0)) / (tf + params.k1 * length_norm)
}

impl InvertedIndex {
    pub fn idf(&self, term: &str) -> Result<f64> {
        let term = self.tokenizer().single_term(term)?;
        Ok(idf_value(self.num_docs(), self.raw_df(&term)))
    }

    pub fn tf_idf(&self, doc_id: DocId, term: &str) -> Result<f64> {
        self.require_document(doc_id)?;
        let term = self.tokenizer().single_term(term)?;
        let tf = f64::from(self.raw_tf(doc_id, &term));
        Ok(tf * idf_value(self.num_docs(), self.raw_df(&term)))
    }

    pub fn bm25_idf(&self, term: &str) -> Result<f64> {
        let term = self.tokenizer().single_term(term)?;
        Ok(bm25_idf_value(self.num_docs(), self.raw_df(&term)))
    }

    pub fn bm25_tf(&self, doc_id: DocId, term: &str, params: Bm25Params) -> Result<f64> {
        let doc_len = self.require_document(doc_id)?;
        let term = self.tokenizer().single_term(term)?;
        Ok(saturated_tf(self.raw_tf(doc_id, &term), doc_len, self.average_document_length(), params))
    }

    /// BM25 contribution of one term to one document.
    pub fn bm25(&self, doc_id: DocId, term: &str, params: Bm25Params) -> Result<f64> {
        let doc_len = self.require_document(doc_id)?;
        let term = self.tokenizer().single_term(term)?;
        Ok(self.term_score(doc_id, doc_len, &term, self.average_document_length(), params))
    }

    /// Sum of term scores over every token of `query`, repeats included.
    pub fn bm25_document_score(&self, doc_id: DocId, query: &str, params: Bm25Params) -> Result<f64> {
        let doc_len = self.require_document(doc_id)?;
        let terms = self.tokenizer().preprocess(query);
        let avg = self.average_document_length();
        Ok(terms
            .iter()
            .map(|term| self.term_score(doc_id, doc_len, term, avg, params))
            .sum())
    }

    pub(crate) fn term_score(&self, doc_id: DocId, doc_len: u32, term: &str, avg_doc_len: f64, params: Bm25Params) -> f64 {
        let tf = self.raw_tf(doc_id, term);
        if tf == 0 {
            return 0.0;
        }
        saturated_tf(tf, doc_len, avg_doc_len, params) * bm25_idf_value(self.num_docs(), self.raw_df(term))
    }

    fn require_document(&self, doc_id: DocId) -> Result<u32> {
        self.doc_length(doc_id).ok_or(Error::UnknownDocument(doc_id))
    }
}
