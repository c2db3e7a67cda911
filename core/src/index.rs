use crate::document::{DocId, Document};
use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Term -> ids of the documents containing it at least once.
pub type Postings = BTreeMap<String, BTreeSet<DocId>>;
/// Document id -> (term -> occurrences in that document). Missing entries count as 0.
pub type TermFrequencies = BTreeMap<DocId, BTreeMap<String, u32>>;
/// Document id -> number of tokens in the document, repeats included.
pub type DocLengths = BTreeMap<DocId, u32>;
pub type DocMap = BTreeMap<DocId, Document>;

/// Immutable inverted index over one corpus snapshot.
///
/// The four tables are always produced together, either by [`InvertedIndex::build`]
/// or by loading a persisted snapshot, and are never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    tokenizer: Tokenizer,
    postings: Postings,
    docs: DocMap,
    term_frequencies: TermFrequencies,
    doc_lengths: DocLengths,
}

/// Tables for a subset of the corpus, merged into the final index.
#[derive(Default)]
struct Partial {
    postings: Postings,
    docs: DocMap,
    term_frequencies: TermFrequencies,
    doc_lengths: DocLengths,
}

impl Partial {
    fn add(&mut self, doc: Document, tokenizer: &Tokenizer) {
        let tokens = tokenizer.preprocess(&doc.text());
        let counts = self.term_frequencies.entry(doc.id).or_default();
        for token in &tokens {
            *counts.entry(token.clone()).or_insert(0) += 1;
        }
        for term in counts.keys() {
            self.postings.entry(term.clone()).or_default().insert(doc.id);
        }
        self.doc_lengths.insert(doc.id, tokens.len() as u32);
        self.docs.insert(doc.id, doc);
    }

    // Shards hold disjoint document ids, so only the posting sets need a real union.
    fn merge(mut self, other: Partial) -> Partial {
        for (term, ids) in other.postings {
            self.postings.entry(term).or_default().extend(ids);
        }
        for (doc_id, counts) in other.term_frequencies {
            let row = self.term_frequencies.entry(doc_id).or_default();
            for (term, count) in counts {
                *row.entry(term).or_insert(0) += count;
            }
        }
        self.doc_lengths.extend(other.doc_lengths);
        self.docs.extend(other.docs);
        self
    }
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the index from a whole corpus on the current thread.
    pub fn build(documents: Vec<Document>, tokenizer: Tokenizer) -> Result<Self> {
        Self::build_sharded(documents, tokenizer, 1)
    }

    /// Builds the index by splitting the corpus into `shards` chunks that are
    /// tokenized in parallel and merged. The result does not depend on `shards`.
    pub fn build_sharded(documents: Vec<Document>, tokenizer: Tokenizer, shards: usize) -> Result<Self> {
        let mut seen = HashSet::with_capacity(documents.len());
        for doc in &documents {
            if !seen.insert(doc.id) {
                return Err(Error::DuplicateDocument(doc.id));
            }
        }

        let shards = shards.max(1);
        let chunk_size = documents.len().div_ceil(shards).max(1);
        let merged = documents
            .par_chunks(chunk_size)
            .map(|chunk| {
                let mut partial = Partial::default();
                for doc in chunk {
                    partial.add(doc.clone(), &tokenizer);
                }
                partial
            })
            .reduce(Partial::default, Partial::merge);

        let index = Self {
            tokenizer,
            postings: merged.postings,
            docs: merged.docs,
            term_frequencies: merged.term_frequencies,
            doc_lengths: merged.doc_lengths,
        };
        tracing::info!(
            num_docs = index.num_docs(),
            num_terms = index.num_terms(),
            shards,
            "built inverted index"
        );
        Ok(index)
    }

    /// Reassembles an index from persisted tables, rejecting tables that could
    /// not have come from the same build.
    pub(crate) fn from_tables(
        tokenizer: Tokenizer,
        postings: Postings,
        docs: DocMap,
        term_frequencies: TermFrequencies,
        doc_lengths: DocLengths,
    ) -> std::result::Result<Self, String> {
        let index = Self { tokenizer, postings, docs, term_frequencies, doc_lengths };
        index.check_consistency()?;
        Ok(index)
    }

    fn check_consistency(&self) -> std::result::Result<(), String> {
        if !self.docs.keys().eq(self.term_frequencies.keys()) {
            return Err("document map and term-frequency table cover different documents".into());
        }
        if !self.docs.keys().eq(self.doc_lengths.keys()) {
            return Err("document map and document-length table cover different documents".into());
        }
        for (doc_id, doc) in &self.docs {
            if doc.id != *doc_id {
                return Err(format!("document stored under id {doc_id} has id {}", doc.id));
            }
        }

        let mut pairs = 0usize;
        for (doc_id, counts) in &self.term_frequencies {
            let mut total = 0u64;
            for (term, &count) in counts {
                if count == 0 {
                    return Err(format!("zero count for {term:?} in document {doc_id}"));
                }
                let listed = self.postings.get(term).is_some_and(|ids| ids.contains(doc_id));
                if !listed {
                    return Err(format!("document {doc_id} missing from posting list of {term:?}"));
                }
                total += u64::from(count);
                pairs += 1;
            }
            if total != u64::from(self.doc_lengths[doc_id]) {
                return Err(format!("length of document {doc_id} does not match its term counts"));
            }
        }
        let posted: usize = self.postings.values().map(BTreeSet::len).sum();
        if posted != pairs {
            return Err("posting lists reference terms absent from the term-frequency table".into());
        }
        Ok(())
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn document(&self, doc_id: DocId) -> Option<&Document> {
        self.docs.get(&doc_id)
    }

    /// Documents in ascending id order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub fn doc_length(&self, doc_id: DocId) -> Option<u32> {
        self.doc_lengths.get(&doc_id).copied()
    }

    pub fn postings(&self) -> &Postings {
        &self.postings
    }

    pub fn doc_map(&self) -> &DocMap {
        &self.docs
    }

    pub fn term_frequencies(&self) -> &TermFrequencies {
        &self.term_frequencies
    }

    pub fn doc_lengths(&self) -> &DocLengths {
        &self.doc_lengths
    }

    /// Ascending ids of the documents containing `term`; empty when the term is unseen.
    pub fn get_documents(&self, term: &str) -> Result<Vec<DocId>> {
        let term = self.tokenizer.single_term(term)?;
        Ok(self.docs_with(&term).iter().copied().collect())
    }

    /// Occurrences of `term` in `doc_id`, 0 when either is unknown.
    pub fn term_frequency(&self, doc_id: DocId, term: &str) -> Result<u32> {
        let term = self.tokenizer.single_term(term)?;
        Ok(self.raw_tf(doc_id, &term))
    }

    pub fn document_frequency(&self, term: &str) -> Result<usize> {
        let term = self.tokenizer.single_term(term)?;
        Ok(self.raw_df(&term))
    }

    /// Mean document length, 0 for an empty corpus.
    pub fn average_document_length(&self) -> f64 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        let total: u64 = self.doc_lengths.values().map(|&len| u64::from(len)).sum();
        total as f64 / self.doc_lengths.len() as f64
    }

    // The raw_* lookups take terms that are already normalized.

    pub(crate) fn docs_with(&self, term: &str) -> &BTreeSet<DocId> {
        static EMPTY: BTreeSet<DocId> = BTreeSet::new();
        self.postings.get(term).unwrap_or(&EMPTY)
    }

    pub(crate) fn raw_tf(&self, doc_id: DocId, term: &str) -> u32 {
        self.term_frequencies
            .get(&doc_id)
            .and_then(|counts| counts.get(term))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn raw_df(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, BTreeSet::len)
    }
}
