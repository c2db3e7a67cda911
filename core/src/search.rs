use crate::bm25::Bm25Params;
use crate::config::SearchConfig;
use crate::document::{DocId, Document};
use crate::error::{Error, Result};
use crate::fusion::{by_score_then_id, fuse, FusedHit, FusionStrategy, RankedDoc};
use crate::index::InvertedIndex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document: Document,
    pub score: f64,
}

impl SearchHit {
    pub fn ranked(&self) -> RankedDoc {
        RankedDoc::new(self.document.id, self.score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridHit {
    pub document: Document,
    #[serde(flatten)]
    pub fused: FusedHit,
}

impl InvertedIndex {
    /// Ranks the corpus by BM25 score for `query`, best first, ties by ascending id.
    ///
    /// Every document takes part: documents matching no query term follow the
    /// matches with a score of 0. An empty corpus, or one without a single
    /// token, returns nothing.
    pub fn lexical_search(&self, query: &str, limit: usize, params: Bm25Params) -> Vec<SearchHit> {
        let avg = self.average_document_length();
        if limit == 0 || self.is_empty() || avg <= 0.0 {
            return Vec::new();
        }
        let terms = self.tokenizer().preprocess(query);

        // Only documents in some query term's posting list can score above 0.
        let candidates: BTreeSet<DocId> = terms.iter().flat_map(|t| self.docs_with(t).iter().copied()).collect();
        let mut scored: Vec<(f64, DocId)> = candidates
            .iter()
            .map(|&doc_id| {
                let doc_len = self.doc_length(doc_id).unwrap_or(0);
                let score: f64 = terms.iter().map(|t| self.term_score(doc_id, doc_len, t, avg, params)).sum();
                (score, doc_id)
            })
            .collect();
        scored.sort_by(|a, b| by_score_then_id(*a, *b));
        scored.truncate(limit);

        if scored.len() < limit {
            let missing = limit - scored.len();
            let zeros = self
                .doc_map()
                .keys()
                .filter(|&&id| !candidates.contains(&id))
                .take(missing)
                .map(|&id| (0.0, id));
            scored.extend(zeros);
        }

        tracing::debug!(query, terms = terms.len(), matched = candidates.len(), "lexical search");
        scored
            .into_iter()
            .filter_map(|(score, id)| self.document(id).map(|doc| SearchHit { document: doc.clone(), score }))
            .collect()
    }
}

/// The vector-similarity side of hybrid search. Implementations return ids
/// best first; scores only need to be comparable within one result list.
pub trait SemanticSearcher {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<RankedDoc>>;
}

/// A semantic ranking computed elsewhere, e.g. by an embedding service, and
/// handed over as data. It answers every query with the same list.
#[derive(Debug, Clone, Default)]
pub struct StaticRanking {
    results: Vec<RankedDoc>,
}

impl StaticRanking {
    /// Orders `results` by score descending, ties by ascending id.
    pub fn new(mut results: Vec<RankedDoc>) -> Self {
        results.sort_by(|a, b| by_score_then_id((a.score, a.document_id), (b.score, b.document_id)));
        Self { results }
    }

    /// Reads a JSON array of `{"document_id": .., "score": ..}` objects.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let results: Vec<RankedDoc> =
            serde_json::from_str(&text).map_err(|source| Error::Json { path: path.to_path_buf(), source })?;
        Ok(Self::new(results))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl SemanticSearcher for StaticRanking {
    fn search(&self, _query: &str, limit: usize) -> Result<Vec<RankedDoc>> {
        Ok(self.results.iter().take(limit).copied().collect())
    }
}

/// Runs both searches with `limit * overfetch` candidates each, fuses them and
/// resolves the surviving ids to documents.
///
/// Lexical documents that match no query term are not fusion candidates, and
/// semantic ids that are not in this snapshot are dropped before fusing.
pub fn hybrid_search(
    index: &InvertedIndex,
    semantic: &dyn SemanticSearcher,
    query: &str,
    strategy: FusionStrategy,
    limit: usize,
    config: &SearchConfig,
) -> Result<Vec<HybridHit>> {
    strategy.validate()?;
    let fetch = limit.saturating_mul(config.fusion.overfetch.max(1));

    let lexical: Vec<RankedDoc> = index
        .lexical_search(query, fetch, config.bm25)
        .iter()
        .filter(|hit| hit.score > 0.0)
        .map(SearchHit::ranked)
        .collect();

    let raw = semantic.search(query, fetch)?;
    let known: Vec<RankedDoc> = raw.iter().filter(|r| index.document(r.document_id).is_some()).copied().collect();
    if known.len() < raw.len() {
        tracing::warn!(dropped = raw.len() - known.len(), "semantic results reference documents outside the index");
    }

    let fused = fuse(&lexical, &known, strategy, limit)?;
    Ok(fused
        .into_iter()
        .filter_map(|hit| {
            index.document(hit.document_id).map(|doc| HybridHit { document: doc.clone(), fused: hit })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tokenizer;

    fn index() -> InvertedIndex {
        let docs = vec![
            Document::new(1, "Brave Bear", ""),
            Document::new(2, "Grizzly Tale", ""),
            Document::new(3, "Ocean Story", ""),
        ];
        InvertedIndex::build(docs, Tokenizer::default()).unwrap()
    }

    #[test]
    fn bear_ranks_first_and_others_score_zero() {
        let hits = index().lexical_search("bear", 3, Bm25Params::default());
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document.id, 1);
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[1].document.id, 2);
        assert_eq!(hits[2].document.id, 3);
        assert_eq!(hits[1].score, 0.0);
        assert_eq!(hits[2].score, 0.0);
    }

    #[test]
    fn stopword_query_scores_everything_zero() {
        let hits = index().lexical_search("the and of", 2, Bm25Params::default());
        let ids: Vec<DocId> = hits.iter().map(|h| h.document.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(hits.iter().all(|h| h.score == 0.0));
    }

    #[test]
    fn empty_corpus_returns_nothing() {
        let index = InvertedIndex::build(Vec::new(), Tokenizer::default()).unwrap();
        assert!(index.lexical_search("anything", 5, Bm25Params::default()).is_empty());
        assert!(self::index().lexical_search("bear", 0, Bm25Params::default()).is_empty());
    }

    #[test]
    fn matches_a_full_scan() {
        let docs = vec![
            Document::new(10, "Bear Country", "bears and more bears in the valley"),
            Document::new(4, "Valley Girl", "a story of the valley"),
            Document::new(7, "Polar", "a polar bear on ice"),
            Document::new(2, "Ice Age", "ice ice ice"),
        ];
        let index = InvertedIndex::build(docs, Tokenizer::default()).unwrap();
        let params = Bm25Params::default();
        let query = "bear valley ice";
        let mut expected: Vec<(f64, DocId)> = index
            .documents()
            .map(|d| (index.bm25_document_score(d.id, query, params).unwrap(), d.id))
            .collect();
        expected.sort_by(|a, b| by_score_then_id(*a, *b));
        let got: Vec<(f64, DocId)> = index.lexical_search(query, 10, params).iter().map(|h| (h.score, h.document.id)).collect();
        assert_eq!(got.len(), expected.len());
        for (g, e) in got.iter().zip(&expected) {
            assert_eq!(g.1, e.1);
            assert!((g.0 - e.0).abs() < 1e-12);
        }
    }

    #[test]
    fn static_ranking_orders_and_truncates() {
        let ranking = StaticRanking::new(vec![RankedDoc::new(3, 0.1), RankedDoc::new(2, 0.9), RankedDoc::new(1, 0.9)]);
        let got = ranking.search("ignored", 2).unwrap();
        assert_eq!(got, vec![RankedDoc::new(1, 0.9), RankedDoc::new(2, 0.9)]);
    }

    #[test]
    fn hybrid_drops_unknown_and_unmatched() {
        let index = index();
        let semantic = StaticRanking::new(vec![RankedDoc::new(3, 0.8), RankedDoc::new(99, 0.7)]);
        let config = SearchConfig::default();
        let hits = hybrid_search(&index, &semantic, "bear", FusionStrategy::Reciprocal { k: 60.0 }, 5, &config).unwrap();
        let ids: Vec<DocId> = hits.iter().map(|h| h.document.id).collect();
        // 1 comes only from the lexical side, 3 only from the semantic side, 2 from neither
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(hits[0].fused.lexical_rank, Some(1));
        assert_eq!(hits[1].fused.semantic_rank, Some(1));
    }

    #[test]
    fn hybrid_rejects_bad_strategy_before_searching() {
        let err = hybrid_search(
            &index(),
            &StaticRanking::default(),
            "bear",
            FusionStrategy::Weighted { alpha: -0.1 },
            5,
            &SearchConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "alpha", .. }));
    }
}
