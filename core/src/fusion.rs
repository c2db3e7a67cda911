//! Merging a lexical ranking with a semantic ranking.
//!
//! Both inputs are ranked lists of `(document_id, score)`, best first. The
//! scales of the two lists are unrelated, so [`FusionStrategy::Weighted`]
//! min-max normalizes each list on its own before mixing, and
//! [`FusionStrategy::Reciprocal`] ignores scores and uses ranks only.

use crate::document::DocId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedDoc {
    pub document_id: DocId,
    pub score: f64,
}

impl RankedDoc {
    pub fn new(document_id: DocId, score: f64) -> Self {
        Self { document_id, score }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FusionStrategy {
    /// `alpha * lexical + (1 - alpha) * semantic` over min-max normalized scores.
    Weighted { alpha: f64 },
    /// Reciprocal rank fusion, `1 / (k + rank)` summed over both lists.
    Reciprocal { k: f64 },
}

impl FusionStrategy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            FusionStrategy::Weighted { alpha } if !(0.0..=1.0).contains(&alpha) => Err(Error::InvalidParameter {
                name: "alpha",
                reason: format!("must be within [0, 1], got {alpha}"),
            }),
            FusionStrategy::Reciprocal { k } if !k.is_finite() || k < 0.0 => Err(Error::InvalidParameter {
                name: "k",
                reason: format!("must be a finite value >= 0, got {k}"),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedHit {
    pub document_id: DocId,
    pub score: f64,
    /// 1-based position in the lexical list.
    pub lexical_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
    /// Normalized per-side scores, only reported by the weighted strategy.
    pub lexical_score: Option<f64>,
    pub semantic_score: Option<f64>,
}

impl FusedHit {
    fn new(document_id: DocId) -> Self {
        Self { document_id, score: 0.0, lexical_rank: None, semantic_rank: None, lexical_score: None, semantic_score: None }
    }

    /// Number of input lists the document appeared in.
    pub fn coverage(&self) -> usize {
        usize::from(self.lexical_rank.is_some()) + usize::from(self.semantic_rank.is_some())
    }

    /// Lists the document appeared in that carry a non-zero weight under `strategy`.
    /// Always 0 for reciprocal rank fusion.
    pub fn weighted_coverage(&self, strategy: FusionStrategy) -> usize {
        match strategy {
            FusionStrategy::Weighted { alpha } => {
                usize::from(alpha > 0.0 && self.lexical_rank.is_some())
                    + usize::from(alpha < 1.0 && self.semantic_rank.is_some())
            }
            FusionStrategy::Reciprocal { .. } => 0,
        }
    }
}

/// Min-max normalizes into [0, 1]. A list whose scores are all equal maps to 1.0.
pub fn normalize(scores: &[f64]) -> Vec<f64> {
    let Some(first) = scores.first() else {
        return Vec::new();
    };
    let (min, max) = scores
        .iter()
        .fold((*first, *first), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = max - min;
    if range == 0.0 {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Drops repeated ids, keeping the best-ranked occurrence, and rejects NaN/infinite scores.
fn dedup(list: &[RankedDoc]) -> Result<Vec<RankedDoc>> {
    let mut seen = HashSet::with_capacity(list.len());
    let mut out = Vec::with_capacity(list.len());
    for entry in list {
        if !entry.score.is_finite() {
            return Err(Error::InvalidScore { doc_id: entry.document_id, score: entry.score });
        }
        if seen.insert(entry.document_id) {
            out.push(*entry);
        }
    }
    Ok(out)
}

#[derive(Clone, Copy)]
enum Side {
    Lexical,
    Semantic,
}

pub fn fuse(lexical: &[RankedDoc], semantic: &[RankedDoc], strategy: FusionStrategy, limit: usize) -> Result<Vec<FusedHit>> {
    strategy.validate()?;
    let lexical = dedup(lexical)?;
    let semantic = dedup(semantic)?;

    let mut fused: BTreeMap<DocId, FusedHit> = BTreeMap::new();
    for (side, list) in [(Side::Lexical, &lexical), (Side::Semantic, &semantic)] {
        let normalized = normalize(&list.iter().map(|d| d.score).collect::<Vec<_>>());
        for (pos, (entry, norm)) in list.iter().zip(normalized).enumerate() {
            let rank = pos + 1;
            let hit = fused.entry(entry.document_id).or_insert_with(|| FusedHit::new(entry.document_id));
            let contribution = match strategy {
                FusionStrategy::Weighted { alpha } => {
                    match side {
                        Side::Lexical => hit.lexical_score = Some(norm),
                        Side::Semantic => hit.semantic_score = Some(norm),
                    }
                    let weight = match side {
                        Side::Lexical => alpha,
                        Side::Semantic => 1.0 - alpha,
                    };
                    weight * norm
                }
                FusionStrategy::Reciprocal { k } => 1.0 / (k + rank as f64),
            };
            match side {
                Side::Lexical => hit.lexical_rank = Some(rank),
                Side::Semantic => hit.semantic_rank = Some(rank),
            }
            hit.score += contribution;
        }
    }

    let mut hits: Vec<FusedHit> = fused.into_values().collect();
    sort_hits(&mut hits, strategy);
    hits.truncate(limit);
    tracing::debug!(
        lexical = lexical.len(),
        semantic = semantic.len(),
        returned = hits.len(),
        ?strategy,
        "fused rankings"
    );
    Ok(hits)
}

/// Score descending, then ascending id so equal scores come out in a stable order.
pub(crate) fn by_score_then_id(a: (f64, DocId), b: (f64, DocId)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1))
}

// Weighted ties prefer documents found by more of the weighted sides; otherwise lower id first.
fn sort_hits(hits: &mut [FusedHit], strategy: FusionStrategy) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.weighted_coverage(strategy).cmp(&a.weighted_coverage(strategy)))
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(pairs: &[(DocId, f64)]) -> Vec<RankedDoc> {
        pairs.iter().map(|&(id, s)| RankedDoc::new(id, s)).collect()
    }

    fn ids(hits: &[FusedHit]) -> Vec<DocId> {
        hits.iter().map(|h| h.document_id).collect()
    }

    #[test]
    fn normalize_min_max() {
        assert_eq!(normalize(&[1.0, 3.0, 2.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(normalize(&[4.0, 4.0]), vec![1.0, 1.0]);
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn weighted_overlap_wins() {
        // A=1, B=2, C=3
        let l = ranked(&[(1, 0.9), (2, 0.5)]);
        let s = ranked(&[(2, 0.8), (3, 0.6)]);
        let hits = fuse(&l, &s, FusionStrategy::Weighted { alpha: 0.5 }, 10).unwrap();
        assert_eq!(hits[0].document_id, 2);
        assert_eq!(hits.len(), 3);
        // A: 0.5 * 1.0, B: 0.5 * 0.0 + 0.5 * 1.0, C: 0.5 * 0.0
        assert!((hits[0].score - 0.5).abs() < 1e-12);
        assert!((hits[1].score - 0.5).abs() < 1e-12);
        assert_eq!(ids(&hits), vec![2, 1, 3]);
        assert_eq!(hits[0].coverage(), 2);
        assert_eq!(hits[0].lexical_score, Some(0.0));
        assert_eq!(hits[0].semantic_score, Some(1.0));
    }

    #[test]
    fn weighted_extremes_reproduce_one_side() {
        let l = ranked(&[(5, 9.0), (2, 4.0), (8, 1.0)]);
        let s = ranked(&[(8, 0.99), (7, 0.5), (5, 0.1)]);
        let lexical_only = fuse(&l, &s, FusionStrategy::Weighted { alpha: 1.0 }, 3).unwrap();
        assert_eq!(ids(&lexical_only), vec![5, 2, 8]);
        let semantic_only = fuse(&l, &s, FusionStrategy::Weighted { alpha: 0.0 }, 3).unwrap();
        assert_eq!(ids(&semantic_only), vec![8, 7, 5]);
        // the side with no weight only shows up at score 0, after every ranked document
        let all = fuse(&l, &s, FusionStrategy::Weighted { alpha: 1.0 }, 10).unwrap();
        assert_eq!(ids(&all), vec![5, 2, 8, 7]);
    }

    #[test]
    fn reciprocal_rank() {
        let l = ranked(&[(1, 10.0), (2, 5.0)]);
        let s = ranked(&[(1, 0.2), (3, 0.1)]);
        let hits = fuse(&l, &s, FusionStrategy::Reciprocal { k: 60.0 }, 10).unwrap();
        assert_eq!(hits[0].document_id, 1);
        assert!((hits[0].score - 2.0 / 61.0).abs() < 1e-12);
        assert_eq!(hits[0].lexical_rank, Some(1));
        assert_eq!(hits[0].semantic_rank, Some(1));
        assert!(hits[0].lexical_score.is_none());
        // 2 and 3 are both rank 2 on one side: tie broken by id
        assert_eq!(ids(&hits), vec![1, 2, 3]);
        assert!(!ids(&hits).contains(&4));
    }

    #[test]
    fn zero_weight_side_does_not_reorder_ties() {
        let l = ranked(&[(1, 5.0), (2, 5.0)]);
        let s = ranked(&[(2, 0.3)]);
        let hits = fuse(&l, &s, FusionStrategy::Weighted { alpha: 1.0 }, 2).unwrap();
        assert_eq!(ids(&hits), vec![1, 2]);
        assert_eq!(hits[0].score, hits[1].score);

        let s = ranked(&[(3, 0.7), (4, 0.7)]);
        let l = ranked(&[(4, 2.0)]);
        let hits = fuse(&l, &s, FusionStrategy::Weighted { alpha: 0.0 }, 10).unwrap();
        assert_eq!(ids(&hits), vec![3, 4]);
    }

    #[test]
    fn reciprocal_ties_break_on_id_alone() {
        let l = ranked(&[(1, 9.0), (5, 1.0)]);
        let s = ranked(&[(7, 9.0), (5, 1.0)]);
        let hits = fuse(&l, &s, FusionStrategy::Reciprocal { k: 0.0 }, 3).unwrap();
        assert!(hits.iter().all(|h| (h.score - 1.0).abs() < 1e-12));
        assert_eq!(ids(&hits), vec![1, 5, 7]);
        assert_eq!(hits[1].coverage(), 2);
    }

    #[test]
    fn empty_sides_degrade_gracefully() {
        let s = ranked(&[(4, 0.3), (9, 0.7)]);
        let hits = fuse(&[], &s, FusionStrategy::Weighted { alpha: 0.3 }, 10).unwrap();
        assert_eq!(ids(&hits), vec![9, 4]);
        let hits = fuse(&s, &[], FusionStrategy::Reciprocal { k: 60.0 }, 1).unwrap();
        assert_eq!(ids(&hits), vec![4]);
        assert!(fuse(&[], &[], FusionStrategy::Reciprocal { k: 60.0 }, 5).unwrap().is_empty());
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let l = ranked(&[(1, 3.0), (2, 2.0), (1, 1.0)]);
        let hits = fuse(&l, &[], FusionStrategy::Reciprocal { k: 0.0 }, 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!((hits[0].score - 1.0).abs() < 1e-12);
        assert!((hits[1].score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_input() {
        let l = ranked(&[(1, f64::NAN)]);
        assert!(matches!(
            fuse(&l, &[], FusionStrategy::Reciprocal { k: 60.0 }, 3),
            Err(Error::InvalidScore { doc_id: 1, .. })
        ));
        assert!(fuse(&[], &[], FusionStrategy::Weighted { alpha: 1.5 }, 3).is_err());
        assert!(fuse(&[], &[], FusionStrategy::Reciprocal { k: -1.0 }, 3).is_err());
    }

    #[test]
    fn strategy_serde_shape() {
        let s: FusionStrategy = serde_json::from_str(r#"{"strategy":"weighted","alpha":0.25}"#).unwrap();
        assert_eq!(s, FusionStrategy::Weighted { alpha: 0.25 });
        let r: FusionStrategy = serde_json::from_str(r#"{"strategy":"reciprocal","k":60}"#).unwrap();
        assert_eq!(r, FusionStrategy::Reciprocal { k: 60.0 });
    }
}
