//! Lexical search with BM25 ranking and hybrid score fusion.
//!
//! The [`InvertedIndex`] is built once from a corpus of [`Document`]s, persisted
//! as a single snapshot through [`persist`], and queried read-only. Lexical
//! results can be merged with an externally produced semantic ranking through
//! the [`fusion`] module.

pub mod bm25;
pub mod config;
pub mod document;
pub mod error;
pub mod fusion;
pub mod index;
pub mod persist;
pub mod search;
pub mod snapshot;
pub mod tokenizer;

pub use bm25::Bm25Params;
pub use config::{FusionConfig, SearchConfig};
pub use document::{DocId, Document};
pub use error::{Error, Result};
pub use fusion::{fuse, normalize, FusedHit, FusionStrategy, RankedDoc};
pub use index::InvertedIndex;
pub use search::{hybrid_search, HybridHit, SearchHit, SemanticSearcher, StaticRanking};
pub use snapshot::SnapshotHandle;
pub use tokenizer::Tokenizer;
