use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use marquee_core::fusion::normalize;
use marquee_core::persist::IndexPaths;
use marquee_core::{hybrid_search, Bm25Params, DocId, FusionStrategy, InvertedIndex, SearchConfig, StaticRanking, Tokenizer};
use std::path::Path;
use tracing_subscriber::{fmt, EnvFilter};

mod ingest;

#[derive(Parser)]
#[command(name = "marquee-indexer")]
#[command(about = "Build, inspect and query a BM25 inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct IndexOpts {
    /// Index directory
    #[arg(long, default_value = "./cache")]
    index: String,
    /// JSON file with BM25 and fusion settings
    #[arg(long)]
    config: Option<String>,
    /// Stopword list, one word per line (built-in English list otherwise)
    #[arg(long)]
    stopwords: Option<String>,
}

impl IndexOpts {
    fn config(&self) -> Result<SearchConfig> {
        match &self.config {
            Some(path) => SearchConfig::from_json_file(path).with_context(|| format!("loading config {path}")),
            None => Ok(SearchConfig::default()),
        }
    }

    fn tokenizer(&self) -> Result<Tokenizer> {
        match &self.stopwords {
            Some(path) => Tokenizer::from_stopword_file(path).with_context(|| format!("loading stopwords {path}")),
            None => Ok(Tokenizer::default()),
        }
    }

    fn load(&self) -> Result<InvertedIndex> {
        let paths = IndexPaths::new(&self.index);
        InvertedIndex::load(&paths, self.tokenizer()?).map_err(|e| {
            if e.is_missing_snapshot() {
                anyhow::Error::new(e).context(format!("no index at {}; run `build` first", self.index))
            } else {
                anyhow::Error::new(e).context(format!("loading index {}", self.index))
            }
        })
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Weighted,
    Rrf,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Worker shards used while tokenizing
        #[arg(long, default_value_t = 1)]
        shards: usize,
        #[command(flatten)]
        opts: IndexOpts,
    },
    /// Rank documents by BM25
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[command(flatten)]
        opts: IndexOpts,
    },
    /// Raw term frequency of a term in a document
    Tf {
        doc_id: DocId,
        term: String,
        #[command(flatten)]
        opts: IndexOpts,
    },
    /// Classic inverse document frequency
    Idf {
        term: String,
        #[command(flatten)]
        opts: IndexOpts,
    },
    /// Term frequency times classic IDF
    Tfidf {
        doc_id: DocId,
        term: String,
        #[command(flatten)]
        opts: IndexOpts,
    },
    /// BM25 inverse document frequency
    Bm25idf {
        term: String,
        #[command(flatten)]
        opts: IndexOpts,
    },
    /// BM25 saturated term frequency
    Bm25tf {
        doc_id: DocId,
        term: String,
        #[arg(long)]
        k1: Option<f64>,
        #[arg(long)]
        b: Option<f64>,
        #[command(flatten)]
        opts: IndexOpts,
    },
    /// Min-max normalize a list of scores
    Normalize {
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<f64>,
    },
    /// Fuse BM25 results with a semantic ranking computed elsewhere
    Hybrid {
        query: String,
        /// JSON array of {"document_id", "score"} from the embedding search
        #[arg(long)]
        semantic: String,
        #[arg(long, value_enum, default_value_t = Strategy::Weighted)]
        strategy: Strategy,
        /// Lexical weight for the weighted strategy
        #[arg(long)]
        alpha: Option<f64>,
        /// Smoothing constant for reciprocal rank fusion
        #[arg(long)]
        k: Option<f64>,
        #[arg(long)]
        limit: Option<usize>,
        #[command(flatten)]
        opts: IndexOpts,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, shards, opts } => build_index(&input, shards, &opts),
        Commands::Search { query, limit, opts } => {
            let config = opts.config()?;
            let index = opts.load()?;
            let hits = index.lexical_search(&query, limit.unwrap_or(config.default_limit), config.bm25);
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. ({}) {} - Score: {:.2}", i + 1, hit.document.id, hit.document.title, hit.score);
            }
            Ok(())
        }
        Commands::Tf { doc_id, term, opts } => {
            let tf = opts.load()?.term_frequency(doc_id, &term)?;
            println!("Term frequency of '{term}' in document '{doc_id}': {tf}");
            Ok(())
        }
        Commands::Idf { term, opts } => {
            let idf = opts.load()?.idf(&term)?;
            println!("Inverse document frequency of '{term}': {idf:.2}");
            Ok(())
        }
        Commands::Tfidf { doc_id, term, opts } => {
            let score = opts.load()?.tf_idf(doc_id, &term)?;
            println!("TF-IDF score of '{term}' in document '{doc_id}': {score:.2}");
            Ok(())
        }
        Commands::Bm25idf { term, opts } => {
            let idf = opts.load()?.bm25_idf(&term)?;
            println!("BM25 IDF score of '{term}': {idf:.2}");
            Ok(())
        }
        Commands::Bm25tf { doc_id, term, k1, b, opts } => {
            let config = opts.config()?;
            let params = Bm25Params::new(k1.unwrap_or(config.bm25.k1), b.unwrap_or(config.bm25.b))?;
            let tf = opts.load()?.bm25_tf(doc_id, &term, params)?;
            println!("BM25 TF score of '{term}' in document '{doc_id}': {tf:.2}");
            Ok(())
        }
        Commands::Normalize { values } => {
            for score in normalize(&values) {
                println!("* {score:.4}");
            }
            Ok(())
        }
        Commands::Hybrid { query, semantic, strategy, alpha, k, limit, opts } => {
            let config = opts.config()?;
            let strategy = match strategy {
                Strategy::Weighted => FusionStrategy::Weighted { alpha: alpha.unwrap_or(config.fusion.alpha) },
                Strategy::Rrf => FusionStrategy::Reciprocal { k: k.unwrap_or(config.fusion.rrf_k) },
            };
            let ranking = StaticRanking::from_json_file(&semantic)
                .with_context(|| format!("loading semantic results {semantic}"))?;
            let index = opts.load()?;
            let hits = hybrid_search(&index, &ranking, &query, strategy, limit.unwrap_or(config.default_limit), &config)?;
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. {}", i + 1, hit.document.title);
                match strategy {
                    FusionStrategy::Weighted { .. } => println!(
                        "   Hybrid Score: {:.3}, BM25: {:.3}, Semantic: {:.3}",
                        hit.fused.score,
                        hit.fused.lexical_score.unwrap_or(0.0),
                        hit.fused.semantic_score.unwrap_or(0.0)
                    ),
                    FusionStrategy::Reciprocal { .. } => println!(
                        "   RRF Score: {:.3}, BM25 Rank: {}, Semantic Rank: {}",
                        hit.fused.score,
                        rank_label(hit.fused.lexical_rank),
                        rank_label(hit.fused.semantic_rank)
                    ),
                }
                println!("   {}", hit.document.description);
            }
            Ok(())
        }
    }
}

fn rank_label(rank: Option<usize>) -> String {
    rank.map_or_else(|| "-".to_string(), |r| r.to_string())
}

fn build_index(input: &str, shards: usize, opts: &IndexOpts) -> Result<()> {
    let docs = ingest::read_documents(Path::new(input))?;
    tracing::info!(num_docs = docs.len(), input, "ingested documents");

    let index = InvertedIndex::build_sharded(docs, opts.tokenizer()?, shards)?;
    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "".into());
    let out_paths = IndexPaths::new(&opts.index);
    let meta = index.save(&out_paths, created_at).with_context(|| format!("saving index to {}", opts.index))?;

    tracing::info!(output = %opts.index, "index build complete");
    println!("Indexed {} documents ({} terms) into {}", meta.num_docs, meta.num_terms, opts.index);
    Ok(())
}
