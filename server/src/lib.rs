use anyhow::{Context, Result};
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use marquee_core::persist::{load_meta, IndexPaths};
use marquee_core::{
    hybrid_search, DocId, Document, Error, FusionStrategy, HybridHit, InvertedIndex, RankedDoc, SearchConfig,
    SnapshotHandle, StaticRanking, Tokenizer,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

const MAX_RESULTS: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub k: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub title: String,
    pub snippet: Option<String>,
}

#[derive(Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    #[default]
    Weighted,
    Rrf,
}

#[derive(Deserialize)]
pub struct HybridRequest {
    pub query: String,
    /// Ranking produced by the embedding search for the same query.
    #[serde(default)]
    pub semantic: Vec<RankedDoc>,
    #[serde(default)]
    pub strategy: StrategyName,
    pub alpha: Option<f64>,
    pub rrf_k: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct HybridResponse {
    pub query: String,
    pub took_s: f64,
    pub fusion: FusionStrategy,
    pub results: Vec<HybridHit>,
}

#[derive(Clone)]
pub struct AppState {
    pub index_paths_root: PathBuf,
    pub snapshot: Arc<SnapshotHandle>,
    pub tokenizer: Tokenizer,
    pub config: SearchConfig,
    pub admin_token: Option<String>,
}

type ApiError = (StatusCode, String);

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::UnknownDocument(_) => StatusCode::NOT_FOUND,
        e if e.is_invalid_input() => StatusCode::BAD_REQUEST,
        Error::MissingSnapshot { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

pub fn build_app(index_dir: String, config: SearchConfig, tokenizer: Tokenizer) -> Result<Router> {
    // Load the snapshot at startup; serving without one is pointless
    let index_paths = IndexPaths::new(&index_dir);
    let index = InvertedIndex::load(&index_paths, tokenizer.clone())
        .with_context(|| format!("loading index from {index_dir}"))?;
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let app_state = AppState {
        index_paths_root: PathBuf::from(&index_dir),
        snapshot: Arc::new(SnapshotHandle::new(index)),
        tokenizer,
        config,
        admin_token,
    };
    Ok(router(app_state))
}

/// Routes over an already assembled state.
pub fn router(app_state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/hybrid", post(hybrid_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/index/reload", post(reload_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn clamp_limit(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_RESULTS)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let index = state.snapshot.current();
    let k = clamp_limit(params.k, state.config.default_limit);
    let hits = index.lexical_search(&params.q, k, state.config.bm25);

    // Capture raw query terms for highlighting
    let raw_terms: Vec<String> = params
        .q
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();
    let results = hits
        .into_iter()
        .map(|hit| SearchHit {
            doc_id: hit.document.id,
            score: hit.score,
            snippet: snippet_from_text(&hit.document.description, &raw_terms),
            title: hit.document.title,
        })
        .collect();

    let elapsed = start.elapsed();
    Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), results })
}

pub async fn hybrid_handler(State(state): State<AppState>, Json(req): Json<HybridRequest>) -> Result<Json<HybridResponse>, ApiError> {
    let start = std::time::Instant::now();
    let fusion = match req.strategy {
        StrategyName::Weighted => FusionStrategy::Weighted { alpha: req.alpha.unwrap_or(state.config.fusion.alpha) },
        StrategyName::Rrf => FusionStrategy::Reciprocal { k: req.rrf_k.unwrap_or(state.config.fusion.rrf_k) },
    };
    let limit = clamp_limit(req.limit, state.config.default_limit);
    let semantic = StaticRanking::new(req.semantic);
    let index = state.snapshot.current();
    let results = hybrid_search(&index, &semantic, &req.query, fusion, limit, &state.config).map_err(api_error)?;

    let elapsed = start.elapsed();
    Ok(Json(HybridResponse { query: req.query, took_s: elapsed.as_secs_f64(), fusion, results }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<Document>, ApiError> {
    let index = state.snapshot.current();
    index
        .document(doc_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(Error::UnknownDocument(doc_id)))
}

/// Loads the snapshot currently on disk and swaps it in for new requests.
async fn reload_handler(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let root = state.index_paths_root.clone();
    let tokenizer = state.tokenizer.clone();
    let loaded = tokio::task::spawn_blocking(move || {
        let paths = IndexPaths::new(&root);
        let index = InvertedIndex::load(&paths, tokenizer)?;
        let meta = load_meta(&paths)?;
        Ok::<_, Error>((index, meta))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("reload task failed: {e}")))?;
    let (index, meta) = loaded.map_err(api_error)?;

    let (num_docs, num_terms) = (index.num_docs(), index.num_terms());
    state.snapshot.swap(index);
    Ok(Json(serde_json::json!({
        "num_docs": num_docs,
        "num_terms": num_terms,
        "created_at": meta.created_at,
    })))
}

fn snippet_from_text(text: &str, raw_terms: &[String]) -> Option<String> {
    if text.is_empty() { return None; }
    let pattern = terms_pattern(raw_terms);
    // window around the first (case-insensitive) match of any raw term
    let first_idx = pattern.as_ref().and_then(|re| re.find(text)).map(|m| m.start());
    let snippet = match first_idx {
        Some(idx) => {
            let start = floor_boundary(text, idx.saturating_sub(100));
            let end = floor_boundary(text, (idx + 200).min(text.len()));
            text[start..end].to_string()
        }
        None => text.chars().take(200).collect(),
    };
    Some(match &pattern {
        Some(re) => highlight_terms(&snippet, re),
        None => snippet,
    })
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// One case-insensitive alternation over all terms, longest first.
fn terms_pattern(terms: &[String]) -> Option<regex::Regex> {
    let mut terms: Vec<&str> = terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).collect();
    if terms.is_empty() {
        return None;
    }
    terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    terms.dedup();
    let alternation = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    regex::RegexBuilder::new(&alternation).case_insensitive(true).build().ok()
}

// Single pass, so markup inserted for one term is never matched by another.
fn highlight_terms(snippet: &str, pattern: &regex::Regex) -> String {
    pattern
        .replace_all(snippet, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0]))
        .into_owned()
}

fn authorize(state: &AppState, headers: &axum::http::HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
