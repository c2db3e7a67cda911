use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use marquee_core::persist::IndexPaths;
use marquee_core::{Document, InvertedIndex, SearchConfig, SnapshotHandle, Tokenizer};
use marquee_server::{router, AppState};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

fn build_tiny_index(dir: &Path, docs: Vec<Document>) {
    let index = InvertedIndex::build(docs, Tokenizer::default()).unwrap();
    index.save(&IndexPaths::new(dir), "2024-01-01T00:00:00Z").unwrap();
}

fn movies() -> Vec<Document> {
    vec![
        Document::new(1, "Brave Bear", "A young bear crosses the tundra."),
        Document::new(2, "Grizzly Tale", "An old grizzly remembers the river."),
        Document::new(3, "Ocean Story", "A lighthouse keeper and a whale."),
    ]
}

fn app(dir: &Path, admin_token: Option<&str>) -> (Router, Arc<SnapshotHandle>) {
    let index = InvertedIndex::load(&IndexPaths::new(dir), Tokenizer::default()).unwrap();
    let snapshot = Arc::new(SnapshotHandle::new(index));
    let state = AppState {
        index_paths_root: dir.to_path_buf(),
        snapshot: Arc::clone(&snapshot),
        tokenizer: Tokenizer::default(),
        config: SearchConfig::default(),
        admin_token: admin_token.map(str::to_string),
    };
    (router(state), snapshot)
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), movies());
    let (app, _) = app(dir.path(), None);

    let (status, body) = call(app, get("/search?q=bear&k=2")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["doc_id"].as_u64().unwrap(), 1);
    assert!(arr[0]["score"].as_f64().unwrap() > 0.0);
    assert_eq!(arr[1]["score"].as_f64().unwrap(), 0.0);
    assert!(arr[0]["snippet"].as_str().unwrap().contains("<em>bear</em>"));
}

#[tokio::test]
async fn hybrid_fuses_client_supplied_semantic_ranking() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), movies());
    let (app, _) = app(dir.path(), None);

    let body = json!({
        "query": "bear",
        "semantic": [
            {"document_id": 3, "score": 0.2},
            {"document_id": 1, "score": 0.9}
        ],
        "strategy": "rrf",
        "limit": 3
    });
    let (status, bytes) = call(app, post_json("/hybrid", body)).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["fusion"]["strategy"], "reciprocal");
    let results = json["results"].as_array().unwrap();
    let ids: Vec<u64> = results.iter().map(|r| r["document"]["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(results[0]["lexical_rank"], 1);
    assert_eq!(results[0]["semantic_rank"], 1);
}

#[tokio::test]
async fn hybrid_rejects_out_of_range_alpha() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), movies());
    let (app, _) = app(dir.path(), None);

    let body = json!({"query": "bear", "semantic": [], "strategy": "weighted", "alpha": 3.0});
    let (status, bytes) = call(app, post_json("/hybrid", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&bytes).contains("alpha"));
}

#[tokio::test]
async fn doc_lookup() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), movies());
    let (app, _) = app(dir.path(), None);

    let (status, bytes) = call(app.clone(), get("/doc/2")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["title"], "Grizzly Tale");

    let (status, _) = call(app, get("/doc/42")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reload_swaps_in_the_rebuilt_snapshot() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), movies());
    let (app, snapshot) = app(dir.path(), Some("secret"));

    let mut more = movies();
    more.push(Document::new(4, "Bear Island", "Polar bears everywhere."));
    build_tiny_index(dir.path(), more);
    assert_eq!(snapshot.current().num_docs(), 3);

    let req = Request::post("/index/reload").header("X-ADMIN-TOKEN", "wrong").body(Body::empty()).unwrap();
    let (status, _) = call(app.clone(), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::post("/index/reload").header("X-ADMIN-TOKEN", "secret").body(Body::empty()).unwrap();
    let (status, bytes) = call(app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["num_docs"], 4);
    assert_eq!(snapshot.current().num_docs(), 4);

    let (_, bytes) = call(app, get("/doc/4")).await;
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["title"], "Bear Island");
}

#[tokio::test]
async fn reload_of_a_missing_snapshot_keeps_serving() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path(), movies());
    let (app, snapshot) = app(dir.path(), Some("secret"));
    std::fs::remove_file(IndexPaths::new(dir.path()).doc_lengths()).unwrap();

    let req = Request::post("/index/reload").header("X-ADMIN-TOKEN", "secret").body(Body::empty()).unwrap();
    let (status, _) = call(app.clone(), req).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(snapshot.current().num_docs(), 3);

    let (status, _) = call(app, get("/search?q=whale")).await;
    assert_eq!(status, StatusCode::OK);
}

#[test]
fn build_app_requires_a_snapshot() {
    let dir = tempdir().unwrap();
    let err = marquee_server::build_app(dir.path().to_string_lossy().to_string(), SearchConfig::default(), Tokenizer::default())
        .unwrap_err();
    let core = err.downcast_ref::<marquee_core::Error>().unwrap();
    assert!(core.is_missing_snapshot());
}
