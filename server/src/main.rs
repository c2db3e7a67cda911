use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use marquee_core::{SearchConfig, Tokenizer};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};
use marquee_server::build_app;
use tokio::net::TcpListener;

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./cache")]
    index: String,
    /// JSON file with BM25 and fusion settings
    #[arg(long)]
    config: Option<String>,
    /// Stopword list the index was built with
    #[arg(long)]
    stopwords: Option<String>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SearchConfig::from_json_file(path).with_context(|| format!("loading config {path}"))?,
        None => SearchConfig::default(),
    };
    let tokenizer = match &args.stopwords {
        Some(path) => Tokenizer::from_stopword_file(path)?,
        None => Tokenizer::default(),
    };
    let app: Router = build_app(args.index.clone(), config, tokenizer)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
