use anyhow::Result;
use axum::Router;
use clap::{Parser, ValueEnum};
use search_core::Ranking;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};
use server::build_app;
use tokio::net::TcpListener;

#[derive(Clone, Copy, ValueEnum)]
enum RankingArg {
    /// Last five documents of the intersection, reversed
    Tail,
    /// Whole intersection by descending score
    Score,
    /// Whole intersection by tf-idf cosine similarity
    Tfidf,
}

impl From<RankingArg> for Ranking {
    fn from(arg: RankingArg) -> Self {
        match arg {
            RankingArg::Tail => Ranking::Tail,
            RankingArg::Score => Ranking::Score,
            RankingArg::Tfidf => Ranking::TfIdf,
        }
    }
}

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// How matching documents are ranked
    #[arg(long, value_enum, default_value_t = RankingArg::Tail)]
    ranking: RankingArg,
    /// Number of shards kept in memory
    #[arg(long, default_value_t = 64)]
    shard_cache: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let app: Router = build_app(&args.index, args.ranking.into(), args.shard_cache)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
