pub mod config;
pub mod docstore;
pub mod error;
pub mod fingerprint;
pub mod html;
pub mod index;
pub mod ingest;
pub mod links;
pub mod persist;
pub mod query;
pub mod router;
pub mod shard;
pub mod tokenizer;

pub use config::IndexConfig;
pub use index::{DocId, Occurrences, Posting, ShardId};
pub use ingest::{Ingested, RawDocument, SkipReason};
pub use persist::IndexPaths;
pub use query::{QueryEngine, Ranking, SearchHit, SearchResult};
pub use router::IndexRouter;
