use std::path::PathBuf;
use thiserror::Error;

/// Conditions under which persisted index state cannot be trusted.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index manifest not found at {0} (use --rebuild to start a new index)")]
    MissingManifest(PathBuf),
    #[error("corrupt index file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest lists {files} shard files but {counts} token counts")]
    ShardCountMismatch { files: usize, counts: usize },
    #[error("manifest has {keys} separator keys for {shards} shards")]
    TooManyKeys { keys: usize, shards: usize },
}
