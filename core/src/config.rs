use serde::{Deserialize, Serialize};

pub const DEFAULT_SHARD_COUNT: usize = 300;
pub const DEFAULT_HAMMING_THRESHOLD: u32 = 3;
pub const DEFAULT_MIN_DISTINCT_TOKENS: usize = 10;

const DEFAULT_ALLOWED_DOMAINS: &[&str] = &["ics.uci.edu", "cs.uci.edu", "informatics.uci.edu", "stat.uci.edu"];

const DEFAULT_DISALLOWED_EXTENSIONS: &[&str] = &[
    "css", "js", "json", "xml", "rss",
    "bmp", "gif", "jpg", "jpeg", "ico", "png", "svg", "tif", "tiff", "webp",
    "mid", "mp2", "mp3", "mp4", "wav", "avi", "mov", "mpeg", "ram", "m4v", "mkv", "ogg", "ogv", "wmv", "flv",
    "pdf", "ps", "eps", "tex", "ppt", "pptx", "doc", "docx", "xls", "xlsx", "odt", "ods", "odp", "rtf",
    "names", "data", "dat", "csv", "arff", "bib",
    "exe", "bz2", "tar", "tgz", "gz", "zip", "rar", "7z", "jar", "msi", "bin", "dmg", "iso", "apk", "war",
    "sha1", "thmx", "mso", "epub", "dll", "cnf", "swf", "woff", "woff2", "ttf", "sql",
];

/// Tunables for one index build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub shard_count: usize,
    pub hamming_threshold: u32,
    /// Documents with fewer distinct tokens than this are not indexed.
    pub min_distinct_tokens: usize,
    /// Outlink host suffixes that earn popularity votes.
    pub allowed_domains: Vec<String>,
    pub disallowed_extensions: Vec<String>,
    pub drop_stopwords: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            hamming_threshold: DEFAULT_HAMMING_THRESHOLD,
            min_distinct_tokens: DEFAULT_MIN_DISTINCT_TOKENS,
            allowed_domains: DEFAULT_ALLOWED_DOMAINS.iter().map(|s| s.to_string()).collect(),
            disallowed_extensions: DEFAULT_DISALLOWED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            drop_stopwords: false,
        }
    }
}

impl IndexConfig {
    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count.max(1);
        self
    }
}
