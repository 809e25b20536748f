use serde::{Deserialize, Serialize};

pub type DocId = u32;
pub type ShardId = usize;

/// Per-document frequency of a token, split into mutually exclusive buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrences {
    pub text_count: u32,
    pub header_count: u32,
    pub important_count: u32,
}

impl Occurrences {
    /// Ranking score. The emphasized bucket does not contribute.
    pub fn score(&self) -> u32 {
        self.header_count + self.text_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Posting {
    pub document_id: DocId,
    pub occurrences: Occurrences,
}

impl Posting {
    pub fn new(document_id: DocId, occurrences: Occurrences) -> Self {
        Self { document_id, occurrences }
    }
}
