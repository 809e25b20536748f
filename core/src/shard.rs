use crate::error::IndexError;
use crate::index::{Posting, ShardId};
use crate::persist::{IndexPaths, StagedSave};
use anyhow::{Context, Result};
use serde::ser::{Serialize, Serializer};
use std::collections::HashMap;
use std::fs;

/// One partition of the inverted index: token -> postings, plus its tokens in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shard {
    pub id: ShardId,
    postings: HashMap<String, Vec<Posting>>,
    tokens: Vec<String>,
}

struct SortedView<'a>(&'a Shard);

impl Serialize for SortedView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.tokens.iter().map(|t| (t, &self.0.postings[t])))
    }
}

impl Shard {
    pub fn new(id: ShardId) -> Self {
        Self { id, ..Self::default() }
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize { self.tokens.len() }

    pub fn is_empty(&self) -> bool { self.tokens.is_empty() }

    pub fn tokens(&self) -> &[String] { &self.tokens }

    pub fn get(&self, token: &str) -> Option<&[Posting]> {
        self.postings.get(token).map(Vec::as_slice)
    }

    pub fn contains(&self, token: &str) -> bool { self.postings.contains_key(token) }

    /// Append `posting` to the token's list. Returns true when the token is new to this shard.
    ///
    /// Postings arrive in document order; a repeat for the last document is merged.
    pub fn insert(&mut self, token: &str, posting: Posting) -> bool {
        if let Some(list) = self.postings.get_mut(token) {
            match list.last_mut() {
                Some(last) if last.document_id == posting.document_id => {
                    last.occurrences.text_count += posting.occurrences.text_count;
                    last.occurrences.header_count += posting.occurrences.header_count;
                    last.occurrences.important_count += posting.occurrences.important_count;
                }
                _ => list.push(posting),
            }
            return false;
        }
        self.insert_list(token.to_string(), vec![posting]);
        true
    }

    /// Take over a whole posting list for a token this shard does not hold yet.
    pub fn insert_list(&mut self, token: String, list: Vec<Posting>) {
        debug_assert!(!self.postings.contains_key(&token));
        let at = self.tokens.binary_search(&token).unwrap_or_else(|i| i);
        self.tokens.insert(at, token.clone());
        self.postings.insert(token, list);
    }

    pub fn remove(&mut self, token: &str) -> Option<Vec<Posting>> {
        let list = self.postings.remove(token)?;
        if let Ok(i) = self.tokens.binary_search_by(|t| t.as_str().cmp(token)) {
            self.tokens.remove(i);
        }
        Some(list)
    }

    pub fn smallest(&self) -> Option<(&str, &[Posting])> {
        self.tokens.first().map(|t| (t.as_str(), self.postings[t].as_slice()))
    }

    pub fn largest(&self) -> Option<(&str, &[Posting])> {
        self.tokens.last().map(|t| (t.as_str(), self.postings[t].as_slice()))
    }

    pub(crate) fn pop_smallest(&mut self) -> Option<(String, Vec<Posting>)> {
        let token = self.tokens.first()?.clone();
        let list = self.remove(&token)?;
        Some((token, list))
    }

    pub(crate) fn pop_largest(&mut self) -> Option<(String, Vec<Posting>)> {
        let token = self.tokens.last()?.clone();
        let list = self.remove(&token)?;
        Some((token, list))
    }

    /// Remove and return every token >= `key`, in order.
    pub(crate) fn split_off(&mut self, key: &str) -> Vec<(String, Vec<Posting>)> {
        let at = self.tokens.partition_point(|t| t.as_str() < key);
        self.tokens
            .split_off(at)
            .into_iter()
            .map(|t| {
                let list = self.postings.remove(&t).unwrap_or_default();
                (t, list)
            })
            .collect()
    }

    /// Stage the shard file, tokens in sorted order.
    pub fn stage(&self, save: &mut StagedSave) -> Result<()> {
        save.json(&IndexPaths::shard_file_name(self.id), &SortedView(self))
    }

    pub fn load(paths: &IndexPaths, id: ShardId) -> Result<Self> {
        let path = paths.shard(id);
        let bytes = fs::read(&path).with_context(|| format!("reading shard {}", path.display()))?;
        let postings: HashMap<String, Vec<Posting>> =
            serde_json::from_slice(&bytes).map_err(|source| IndexError::Corrupt { path: path.clone(), source })?;
        let mut tokens: Vec<String> = postings.keys().cloned().collect();
        tokens.sort();
        Ok(Self { id, postings, tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Occurrences;

    fn posting(doc: u32, text: u32) -> Posting {
        Posting::new(doc, Occurrences { text_count: text, ..Default::default() })
    }

    #[test]
    fn keeps_tokens_sorted() {
        let mut shard = Shard::new(0);
        for t in ["pear", "apple", "zebra", "mango"] {
            assert!(shard.insert(t, posting(0, 1)));
        }
        assert!(!shard.insert("apple", posting(1, 1)));
        assert_eq!(shard.tokens(), ["apple", "mango", "pear", "zebra"]);
        assert_eq!(shard.smallest().map(|(t, p)| (t, p.len())), Some(("apple", 2)));
        assert_eq!(shard.largest().map(|(t, _)| t), Some("zebra"));
        assert_eq!(shard.remove("mango").map(|l| l.len()), Some(1));
        assert_eq!(shard.tokens(), ["apple", "pear", "zebra"]);
        assert!(shard.remove("mango").is_none());
    }

    #[test]
    fn repeated_document_is_merged() {
        let mut shard = Shard::new(0);
        shard.insert("rust", posting(3, 1));
        shard.insert("rust", posting(3, 2));
        assert_eq!(shard.get("rust").unwrap(), &[posting(3, 3)]);
    }

    #[test]
    fn split_off_moves_upper_range() {
        let mut shard = Shard::new(0);
        for t in ["a", "c", "e"] {
            shard.insert(t, posting(0, 1));
        }
        let moved: Vec<String> = shard.split_off("b").into_iter().map(|(t, _)| t).collect();
        assert_eq!(moved, ["c", "e"]);
        assert_eq!(shard.tokens(), ["a"]);
        assert!(!shard.contains("c"));
    }

    #[test]
    fn save_is_sorted_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let mut shard = Shard::new(4);
        shard.insert("b", posting(1, 2));
        shard.insert("a", posting(0, 1));
        let mut save = StagedSave::new(&paths).unwrap();
        shard.stage(&mut save).unwrap();
        let written = save.commit().unwrap();
        let text = std::fs::read_to_string(paths.shard(4)).unwrap();
        assert_eq!(written as usize, text.len());
        assert!(text.find("\"a\"").unwrap() < text.find("\"b\"").unwrap());
        assert_eq!(Shard::load(&paths, 4).unwrap(), shard);
    }
}
