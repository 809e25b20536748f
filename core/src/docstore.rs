use crate::index::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// URL <-> id mapping plus display metadata. Ids are dense and never reused.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocumentStore {
    records: Vec<DocumentRecord>,
    by_url: HashMap<String, DocId>,
}

impl DocumentStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn contains_url(&self, url: &str) -> bool { self.by_url.contains_key(url) }

    pub fn id_of(&self, url: &str) -> Option<DocId> { self.by_url.get(url).copied() }

    pub fn get(&self, id: DocId) -> Option<&DocumentRecord> { self.records.get(id as usize) }

    /// Assign the next id to `url`. A URL that is already registered keeps its id.
    pub fn register(&mut self, url: &str, title: Option<String>, description: Option<String>) -> DocId {
        if let Some(id) = self.id_of(url) {
            return id;
        }
        let id = self.records.len() as DocId;
        self.records.push(DocumentRecord { url: url.to_string(), title, description });
        self.by_url.insert(url.to_string(), id);
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, &DocumentRecord)> {
        self.records.iter().enumerate().map(|(i, r)| (i as DocId, r))
    }

    pub(crate) fn to_file(&self) -> BTreeMap<DocId, &DocumentRecord> {
        self.iter().collect()
    }

    /// Rebuild from the persisted id map. Ids must be dense from zero.
    pub(crate) fn from_file(file: BTreeMap<DocId, DocumentRecord>) -> anyhow::Result<Self> {
        let mut store = Self::new();
        for (expected, (id, record)) in file.into_iter().enumerate() {
            anyhow::ensure!(id as usize == expected, "document ids are not dense: expected {expected}, found {id}");
            anyhow::ensure!(!store.contains_url(&record.url), "url registered twice: {}", record.url);
            store.by_url.insert(record.url.clone(), id);
            store.records.push(record);
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_urls_unique() {
        let mut docs = DocumentStore::new();
        assert_eq!(docs.register("https://a.example/", Some("A".into()), None), 0);
        assert_eq!(docs.register("https://b.example/", None, None), 1);
        assert_eq!(docs.register("https://a.example/", None, None), 0);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs.get(0).and_then(|r| r.title.as_deref()), Some("A"));
        assert_eq!(docs.id_of("https://b.example/"), Some(1));
    }

    #[test]
    fn rejects_sparse_ids_on_load() {
        let mut file = BTreeMap::new();
        file.insert(1, DocumentRecord { url: "u".into(), title: None, description: None });
        assert!(DocumentStore::from_file(file).is_err());
    }
}
