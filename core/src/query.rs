use crate::docstore::DocumentStore;
use crate::index::{DocId, Occurrences, Posting, ShardId};
use crate::persist::{self, IndexPaths};
use crate::shard::Shard;
use crate::tokenizer::tokenize_query;
use anyhow::Result;
use lru::LruCache;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Number of hits the tail ranking returns.
pub const TAIL_RESULTS: usize = 5;

/// How an intersection is turned into a result list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ranking {
    /// Last five entries of the intersection, reversed. The intersection keeps the
    /// order of the smallest posting list (ascending plain-text count), so this is
    /// not a top-5 by score.
    #[default]
    Tail,
    /// Whole intersection, highest score first, ties in intersection order.
    Score,
    /// Whole intersection by cosine similarity between query and document tf-idf
    /// vectors, ties in intersection order. Term frequency is the plain-text count and
    /// `idf = ln(N / df)` with `N` the number of registered documents.
    TfIdf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub document_id: DocId,
    /// Occurrences from the shortest posting list among the query tokens.
    pub occurrences: Occurrences,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub description: String,
    pub score: f64,
}

/// Read-only view over a persisted index. Safe to share across threads.
pub struct QueryEngine {
    paths: IndexPaths,
    keys: Vec<String>,
    shard_count: usize,
    documents: DocumentStore,
    cache: Mutex<LruCache<ShardId, Arc<Shard>>>,
    ranking: Ranking,
}

impl QueryEngine {
    /// Open the committed index at `paths`. A sealed save that was interrupted is finished first.
    pub fn open(paths: IndexPaths, cache_capacity: usize) -> Result<Self> {
        persist::finish_sealed_save(&paths)?;
        let manifest = persist::load_manifest(&paths)?;
        let documents = persist::load_docs(&paths)?;
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        tracing::info!(shards = manifest.index_files.len(), documents = documents.len(), "query engine opened");
        Ok(Self {
            paths,
            keys: manifest.keys,
            shard_count: manifest.index_files.len(),
            documents,
            cache: Mutex::new(LruCache::new(capacity)),
            ranking: Ranking::default(),
        })
    }

    pub fn with_ranking(mut self, ranking: Ranking) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn ranking(&self) -> Ranking { self.ranking }

    pub fn documents(&self) -> &DocumentStore { &self.documents }

    fn shard_for(&self, token: &str) -> ShardId {
        self.keys.partition_point(|k| k.as_str() <= token).min(self.shard_count.saturating_sub(1))
    }

    fn shard(&self, id: ShardId) -> Result<Arc<Shard>> {
        if let Some(shard) = self.cache.lock().get(&id) {
            return Ok(Arc::clone(shard));
        }
        // Loaded outside the lock; a concurrent miss on the same shard just loads it twice.
        let shard = Arc::new(Shard::load(&self.paths, id)?);
        self.cache.lock().put(id, Arc::clone(&shard));
        Ok(shard)
    }

    /// Postings for one token, ascending by plain-text count. Empty when absent.
    pub fn query_token(&self, token: &str) -> Result<Vec<Posting>> {
        let shard = self.shard(self.shard_for(token))?;
        let mut postings = shard.get(token).map(<[Posting]>::to_vec).unwrap_or_default();
        postings.sort_by_key(|p| p.occurrences.text_count);
        Ok(postings)
    }

    /// Documents containing every token, ranked per the engine's `Ranking`.
    pub fn query<S: AsRef<str> + Sync>(&self, tokens: &[S]) -> Result<Vec<SearchHit>> {
        let mut unique: Vec<(&str, u32)> = Vec::new();
        for token in tokens.iter().map(AsRef::as_ref) {
            match unique.iter_mut().find(|(t, _)| *t == token) {
                Some((_, freq)) => *freq += 1,
                None => unique.push((token, 1)),
            }
        }
        if unique.is_empty() {
            return Ok(Vec::new());
        }
        let lists = unique
            .par_iter()
            .map(|(t, _)| self.query_token(t))
            .collect::<Result<Vec<_>>>()?;

        let mut order: Vec<usize> = (0..lists.len()).collect();
        order.sort_by_key(|&i| lists[i].len());
        let mut matched = lists[order[0]].clone();
        for &i in &order[1..] {
            let ids: HashSet<DocId> = lists[i].iter().map(|p| p.document_id).collect();
            matched.retain(|p| ids.contains(&p.document_id));
        }

        let scores: Vec<f64> = match self.ranking {
            Ranking::TfIdf => {
                let query_freq: Vec<u32> = unique.iter().map(|(_, f)| *f).collect();
                tfidf_scores(self.documents.len(), &query_freq, &lists, &matched)
            }
            Ranking::Tail | Ranking::Score => matched.iter().map(|p| f64::from(p.occurrences.score())).collect(),
        };
        let hits = matched
            .into_iter()
            .zip(scores)
            .map(|(p, score)| SearchHit { document_id: p.document_id, occurrences: p.occurrences, score });
        Ok(rank(hits.collect(), self.ranking))
    }

    /// Tokenize free text, query, and attach document metadata.
    pub fn search(&self, text: &str) -> Result<Vec<SearchResult>> {
        let tokens = tokenize_query(text);
        let hits = self.query(tokens.as_slice())?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let doc = self.documents.get(hit.document_id)?;
                Some(SearchResult {
                    url: doc.url.clone(),
                    title: doc.title.clone().unwrap_or_default(),
                    description: doc.description.clone().unwrap_or_default(),
                    score: hit.score,
                })
            })
            .collect())
    }
}

/// Cosine similarity of each matched document to the query over tf-idf weights.
///
/// `lists[i]` is the full posting list of the query token seen `query_freq[i]` times.
fn tfidf_scores(total_docs: usize, query_freq: &[u32], lists: &[Vec<Posting>], matched: &[Posting]) -> Vec<f64> {
    let idf: Vec<f64> = lists
        .iter()
        .map(|list| match list.len() {
            0 => 0.0,
            df => (total_docs as f64 / df as f64).ln(),
        })
        .collect();
    let query: Vec<f64> = query_freq.iter().zip(&idf).map(|(&f, &w)| f64::from(f) * w).collect();
    let query_norm = query.iter().map(|w| w * w).sum::<f64>().sqrt();

    let text_counts: Vec<HashMap<DocId, u32>> = lists
        .iter()
        .map(|list| list.iter().map(|p| (p.document_id, p.occurrences.text_count)).collect())
        .collect();
    matched
        .iter()
        .map(|p| {
            let mut dot = 0.0;
            let mut doc_norm = 0.0;
            for (i, counts) in text_counts.iter().enumerate() {
                let weight = f64::from(counts.get(&p.document_id).copied().unwrap_or(0)) * idf[i];
                dot += weight * query[i];
                doc_norm += weight * weight;
            }
            let denom = query_norm * doc_norm.sqrt();
            if denom > 0.0 { dot / denom } else { 0.0 }
        })
        .collect()
}

fn rank(mut hits: Vec<SearchHit>, ranking: Ranking) -> Vec<SearchHit> {
    match ranking {
        Ranking::Tail => {
            let start = hits.len().saturating_sub(TAIL_RESULTS);
            let mut tail = hits.split_off(start);
            tail.reverse();
            tail
        }
        Ranking::Score | Ranking::TfIdf => {
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(doc: u32, score: u32) -> SearchHit {
        SearchHit {
            document_id: doc,
            occurrences: Occurrences { text_count: score, ..Default::default() },
            score: f64::from(score),
        }
    }

    fn text(doc: u32, count: u32) -> Posting {
        Posting::new(doc, Occurrences { text_count: count, ..Default::default() })
    }

    #[test]
    fn tail_takes_last_five_reversed() {
        let hits: Vec<SearchHit> = (0..7).map(|d| hit(d, 10 - d)).collect();
        let ids: Vec<u32> = rank(hits, Ranking::Tail).iter().map(|h| h.document_id).collect();
        assert_eq!(ids, [6, 5, 4, 3, 2]);
    }

    #[test]
    fn score_ranking_is_stable() {
        let hits = vec![hit(0, 1), hit(1, 3), hit(2, 1), hit(3, 3)];
        let ids: Vec<u32> = rank(hits, Ranking::Score).iter().map(|h| h.document_id).collect();
        assert_eq!(ids, [1, 3, 0, 2]);
    }

    #[test]
    fn tfidf_is_cosine_over_text_counts() {
        // N = 4: "x" is in one document (idf ln 4), "y" in two (idf ln 2).
        let x = vec![text(0, 1), text(1, 1)];
        let y = vec![text(0, 1), text(1, 4)];
        let lists = vec![x[..1].to_vec(), y.clone()];
        let lists_both = vec![x.clone(), y.clone()];
        let scores = tfidf_scores(4, &[1, 1], &lists, &lists[0]);
        // Document 0 has the same weight profile as the query.
        assert!((scores[0] - 1.0).abs() < 1e-9);

        // With "x" in both documents, idf(x) = ln 2 = idf(y): doc 0 is (1, 1), doc 1 is (1, 4).
        let scores = tfidf_scores(4, &[1, 1], &lists_both, &x);
        let expected_doc1 = 5.0 / (2f64.sqrt() * 17f64.sqrt());
        assert!((scores[0] - 1.0).abs() < 1e-9);
        assert!((scores[1] - expected_doc1).abs() < 1e-9);
    }

    #[test]
    fn tfidf_is_zero_when_every_document_matches() {
        let list = vec![text(0, 3), text(1, 1)];
        let scores = tfidf_scores(2, &[1], &[list.clone()], &list);
        assert_eq!(scores, [0.0, 0.0]);
    }

    #[test]
    fn tfidf_ranking_sorts_descending() {
        let hits = vec![hit(0, 1), hit(1, 3), hit(2, 2)];
        let ids: Vec<u32> = rank(hits, Ranking::TfIdf).iter().map(|h| h.document_id).collect();
        assert_eq!(ids, [1, 2, 0]);
    }
}
