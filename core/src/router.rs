//! Single-level range partition of the token keyspace over a fixed set of shards.
//!
//! Shard `i` owns `[keys[i - 1], keys[i])`. Slots past `keys.len()` are not yet
//! active and always empty. While inactive slots remain, every token that is
//! not already a separator becomes one: the owning shard is split at it and the
//! shards to its right shift one slot over. Once every separator slot is used
//! the partition only moves through rebalancing, which shifts single boundary
//! tokens between neighbours until shard sizes differ by at most one.

use crate::config::IndexConfig;
use crate::docstore::DocumentStore;
use crate::fingerprint::FingerprintStore;
use crate::index::{Posting, ShardId};
use crate::links::{LinkPolicy, OutlinkVotes};
use crate::persist::{self, IndexPaths, Manifest, StagedSave};
use crate::shard::Shard;
use anyhow::{ensure, Result};

#[derive(Debug)]
enum Slot {
    Resident(Shard),
    /// On disk, loaded on first touch.
    Paged,
}

pub struct IndexRouter {
    pub(crate) config: IndexConfig,
    paths: IndexPaths,
    slots: Vec<Slot>,
    sizes: Vec<usize>,
    keys: Vec<String>,
    pub(crate) documents: DocumentStore,
    pub(crate) fingerprints: FingerprintStore,
    pub(crate) votes: OutlinkVotes,
    pub(crate) policy: LinkPolicy,
}

impl IndexRouter {
    /// Empty index rooted at `paths`. Nothing is read from or written to disk.
    pub fn new(paths: IndexPaths, config: IndexConfig) -> Self {
        let n = config.shard_count.max(1);
        Self {
            slots: (0..n).map(|i| Slot::Resident(Shard::new(i))).collect(),
            sizes: vec![0; n],
            keys: Vec::new(),
            documents: DocumentStore::new(),
            fingerprints: FingerprintStore::new(config.hamming_threshold),
            votes: OutlinkVotes::new(),
            policy: LinkPolicy::from_config(&config),
            paths,
            config,
        }
    }

    /// Restore manifest, documents, votes and fingerprints. Shards stay on disk until touched.
    ///
    /// An interrupted save is finished first if it was sealed, and discarded otherwise.
    ///
    /// The shard count recorded in the manifest overrides `config.shard_count`.
    pub fn load(paths: IndexPaths, mut config: IndexConfig) -> Result<Self> {
        persist::recover(&paths)?;
        let manifest = persist::load_manifest(&paths)?;
        let n = manifest.index_files.len();
        ensure!(n > 0, "manifest {} lists no shards", paths.manifest().display());
        for (i, name) in manifest.index_files.iter().enumerate() {
            ensure!(*name == IndexPaths::shard_file_name(i), "unexpected shard file {name} in slot {i}");
        }
        if config.shard_count != n {
            tracing::warn!(configured = config.shard_count, persisted = n, "using persisted shard count");
            config.shard_count = n;
        }
        let documents = persist::load_docs(&paths)?;
        let votes = persist::load_popularity(&paths)?;
        let fingerprints = persist::load_fingerprints(&paths, config.hamming_threshold)?;

        let mut router = Self {
            slots: (0..n).map(|_| Slot::Paged).collect(),
            sizes: vec![0; n],
            keys: manifest.keys,
            documents,
            fingerprints,
            votes,
            policy: LinkPolicy::from_config(&config),
            paths,
            config,
        };
        if manifest.token_counts.is_empty() {
            for i in 0..n {
                router.page_in(i)?;
            }
        } else {
            router.sizes = manifest.token_counts;
        }
        tracing::info!(shards = n, documents = router.documents.len(), "index loaded");
        Ok(router)
    }

    /// Load the index at `paths`, or start an empty one when `rebuild` is set.
    pub fn open(paths: IndexPaths, config: IndexConfig, rebuild: bool) -> Result<Self> {
        if rebuild {
            paths.clear()?;
            Ok(Self::new(paths, config))
        } else {
            Self::load(paths, config)
        }
    }

    pub fn config(&self) -> &IndexConfig { &self.config }

    pub fn paths(&self) -> &IndexPaths { &self.paths }

    pub fn shard_count(&self) -> usize { self.slots.len() }

    pub fn keys(&self) -> &[String] { &self.keys }

    /// Distinct-token count of every shard, resident or not.
    pub fn shard_sizes(&self) -> &[usize] { &self.sizes }

    pub fn distinct_tokens(&self) -> usize { self.sizes.iter().sum() }

    pub fn documents(&self) -> &DocumentStore { &self.documents }

    pub fn votes(&self) -> &OutlinkVotes { &self.votes }

    pub fn fingerprints(&self) -> &FingerprintStore { &self.fingerprints }

    /// Shard that owns `token` under the current separators.
    pub fn shard_for(&self, token: &str) -> ShardId {
        self.keys.partition_point(|k| k.as_str() <= token)
    }

    pub fn shard(&mut self, id: ShardId) -> Result<&Shard> {
        Ok(self.resident(id)?)
    }

    pub fn postings(&mut self, token: &str) -> Result<Option<Vec<Posting>>> {
        let id = self.shard_for(token);
        Ok(self.resident(id)?.get(token).map(<[Posting]>::to_vec))
    }

    fn page_in(&mut self, id: ShardId) -> Result<()> {
        if let Slot::Paged = self.slots[id] {
            let shard = Shard::load(&self.paths, id)?;
            if shard.len() != self.sizes[id] && self.sizes[id] != 0 {
                tracing::warn!(shard = id, recorded = self.sizes[id], actual = shard.len(), "manifest token count out of date");
            }
            self.sizes[id] = shard.len();
            self.slots[id] = Slot::Resident(shard);
        }
        Ok(())
    }

    fn resident(&mut self, id: ShardId) -> Result<&mut Shard> {
        self.page_in(id)?;
        match &mut self.slots[id] {
            Slot::Resident(shard) => Ok(shard),
            Slot::Paged => anyhow::bail!("shard {id} failed to page in"),
        }
    }

    /// Insert one posting, then restore balance between shard sizes.
    pub fn add_token(&mut self, token: &str, posting: Posting) -> Result<()> {
        let chosen = self.choose_insertion_index(token)?;
        if self.resident(chosen)?.insert(token, posting) {
            self.sizes[chosen] += 1;
        }
        self.rebalance(chosen)
    }

    fn choose_insertion_index(&mut self, token: &str) -> Result<ShardId> {
        let n = self.slots.len();
        if self.keys.len() + 1 >= n {
            return Ok(self.shard_for(token));
        }
        let at = self.keys.partition_point(|k| k.as_str() < token);
        if self.keys.get(at).is_some_and(|k| k == token) {
            return Ok(at + 1);
        }
        // First separator included: keys is empty, at == 0, route to shard 1.
        self.split_at(at, token)?;
        Ok(at + 1)
    }

    /// Insert separator `key` at position `at`, shifting later shards one slot right
    /// and moving the tokens >= `key` of shard `at` into the freed slot.
    fn split_at(&mut self, at: usize, key: &str) -> Result<()> {
        let last = self.keys.len() + 1;
        for i in at..=last {
            self.page_in(i)?;
        }
        self.slots[at + 1..=last].rotate_right(1);
        self.sizes[at + 1..=last].rotate_right(1);
        for i in at + 1..=last {
            if let Slot::Resident(shard) = &mut self.slots[i] {
                shard.id = i;
            }
        }
        self.keys.insert(at, key.to_string());

        let moved = self.resident(at)?.split_off(key);
        self.sizes[at] -= moved.len();
        self.sizes[at + 1] += moved.len();
        let target = self.resident(at + 1)?;
        for (token, list) in moved {
            target.insert_list(token, list);
        }
        Ok(())
    }

    /// Lowest-index shard with the fewest distinct tokens.
    fn smallest_shard(&self) -> ShardId {
        (0..self.sizes.len()).min_by_key(|&i| self.sizes[i]).unwrap_or(0)
    }

    fn rebalance(&mut self, chosen: ShardId) -> Result<()> {
        let smallest = self.smallest_shard();
        let min = self.sizes[smallest];
        if self.sizes[chosen] <= min + 1 {
            return Ok(());
        }
        let mut current = chosen;
        loop {
            let next = if smallest < current { current - 1 } else { current + 1 };
            let before = self.sizes[next];
            if next < current {
                self.migrate_left(current)?;
            } else {
                self.migrate_right(current)?;
            }
            if before == min || next == smallest {
                return Ok(());
            }
            current = next;
        }
    }

    /// Move the smallest token of shard `from` into shard `from - 1`.
    fn migrate_left(&mut self, from: ShardId) -> Result<()> {
        let to = from - 1;
        self.page_in(to)?;
        let source = self.resident(from)?;
        let Some((token, list)) = source.pop_smallest() else { return Ok(()) };
        let new_boundary = source.smallest().map(|(t, _)| t.to_string());
        self.sizes[from] -= 1;
        self.resident(to)?.insert_list(token, list);
        self.sizes[to] += 1;
        if let Some(boundary) = new_boundary {
            self.keys[to] = boundary;
        }
        Ok(())
    }

    /// Move the largest token of shard `from` into shard `from + 1`.
    fn migrate_right(&mut self, from: ShardId) -> Result<()> {
        let to = from + 1;
        self.page_in(to)?;
        let Some((token, list)) = self.resident(from)?.pop_largest() else { return Ok(()) };
        self.sizes[from] -= 1;
        if from < self.keys.len() {
            self.keys[from] = token.clone();
        } else {
            self.keys.push(token.clone());
        }
        self.resident(to)?.insert_list(token, list);
        self.sizes[to] += 1;
        Ok(())
    }

    pub fn manifest(&self) -> Manifest {
        Manifest {
            keys: self.keys.clone(),
            index_files: (0..self.slots.len()).map(IndexPaths::shard_file_name).collect(),
            token_counts: self.sizes.clone(),
        }
    }

    /// Stage every file of the index: resident shards, documents, votes, fingerprints and
    /// the manifest last. Nothing on disk changes until the returned save is committed.
    pub fn stage_index(&self) -> Result<StagedSave> {
        let mut save = StagedSave::new(&self.paths)?;
        for slot in &self.slots {
            if let Slot::Resident(shard) = slot {
                shard.stage(&mut save)?;
            }
        }
        persist::stage_docs(&mut save, &self.documents)?;
        persist::stage_popularity(&mut save, &self.votes)?;
        persist::stage_fingerprints(&mut save, &self.fingerprints)?;
        persist::stage_manifest(&mut save, &self.manifest())?;
        Ok(save)
    }

    /// Stage and commit the index. Returns the number of bytes written.
    pub fn save_index(&self) -> Result<u64> {
        let written = self.stage_index()?.commit()?;
        tracing::info!(bytes = written, root = %self.paths.root.display(), "index saved");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Occurrences;

    fn router(n: usize) -> IndexRouter {
        IndexRouter::new(IndexPaths::new("unused"), IndexConfig::default().with_shard_count(n))
    }

    fn p(doc: u32) -> Posting {
        Posting::new(doc, Occurrences { text_count: 1, ..Default::default() })
    }

    #[test]
    fn first_token_creates_first_separator() {
        let mut r = router(4);
        r.add_token("m", p(0)).unwrap();
        assert_eq!(r.keys(), ["m"]);
        assert_eq!(r.shard_sizes(), [0, 1, 0, 0]);
    }

    #[test]
    fn split_shifts_later_shards_right() {
        let mut r = router(4);
        for t in ["m", "t", "c"] {
            r.add_token(t, p(0)).unwrap();
        }
        assert_eq!(r.keys(), ["c", "m", "t"]);
        assert_eq!(r.shard(1).unwrap().tokens(), ["c"]);
        assert_eq!(r.shard(2).unwrap().tokens(), ["m"]);
        assert_eq!(r.shard(3).unwrap().tokens(), ["t"]);
    }

    #[test]
    fn existing_separator_routes_after_it() {
        let mut r = router(4);
        r.add_token("m", p(0)).unwrap();
        r.add_token("m", p(1)).unwrap();
        assert_eq!(r.keys(), ["m"]);
        assert_eq!(r.postings("m").unwrap().map(|l| l.len()), Some(2));
    }

    #[test]
    fn single_shard_never_splits() {
        let mut r = router(1);
        for t in ["b", "a", "c"] {
            r.add_token(t, p(0)).unwrap();
        }
        assert!(r.keys().is_empty());
        assert_eq!(r.shard_sizes(), [3]);
    }

    #[test]
    fn full_partition_rebalances_leftward() {
        let mut r = router(3);
        for t in ["b", "d", "f", "g", "h"] {
            r.add_token(t, p(0)).unwrap();
        }
        let sizes = r.shard_sizes().to_vec();
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1, "{sizes:?}");
        for t in ["b", "d", "f", "g", "h"] {
            let owner = r.shard_for(t);
            assert!(r.shard(owner).unwrap().contains(t), "{t} not in shard {owner}");
        }
    }
}
