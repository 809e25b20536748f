use crate::docstore::{DocumentRecord, DocumentStore};
use crate::error::IndexError;
use crate::fingerprint::{FingerprintFile, FingerprintStore};
use crate::index::{DocId, ShardId};
use crate::links::OutlinkVotes;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, create_dir_all, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Partition manifest: separator keys and the shard file for every slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub keys: Vec<String>,
    pub index_files: Vec<String>,
    /// Distinct tokens per shard, absent in manifests written without it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_counts: Vec<usize>,
}

const MANIFEST_FILE: &str = "index_dir.json";
const DOCS_FILE: &str = "docs.json";
const POPULARITY_FILE: &str = "popularity.json";
const FINGERPRINTS_FILE: &str = "fingerprints.bin";
const COMMIT_RECORD: &str = "index_commit.json";
const STAGED_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn shard_file_name(id: ShardId) -> String { format!("index_{id}.json") }
    pub fn shard(&self, id: ShardId) -> PathBuf { self.root.join(Self::shard_file_name(id)) }
    pub fn manifest(&self) -> PathBuf { self.root.join(MANIFEST_FILE) }
    pub fn docs(&self) -> PathBuf { self.root.join(DOCS_FILE) }
    pub fn popularity(&self) -> PathBuf { self.root.join(POPULARITY_FILE) }
    pub fn fingerprints(&self) -> PathBuf { self.root.join(FINGERPRINTS_FILE) }
    pub fn commit_record(&self) -> PathBuf { self.root.join(COMMIT_RECORD) }
    fn staged(&self, name: &str) -> PathBuf { self.root.join(format!("{name}{STAGED_SUFFIX}")) }

    pub fn exists(&self) -> bool { self.manifest().is_file() }

    fn is_index_file(name: &str) -> bool {
        let name = name.strip_suffix(STAGED_SUFFIX).unwrap_or(name);
        if matches!(name, MANIFEST_FILE | DOCS_FILE | POPULARITY_FILE | FINGERPRINTS_FILE | COMMIT_RECORD) {
            return true;
        }
        name.strip_prefix("index_")
            .and_then(|rest| rest.strip_suffix(".json"))
            .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
    }

    fn index_files(&self) -> Result<Vec<fs::DirEntry>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("listing {}", self.root.display())),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() && Self::is_index_file(&entry.file_name().to_string_lossy()) {
                files.push(entry);
            }
        }
        Ok(files)
    }

    /// Total size in bytes of the index files in this directory.
    pub fn disk_usage(&self) -> Result<u64> {
        let mut total = 0;
        for entry in self.index_files()? {
            total += entry.metadata()?.len();
        }
        Ok(total)
    }

    /// Delete the files of an earlier index, staged ones included. Other files in the
    /// directory are left alone.
    pub fn clear(&self) -> Result<()> {
        for entry in self.index_files()? {
            fs::remove_file(entry.path()).with_context(|| format!("removing {}", entry.path().display()))?;
        }
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(bytes).with_context(|| format!("writing {}", path.display()))?;
    file.sync_all().with_context(|| format!("syncing {}", path.display()))?;
    Ok(())
}

fn sync_dir(dir: &Path) -> Result<()> {
    // Directory handles can only be opened for syncing on unix.
    #[cfg(unix)]
    File::open(dir).and_then(|d| d.sync_all()).with_context(|| format!("syncing {}", dir.display()))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e).with_context(|| format!("removing {}", path.display())),
        _ => Ok(()),
    }
}

/// One save of the index directory.
///
/// Files are written and synced under staged names. `seal` records the file list, after
/// which the save is completed even across a crash; `apply` moves the files into place in
/// staging order. Until sealed, the previous index stays untouched.
#[must_use = "staged files are discarded unless the save is committed"]
pub struct StagedSave {
    paths: IndexPaths,
    files: Vec<String>,
    bytes: u64,
}

impl StagedSave {
    pub fn new(paths: &IndexPaths) -> Result<Self> {
        create_dir_all(&paths.root).with_context(|| format!("creating {}", paths.root.display()))?;
        Ok(Self { paths: paths.clone(), files: Vec::new(), bytes: 0 })
    }

    /// Bytes staged so far.
    pub fn bytes(&self) -> u64 { self.bytes }

    pub fn json<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.raw(name, &bytes)
    }

    pub fn raw(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        debug_assert!(IndexPaths::is_index_file(name), "{name} is not an index file");
        write_synced(&self.paths.staged(name), bytes)?;
        self.files.push(name.to_string());
        self.bytes += bytes.len() as u64;
        Ok(())
    }

    pub fn seal(self) -> Result<SealedSave> {
        sync_dir(&self.paths.root)?;
        let staged = self.paths.staged(COMMIT_RECORD);
        write_synced(&staged, &serde_json::to_vec(&self.files)?)?;
        fs::rename(&staged, self.paths.commit_record())
            .with_context(|| format!("writing {}", self.paths.commit_record().display()))?;
        sync_dir(&self.paths.root)?;
        Ok(SealedSave { paths: self.paths, files: self.files, bytes: self.bytes })
    }

    /// Seal and apply. Returns the number of bytes written.
    pub fn commit(self) -> Result<u64> {
        self.seal()?.apply()
    }
}

/// A save whose file list is on disk.
#[must_use = "a sealed save is only completed on the next open unless applied"]
pub struct SealedSave {
    paths: IndexPaths,
    files: Vec<String>,
    bytes: u64,
}

impl SealedSave {
    pub fn apply(self) -> Result<u64> {
        move_into_place(&self.paths, &self.files)?;
        Ok(self.bytes)
    }
}

fn move_into_place(paths: &IndexPaths, files: &[String]) -> Result<()> {
    for name in files {
        match fs::rename(paths.staged(name), paths.root.join(name)) {
            Ok(()) => {}
            // Already moved before an interruption.
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("moving {name} into place")),
        }
    }
    sync_dir(&paths.root)?;
    remove_if_present(&paths.commit_record())
}

/// Complete a sealed save that was interrupted before all of its files were moved.
pub fn finish_sealed_save(paths: &IndexPaths) -> Result<()> {
    let record = paths.commit_record();
    let bytes = match fs::read(&record) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", record.display())),
    };
    let files: Vec<String> =
        serde_json::from_slice(&bytes).map_err(|source| IndexError::Corrupt { path: record.clone(), source })?;
    if let Some(bad) = files.iter().find(|f| !IndexPaths::is_index_file(f)) {
        anyhow::bail!("commit record {} names foreign file {bad}", record.display());
    }
    tracing::warn!(files = files.len(), "completing interrupted save");
    move_into_place(paths, &files)
}

/// Bring the directory to its last committed state: finish a sealed save, then drop the
/// staged files of a save that never sealed. Only the writer may call this.
pub fn recover(paths: &IndexPaths) -> Result<()> {
    finish_sealed_save(paths)?;
    for entry in paths.index_files()? {
        if entry.file_name().to_string_lossy().ends_with(STAGED_SUFFIX) {
            tracing::warn!(file = %entry.path().display(), "discarding file of an unfinished save");
            remove_if_present(&entry.path())?;
        }
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_slice(&bytes).map_err(|source| IndexError::Corrupt { path: path.to_path_buf(), source })?;
    Ok(value)
}

pub fn stage_manifest(save: &mut StagedSave, manifest: &Manifest) -> Result<()> {
    save.json(MANIFEST_FILE, manifest)
}

/// Load the manifest. A missing manifest is a hard error, never an empty index.
pub fn load_manifest(paths: &IndexPaths) -> Result<Manifest> {
    let path = paths.manifest();
    if !path.is_file() {
        return Err(IndexError::MissingManifest(path).into());
    }
    let manifest: Manifest = read_json(&path)?;
    let shards = manifest.index_files.len();
    if manifest.keys.len() >= shards.max(1) {
        return Err(IndexError::TooManyKeys { keys: manifest.keys.len(), shards }.into());
    }
    if !manifest.token_counts.is_empty() && manifest.token_counts.len() != shards {
        return Err(IndexError::ShardCountMismatch { files: shards, counts: manifest.token_counts.len() }.into());
    }
    Ok(manifest)
}

pub fn stage_docs(save: &mut StagedSave, docs: &DocumentStore) -> Result<()> {
    save.json(DOCS_FILE, &docs.to_file())
}

pub fn load_docs(paths: &IndexPaths) -> Result<DocumentStore> {
    let file: BTreeMap<DocId, DocumentRecord> = read_json(&paths.docs())?;
    DocumentStore::from_file(file).with_context(|| format!("validating {}", paths.docs().display()))
}

pub fn stage_popularity(save: &mut StagedSave, votes: &OutlinkVotes) -> Result<()> {
    save.json(POPULARITY_FILE, votes)
}

pub fn load_popularity(paths: &IndexPaths) -> Result<OutlinkVotes> {
    let map: HashMap<String, u64> = read_json(&paths.popularity())?;
    Ok(OutlinkVotes::from_map(map))
}

pub fn stage_fingerprints(save: &mut StagedSave, store: &FingerprintStore) -> Result<()> {
    save.raw(FINGERPRINTS_FILE, &bincode::serialize(&store.to_file())?)
}

/// Load registered fingerprints, banded for `hamming_threshold`. A missing file gives an empty store.
pub fn load_fingerprints(paths: &IndexPaths, hamming_threshold: u32) -> Result<FingerprintStore> {
    let path = paths.fingerprints();
    let bytes = match fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "no fingerprint file, near-duplicate history starts empty");
            return Ok(FingerprintStore::new(hamming_threshold));
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let file: FingerprintFile = bincode::deserialize(&bytes).with_context(|| format!("decoding {}", path.display()))?;
    if file.hamming_threshold != hamming_threshold {
        tracing::info!(stored = file.hamming_threshold, configured = hamming_threshold, "re-banding fingerprints");
    }
    Ok(FingerprintStore::from_fingerprints(hamming_threshold, file.fingerprints))
}
