//! Document index repository.
//!
//! The index maps a document id to its [`DocumentMeta`] (original filename,
//! text-artifact path, ingestion time) and is the only authority for
//! enumerating ingested documents. It is persisted as a JSON object at
//! `<store.dir>/index.json`.
//!
//! # Consistency
//!
//! `index.json` is the source of truth; several handles (a running server
//! and `ingres ingest`) may share one store. Writers are serialized by a
//! mutex and re-read the file before every insert, then write the merged map
//! to `index.json.tmp` and rename it over `index.json`. Readers keep a cached
//! snapshot keyed by the file's modification time and length, and reload it
//! when either changes. A reader therefore observes either the old or the
//! new index, never a half-applied insert.
//!
//! The writer mutex is per process. Two processes inserting at the same
//! instant can still race between re-read and rename.

use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use ingres_rag_core::models::{DocumentMeta, IndexedDocument};

type Entries = BTreeMap<String, DocumentMeta>;

/// Identity of one version of `index.json` on disk.
type FileStamp = (SystemTime, u64);

struct Snapshot {
    entries: Arc<Entries>,
    stamp: Option<FileStamp>,
}

pub struct DocumentIndex {
    path: PathBuf,
    snapshot: RwLock<Snapshot>,
    writer: Mutex<()>,
}

impl DocumentIndex {
    /// Opens the index at `path`, creating its directory and an empty index
    /// file if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store dir: {}", parent.display()))?;
        }

        if !path.exists() {
            write_atomic(&path, &Entries::new())?;
        }
        let (entries, stamp) = read_index(&path)?;

        tracing::debug!(path = %path.display(), documents = entries.len(), "opened document index");

        Ok(Self {
            path,
            snapshot: RwLock::new(Snapshot {
                entries: Arc::new(entries),
                stamp,
            }),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current entries, reloaded from disk if another handle changed them.
    fn current(&self) -> Result<Arc<Entries>> {
        let on_disk = file_stamp(&self.path)?;
        {
            let snapshot = self
                .snapshot
                .read()
                .map_err(|_| anyhow!("document index lock poisoned"))?;
            if on_disk.is_some() && snapshot.stamp == on_disk {
                return Ok(Arc::clone(&snapshot.entries));
            }
        }

        let (entries, stamp) = read_index(&self.path)?;
        tracing::debug!(documents = entries.len(), "reloaded document index");
        self.replace(entries, stamp)
    }

    fn replace(&self, entries: Entries, stamp: Option<FileStamp>) -> Result<Arc<Entries>> {
        let entries = Arc::new(entries);
        let mut slot = self
            .snapshot
            .write()
            .map_err(|_| anyhow!("document index lock poisoned"))?;
        *slot = Snapshot {
            entries: Arc::clone(&entries),
            stamp,
        };
        Ok(entries)
    }

    pub fn get(&self, id: &str) -> Result<Option<DocumentMeta>> {
        Ok(self.current()?.get(id).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.current()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.current()?.is_empty())
    }

    /// All documents in ingestion order (ties and legacy entries by id).
    pub fn list(&self) -> Result<Vec<IndexedDocument>> {
        let snapshot = self.current()?;
        let mut docs: Vec<IndexedDocument> = snapshot
            .iter()
            .map(|(id, meta)| IndexedDocument {
                id: id.clone(),
                meta: meta.clone(),
            })
            .collect();
        docs.sort_by(|a, b| {
            a.meta
                .ingested_at
                .cmp(&b.meta.ingested_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(docs)
    }

    /// Adds a new document. Ids are never reused or overwritten.
    ///
    /// Merges into the index as it is on disk, not as this handle last saw
    /// it. The new entry is visible to readers only after it is durable.
    pub fn insert(&self, id: &str, meta: DocumentMeta) -> Result<()> {
        let _guard = self
            .writer
            .lock()
            .map_err(|_| anyhow!("document index writer lock poisoned"))?;

        let (mut next, _) = read_index(&self.path)?;
        if next.contains_key(id) {
            bail!("document id already indexed: {}", id);
        }
        next.insert(id.to_string(), meta);
        write_atomic(&self.path, &next)?;

        let stamp = file_stamp(&self.path)?;
        self.replace(next, stamp)?;
        Ok(())
    }
}

fn file_stamp(path: &Path) -> Result<Option<FileStamp>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some((meta.modified()?, meta.len()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to stat index: {}", path.display())),
    }
}

/// Reads the index file. A missing or blank file is an empty index.
///
/// The stamp is taken before the read, so a write racing with it leaves a
/// stale stamp and the next access reloads.
fn read_index(path: &Path) -> Result<(Entries, Option<FileStamp>)> {
    let stamp = file_stamp(path)?;
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Entries::new(), None)),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read index: {}", path.display()))
        }
    };
    if content.trim().is_empty() {
        return Ok((Entries::new(), stamp));
    }
    let entries = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse index: {}", path.display()))?;
    Ok((entries, stamp))
}

/// Writes `entries` to a sibling temp file, syncs it, and renames it over `path`.
fn write_atomic(path: &Path, entries: &Entries) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(entries)?;
    {
        let mut file = std::fs::File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(&body)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace index: {}", path.display()))?;
    Ok(())
}
