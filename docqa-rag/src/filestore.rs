//! Persistent vector store backed by a single directory.
//!
//! Layout:
//!
//! - `manifest.json`: format version, vector dimensionality and embedding
//!   model of the stored entries. Always replaced atomically (temp file +
//!   rename).
//! - `entries.jsonl`: one JSON record per line, appended and fsynced per
//!   [`add`](VectorStore::add) call.
//!
//! A crash in the middle of an append can leave a final line without its
//! terminating newline. Such a torn tail is dropped (and truncated away) when
//! the store is opened, so a partially written entry is never observable. A
//! complete line that does not parse is real corruption: [`FileVectorStore::open`]
//! fails with [`RagError::IndexCorrupt`] and [`FileVectorStore::repair`] is the
//! way back.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::document::{Chunk, IndexEntry, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, check_dimensions, rank};

const MANIFEST_FILE: &str = "manifest.json";
const ENTRIES_FILE: &str = "entries.jsonl";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Manifest {
    format_version: u32,
    #[serde(default)]
    dimensions: Option<usize>,
    #[serde(default)]
    embedding_model: Option<String>,
    created_at: DateTime<Utc>,
}

impl Manifest {
    fn empty() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            dimensions: None,
            embedding_model: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
struct EntryRecordRef<'a> {
    seq: u64,
    ingested_at: DateTime<Utc>,
    chunk: &'a Chunk,
    embedding: &'a [f32],
}

#[derive(Deserialize)]
struct EntryRecord {
    seq: u64,
    #[allow(dead_code)]
    ingested_at: DateTime<Utc>,
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// Outcome of [`FileVectorStore::repair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    /// Entries kept in the rewritten log.
    pub kept: usize,
    /// Lines dropped because they did not parse or had the wrong dimensionality.
    pub dropped: usize,
}

#[derive(Debug)]
struct State {
    manifest: Manifest,
    entries: Vec<IndexEntry>,
    next_seq: u64,
    log_len: u64,
}

/// A [`VectorStore`] persisted to a directory, ranking by cosine similarity.
///
/// All entries are kept in memory for search; the directory is the source of
/// truth across restarts.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{FileVectorStore, VectorStore};
///
/// let store = FileVectorStore::open_with_model("./vector_index", "all-minilm").await?;
/// store.add(&entries).await?;
/// ```
#[derive(Debug)]
pub struct FileVectorStore {
    dir: PathBuf,
    model_id: Option<String>,
    state: RwLock<State>,
}

impl FileVectorStore {
    /// Open (or create) the store in `dir` without binding it to an embedding model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexCorrupt`] if the manifest or a complete entry
    /// line cannot be parsed, and [`RagError::Io`] on filesystem failures.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let state = load_state(&dir).await?;
        info!(
            path = %dir.display(),
            entries = state.entries.len(),
            dimensions = ?state.manifest.dimensions,
            "opened vector index"
        );
        Ok(Self { dir, model_id: None, state: RwLock::new(state) })
    }

    /// Open (or create) the store in `dir` for vectors produced by `model_id`.
    ///
    /// # Errors
    ///
    /// In addition to the errors of [`open`](Self::open), returns
    /// [`RagError::ModelMismatch`] if the stored entries were produced by a
    /// different model.
    pub async fn open_with_model(dir: impl Into<PathBuf>, model_id: impl Into<String>) -> Result<Self> {
        let mut store = Self::open(dir).await?;
        let model_id = model_id.into();
        {
            let state = store.state.get_mut();
            if let Some(stored) = &state.manifest.embedding_model {
                if *stored != model_id {
                    return Err(RagError::ModelMismatch {
                        expected: stored.clone(),
                        actual: model_id,
                    });
                }
            }
        }
        store.model_id = Some(model_id);
        Ok(store)
    }

    /// The directory holding the index.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// The embedding model recorded for the stored entries, if any.
    pub async fn embedding_model(&self) -> Option<String> {
        self.state.read().await.manifest.embedding_model.clone()
    }

    /// Rewrite the index in `dir` keeping only entries that parse and agree on
    /// dimensionality with the first valid entry.
    ///
    /// A torn tail is dropped as well. A missing or unreadable manifest is
    /// replaced. The rewritten log is swapped in atomically, so an interrupted
    /// repair leaves the previous log untouched. Open the store again afterwards.
    pub async fn repair(dir: impl AsRef<Path>) -> Result<RepairReport> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;

        let mut manifest = match read_manifest(dir).await {
            Ok(Some(manifest)) => manifest,
            Ok(None) => Manifest::empty(),
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "replacing unreadable manifest");
                Manifest::empty()
            }
        };

        let raw = read_log(dir).await?;
        let mut buffer = Vec::new();
        let mut dimensions = None;
        let mut kept = 0;
        let mut dropped = 0;

        for line in raw.split_inclusive(|b| *b == b'\n') {
            let Some(body) = line.strip_suffix(b"\n") else {
                dropped += 1;
                continue;
            };
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let record = match serde_json::from_slice::<EntryRecord>(body) {
                Ok(record) => record,
                Err(_) => {
                    dropped += 1;
                    continue;
                }
            };
            let dims = *dimensions.get_or_insert(record.embedding.len());
            if record.embedding.len() != dims {
                dropped += 1;
                continue;
            }
            buffer.extend_from_slice(body);
            buffer.push(b'\n');
            kept += 1;
        }

        manifest.format_version = FORMAT_VERSION;
        manifest.dimensions = dimensions;
        if kept == 0 {
            manifest.embedding_model = None;
        }

        write_atomic(&dir.join(ENTRIES_FILE), &buffer).await?;
        write_manifest(dir, &manifest).await?;

        info!(path = %dir.display(), kept, dropped, "repaired vector index");
        Ok(RepairReport { kept, dropped })
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn add(&self, entries: &[IndexEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let dimensions = check_dimensions(state.manifest.dimensions, entries)?;

        let ingested_at = Utc::now();
        let mut buffer = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            let record = EntryRecordRef {
                seq: state.next_seq + i as u64,
                ingested_at,
                chunk: &entry.chunk,
                embedding: &entry.embedding,
            };
            serde_json::to_writer(&mut buffer, &record).map_err(std::io::Error::other)?;
            buffer.push(b'\n');
        }

        let mut manifest = state.manifest.clone();
        manifest.dimensions = dimensions;
        if manifest.embedding_model.is_none() {
            manifest.embedding_model = self.model_id.clone();
        }
        if manifest != state.manifest {
            write_manifest(&self.dir, &manifest).await?;
            state.manifest = manifest;
        }

        let path = self.dir.join(ENTRIES_FILE);
        if let Err(e) = append(&path, &buffer).await {
            warn!(path = %path.display(), error = %e, "append failed, rolling back log");
            rollback(&path, state.log_len).await;
            return Err(e.into());
        }

        state.log_len += buffer.len() as u64;
        state.next_seq += entries.len() as u64;
        state.entries.extend_from_slice(entries);
        debug!(added = entries.len(), total = state.entries.len(), "appended index entries");
        Ok(())
    }

    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let state = self.state.read().await;
        rank(state.entries.iter(), state.manifest.dimensions, embedding, k)
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;

        // Entries go first: a crash before the manifest rewrite still leaves an empty index.
        match fs::remove_file(self.dir.join(ENTRIES_FILE)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        state.entries.clear();
        state.next_seq = 0;
        state.log_len = 0;

        fs::create_dir_all(&self.dir).await?;
        let manifest = Manifest::empty();
        write_manifest(&self.dir, &manifest).await?;
        state.manifest = manifest;
        info!(path = %self.dir.display(), "cleared vector index");
        Ok(())
    }

    async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    async fn dimensions(&self) -> Option<usize> {
        self.state.read().await.manifest.dimensions
    }
}

async fn load_state(dir: &Path) -> Result<State> {
    fs::create_dir_all(dir).await?;

    let manifest = read_manifest(dir).await?;
    let log_path = dir.join(ENTRIES_FILE);
    let raw = read_log(dir).await?;

    let mut manifest = match manifest {
        Some(manifest) => manifest,
        None if raw.iter().all(u8::is_ascii_whitespace) => {
            let manifest = Manifest::empty();
            write_manifest(dir, &manifest).await?;
            manifest
        }
        None => {
            return Err(RagError::IndexCorrupt {
                path: dir.join(MANIFEST_FILE),
                line: None,
                message: "manifest missing but entries present".to_string(),
            });
        }
    };

    let mut entries = Vec::new();
    let mut next_seq = 0;
    let mut log_len = 0u64;
    let mut dimensions = None;

    for (i, line) in raw.split_inclusive(|b| *b == b'\n').enumerate() {
        let Some(body) = line.strip_suffix(b"\n") else {
            warn!(
                path = %log_path.display(),
                line = i + 1,
                bytes = line.len(),
                "dropping torn trailing entry"
            );
            break;
        };
        log_len += line.len() as u64;
        if body.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let record: EntryRecord =
            serde_json::from_slice(body).map_err(|e| RagError::IndexCorrupt {
                path: log_path.clone(),
                line: Some(i + 1),
                message: e.to_string(),
            })?;

        let dims = *dimensions.get_or_insert(record.embedding.len());
        if record.embedding.len() != dims {
            return Err(RagError::IndexCorrupt {
                path: log_path.clone(),
                line: Some(i + 1),
                message: format!(
                    "embedding has {} dimensions, earlier entries have {dims}",
                    record.embedding.len()
                ),
            });
        }

        next_seq = next_seq.max(record.seq + 1);
        entries.push(IndexEntry { chunk: record.chunk, embedding: record.embedding });
    }

    if (log_len as usize) < raw.len() {
        rollback(&log_path, log_len).await;
    }

    if entries.is_empty() {
        // An empty index accepts vectors from any model.
        manifest.dimensions = None;
        manifest.embedding_model = None;
    } else if manifest.dimensions.is_some_and(|d| Some(d) != dimensions) {
        return Err(RagError::IndexCorrupt {
            path: dir.join(MANIFEST_FILE),
            line: None,
            message: format!(
                "manifest records {:?} dimensions, entries have {:?}",
                manifest.dimensions, dimensions
            ),
        });
    } else {
        manifest.dimensions = dimensions;
    }

    Ok(State { manifest, entries, next_seq, log_len })
}

async fn read_manifest(dir: &Path) -> Result<Option<Manifest>> {
    let path = dir.join(MANIFEST_FILE);
    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| RagError::IndexCorrupt {
        path: path.clone(),
        line: None,
        message: e.to_string(),
    })?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(RagError::IndexCorrupt {
            path,
            line: None,
            message: format!("unsupported format version {}", manifest.format_version),
        });
    }
    Ok(Some(manifest))
}

async fn read_log(dir: &Path) -> Result<Vec<u8>> {
    match fs::read(dir.join(ENTRIES_FILE)).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(manifest).map_err(std::io::Error::other)?;
    write_atomic(&dir.join(MANIFEST_FILE), &bytes).await
}

/// Write `bytes` to a sibling temp file, fsync it, then rename it over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn append(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(bytes).await?;
    file.sync_data().await
}

/// Truncate the log back to `len` bytes, logging rather than failing.
async fn rollback(path: &Path, len: u64) {
    let result = async {
        let file = fs::OpenOptions::new().write(true).open(path).await?;
        file.set_len(len).await?;
        file.sync_data().await
    }
    .await;
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to truncate entry log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                id: format!("{text}#0"),
                source: "t.txt".into(),
                text: text.into(),
                chunk_index: 0,
                page: None,
                offset: 0,
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn creates_manifest_in_fresh_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("index");
        let store = FileVectorStore::open(&dir).await.unwrap();
        assert!(store.is_empty().await);
        assert!(dir.join(MANIFEST_FILE).exists());
        assert_eq!(store.dimensions().await, None);
    }

    #[tokio::test]
    async fn manifest_records_model_on_first_add() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open_with_model(temp.path(), "model-a").await.unwrap();
        store.add(&[entry("a", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(store.embedding_model().await.as_deref(), Some("model-a"));
        drop(store);

        let err = FileVectorStore::open_with_model(temp.path(), "model-b").await.unwrap_err();
        assert!(matches!(err, RagError::ModelMismatch { .. }));
    }

    #[tokio::test]
    async fn torn_tail_is_dropped_and_truncated() {
        let temp = tempfile::tempdir().unwrap();
        {
            let store = FileVectorStore::open(temp.path()).await.unwrap();
            store.add(&[entry("a", vec![1.0, 0.0])]).await.unwrap();
        }
        let log = temp.path().join(ENTRIES_FILE);
        let intact = std::fs::read(&log).unwrap();
        let mut torn = intact.clone();
        torn.extend_from_slice(br#"{"seq":1,"ingested_at":"2024-01-01T00:00:00Z","chu"#);
        std::fs::write(&log, &torn).unwrap();

        let store = FileVectorStore::open(temp.path()).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(std::fs::read(&log).unwrap(), intact);
    }

    #[tokio::test]
    async fn manifest_without_entries_does_not_pin_dimensions() {
        let temp = tempfile::tempdir().unwrap();
        let manifest = Manifest {
            dimensions: Some(3),
            embedding_model: Some("old".into()),
            ..Manifest::empty()
        };
        write_manifest(temp.path(), &manifest).await.unwrap();

        let store = FileVectorStore::open_with_model(temp.path(), "new").await.unwrap();
        store.add(&[entry("a", vec![1.0; 5])]).await.unwrap();
        assert_eq!(store.dimensions().await, Some(5));
        assert_eq!(store.embedding_model().await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn missing_manifest_with_entries_is_corrupt() {
        let temp = tempfile::tempdir().unwrap();
        {
            let store = FileVectorStore::open(temp.path()).await.unwrap();
            store.add(&[entry("a", vec![1.0, 0.0])]).await.unwrap();
        }
        std::fs::remove_file(temp.path().join(MANIFEST_FILE)).unwrap();
        let err = FileVectorStore::open(temp.path()).await.unwrap_err();
        assert!(matches!(err, RagError::IndexCorrupt { line: None, .. }));

        let report = FileVectorStore::repair(temp.path()).await.unwrap();
        assert_eq!(report, RepairReport { kept: 1, dropped: 0 });
        let store = FileVectorStore::open(temp.path()).await.unwrap();
        assert_eq!(store.dimensions().await, Some(2));
    }

    #[tokio::test]
    async fn unsupported_format_version_is_corrupt() {
        let temp = tempfile::tempdir().unwrap();
        let manifest = Manifest { format_version: 99, ..Manifest::empty() };
        write_manifest(temp.path(), &manifest).await.unwrap();
        let err = FileVectorStore::open(temp.path()).await.unwrap_err();
        assert!(err.is_index_integrity());
    }
}
