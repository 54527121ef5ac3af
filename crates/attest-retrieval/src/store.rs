//! SQLite storage for named vector indexes.
//!
//! A named index is a single file `{dir}/{name}.db` holding a `metadata`
//! table and an `entries` table (position, little-endian f32 BLOB, chunk
//! JSON). Saves are written to `{name}.db.tmp` in one transaction and then
//! renamed over the previous file, so readers only ever open a complete
//! artifact.

use std::path::{Path, PathBuf};

use attest_core::{check_file_stem, AttestError, Chunk};
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info};

use crate::index::{IndexEntry, VectorIndex};

/// Bumped whenever the on-disk layout changes.
pub const FORMAT_VERSION: i64 = 1;

const INDEX_EXTENSION: &str = "db";

/// Directory of named index artifacts.
///
/// # Examples
///
/// ```
/// use attest_retrieval::store::IndexStore;
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = IndexStore::new(dir.path());
/// assert!(store.load("default").unwrap().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    /// Use `dir` for index files. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::InvalidParameter`] for names that are not a
    /// plain file stem.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, AttestError> {
        check_file_stem("store name", name)?;
        Ok(self.dir.join(format!("{name}.{INDEX_EXTENSION}")))
    }

    /// Whether an artifact for `name` exists.
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Names of all saved indexes, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Io`] if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<String>, AttestError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(INDEX_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Write `index` under `name`, replacing any previous artifact atomically.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Storage`] if the database cannot be written, or
    /// [`AttestError::Io`] if the rename fails.
    pub fn save(&self, name: &str, index: &VectorIndex) -> Result<(), AttestError> {
        let final_path = self.path_for(name)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            AttestError::Storage(format!("failed to create index directory: {e}"))
        })?;

        let tmp_path = self.dir.join(format!("{name}.{INDEX_EXTENSION}.tmp"));
        if tmp_path.exists() {
            std::fs::remove_file(&tmp_path)?;
        }

        write_artifact(&tmp_path, index)?;
        std::fs::rename(&tmp_path, &final_path)?;

        info!(
            store = name,
            entries = index.len(),
            path = %final_path.display(),
            "saved vector index"
        );
        Ok(())
    }

    /// Load `name`; `Ok(None)` if no artifact exists.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Storage`] if the artifact is unreadable, has an
    /// unknown format version, or its vectors disagree with the stored
    /// dimension.
    pub fn load(&self, name: &str) -> Result<Option<VectorIndex>, AttestError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            debug!(store = name, "no saved index");
            return Ok(None);
        }

        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| AttestError::Storage(format!("failed to open index '{name}': {e}")))?;

        let version: i64 = get_metadata(&conn, "format_version")?
            .ok_or_else(|| AttestError::Storage(format!("index '{name}' has no format version")))?
            .parse()
            .map_err(|_| AttestError::Storage(format!("corrupted format version in '{name}'")))?;
        if version != FORMAT_VERSION {
            return Err(AttestError::Storage(format!(
                "index '{name}' has format version {version}, expected {FORMAT_VERSION}. \
                 Rebuild with `attest build`."
            )));
        }

        let dimension: usize = get_metadata(&conn, "dimension")?
            .ok_or_else(|| AttestError::Storage(format!("index '{name}' has no dimension")))?
            .parse()
            .map_err(|_| AttestError::Storage(format!("corrupted dimension in '{name}'")))?;

        let entries = read_entries(&conn)?;
        let index = if dimension == 0 && entries.is_empty() {
            VectorIndex::empty()
        } else {
            VectorIndex::from_entries(dimension, entries).map_err(|e| {
                AttestError::Storage(format!("index '{name}' is inconsistent: {e}"))
            })?
        };

        info!(store = name, entries = index.len(), "loaded vector index");
        Ok(Some(index))
    }
}

fn write_artifact(path: &Path, index: &VectorIndex) -> Result<(), AttestError> {
    let mut conn = Connection::open(path)
        .map_err(|e| AttestError::Storage(format!("failed to open database: {e}")))?;

    conn.execute_batch(
        "
        CREATE TABLE metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE entries (
            position INTEGER PRIMARY KEY,
            vector BLOB NOT NULL,
            chunk TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| AttestError::Storage(format!("failed to create schema: {e}")))?;

    let tx = conn
        .transaction()
        .map_err(|e| AttestError::Storage(format!("failed to begin transaction: {e}")))?;
    {
        let mut meta = tx
            .prepare("INSERT INTO metadata (key, value) VALUES (?1, ?2)")
            .map_err(|e| AttestError::Storage(format!("failed to prepare insert: {e}")))?;
        let stats = index.stats();
        for (key, value) in [
            ("format_version", FORMAT_VERSION.to_string()),
            ("dimension", stats.dimension.to_string()),
            ("built_at", chrono::Utc::now().to_rfc3339()),
        ] {
            meta.execute(params![key, value])
                .map_err(|e| AttestError::Storage(format!("failed to set metadata '{key}': {e}")))?;
        }

        let mut insert = tx
            .prepare("INSERT INTO entries (position, vector, chunk) VALUES (?1, ?2, ?3)")
            .map_err(|e| AttestError::Storage(format!("failed to prepare insert: {e}")))?;
        for (position, entry) in index.entries().iter().enumerate() {
            let chunk_json = serde_json::to_string(&entry.chunk)?;
            insert
                .execute(params![
                    position as i64,
                    floats_to_bytes(&entry.vector),
                    chunk_json
                ])
                .map_err(|e| AttestError::Storage(format!("failed to insert entry: {e}")))?;
        }
    }
    tx.commit()
        .map_err(|e| AttestError::Storage(format!("failed to commit index: {e}")))?;
    Ok(())
}

fn read_entries(conn: &Connection) -> Result<Vec<IndexEntry>, AttestError> {
    let mut stmt = conn
        .prepare("SELECT vector, chunk FROM entries ORDER BY position")
        .map_err(|e| AttestError::Storage(format!("failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map([], |row| {
            let bytes: Vec<u8> = row.get(0)?;
            let chunk: String = row.get(1)?;
            Ok((bytes, chunk))
        })
        .map_err(|e| AttestError::Storage(format!("failed to query entries: {e}")))?;

    let mut entries = Vec::new();
    for row in rows {
        let (bytes, chunk_json) =
            row.map_err(|e| AttestError::Storage(format!("failed to read row: {e}")))?;
        if bytes.len() % 4 != 0 {
            return Err(AttestError::Storage(format!(
                "vector blob of {} bytes is not a whole number of f32s",
                bytes.len()
            )));
        }
        let chunk: Chunk = serde_json::from_str(&chunk_json)?;
        entries.push(IndexEntry {
            vector: bytes_to_floats(&bytes),
            chunk,
        });
    }
    Ok(entries)
}

fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>, AttestError> {
    let result = conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        params![key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AttestError::Storage(format!(
            "failed to get metadata '{key}': {e}"
        ))),
    }
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    let mut floats = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let arr: [u8; 4] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        floats.push(f32::from_le_bytes(arr));
    }
    floats
}

#[cfg(test)]
mod tests {
    use attest_core::DocumentMetadata;

    use super::*;

    fn sample_index() -> VectorIndex {
        let meta = DocumentMetadata::new("Handbook", "HR", "3", true, "people-ops");
        let mut index = VectorIndex::empty();
        index
            .add(
                vec![vec![1.0, -2.5, 0.0], vec![0.25, 3.0, 9.0]],
                vec![
                    Chunk::new("doc", 0, "first", meta.clone()),
                    Chunk::new("doc", 1, "second", meta),
                ],
            )
            .unwrap();
        index
    }

    #[test]
    fn save_then_load_preserves_entries_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let index = sample_index();

        store.save("default", &index).unwrap();
        let loaded = store.load("default").unwrap().unwrap();

        assert_eq!(loaded.stats(), index.stats());
        assert_eq!(loaded.entries(), index.entries());
        assert!(!dir.path().join("default.db.tmp").exists());
    }

    #[test]
    fn missing_store_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("never-created"));
        assert!(store.load("default").unwrap().is_none());
        assert!(!store.exists("default"));
    }

    #[test]
    fn save_replaces_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        store.save("default", &sample_index()).unwrap();

        let meta = DocumentMetadata::new("Other", "Eng", "1", true, "cto");
        let mut smaller = VectorIndex::empty();
        smaller
            .add(vec![vec![7.0]], vec![Chunk::new("x", 0, "only", meta)])
            .unwrap();
        store.save("default", &smaller).unwrap();

        let loaded = store.load("default").unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.dimension(), Some(1));
    }

    #[test]
    fn empty_index_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        store.save("blank", &VectorIndex::empty()).unwrap();
        let loaded = store.load("blank").unwrap().unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn list_returns_saved_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        store.save("zeta", &sample_index()).unwrap();
        store.save("alpha", &sample_index()).unwrap();
        assert_eq!(store.list().unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn rejects_path_like_names() {
        let store = IndexStore::new("/tmp");
        assert!(store.path_for("../escape").is_err());
        assert!(store.path_for("a/b").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.path_for("policies-2024").is_ok());
    }

    #[test]
    fn unknown_format_version_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        store.save("default", &sample_index()).unwrap();

        let conn = Connection::open(dir.path().join("default.db")).unwrap();
        conn.execute(
            "UPDATE metadata SET value = '99' WHERE key = 'format_version'",
            [],
        )
        .unwrap();
        drop(conn);

        let err = store.load("default").unwrap_err();
        assert!(matches!(err, AttestError::Storage(_)));
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn floats_bytes_roundtrip() {
        let original = vec![1.0f32, -2.5, 0.0, 3.75];
        assert_eq!(bytes_to_floats(&floats_to_bytes(&original)), original);
    }
}
