use crate::error::ProcError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// On-disk shape of one monthly archive: a self-describing column store
/// with a single growable time axis (epoch seconds), per-record columns
/// aligned to it, and non-time-indexed deployment scalars.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArchiveDocument {
    pub header: BTreeMap<String, String>,
    pub scalars: BTreeMap<String, f64>,
    pub time: Vec<i64>,
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl ArchiveDocument {
    pub fn record_count(&self) -> usize {
        self.time.len()
    }

    fn check_aligned(&self) -> Result<(), String> {
        for (name, column) in &self.columns {
            if column.len() != self.time.len() {
                return Err(format!(
                    "column `{name}` has {} values for {} time steps",
                    column.len(),
                    self.time.len()
                ));
            }
        }
        Ok(())
    }
}

/// The three operations the merge engine needs from an archive container.
///
/// Implementations must write atomically: a crashed run may lose the
/// in-flight update but must never leave a torn archive behind.
pub trait ArchiveStore {
    /// Fails if `path` already exists; callers delete first when a rebuild
    /// is intended.
    fn create(&self, path: &Path, doc: &ArchiveDocument) -> Result<(), ProcError>;

    /// Merge `header_patch` by key and append along the time axis. Every
    /// appended column must already exist in the archive.
    fn append(
        &self,
        path: &Path,
        header_patch: &BTreeMap<String, String>,
        time: &[i64],
        columns: &BTreeMap<String, Vec<f64>>,
    ) -> Result<(), ProcError>;

    fn read_time_axis(&self, path: &Path) -> Result<Vec<i64>, ProcError>;
}

/// JSON-file archive store; one document per (platform, package, month).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArchiveStore;

fn io_err(path: &Path, reason: impl Into<String>) -> ProcError {
    ProcError::ArchiveIo {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn load_document(path: &Path) -> Result<ArchiveDocument, ProcError> {
    let raw = fs::read_to_string(path).map_err(|err| io_err(path, err.to_string()))?;
    serde_json::from_str(&raw).map_err(|err| io_err(path, format!("malformed archive: {err}")))
}

/// Serialize then rename into place so a crash mid-write cannot corrupt an
/// existing archive.
fn persist_document(path: &Path, doc: &ArchiveDocument) -> Result<(), ProcError> {
    let parent = path
        .parent()
        .ok_or_else(|| io_err(path, "archive path has no parent directory"))?;
    fs::create_dir_all(parent).map_err(|err| io_err(path, err.to_string()))?;

    let data =
        serde_json::to_string(doc).map_err(|err| io_err(path, err.to_string()))?;
    let tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|err| io_err(path, err.to_string()))?;
    fs::write(tmp.path(), format!("{data}\n")).map_err(|err| io_err(path, err.to_string()))?;
    tmp.persist(path)
        .map_err(|err| io_err(path, err.to_string()))?;
    Ok(())
}

impl ArchiveStore for JsonArchiveStore {
    fn create(&self, path: &Path, doc: &ArchiveDocument) -> Result<(), ProcError> {
        if path.exists() {
            return Err(io_err(path, "archive already exists"));
        }
        doc.check_aligned().map_err(|reason| io_err(path, reason))?;
        persist_document(path, doc)
    }

    fn append(
        &self,
        path: &Path,
        header_patch: &BTreeMap<String, String>,
        time: &[i64],
        columns: &BTreeMap<String, Vec<f64>>,
    ) -> Result<(), ProcError> {
        let mut doc = load_document(path)?;

        for (name, column) in columns {
            if column.len() != time.len() {
                return Err(io_err(
                    path,
                    format!(
                        "append column `{name}` has {} values for {} time steps",
                        column.len(),
                        time.len()
                    ),
                ));
            }
            if !doc.columns.contains_key(name) {
                return Err(io_err(path, format!("unknown archive column `{name}`")));
            }
        }

        for (key, value) in header_patch {
            doc.header.insert(key.clone(), value.clone());
        }
        doc.time.extend_from_slice(time);
        for (name, column) in columns {
            if let Some(existing) = doc.columns.get_mut(name) {
                existing.extend_from_slice(column);
            }
        }
        doc.check_aligned().map_err(|reason| io_err(path, reason))?;

        persist_document(path, &doc)
    }

    fn read_time_axis(&self, path: &Path) -> Result<Vec<i64>, ProcError> {
        Ok(load_document(path)?.time)
    }
}

/// Read the whole document; downstream consumers (latest-value exports,
/// relays) and the tests use this rather than the mutation contract.
pub fn read_document(path: &Path) -> Result<ArchiveDocument, ProcError> {
    load_document(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_doc() -> ArchiveDocument {
        let mut doc = ArchiveDocument::default();
        doc.header.insert("start_date".into(), "2011-11-12 16:04:44".into());
        doc.header.insert("end_date".into(), "2011-11-12 16:16:44".into());
        doc.scalars.insert("lat".into(), 35.7885);
        doc.time = vec![1321113884, 1321114244, 1321114604];
        doc.columns.insert("wtemp".into(), vec![17.41, 17.42, 17.44]);
        doc
    }

    #[test]
    fn create_then_read_round_trips() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("b1_ctd1_2011_11.json");
        let store = JsonArchiveStore;
        store.create(&path, &sample_doc()).expect("create");

        let time = store.read_time_axis(&path).expect("time axis");
        assert_eq!(time.len(), 3);
        let doc = read_document(&path).expect("read");
        assert_eq!(doc.columns["wtemp"].len(), 3);
        assert_eq!(doc.header["start_date"], "2011-11-12 16:04:44");
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("b1_ctd1_2011_11.json");
        let store = JsonArchiveStore;
        store.create(&path, &sample_doc()).expect("create");
        assert!(store.create(&path, &sample_doc()).is_err());
    }

    #[test]
    fn append_extends_columns_and_patches_header() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("b1_ctd1_2011_11.json");
        let store = JsonArchiveStore;
        store.create(&path, &sample_doc()).expect("create");

        let mut patch = BTreeMap::new();
        patch.insert("end_date".to_string(), "2011-11-12 16:22:44".to_string());
        let mut columns = BTreeMap::new();
        columns.insert("wtemp".to_string(), vec![17.44]);
        store
            .append(&path, &patch, &[1321114964], &columns)
            .expect("append");

        let doc = read_document(&path).expect("read");
        assert_eq!(doc.time.len(), 4);
        assert_eq!(doc.columns["wtemp"].len(), 4);
        assert_eq!(doc.header["end_date"], "2011-11-12 16:22:44");
        // untouched keys survive a patch
        assert_eq!(doc.header["start_date"], "2011-11-12 16:04:44");
    }

    #[test]
    fn append_rejects_unknown_or_ragged_columns() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("b1_ctd1_2011_11.json");
        let store = JsonArchiveStore;
        store.create(&path, &sample_doc()).expect("create");

        let patch = BTreeMap::new();
        let mut unknown = BTreeMap::new();
        unknown.insert("salin".to_string(), vec![35.0]);
        assert!(store.append(&path, &patch, &[1321114964], &unknown).is_err());

        let mut ragged = BTreeMap::new();
        ragged.insert("wtemp".to_string(), vec![17.0, 18.0]);
        assert!(store.append(&path, &patch, &[1321114964], &ragged).is_err());
    }

    #[test]
    fn malformed_archive_is_an_archive_io_error() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("b1_ctd1_2011_11.json");
        std::fs::write(&path, "not json").expect("write");
        let store = JsonArchiveStore;
        let err = store.read_time_axis(&path).unwrap_err();
        assert_eq!(err.code(), "ARCHIVE_IO");
    }
}
