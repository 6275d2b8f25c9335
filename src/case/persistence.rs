use std::{
    fs,
    io::{BufWriter, Write},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

use crate::case::{error::StoreError, memory::CaseStoreSnapshot};

const PERSISTENCE_VERSION: u64 = 1;

/// Atomic JSON snapshot file for the case store (write temp, fsync, rename).
#[derive(Debug, Clone)]
pub struct CaseStorePersistence {
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedCaseStore {
    version: u64,
    snapshot: CaseStoreSnapshot,
}

fn persistence_error(message: String) -> StoreError {
    StoreError::Persistence(message)
}

impl CaseStorePersistence {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn load(&self) -> Result<Option<CaseStoreSnapshot>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(persistence_error(format!(
                    "failed to read case store '{}': {err}",
                    self.path.display()
                )));
            }
        };

        let parsed: PersistedCaseStore = serde_json::from_str(&content).map_err(|err| {
            persistence_error(format!(
                "failed to parse case store '{}': {err}",
                self.path.display()
            ))
        })?;
        if parsed.version != PERSISTENCE_VERSION {
            return Err(persistence_error(format!(
                "unsupported case store version {} at '{}'",
                parsed.version,
                self.path.display()
            )));
        }

        Ok(Some(parsed.snapshot))
    }

    pub fn save(&self, snapshot: &CaseStoreSnapshot) -> Result<(), StoreError> {
        let parent = self.path.parent().ok_or_else(|| {
            persistence_error(format!(
                "case store path '{}' has no parent",
                self.path.display()
            ))
        })?;
        fs::create_dir_all(parent).map_err(|err| {
            persistence_error(format!(
                "failed to create case store directory '{}': {err}",
                parent.display()
            ))
        })?;

        let persisted = PersistedCaseStore {
            version: PERSISTENCE_VERSION,
            snapshot: snapshot.clone(),
        };

        let tmp_path = self.path.with_extension("tmp");
        let file = fs::File::create(&tmp_path).map_err(|err| {
            persistence_error(format!(
                "failed to create case store temp file '{}': {err}",
                tmp_path.display()
            ))
        })?;
        {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &persisted).map_err(|err| {
                persistence_error(format!(
                    "failed to serialize case store '{}': {err}",
                    tmp_path.display()
                ))
            })?;
            writer.write_all(b"\n").map_err(|err| {
                persistence_error(format!(
                    "failed to finalize case store '{}': {err}",
                    tmp_path.display()
                ))
            })?;
            let file = writer.into_inner().map_err(|err| {
                persistence_error(format!(
                    "failed to flush case store '{}': {err}",
                    tmp_path.display()
                ))
            })?;
            file.sync_all().map_err(|err| {
                persistence_error(format!(
                    "failed to sync case store temp file '{}': {err}",
                    tmp_path.display()
                ))
            })?;
        }

        fs::rename(&tmp_path, &self.path).map_err(|err| {
            persistence_error(format!(
                "failed to replace case store '{}' from '{}': {err}",
                self.path.display(),
                tmp_path.display()
            ))
        })?;

        if let Ok(parent_file) = fs::File::open(parent) {
            let _ = parent_file.sync_all();
        }

        Ok(())
    }
}
