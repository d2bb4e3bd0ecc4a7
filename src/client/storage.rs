use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::util::lock::{rw_read, rw_write};

use super::api::ClientError;

/// Fixed name the current session id is persisted under.
pub const SESSION_ID_KEY: &str = "currentSessionId";

/// Durable slot for the active session id, surviving restarts.
pub trait SessionIdStorage: Send + Sync {
    fn load(&self) -> Result<Option<String>, ClientError>;
    fn store(&self, session_id: Option<&str>) -> Result<(), ClientError>;
}

/// Stores the id as a single file named [`SESSION_ID_KEY`] inside `dir`.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_ID_KEY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionIdStorage for FileSessionStorage {
    fn load(&self) -> Result<Option<String>, ClientError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn store(&self, session_id: Option<&str>) -> Result<(), ClientError> {
        match session_id {
            Some(id) => {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&self.path, id)?;
            }
            None => match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            },
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    slot: RwLock<Option<String>>,
}

impl SessionIdStorage for MemorySessionStorage {
    fn load(&self) -> Result<Option<String>, ClientError> {
        Ok(rw_read(&self.slot, "client::storage", "load").clone())
    }

    fn store(&self, session_id: Option<&str>) -> Result<(), ClientError> {
        *rw_write(&self.slot, "client::storage", "store") = session_id.map(str::to_owned);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_round_trips_and_clears() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileSessionStorage::new(dir.path());
        assert_eq!(storage.load().unwrap(), None);

        storage.store(Some("session-42")).unwrap();
        assert_eq!(storage.path(), dir.path().join("currentSessionId"));
        assert_eq!(storage.load().unwrap().as_deref(), Some("session-42"));

        let reopened = FileSessionStorage::new(dir.path());
        assert_eq!(reopened.load().unwrap().as_deref(), Some("session-42"));

        storage.store(None).unwrap();
        assert_eq!(storage.load().unwrap(), None);
        storage.store(None).unwrap();
    }

    #[test]
    fn blank_file_reads_as_no_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(SESSION_ID_KEY), "  \n").unwrap();
        assert_eq!(FileSessionStorage::new(dir.path()).load().unwrap(), None);
    }
}
