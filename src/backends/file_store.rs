// JSON document settings store with atomic replace on every write

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::components::settings::KeyValueStore;
use crate::components::{PushError, PushResult};

/// Settings persisted as a single JSON object on disk
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> PushResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&raw)? {
                    Value::Object(map) => map,
                    _ => {
                        return Err(PushError::Storage {
                            key: path.display().to_string(),
                            message: "settings file is not a JSON object".to_string(),
                        });
                    },
                }
            }
        } else {
            Map::new()
        };

        tracing::debug!(path = %path.display(), entries = values.len(), "Opened settings store");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &Map<String, Value>) -> PushResult<()> {
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, values)?;
        file.flush()?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| PushError::Io(e.error))?;
        Ok(())
    }

    fn storage_error(key: &str, error: PushError) -> PushError {
        PushError::Storage {
            key: key.to_string(),
            message: error.to_string(),
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    // Writes go to a copy; memory only changes once the file is replaced
    fn set(&self, key: &str, value: Value) -> PushResult<()> {
        let mut values = self.values.lock();
        let mut next = values.clone();
        next.insert(key.to_string(), value);
        self.flush(&next)
            .map_err(|e| Self::storage_error(key, e))?;
        *values = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> PushResult<()> {
        let mut values = self.values.lock();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.flush(&next)
            .map_err(|e| Self::storage_error(key, e))?;
        *values = next;
        Ok(())
    }
}
