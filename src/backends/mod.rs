// In-process collaborator implementations
// Settings stores and a local channel that the integration can run against
// when the host application does not supply its own

pub mod file_store;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

pub use file_store::JsonFileStore;
pub use memory::{MemoryChannel, MemoryStore};

use crate::components::PushResult;
use crate::components::settings::KeyValueStore;

/// Where push settings are persisted
#[derive(Debug, Clone, Default)]
pub enum StoreBackend {
    /// Lost when the process exits
    #[default]
    Memory,
    /// JSON document at the given path
    File(PathBuf),
}

/// Factory for settings stores
pub struct StoreBackendFactory;

impl StoreBackendFactory {
    pub fn create_store(backend: &StoreBackend) -> PushResult<Arc<dyn KeyValueStore>> {
        match backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreBackend::File(path) => Ok(Arc::new(JsonFileStore::open(path.clone())?)),
        }
    }
}
