//! Persisted admin credential.
//!
//! The credential survives console restarts but is logically owned by the
//! controller: read by every admin call, written only on explicit operator
//! edit. It is injected as a trait object so tests can substitute an
//! in-memory fake.

use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;

/// Load/store access to the admin credential.
pub trait AdminKeyStore: Send + Sync {
    /// Current credential, if one has been saved. Empty values read as `None`.
    fn load(&self) -> Option<String>;

    /// Persists a new credential. An empty value clears it.
    fn store(&self, key: &str) -> io::Result<()>;
}

/// Credential kept in a plain file next to the console's working directory.
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AdminKeyStore for FileKeyStore {
    fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let key = raw.trim();
                if key.is_empty() { None } else { Some(key.to_string()) }
            }
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "no stored admin key");
                None
            }
        }
    }

    fn store(&self, key: &str) -> io::Result<()> {
        if key.trim().is_empty() {
            match std::fs::remove_file(&self.path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
                _ => return Ok(()),
            }
        }
        std::fs::write(&self.path, key.trim())
    }
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct MemoryKeyStore {
    key: Mutex<Option<String>>,
}

impl MemoryKeyStore {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Mutex::new(Some(key.into())),
        }
    }
}

impl AdminKeyStore for MemoryKeyStore {
    fn load(&self) -> Option<String> {
        self.key.lock().expect("key store poisoned").clone()
    }

    fn store(&self, key: &str) -> io::Result<()> {
        let value = key.trim();
        *self.key.lock().expect("key store poisoned") = if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        };
        Ok(())
    }
}
