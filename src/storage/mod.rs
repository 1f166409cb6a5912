//! Where the session token lives between requests (and, optionally, restarts)

use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Storage for the session token
///
/// Implementations are synchronous; a token is a short string and every
/// request reads it.
pub trait TokenStore: Send + Sync {
    /// The stored token, if any
    fn load(&self) -> Option<String>;

    /// Replace the stored token
    fn store(&self, token: &str);

    /// Forget the stored token
    fn clear(&self);
}

/// Keeps the token in memory only
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.guard().clone()
    }

    fn store(&self, token: &str) {
        *self.guard() = Some(token.to_string());
    }

    fn clear(&self) {
        *self.guard() = None;
    }
}

/// Persists the token in a file, keeping an in-memory copy
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cached: MemoryTokenStore,
}

impl FileTokenStore {
    /// Opens the store, reading any token already on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = MemoryTokenStore::new();
        match std::fs::read_to_string(&path) {
            Ok(token) if !token.trim().is_empty() => cached.store(token.trim()),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not read token file {}: {}", path.display(), e),
        }
        Self { path, cached }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        self.cached.load()
    }

    fn store(&self, token: &str) {
        self.cached.store(token);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Could not create {}: {}", parent.display(), e);
                return;
            }
        }
        match std::fs::write(&self.path, token) {
            Ok(()) => debug!("Token written to {}", self.path.display()),
            Err(e) => warn!("Could not write token file {}: {}", self.path.display(), e),
        }
    }

    fn clear(&self) {
        self.cached.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Token file {} removed", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove token file {}: {}", self.path.display(), e),
        }
    }
}
