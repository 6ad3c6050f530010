//! Persisted authentication token
//!
//! VTube Studio issues a token once, after the user approves the plugin.
//! It is kept as plain text in a single file so later runs can skip the
//! approval popup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to read token file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write token file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Opaque authentication token issued by VTube Studio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Wrap a raw token, rejecting blank values
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// File-backed token store with an in-process cache
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    cached: Option<Token>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored token
    ///
    /// A missing or blank file means no token. Once a token has been saved
    /// or loaded, the cached value is returned without touching the disk.
    pub fn load(&mut self) -> Result<Option<Token>, CredentialError> {
        if let Some(token) = &self.cached {
            return Ok(Some(token.clone()));
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CredentialError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        self.cached = Token::new(content);
        if self.cached.is_some() {
            tracing::info!("Loaded token from {}", self.path.display());
        }
        Ok(self.cached.clone())
    }

    /// Overwrite the token file and update the cache
    pub fn save(&mut self, token: &Token) -> Result<(), CredentialError> {
        let write_err = |source| CredentialError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(&self.path, token.as_str()).map_err(write_err)?;

        self.cached = Some(token.clone());
        tracing::info!("Saved token to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vtube_token.txt");

        let mut store = CredentialStore::new(&path);
        let token = Token::new("abc123").unwrap();
        store.save(&token).unwrap();
        assert_eq!(store.load().unwrap(), Some(token.clone()));

        // A fresh store reads it back from disk
        let mut reopened = CredentialStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(token));
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CredentialStore::new(dir.path().join("nope.txt"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_blank_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vtube_token.txt");
        std::fs::write(&path, "  \n").unwrap();

        let mut store = CredentialStore::new(&path);
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_load_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vtube_token.txt");
        std::fs::write(&path, "  abc123\n").unwrap();

        let mut store = CredentialStore::new(&path);
        assert_eq!(store.load().unwrap().unwrap().as_str(), "abc123");
    }

    #[test]
    fn test_save_overwrites_cache_without_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vtube_token.txt");
        std::fs::write(&path, "old").unwrap();

        let mut store = CredentialStore::new(&path);
        assert_eq!(store.load().unwrap().unwrap().as_str(), "old");

        store.save(&Token::new("new").unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(store.load().unwrap().unwrap().as_str(), "new");
    }

    #[test]
    fn test_save_error_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        // Parent is a regular file, so the directory cannot be created
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let mut store = CredentialStore::new(blocker.join("vtube_token.txt"));
        let result = store.save(&Token::new("abc123").unwrap());
        assert!(matches!(result, Err(CredentialError::Write { .. })));
    }

    #[test]
    fn test_blank_token_rejected() {
        assert!(Token::new("   ").is_none());
        assert_eq!(Token::new(" t ").unwrap().as_str(), "t");
    }
}
