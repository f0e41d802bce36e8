//! Username directory.
//!
//! The directory is the external collaborator that guarantees username
//! uniqueness. The server only consumes the trait; the built-in backend
//! is a process-local set selected by the `memory://` store URL. Durable
//! backends plug in behind the same trait.

use anyhow::bail;
use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The name was free and is now taken.
    Registered,
    /// The name is already taken.
    AlreadyExists,
}

/// Directory errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The backing store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Registers usernames, guaranteeing no two concurrent registrations of
/// the same name both succeed. Safe to retry on [`DirectoryError`].
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Register a username.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Unavailable`] if the store cannot be
    /// reached; the name's status is then unknown and the caller may retry.
    async fn register(&self, username: &str) -> Result<RegisterOutcome, DirectoryError>;
}

/// Process-local, in-memory username directory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    names: DashSet<String>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn register(&self, username: &str) -> Result<RegisterOutcome, DirectoryError> {
        // DashSet::insert is atomic, so exactly one concurrent caller wins
        if self.names.insert(username.to_string()) {
            debug!(username, "Username registered");
            Ok(RegisterOutcome::Registered)
        } else {
            Ok(RegisterOutcome::AlreadyExists)
        }
    }
}

/// Open the directory selected by a store URL.
///
/// # Errors
///
/// Returns an error for URL schemes with no built-in backend.
pub fn open_directory(url: &str) -> anyhow::Result<Arc<dyn UserDirectory>> {
    match url.split_once("://").map(|(scheme, _)| scheme) {
        Some("memory") => Ok(Arc::new(MemoryDirectory::new())),
        _ => bail!("unsupported store URL: {url}"),
    }
}
