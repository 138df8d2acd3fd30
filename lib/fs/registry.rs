//! Process-wide registry of caching sessions, keyed by URI.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::fs::caching::{CacheSettings, CachingFs};
use crate::fs::traits::AttributeProvider;

/// Errors from registry lookups and registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A session is already registered under the URI.
    #[error("filesystem already exists: {0}")]
    AlreadyExists(String),

    /// No open session is registered under the URI.
    #[error("filesystem not found: {0}")]
    NotFound(String),

    /// The URI does not use the `cache` scheme.
    #[error("not a cache URI: {0}")]
    InvalidScheme(String),
}

impl From<RegistryError> for i32 {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::AlreadyExists(_) => libc::EEXIST,
            RegistryError::NotFound(_) => libc::ENOENT,
            RegistryError::InvalidScheme(_) => libc::EINVAL,
        }
    }
}

/// Open caching sessions over one kind of backing filesystem.
///
/// The registry is owned by whoever bootstraps the process and shared as an `Arc`. Sessions hold
/// a weak reference back so that closing a session unregisters it.
pub struct FsRegistry<B: AttributeProvider> {
    sessions: scc::HashMap<String, Arc<CachingFs<B>>>,
}

impl<B: AttributeProvider> FsRegistry<B> {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: scc::HashMap::new(),
        })
    }

    /// Wrap `backing` in a new session under a freshly generated `cache:///<uuid>` URI.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyExists`] if the generated URI collides with a live session.
    pub fn wrapping(
        self: &Arc<Self>,
        backing: impl Into<Arc<B>>,
        settings: CacheSettings,
    ) -> Result<Arc<CachingFs<B>>, RegistryError> {
        let uri = format!("{}:///{}", CachingFs::<B>::SCHEME, Uuid::new_v4());
        self.new_filesystem(&uri, backing, settings)
    }

    /// Register a new session under `uri`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidScheme`] for a non-`cache:` URI and
    /// [`RegistryError::AlreadyExists`] if the URI is taken.
    pub fn new_filesystem(
        self: &Arc<Self>,
        uri: &str,
        backing: impl Into<Arc<B>>,
        settings: CacheSettings,
    ) -> Result<Arc<CachingFs<B>>, RegistryError> {
        let scheme_ok = uri
            .split_once(':')
            .is_some_and(|(scheme, _)| scheme == CachingFs::<B>::SCHEME);
        if !scheme_ok {
            return Err(RegistryError::InvalidScheme(uri.to_owned()));
        }

        let fs = Arc::new(CachingFs::new(
            Arc::from(uri),
            backing.into(),
            settings,
            Arc::downgrade(self),
        ));
        self.sessions
            .insert_sync(uri.to_owned(), Arc::clone(&fs))
            .map_err(|_| RegistryError::AlreadyExists(uri.to_owned()))?;

        info!(uri, flush_interval = ?fs.settings().flush_interval, "filesystem session opened");
        Ok(fs)
    }

    /// Look up an open session.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if nothing is registered under `uri`.
    pub fn get(&self, uri: &str) -> Result<Arc<CachingFs<B>>, RegistryError> {
        self.sessions
            .read_sync(uri, |_, fs| Arc::clone(fs))
            .ok_or_else(|| RegistryError::NotFound(uri.to_owned()))
    }

    pub(crate) fn remove(&self, uri: &str) -> bool {
        let removed = self.sessions.remove_sync(uri).is_some();
        debug!(uri, removed, "filesystem session unregistered");
        removed
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
