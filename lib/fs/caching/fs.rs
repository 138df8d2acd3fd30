//! The caching filesystem session.

use std::io::{Read as _, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tracing::{debug, instrument, trace, warn};

use crate::fs::attrs::{AttrValue, AttributeFamily, AttributeMap, AttributeQuery, AttributeSnapshot};
use crate::fs::caching::{CacheSettings, CachingPath};
use crate::fs::error::FsError;
use crate::fs::forwarding::ForwardingFs;
use crate::fs::registry::FsRegistry;
use crate::fs::traits::{AttributeProvider, ByteChannel, FilesystemOps};
use crate::fs::{AccessMode, AttributeViews, CopyOptions, OpenFlags, Platform};

/// A filesystem session that caches attributes per path.
///
/// Attribute reads, writes, copies and moves are intercepted; every other operation is forwarded
/// to the backing filesystem unchanged.
pub struct CachingFs<B: AttributeProvider> {
    uri: Arc<str>,
    forward: ForwardingFs<B>,
    settings: CacheSettings,
    open: AtomicBool,
    registry: Weak<FsRegistry<B>>,
}

impl<B: AttributeProvider> CachingFs<B> {
    /// URI scheme of caching sessions.
    pub const SCHEME: &'static str = "cache";

    pub(crate) fn new(
        uri: Arc<str>,
        backing: Arc<B>,
        settings: CacheSettings,
        registry: Weak<FsRegistry<B>>,
    ) -> Self {
        Self {
            uri,
            forward: ForwardingFs::from_shared(backing),
            settings,
            open: AtomicBool::new(true),
            registry,
        }
    }

    /// The URI this session is registered under.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The backing filesystem.
    pub fn delegate(&self) -> &Arc<B> {
        self.forward.delegate()
    }

    /// Cache settings shared by every path of this session.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Whether [`close`](Self::close) has not yet been called.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close the session: remove it from its registry and close the backing filesystem.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates a failure closing the backing filesystem.
    #[instrument(name = "CachingFs::close", skip(self), fields(uri = %self.uri))]
    pub fn close(&self) -> Result<(), FsError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.uri);
        }
        self.forward.close()?;
        debug!("session closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), FsError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(FsError::Closed(self.uri.to_string()))
        }
    }

    /// Build a path from one or more name strings.
    ///
    /// # Errors
    ///
    /// [`FsError::Closed`] on a closed session, or the backing filesystem's rejection.
    pub fn path(&self, first: &str, more: &[&str]) -> Result<CachingPath<B::Path>, FsError> {
        self.ensure_open()?;
        Ok(self.wrap(self.forward.path(first, more)?))
    }

    /// Wrap a backing path into a path of this session with an empty cache.
    pub fn wrap(&self, delegate: B::Path) -> CachingPath<B::Path> {
        CachingPath::new(Arc::clone(&self.uri), delegate, self.settings.clone())
    }

    /// The backing path of `path`, after checking it belongs to this open session.
    fn unwrap_path<'p>(&self, path: &'p CachingPath<B::Path>) -> Result<&'p B::Path, FsError> {
        self.ensure_open()?;
        if path.session() != &*self.uri {
            return Err(FsError::InvalidPathKind {
                expected: self.uri.to_string(),
                found: path.session().to_owned(),
            });
        }
        Ok(path.delegate())
    }

    fn supports(&self, family: AttributeFamily) -> bool {
        family == AttributeFamily::Basic || self.forward.supported_views().contains(family.view())
    }

    fn ensure_supported(&self, family: AttributeFamily) -> Result<(), FsError> {
        if self.supports(family) {
            Ok(())
        } else {
            Err(FsError::UnsupportedAttributeFamily(family))
        }
    }

    fn fetch(
        &self,
        path: &B::Path,
        family: AttributeFamily,
    ) -> Result<Option<AttributeSnapshot>, FsError> {
        trace!(%path, %family, "reading attributes from backing filesystem");
        self.forward.read_family(path, family).map(Some)
    }

    /// Read one family's full snapshot, from the cache when it has a live entry.
    ///
    /// # Errors
    ///
    /// [`FsError::UnsupportedAttributeFamily`] if the backing filesystem lacks the view; nothing
    /// is cached in that case. Backing failures are returned and not cached.
    #[instrument(name = "CachingFs::read_attributes", skip(self))]
    pub fn read_attributes(
        &self,
        path: &CachingPath<B::Path>,
        family: AttributeFamily,
    ) -> Result<AttributeSnapshot, FsError> {
        let delegate = self.unwrap_path(path)?;
        self.ensure_supported(family)?;
        path.snapshot(family, || self.fetch(delegate, family))?
            .ok_or(FsError::UnsupportedAttributeFamily(family))
    }

    /// Read attributes by selector: a family wildcard (`"*"`, `"dos:*"`, `"posix:*"`) or a single
    /// name such as `"lastModifiedTime"` or `"dos:hidden"`.
    ///
    /// # Errors
    ///
    /// [`FsError::MalformedAttributeQuery`] when the selector matches nothing, plus the errors of
    /// [`read_attributes`](Self::read_attributes).
    #[instrument(name = "CachingFs::read_attributes_map", skip(self))]
    pub fn read_attributes_map(
        &self,
        path: &CachingPath<B::Path>,
        selector: &str,
    ) -> Result<AttributeMap, FsError> {
        let delegate = self.unwrap_path(path)?;
        let query = AttributeQuery::parse(selector)?;
        let family = query.family();
        self.ensure_supported(family)?;
        path.read_named(&query, || self.fetch(delegate, family))?
            .ok_or_else(|| FsError::MalformedAttributeQuery(selector.to_owned()))
    }

    /// Write one attribute through to the backing filesystem, then refresh the cached family it
    /// belongs to with a full re-read.
    ///
    /// Other families whose snapshots also carry the field (every family, for a Basic field) are
    /// dropped, so their next read goes to the backing filesystem. Families that do not carry the
    /// field are left as they are.
    ///
    /// # Errors
    ///
    /// The backing write's error, in which case the cache is untouched. If the write succeeds but
    /// the re-read fails, the family's entry is dropped and the read error is returned.
    #[instrument(name = "CachingFs::set_attribute", skip(self))]
    pub fn set_attribute(
        &self,
        path: &CachingPath<B::Path>,
        name: &str,
        value: AttrValue,
    ) -> Result<(), FsError> {
        let delegate = self.unwrap_path(path)?;
        self.forward.set_attribute(delegate, name, value)?;

        let family = AttributeFamily::refreshed_by(name);
        for &other in AttributeFamily::holding(name) {
            if other != family {
                path.invalidate(other)?;
            }
        }
        if !self.supports(family) {
            debug!(%family, "attribute written, family not served by backing filesystem");
            return Ok(());
        }

        debug!(%family, "attribute written, refreshing cached family");
        match self.forward.read_family(delegate, family) {
            Ok(snapshot) => path.set_by_name(family.selector(), Some(snapshot)),
            Err(e) => {
                warn!(error = %e, %family, "refresh after write failed, dropping cached family");
                path.invalidate(family)?;
                Err(e)
            }
        }
    }

    /// Copy `source` to `target`.
    ///
    /// With [`CopyOptions::COPY_ATTRIBUTES`], the source's snapshots (cached or freshly read) are
    /// installed on `target` once the byte copy succeeds, and the backing copy runs without that
    /// flag. Without it the target's cache is not touched.
    ///
    /// # Errors
    ///
    /// Backing failures from the snapshot reads or the copy.
    #[instrument(name = "CachingFs::copy", skip(self))]
    pub fn copy(
        &self,
        source: &CachingPath<B::Path>,
        target: &CachingPath<B::Path>,
        options: CopyOptions,
    ) -> Result<(), FsError> {
        let src = self.unwrap_path(source)?;
        let dst = self.unwrap_path(target)?;

        if !options.contains(CopyOptions::COPY_ATTRIBUTES) {
            return Ok(self.forward.copy(src, dst, options)?);
        }

        let stripped = options - CopyOptions::COPY_ATTRIBUTES;
        source.copy_attributes_to(
            target,
            self.forward.supported_views(),
            |family| self.fetch(src, family),
            || Ok(self.forward.copy(src, dst, stripped)?),
        )
    }

    /// Move `source` to `target`, with the same attribute handling as [`copy`](Self::copy).
    ///
    /// # Errors
    ///
    /// Backing failures from the snapshot reads or the move.
    #[instrument(name = "CachingFs::rename", skip(self))]
    pub fn rename(
        &self,
        source: &CachingPath<B::Path>,
        target: &CachingPath<B::Path>,
        options: CopyOptions,
    ) -> Result<(), FsError> {
        let src = self.unwrap_path(source)?;
        let dst = self.unwrap_path(target)?;

        if !options.contains(CopyOptions::COPY_ATTRIBUTES) {
            return Ok(self.forward.rename(src, dst, options)?);
        }

        let stripped = options - CopyOptions::COPY_ATTRIBUTES;
        source.copy_attributes_to(
            target,
            self.forward.supported_views(),
            |family| self.fetch(src, family),
            || Ok(self.forward.rename(src, dst, stripped)?),
        )
    }

    /// Whether `path` is hidden under the backing filesystem's convention.
    ///
    /// On a Windows-style backing filesystem this is the cached Dos `hidden` flag, and directories
    /// are never reported hidden. On a POSIX-style one the check goes straight to the backing
    /// filesystem.
    ///
    /// # Errors
    ///
    /// Backing failures, or a missing Dos view on a Windows-style filesystem.
    #[instrument(name = "CachingFs::is_hidden", skip(self))]
    pub fn is_hidden(&self, path: &CachingPath<B::Path>) -> Result<bool, FsError> {
        match self.forward.platform() {
            Platform::Windows => {
                let snapshot = self.read_attributes(path, AttributeFamily::Dos)?;
                let dos = snapshot
                    .as_dos()
                    .ok_or(FsError::UnsupportedAttributeFamily(AttributeFamily::Dos))?;
                Ok(dos.hidden && !dos.basic.is_directory)
            }
            Platform::Posix => Ok(self.forward.is_hidden(self.unwrap_path(path)?)?),
        }
    }

    /// Open a file for byte access.
    ///
    /// # Errors
    ///
    /// Backing I/O failures.
    #[instrument(name = "CachingFs::open", skip(self))]
    pub fn open(
        &self,
        path: &CachingPath<B::Path>,
        flags: OpenFlags,
    ) -> Result<Box<dyn ByteChannel>, FsError> {
        Ok(self.forward.open(self.unwrap_path(path)?, flags)?)
    }

    /// Read a whole file.
    ///
    /// # Errors
    ///
    /// Backing I/O failures.
    #[instrument(name = "CachingFs::read", skip(self))]
    pub fn read(&self, path: &CachingPath<B::Path>) -> Result<Bytes, FsError> {
        let mut channel = self.open(path, OpenFlags::READ)?;
        let mut buf = Vec::new();
        channel.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Replace a file's content, creating the file if needed.
    ///
    /// # Errors
    ///
    /// Backing I/O failures.
    #[instrument(name = "CachingFs::write", skip(self, data), fields(len = data.len()))]
    pub fn write(&self, path: &CachingPath<B::Path>, data: &[u8]) -> Result<(), FsError> {
        let mut channel = self.open(
            path,
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE_EXISTING,
        )?;
        channel.write_all(data)?;
        channel.flush()?;
        Ok(())
    }

    /// Create an empty regular file.
    ///
    /// # Errors
    ///
    /// Backing I/O failures, including an existing entry.
    #[instrument(name = "CachingFs::create_file", skip(self))]
    pub fn create_file(&self, path: &CachingPath<B::Path>) -> Result<(), FsError> {
        Ok(self.forward.create_file(self.unwrap_path(path)?)?)
    }

    /// Create a directory.
    ///
    /// # Errors
    ///
    /// Backing I/O failures, including an existing entry.
    #[instrument(name = "CachingFs::create_dir", skip(self))]
    pub fn create_dir(&self, dir: &CachingPath<B::Path>) -> Result<(), FsError> {
        Ok(self.forward.create_dir(self.unwrap_path(dir)?)?)
    }

    /// Delete a file or empty directory.
    ///
    /// # Errors
    ///
    /// Backing I/O failures.
    #[instrument(name = "CachingFs::delete", skip(self))]
    pub fn delete(&self, path: &CachingPath<B::Path>) -> Result<(), FsError> {
        Ok(self.forward.delete(self.unwrap_path(path)?)?)
    }

    /// Whether an entry exists at `path`.
    ///
    /// # Errors
    ///
    /// Session errors only.
    pub fn exists(&self, path: &CachingPath<B::Path>) -> Result<bool, FsError> {
        Ok(self.forward.exists(self.unwrap_path(path)?))
    }

    /// List a directory. The returned paths belong to this session and start with empty caches.
    ///
    /// # Errors
    ///
    /// Backing I/O failures.
    #[instrument(name = "CachingFs::read_dir", skip(self))]
    pub fn read_dir(
        &self,
        dir: &CachingPath<B::Path>,
    ) -> Result<Vec<CachingPath<B::Path>>, FsError> {
        let entries = self.forward.read_dir(self.unwrap_path(dir)?)?;
        Ok(entries.into_iter().map(|p| self.wrap(p)).collect())
    }

    /// Whether two paths name the same entry.
    ///
    /// # Errors
    ///
    /// Backing I/O failures.
    pub fn is_same_file(
        &self,
        a: &CachingPath<B::Path>,
        b: &CachingPath<B::Path>,
    ) -> Result<bool, FsError> {
        Ok(self
            .forward
            .is_same_file(self.unwrap_path(a)?, self.unwrap_path(b)?)?)
    }

    /// Check that the entry exists and allows every mode in `modes`.
    ///
    /// # Errors
    ///
    /// Backing I/O failures, including a denied mode.
    pub fn check_access(
        &self,
        path: &CachingPath<B::Path>,
        modes: AccessMode,
    ) -> Result<(), FsError> {
        Ok(self.forward.check_access(self.unwrap_path(path)?, modes)?)
    }

    /// The attribute views the backing filesystem serves.
    pub fn supported_views(&self) -> AttributeViews {
        self.forward.supported_views()
    }

    /// The backing name separator.
    pub fn separator(&self) -> &str {
        self.forward.separator()
    }

    /// The backing roots, as paths of this session.
    pub fn root_directories(&self) -> Vec<CachingPath<B::Path>> {
        self.forward
            .root_directories()
            .into_iter()
            .map(|p| self.wrap(p))
            .collect()
    }

    /// Whether the backing filesystem only allows reads.
    pub fn is_read_only(&self) -> bool {
        self.forward.is_read_only()
    }
}

impl<B: AttributeProvider> std::fmt::Debug for CachingFs<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingFs")
            .field("uri", &self.uri)
            .field("settings", &self.settings)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
