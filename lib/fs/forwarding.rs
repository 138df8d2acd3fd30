//! A filesystem that forwards every call to a shared backing filesystem.
//!
//! Decorators hold a [`ForwardingFs`] and override only the calls they care about; everything
//! else goes through here unchanged.

use std::io;
use std::sync::Arc;

use tracing::instrument;

use crate::fs::attrs::{
    AttrValue, AttributeFamily, AttributeSnapshot, BasicAttrs, DosAttrs, PosixAttrs,
};
use crate::fs::error::FsError;
use crate::fs::traits::{AttributeProvider, ByteChannel, FilesystemOps};
use crate::fs::{AccessMode, AttributeViews, CopyOptions, OpenFlags, Platform};

/// Pass-through adapter over a backing filesystem `B`.
pub struct ForwardingFs<B> {
    inner: Arc<B>,
}

impl<B> ForwardingFs<B> {
    /// Take ownership of `backing`.
    pub fn new(backing: B) -> Self {
        Self {
            inner: Arc::new(backing),
        }
    }

    /// Forward to a backing filesystem that is shared with other handles.
    pub fn from_shared(backing: Arc<B>) -> Self {
        Self { inner: backing }
    }

    /// The backing filesystem.
    pub fn delegate(&self) -> &Arc<B> {
        &self.inner
    }
}

impl<B> Clone for ForwardingFs<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: FilesystemOps> FilesystemOps for ForwardingFs<B> {
    type Path = B::Path;

    fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    fn separator(&self) -> &str {
        self.inner.separator()
    }

    fn path(&self, first: &str, more: &[&str]) -> io::Result<Self::Path> {
        self.inner.path(first, more)
    }

    fn root_directories(&self) -> Vec<Self::Path> {
        self.inner.root_directories()
    }

    fn supported_views(&self) -> AttributeViews {
        self.inner.supported_views()
    }

    fn platform(&self) -> Platform {
        self.inner.platform()
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    #[instrument(level = "trace", name = "ForwardingFs::close", skip(self))]
    fn close(&self) -> io::Result<()> {
        self.inner.close()
    }

    #[instrument(level = "trace", name = "ForwardingFs::open", skip(self))]
    fn open(&self, path: &Self::Path, flags: OpenFlags) -> io::Result<Box<dyn ByteChannel>> {
        self.inner.open(path, flags)
    }

    #[instrument(level = "trace", name = "ForwardingFs::read_dir", skip(self))]
    fn read_dir(&self, dir: &Self::Path) -> io::Result<Vec<Self::Path>> {
        self.inner.read_dir(dir)
    }

    #[instrument(level = "trace", name = "ForwardingFs::create_dir", skip(self))]
    fn create_dir(&self, dir: &Self::Path) -> io::Result<()> {
        self.inner.create_dir(dir)
    }

    #[instrument(level = "trace", name = "ForwardingFs::create_file", skip(self))]
    fn create_file(&self, path: &Self::Path) -> io::Result<()> {
        self.inner.create_file(path)
    }

    #[instrument(level = "trace", name = "ForwardingFs::delete", skip(self))]
    fn delete(&self, path: &Self::Path) -> io::Result<()> {
        self.inner.delete(path)
    }

    fn exists(&self, path: &Self::Path) -> bool {
        self.inner.exists(path)
    }

    #[instrument(level = "trace", name = "ForwardingFs::copy", skip(self))]
    fn copy(
        &self,
        source: &Self::Path,
        target: &Self::Path,
        options: CopyOptions,
    ) -> io::Result<()> {
        self.inner.copy(source, target, options)
    }

    #[instrument(level = "trace", name = "ForwardingFs::rename", skip(self))]
    fn rename(
        &self,
        source: &Self::Path,
        target: &Self::Path,
        options: CopyOptions,
    ) -> io::Result<()> {
        self.inner.rename(source, target, options)
    }

    fn is_same_file(&self, a: &Self::Path, b: &Self::Path) -> io::Result<bool> {
        self.inner.is_same_file(a, b)
    }

    fn is_hidden(&self, path: &Self::Path) -> io::Result<bool> {
        self.inner.is_hidden(path)
    }

    fn check_access(&self, path: &Self::Path, modes: AccessMode) -> io::Result<()> {
        self.inner.check_access(path, modes)
    }
}

impl<B: AttributeProvider> AttributeProvider for ForwardingFs<B> {
    #[instrument(level = "trace", name = "ForwardingFs::read_basic", skip(self))]
    fn read_basic(&self, path: &Self::Path) -> Result<BasicAttrs, FsError> {
        self.inner.read_basic(path)
    }

    #[instrument(level = "trace", name = "ForwardingFs::read_dos", skip(self))]
    fn read_dos(&self, path: &Self::Path) -> Result<DosAttrs, FsError> {
        self.inner.read_dos(path)
    }

    #[instrument(level = "trace", name = "ForwardingFs::read_posix", skip(self))]
    fn read_posix(&self, path: &Self::Path) -> Result<PosixAttrs, FsError> {
        self.inner.read_posix(path)
    }

    #[instrument(level = "trace", name = "ForwardingFs::set_attribute", skip(self))]
    fn set_attribute(
        &self,
        path: &Self::Path,
        name: &str,
        value: AttrValue,
    ) -> Result<(), FsError> {
        self.inner.set_attribute(path, name, value)
    }

    fn read_family(
        &self,
        path: &Self::Path,
        family: AttributeFamily,
    ) -> Result<AttributeSnapshot, FsError> {
        self.inner.read_family(path, family)
    }
}
