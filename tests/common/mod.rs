#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::io::{self, Write as _};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use attr_cache_fs::cache::ManualClock;
use attr_cache_fs::fs::mem::{MemFlavor, MemFs, MemPath};
use attr_cache_fs::fs::{
    AccessMode, AttrValue, AttributeProvider, AttributeViews, BasicAttrs, ByteChannel,
    CacheSettings, CachingFs, CachingPath, CopyOptions, DosAttrs, FileTime, FilesystemOps,
    FsError, FsRegistry, OpenFlags, Platform, PosixAttrs,
};

pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// 1970-01-01T19:34:27Z.
pub fn test_date() -> FileTime {
    FileTime::from_unix_millis(70_467_000)
}

/// A caching session over an in-memory filesystem, with a hand-driven clock.
pub struct Fixture<B: AttributeProvider> {
    pub registry: Arc<FsRegistry<B>>,
    pub fs: Arc<CachingFs<B>>,
    pub backing: Arc<B>,
    pub clock: Arc<ManualClock>,
}

impl<B: AttributeProvider> Fixture<B> {
    pub fn over(backing: B) -> Self {
        let clock = Arc::new(ManualClock::new());
        let settings = CacheSettings::default()
            .with_flush_interval(FLUSH_INTERVAL)
            .with_clock(clock.clone());
        let backing = Arc::new(backing);
        let registry = FsRegistry::new();
        let fs = registry.wrapping(Arc::clone(&backing), settings).unwrap();
        Self {
            registry,
            fs,
            backing,
            clock,
        }
    }

    pub fn path(&self, first: &str, more: &[&str]) -> CachingPath<B::Path> {
        self.fs.path(first, more).unwrap()
    }

    /// Create `name` holding `hello`.
    pub fn create_hello(&self, name: &str) -> CachingPath<B::Path> {
        let path = self.path(name, &[]);
        self.fs.create_file(&path).unwrap();
        self.fs.write(&path, b"hello").unwrap();
        path
    }

    pub fn set_time(&self, path: &CachingPath<B::Path>, name: &str, time: FileTime) {
        self.fs
            .set_attribute(path, name, AttrValue::Time(time))
            .unwrap();
    }

    pub fn set_all_times(&self, path: &CachingPath<B::Path>, time: FileTime) {
        for name in ["creationTime", "lastModifiedTime", "lastAccessTime"] {
            self.set_time(path, name, time);
        }
    }

    pub fn expire(&self) {
        self.clock.advance(FLUSH_INTERVAL);
    }
}

pub fn mem_fixture(flavor: MemFlavor) -> Fixture<MemFs> {
    Fixture::over(MemFs::new(flavor))
}

pub fn all_flavors() -> [MemFlavor; 3] {
    [MemFlavor::Windows, MemFlavor::Unix, MemFlavor::OsX]
}

pub fn posix_flavors() -> [MemFlavor; 2] {
    [MemFlavor::Unix, MemFlavor::OsX]
}

/// Wraps a [`MemFs`], counting attribute reads and optionally failing them.
pub struct CountingFs {
    inner: MemFs,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
}

impl CountingFs {
    pub fn new(inner: MemFs) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn count(&self) -> Result<(), FsError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(FsError::Io(io::Error::other("injected read failure")));
        }
        Ok(())
    }
}

impl FilesystemOps for CountingFs {
    type Path = MemPath;

    fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    fn separator(&self) -> &str {
        self.inner.separator()
    }

    fn path(&self, first: &str, more: &[&str]) -> io::Result<MemPath> {
        self.inner.path(first, more)
    }

    fn root_directories(&self) -> Vec<MemPath> {
        self.inner.root_directories()
    }

    fn supported_views(&self) -> AttributeViews {
        self.inner.supported_views()
    }

    fn platform(&self) -> Platform {
        self.inner.platform()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn close(&self) -> io::Result<()> {
        self.inner.close()
    }

    fn open(&self, path: &MemPath, flags: OpenFlags) -> io::Result<Box<dyn ByteChannel>> {
        self.inner.open(path, flags)
    }

    fn read_dir(&self, dir: &MemPath) -> io::Result<Vec<MemPath>> {
        self.inner.read_dir(dir)
    }

    fn create_dir(&self, dir: &MemPath) -> io::Result<()> {
        self.inner.create_dir(dir)
    }

    fn delete(&self, path: &MemPath) -> io::Result<()> {
        self.inner.delete(path)
    }

    fn exists(&self, path: &MemPath) -> bool {
        self.inner.exists(path)
    }

    fn copy(&self, source: &MemPath, target: &MemPath, options: CopyOptions) -> io::Result<()> {
        self.inner.copy(source, target, options)
    }

    fn rename(&self, source: &MemPath, target: &MemPath, options: CopyOptions) -> io::Result<()> {
        self.inner.rename(source, target, options)
    }

    fn is_same_file(&self, a: &MemPath, b: &MemPath) -> io::Result<bool> {
        self.inner.is_same_file(a, b)
    }

    fn is_hidden(&self, path: &MemPath) -> io::Result<bool> {
        self.inner.is_hidden(path)
    }

    fn check_access(&self, path: &MemPath, modes: AccessMode) -> io::Result<()> {
        self.inner.check_access(path, modes)
    }
}

impl AttributeProvider for CountingFs {
    fn read_basic(&self, path: &MemPath) -> Result<BasicAttrs, FsError> {
        self.count()?;
        self.inner.read_basic(path)
    }

    fn read_dos(&self, path: &MemPath) -> Result<DosAttrs, FsError> {
        self.count()?;
        self.inner.read_dos(path)
    }

    fn read_posix(&self, path: &MemPath) -> Result<PosixAttrs, FsError> {
        self.count()?;
        self.inner.read_posix(path)
    }

    fn set_attribute(&self, path: &MemPath, name: &str, value: AttrValue) -> Result<(), FsError> {
        self.inner.set_attribute(path, name, value)
    }
}

/// Write `data` straight to the backing filesystem, bypassing any cache.
pub fn write_backing(fs: &MemFs, path: &MemPath, data: &[u8]) {
    let mut channel = fs
        .open(
            path,
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE_EXISTING,
        )
        .unwrap();
    channel.write_all(data).unwrap();
}
