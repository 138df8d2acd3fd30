//! Capability traits a filesystem implements to be wrapped by the caching layer.
//!
//! The roles are split the way callers use them: [`PathOps`] covers pure path arithmetic,
//! [`FilesystemOps`] covers entries and their bytes, and [`AttributeProvider`] adds structured
//! attribute reads and writes on top.

use std::fmt;
use std::hash::Hash;
use std::io::{self, Read, Seek, Write};

use crate::fs::attrs::{
    AttrValue, AttributeFamily, AttributeSnapshot, BasicAttrs, DosAttrs, PosixAttrs,
};
use crate::fs::error::FsError;
use crate::fs::{AccessMode, AttributeViews, CopyOptions, OpenFlags, Platform};

/// Pure operations on a path value. None of these touch the filesystem.
pub trait PathOps:
    Clone + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// The last component, if there is one.
    fn file_name(&self) -> Option<String>;

    /// The path without its last component.
    fn parent(&self) -> Option<Self>;

    /// Join `other` onto this path. An absolute `other` replaces this path.
    #[must_use]
    fn resolve(&self, other: &str) -> Self;

    /// Remove `.` components and collapse `..` where possible.
    #[must_use]
    fn normalize(&self) -> Self;

    /// Every name component, in order.
    fn components(&self) -> Vec<String>;

    /// Whether the path is rooted.
    fn is_absolute(&self) -> bool;

    /// A URI naming this path.
    fn to_uri(&self) -> String;
}

/// An open, seekable handle to a file's bytes.
pub trait ByteChannel: Read + Write + Seek + Send {
    /// The current size of the file in bytes.
    fn size(&mut self) -> io::Result<u64>;
}

impl ByteChannel for std::fs::File {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

/// Entry and byte-level operations of a filesystem.
pub trait FilesystemOps: Send + Sync {
    /// The path type this filesystem hands out.
    type Path: PathOps;

    /// URI scheme of this filesystem.
    fn scheme(&self) -> &str;

    /// Name separator.
    fn separator(&self) -> &str;

    /// Build a path from one or more name strings.
    ///
    /// # Errors
    ///
    /// Fails with [`io::ErrorKind::InvalidInput`] when the names do not form a valid path.
    fn path(&self, first: &str, more: &[&str]) -> io::Result<Self::Path>;

    /// The roots of this filesystem.
    fn root_directories(&self) -> Vec<Self::Path>;

    /// The attribute views this filesystem can serve.
    fn supported_views(&self) -> AttributeViews;

    /// Which hidden-file convention the filesystem follows.
    fn platform(&self) -> Platform;

    /// Whether the filesystem only allows reads.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Whether [`close`](Self::close) has not yet been called.
    fn is_open(&self) -> bool;

    /// Close the filesystem. Later operations may fail.
    ///
    /// # Errors
    ///
    /// Propagates failures releasing backing resources.
    fn close(&self) -> io::Result<()>;

    /// Open a file for byte access.
    ///
    /// # Errors
    ///
    /// Propagates backing I/O failures.
    fn open(&self, path: &Self::Path, flags: OpenFlags) -> io::Result<Box<dyn ByteChannel>>;

    /// List the entries of a directory.
    ///
    /// # Errors
    ///
    /// Propagates backing I/O failures.
    fn read_dir(&self, dir: &Self::Path) -> io::Result<Vec<Self::Path>>;

    /// Create a single directory.
    ///
    /// # Errors
    ///
    /// Fails if the entry already exists or its parent does not.
    fn create_dir(&self, dir: &Self::Path) -> io::Result<()>;

    /// Create an empty regular file.
    ///
    /// # Errors
    ///
    /// Fails if the entry already exists or its parent does not.
    fn create_file(&self, path: &Self::Path) -> io::Result<()> {
        self.open(path, OpenFlags::WRITE | OpenFlags::CREATE_NEW)
            .map(drop)
    }

    /// Delete a file or empty directory.
    ///
    /// # Errors
    ///
    /// Propagates backing I/O failures.
    fn delete(&self, path: &Self::Path) -> io::Result<()>;

    /// Whether an entry exists at `path`.
    fn exists(&self, path: &Self::Path) -> bool;

    /// Copy `source` to `target`.
    ///
    /// # Errors
    ///
    /// Propagates backing I/O failures.
    fn copy(&self, source: &Self::Path, target: &Self::Path, options: CopyOptions)
    -> io::Result<()>;

    /// Move `source` to `target`.
    ///
    /// # Errors
    ///
    /// Propagates backing I/O failures.
    fn rename(
        &self,
        source: &Self::Path,
        target: &Self::Path,
        options: CopyOptions,
    ) -> io::Result<()>;

    /// Whether two paths name the same entry.
    ///
    /// # Errors
    ///
    /// Propagates backing I/O failures.
    fn is_same_file(&self, a: &Self::Path, b: &Self::Path) -> io::Result<bool>;

    /// Whether the entry is hidden under this filesystem's convention.
    ///
    /// # Errors
    ///
    /// Propagates backing I/O failures.
    fn is_hidden(&self, path: &Self::Path) -> io::Result<bool>;

    /// Check that the entry exists and allows every mode in `modes`.
    ///
    /// # Errors
    ///
    /// [`io::ErrorKind::NotFound`] or [`io::ErrorKind::PermissionDenied`].
    fn check_access(&self, path: &Self::Path, modes: AccessMode) -> io::Result<()>;
}

/// A filesystem that can read and write structured attributes.
///
/// Each `read_*` call captures one family's full field set with a single backing read.
pub trait AttributeProvider: FilesystemOps {
    /// Read the basic attributes.
    ///
    /// # Errors
    ///
    /// Propagates backing I/O failures.
    fn read_basic(&self, path: &Self::Path) -> Result<BasicAttrs, FsError>;

    /// Read the basic attributes together with the DOS flags.
    ///
    /// # Errors
    ///
    /// [`FsError::UnsupportedAttributeFamily`] if the filesystem has no DOS view.
    fn read_dos(&self, path: &Self::Path) -> Result<DosAttrs, FsError>;

    /// Read the basic attributes together with ownership and permissions.
    ///
    /// # Errors
    ///
    /// [`FsError::UnsupportedAttributeFamily`] if the filesystem has no POSIX view.
    fn read_posix(&self, path: &Self::Path) -> Result<PosixAttrs, FsError>;

    /// Write one named attribute.
    ///
    /// # Errors
    ///
    /// [`FsError::UnknownAttribute`] for names the filesystem does not define,
    /// [`FsError::InvalidAttributeValue`] for values of the wrong type.
    fn set_attribute(&self, path: &Self::Path, name: &str, value: AttrValue)
    -> Result<(), FsError>;

    /// Read one family's snapshot.
    ///
    /// # Errors
    ///
    /// Whatever the matching `read_*` method returns.
    fn read_family(
        &self,
        path: &Self::Path,
        family: AttributeFamily,
    ) -> Result<AttributeSnapshot, FsError> {
        Ok(match family {
            AttributeFamily::Basic => self.read_basic(path)?.into(),
            AttributeFamily::Dos => self.read_dos(path)?.into(),
            AttributeFamily::Posix => self.read_posix(path)?.into(),
        })
    }
}
