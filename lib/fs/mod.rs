//! Filesystem abstractions and the attribute caching layer.

/// Attribute families, snapshots and flattened attribute maps.
pub mod attrs;
/// Caching decorator over an [`AttributeProvider`](traits::AttributeProvider).
pub mod caching;
pub mod error;
/// Pass-through adapter over a shared backing filesystem.
pub mod forwarding;
/// The local disk, via `std::fs`.
#[cfg(unix)]
pub mod host;
/// An in-memory filesystem that emulates Windows, Linux or macOS attribute support.
pub mod mem;
/// Process-wide registry of caching filesystem sessions.
pub mod registry;
/// Capability traits implemented by backing filesystems.
pub mod traits;

pub use attrs::{
    AttrValue, AttributeFamily, AttributeMap, AttributeQuery, AttributeSnapshot, BasicAttrs,
    DosAttrs, FileKey, FileTime, PosixAttrs, PosixPermissions, Principal,
};
pub use caching::{CacheSettings, CachingFs, CachingPath};
pub use error::FsError;
pub use forwarding::ForwardingFs;
pub use registry::{FsRegistry, RegistryError};
pub use traits::{AttributeProvider, ByteChannel, FilesystemOps, PathOps};

use bitflags::bitflags;

bitflags! {
    /// Attribute views a filesystem reports support for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttributeViews: u8 {
        /// Timestamps, kind and size.
        const BASIC = 1 << 0;
        /// File owner.
        const OWNER = 1 << 1;
        /// DOS flags.
        const DOS   = 1 << 2;
        /// POSIX owner, group and permissions.
        const POSIX = 1 << 3;
        /// Raw unix metadata (uid, gid, mode, ...).
        const UNIX  = 1 << 4;
        /// Access control lists.
        const ACL   = 1 << 5;
        /// User-defined attributes.
        const USER  = 1 << 6;
    }
}

bitflags! {
    /// Options for copy and move.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CopyOptions: u8 {
        /// Overwrite an existing target.
        const REPLACE_EXISTING = 1 << 0;
        /// Carry timestamps and other attributes over to the target.
        const COPY_ATTRIBUTES  = 1 << 1;
        /// Move as a single atomic operation, or fail.
        const ATOMIC_MOVE      = 1 << 2;
    }
}

bitflags! {
    /// Flags for opening a file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u8 {
        /// Open for reading.
        const READ              = 1 << 0;
        /// Open for writing.
        const WRITE             = 1 << 1;
        /// Append on each write.
        const APPEND            = 1 << 2;
        /// Create the file if it does not exist.
        const CREATE            = 1 << 3;
        /// Create the file, failing if it exists.
        const CREATE_NEW        = 1 << 4;
        /// Truncate an existing file to zero length.
        const TRUNCATE_EXISTING = 1 << 5;
    }
}

bitflags! {
    /// Access modes for [`FilesystemOps::check_access`](traits::FilesystemOps::check_access).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMode: u8 {
        /// Read access.
        const READ    = 1 << 0;
        /// Write access.
        const WRITE   = 1 << 1;
        /// Execute access.
        const EXECUTE = 1 << 2;
    }
}

/// The hidden-file convention of a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Hidden is a DOS flag on the entry.
    Windows,
    /// Hidden means the name starts with a dot.
    Posix,
}
