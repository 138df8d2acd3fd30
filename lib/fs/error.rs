//! Errors raised by the caching filesystem layer.

use thiserror::Error;

use crate::fs::attrs::AttributeFamily;

/// Errors returned by attribute-aware filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// The backing filesystem does not support the requested attribute family.
    #[error("attribute family '{0}' is not supported by the backing filesystem")]
    UnsupportedAttributeFamily(AttributeFamily),

    /// A backing read or write failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A path was handed to a filesystem session that did not create it.
    #[error("path belongs to {found}, expected a path of {expected}")]
    InvalidPathKind {
        /// URI of the session the operation ran on.
        expected: String,
        /// URI of the session the path came from.
        found: String,
    },

    /// An attribute selector could not be understood or matched nothing.
    #[error("malformed attribute query: {0:?}")]
    MalformedAttributeQuery(String),

    /// A set targeted an attribute the backing view does not define.
    #[error("unknown attribute: {0:?}")]
    UnknownAttribute(String),

    /// A value had the wrong type for the attribute it was written to.
    #[error("invalid value for attribute {name:?}, expected {expected}")]
    InvalidAttributeValue {
        /// The attribute being written.
        name: String,
        /// Description of the accepted value.
        expected: &'static str,
    },

    /// A compute callback tried to touch the cache it was populating.
    #[error("re-entrant access to a path's attribute cache")]
    ReentrantCacheAccess,

    /// The filesystem session has been closed.
    #[error("filesystem {0} is closed")]
    Closed(String),
}

#[cfg(test)]
impl FsError {
    /// Build an [`FsError::Io`] with the given kind and message.
    pub(crate) fn io(kind: std::io::ErrorKind, msg: impl Into<String>) -> Self {
        Self::Io(std::io::Error::new(kind, msg.into()))
    }
}

impl From<FsError> for i32 {
    fn from(e: FsError) -> Self {
        match e {
            FsError::UnsupportedAttributeFamily(_) => libc::ENOTSUP,
            FsError::Io(ref io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
            FsError::InvalidPathKind { .. }
            | FsError::MalformedAttributeQuery(_)
            | FsError::InvalidAttributeValue { .. } => libc::EINVAL,
            FsError::UnknownAttribute(_) => libc::ENOENT,
            FsError::ReentrantCacheAccess => libc::EDEADLK,
            FsError::Closed(_) => libc::EBADF,
        }
    }
}
