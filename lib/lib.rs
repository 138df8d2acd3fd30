//! attr-cache-fs shared library.
//!
//! A filesystem decorator that remembers file attributes for a bounded interval. Wrap any
//! [`fs::AttributeProvider`] in a [`fs::CachingFs`] session through an [`fs::FsRegistry`], and
//! attribute reads on its paths are served from a per-path cache until the flush interval elapses.

/// Time-bounded caching primitives.
pub mod cache;
/// Filesystem abstractions and the attribute-caching layer.
pub mod fs;
