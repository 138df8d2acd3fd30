//! A backing path paired with its own attribute cache.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::trace;

use crate::cache::clock::SharedClock;
use crate::cache::expirable::ExpirableCache;
use crate::cache::traits::SyncWritableCache as _;
use crate::fs::AttributeViews;
use crate::fs::attrs::{AttributeFamily, AttributeMap, AttributeQuery, AttributeSnapshot};
use crate::fs::caching::CacheSettings;
use crate::fs::error::FsError;
use crate::fs::traits::PathOps;

type FamilyCache = ExpirableCache<AttributeFamily, Option<AttributeSnapshot>, SharedClock>;

/// A path handed out by a [`CachingFs`](crate::fs::CachingFs).
///
/// The path owns one cache entry per attribute family. The entries share a single expiry window,
/// so the three families are always equally fresh. A cached `None` means the family was looked up
/// and has no snapshot; it is not the same as "not looked up yet".
///
/// The cache lives in a `RefCell`, so a `CachingPath` is `Send` but not `Sync`: one owner reads and
/// writes it at a time.
pub struct CachingPath<P> {
    session: Arc<str>,
    delegate: P,
    settings: CacheSettings,
    cache: RefCell<FamilyCache>,
}

impl<P: PathOps> CachingPath<P> {
    pub(crate) fn new(session: Arc<str>, delegate: P, settings: CacheSettings) -> Self {
        let cache =
            ExpirableCache::with_clock(settings.flush_interval, Arc::clone(&settings.clock));
        Self {
            session,
            delegate,
            settings,
            cache: RefCell::new(cache),
        }
    }

    /// A new path in the same session, with an empty cache.
    fn derive(&self, delegate: P) -> Self {
        Self::new(Arc::clone(&self.session), delegate, self.settings.clone())
    }

    fn with_cache<T>(&self, f: impl FnOnce(&mut FamilyCache) -> T) -> Result<T, FsError> {
        let mut cache = self
            .cache
            .try_borrow_mut()
            .map_err(|_| FsError::ReentrantCacheAccess)?;
        Ok(f(&mut cache))
    }

    /// The wrapped backing path.
    pub fn delegate(&self) -> &P {
        &self.delegate
    }

    /// URI of the session that created this path.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Get `family`'s snapshot, calling `fetch` only if the family has no live entry.
    ///
    /// A failed fetch caches nothing.
    ///
    /// # Errors
    ///
    /// Whatever `fetch` returns, or [`FsError::ReentrantCacheAccess`] if `fetch` touches this
    /// path's cache.
    pub fn snapshot<F>(
        &self,
        family: AttributeFamily,
        fetch: F,
    ) -> Result<Option<AttributeSnapshot>, FsError>
    where
        F: FnOnce() -> Result<Option<AttributeSnapshot>, FsError>,
    {
        let mut cache = self
            .cache
            .try_borrow_mut()
            .map_err(|_| FsError::ReentrantCacheAccess)?;

        let mut missed = false;
        let snapshot = cache.try_compute_if_expired_or_absent(family, |_| {
            missed = true;
            fetch()
        })?;

        if missed {
            trace!(path = %self.delegate, %family, "attribute cache miss");
        } else {
            trace!(path = %self.delegate, %family, "attribute cache hit");
        }
        Ok(snapshot)
    }

    /// Overwrite `family`'s entry.
    ///
    /// # Errors
    ///
    /// [`FsError::ReentrantCacheAccess`] when called from inside a fetch on this path.
    pub fn set_snapshot(
        &self,
        family: AttributeFamily,
        snapshot: Option<AttributeSnapshot>,
    ) -> Result<(), FsError> {
        self.with_cache(|cache| cache.insert(family, snapshot))
    }

    /// Overwrite the entry named by a wildcard selector such as `"dos:*"` or `"basic:*"`.
    ///
    /// Selectors for single attributes are ignored: only whole families are cached.
    ///
    /// # Errors
    ///
    /// [`FsError::ReentrantCacheAccess`] when called from inside a fetch on this path.
    pub fn set_by_name(
        &self,
        selector: &str,
        snapshot: Option<AttributeSnapshot>,
    ) -> Result<(), FsError> {
        match AttributeFamily::from_selector(selector) {
            Some(family) => self.set_snapshot(family, snapshot),
            None => Ok(()),
        }
    }

    /// Forget `family`'s entry so the next read goes to the backing filesystem.
    ///
    /// # Errors
    ///
    /// [`FsError::ReentrantCacheAccess`] when called from inside a fetch on this path.
    pub fn invalidate(&self, family: AttributeFamily) -> Result<(), FsError> {
        self.with_cache(|cache| {
            cache.remove(&family);
        })
    }

    /// Answer a named query from the family snapshot it belongs to.
    ///
    /// Wildcard queries return the whole flattened family; single-name queries return a map with
    /// just that entry. Returns `Ok(None)` when the family has no snapshot or the name matches
    /// nothing in it.
    ///
    /// # Errors
    ///
    /// Whatever `fetch` returns.
    pub fn read_named<F>(
        &self,
        query: &AttributeQuery,
        fetch: F,
    ) -> Result<Option<AttributeMap>, FsError>
    where
        F: FnOnce() -> Result<Option<AttributeSnapshot>, FsError>,
    {
        let snapshot = self.snapshot(query.family(), fetch)?;
        Ok(snapshot.and_then(|snap| query.select(snap.to_map())))
    }

    /// Capture this path's snapshots, run `action`, then install the snapshots on `target`.
    ///
    /// Basic is always captured; Dos and Posix only when `views` includes them, otherwise the
    /// target gets `None` for that family. Captured snapshots come from this path's cache when it
    /// has them. If `action` fails the target's cache is left untouched.
    ///
    /// # Errors
    ///
    /// The first failing fetch, or the error from `action`.
    pub fn copy_attributes_to<T, F, A>(
        &self,
        target: &Self,
        views: AttributeViews,
        mut fetch: F,
        action: A,
    ) -> Result<T, FsError>
    where
        F: FnMut(AttributeFamily) -> Result<Option<AttributeSnapshot>, FsError>,
        A: FnOnce() -> Result<T, FsError>,
    {
        let mut captured = Vec::with_capacity(AttributeFamily::ALL.len());
        for family in AttributeFamily::ALL {
            let snapshot = if family == AttributeFamily::Basic || views.contains(family.view()) {
                self.snapshot(family, || fetch(family))?
            } else {
                None
            };
            captured.push((family, snapshot));
        }

        let out = action()?;

        for (family, snapshot) in captured {
            target.set_snapshot(family, snapshot)?;
        }
        Ok(out)
    }

    /// Number of families with a live entry.
    #[doc(hidden)]
    pub fn cached_len(&self) -> usize {
        self.with_cache(|cache| cache.len()).unwrap_or_default()
    }

    /// The last name component.
    pub fn file_name(&self) -> Option<String> {
        self.delegate.file_name()
    }

    /// The parent path, with its own empty cache.
    pub fn parent(&self) -> Option<Self> {
        self.delegate.parent().map(|p| self.derive(p))
    }

    /// Join `other` onto this path. The result has an empty cache.
    #[must_use]
    pub fn resolve(&self, other: &str) -> Self {
        self.derive(self.delegate.resolve(other))
    }

    /// The normalized path. The result has an empty cache.
    #[must_use]
    pub fn normalize(&self) -> Self {
        self.derive(self.delegate.normalize())
    }

    /// Every name component, in order.
    pub fn components(&self) -> Vec<String> {
        self.delegate.components()
    }

    /// Whether the path is rooted.
    pub fn is_absolute(&self) -> bool {
        self.delegate.is_absolute()
    }

    /// A URI naming the backing entry.
    pub fn to_uri(&self) -> String {
        self.delegate.to_uri()
    }
}

impl<P: PartialEq> PartialEq for CachingPath<P> {
    fn eq(&self, other: &Self) -> bool {
        self.session == other.session && self.delegate == other.delegate
    }
}

impl<P: Eq> Eq for CachingPath<P> {}

impl<P: Hash> Hash for CachingPath<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session.hash(state);
        self.delegate.hash(state);
    }
}

impl<P: fmt::Display> fmt::Display for CachingPath<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.delegate.fmt(f)
    }
}

impl<P: fmt::Debug> fmt::Debug for CachingPath<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingPath")
            .field("session", &self.session)
            .field("delegate", &self.delegate)
            .finish_non_exhaustive()
    }
}
