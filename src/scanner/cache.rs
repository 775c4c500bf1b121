//! LRU cache of extracted directives so unchanged files are parsed once.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use camino::Utf8PathBuf;
use lru::LruCache;

use super::directive::Directive;
use crate::hasher::Signature;

/// Default number of files whose directives are retained.
pub const CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    path: Utf8PathBuf,
    signature: Signature,
}

/// Directives per `(file, content signature)`.
///
/// Keying on the signature means an edited file misses the cache instead
/// of returning stale directives. Clones share the same storage.
#[derive(Clone, Debug)]
pub struct IncludeCache {
    cache: Arc<Mutex<LruCache<CacheKey, Arc<Vec<Directive>>>>>,
}

impl Default for IncludeCache {
    fn default() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }
}

impl IncludeCache {
    /// Cache holding up to `capacity` files.
    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Cached directives for `path` at `signature`.
    #[must_use]
    pub fn get(&self, path: &str, signature: &Signature) -> Option<Arc<Vec<Directive>>> {
        let key = CacheKey {
            path: Utf8PathBuf::from(path),
            signature: signature.clone(),
        };
        self.lock_cache().get(&key).map(Arc::clone)
    }

    /// Remember the directives of `path` at `signature`.
    pub fn store(&self, path: &str, signature: Signature, directives: Arc<Vec<Directive>>) {
        let key = CacheKey {
            path: Utf8PathBuf::from(path),
            signature,
        };
        self.lock_cache().put(key, directives);
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_cache().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_cache(&self) -> MutexGuard<'_, LruCache<CacheKey, Arc<Vec<Directive>>>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
