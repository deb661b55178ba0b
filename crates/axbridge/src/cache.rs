//! Process-wide metadata cache
//!
//! Generated metadata depends only on the class and the generation options,
//! so one [`MetaObject`] serves every wrapper of a class. Enums are cached
//! per type library.
//!
//! Generation holds the reentrant generation lock for its whole run; the
//! maps have their own short-lived lock.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use axcom::GUID;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::meta::{MetaEnum, MetaObject};
use crate::services::GenerationOptions;

/// Cache key: the class (or interface, without class information) and the
/// options the metadata was generated with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub guid: GUID,
    pub options: GenerationOptions,
}

impl CacheKey {
    #[must_use]
    pub fn new(guid: GUID, options: GenerationOptions) -> Self {
        Self { guid, options }
    }
}

#[derive(Default)]
pub struct MetaObjectCache {
    generation: ReentrantMutex<()>,
    objects: Mutex<HashMap<CacheKey, Arc<MetaObject>>>,
    enums: Mutex<HashMap<GUID, Arc<Vec<MetaEnum>>>>,
}

static SHARED: Mutex<Weak<MetaObjectCache>> = Mutex::new(Weak::new());

impl MetaObjectCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache, created on first use and kept while any
    /// services hold it.
    pub fn shared() -> Arc<MetaObjectCache> {
        let mut slot = SHARED.lock();
        if let Some(cache) = slot.upgrade() {
            return cache;
        }
        let cache = Arc::new(MetaObjectCache::new());
        *slot = Arc::downgrade(&cache);
        cache
    }

    /// Serializes metadata generation. Reentrant, so generation may recurse
    /// into a sub-object of the same thread.
    pub fn generation_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.generation.lock()
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<MetaObject>> {
        self.objects.lock().get(key).cloned()
    }

    /// Store `meta` under `key` and return the cached entry, which is the
    /// earlier one if another generation got there first.
    pub fn insert(&self, key: CacheKey, meta: MetaObject) -> Arc<MetaObject> {
        self.objects
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(meta))
            .clone()
    }

    /// Enums of type library `libid`
    #[must_use]
    pub fn enums(&self, libid: &GUID) -> Option<Arc<Vec<MetaEnum>>> {
        self.enums.lock().get(libid).cloned()
    }

    pub fn insert_enums(&self, libid: GUID, enums: Vec<MetaEnum>) -> Arc<Vec<MetaEnum>> {
        self.enums
            .lock()
            .entry(libid)
            .or_insert_with(|| Arc::new(enums))
            .clone()
    }

    /// Number of cached classes
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let _generation = self.generation_lock();
        self.objects.lock().clear();
        self.enums.lock().clear();
    }
}

impl std::fmt::Debug for MetaObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaObjectCache")
            .field("objects", &self.objects.lock().len())
            .field("enums", &self.enums.lock().len())
            .finish()
    }
}
