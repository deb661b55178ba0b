//! Environment the bridge runs in
//!
//! The bridge never touches a global registry or class store directly.
//! Name lookups go through a [`ClassRegistry`], object creation through an
//! [`ObjectFactory`], and both travel with the shared metadata cache in
//! [`AxServices`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use axcom::{ComPtr, GUID, HRESULT, IUnknown, REGDB_E_CLASSNOTREG};
use bitflags::bitflags;

use crate::cache::MetaObjectCache;

bitflags! {
    /// What metadata generation reads, and how it names things.
    ///
    /// The options are part of the metadata cache key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GenerationOptions: u32 {
        /// Read outgoing interfaces and register event sinks
        const EVENT_SINK = 0x01;
        /// Read class information (coclass, version, interfaces)
        const CLASS_INFO = 0x02;
        /// Resolve GUIDs in class information to registered names
        const UUID_NAMES = 0x04;
        /// Qualify dispatch types from other libraries as `Library::Type`
        const QUALIFIED_USER_TYPES = 0x08;
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        GenerationOptions::EVENT_SINK | GenerationOptions::CLASS_INFO
    }
}

/// Read-only name lookup.
///
/// Keys follow the registry layout: `CLSID/{GUID}/Default` and
/// `Interface/{GUID}/Default` give readable names, `<ProgID>/CLSID/Default`
/// gives the class id of a program id.
pub trait ClassRegistry {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// A [`ClassRegistry`] backed by a map
#[derive(Debug, Clone, Default)]
pub struct MapRegistry {
    entries: BTreeMap<String, String>,
}

impl MapRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    /// Register `prog_id` for `clsid` in both directions.
    pub fn register_class(&mut self, prog_id: &str, clsid: &GUID) {
        let braced = clsid.to_braced_string();
        self.insert(&format!("{prog_id}/CLSID/Default"), &braced);
        self.insert(&format!("CLSID/{braced}/Default"), prog_id);
    }

    /// Register a readable name for an interface id.
    pub fn register_interface(&mut self, name: &str, iid: &GUID) {
        self.insert(
            &format!("Interface/{}/Default", iid.to_braced_string()),
            name,
        );
    }
}

impl ClassRegistry for MapRegistry {
    fn lookup(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

/// Creates objects from class ids
pub trait ObjectFactory {
    fn create(&self, clsid: &GUID) -> Result<ComPtr<IUnknown>, HRESULT>;
}

type Constructor = Box<dyn Fn() -> Option<ComPtr<IUnknown>>>;

/// An [`ObjectFactory`] with one constructor per class id
#[derive(Default)]
pub struct FactoryMap {
    constructors: HashMap<GUID, Constructor>,
}

impl FactoryMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, clsid: GUID, constructor: F)
    where
        F: Fn() -> Option<ComPtr<IUnknown>> + 'static,
    {
        self.constructors.insert(clsid, Box::new(constructor));
    }
}

impl fmt::Debug for FactoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}

impl ObjectFactory for FactoryMap {
    fn create(&self, clsid: &GUID) -> Result<ComPtr<IUnknown>, HRESULT> {
        let constructor = self.constructors.get(clsid).ok_or(REGDB_E_CLASSNOTREG)?;
        constructor().ok_or(axcom::E_FAIL)
    }
}

/// Everything a wrapper needs from its environment
#[derive(Clone)]
pub struct AxServices {
    pub cache: Arc<MetaObjectCache>,
    pub registry: Rc<dyn ClassRegistry>,
    pub factory: Rc<dyn ObjectFactory>,
    pub options: GenerationOptions,
}

impl AxServices {
    /// Services sharing the process-wide metadata cache.
    pub fn new(registry: Rc<dyn ClassRegistry>, factory: Rc<dyn ObjectFactory>) -> Self {
        Self {
            cache: MetaObjectCache::shared(),
            registry,
            factory,
            options: GenerationOptions::default(),
        }
    }

    /// Services with an empty registry and no creatable classes, for wrapping
    /// objects obtained elsewhere.
    #[must_use]
    pub fn standalone() -> Self {
        Self::new(Rc::new(MapRegistry::new()), Rc::new(FactoryMap::new()))
    }

    #[must_use]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<MetaObjectCache>) -> Self {
        self.cache = cache;
        self
    }
}

impl fmt::Debug for AxServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AxServices")
            .field("cache", &self.cache.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
