//! Object registries.
//!
//! [`TypeRegistry`] maps wire type names to proxy constructors and is built
//! by the caller before the connection starts. [`Registry`] is the live
//! guid-keyed table of remote objects, owned by the connection; only the
//! dispatch thread mutates it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::owner::{GenericObject, ObjectCore, RemoteObject};

/// Constructor for one wire type: wraps a ready-made core in a proxy.
pub type ObjectCtor = Box<dyn Fn(ObjectCore) -> Arc<dyn RemoteObject> + Send + Sync>;

/// Maps wire type names (`"Browser"`, `"Page"`, ...) to constructors.
///
/// Creation notifications for unregistered types fall back to
/// [`GenericObject`], so an incomplete table degrades gracefully instead of
/// failing the connection.
#[derive(Default)]
pub struct TypeRegistry {
    ctors: HashMap<String, ObjectCtor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Registers `ctor` for `type_name`, replacing any previous entry.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        ctor: impl Fn(ObjectCore) -> Arc<dyn RemoteObject> + Send + Sync + 'static,
    ) -> &mut Self {
        self.ctors.insert(type_name.into(), Box::new(ctor));
        self
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.ctors.contains_key(type_name)
    }

    pub(crate) fn construct(&self, type_name: &str, core: ObjectCore) -> Arc<dyn RemoteObject> {
        match self.ctors.get(type_name) {
            Some(ctor) => ctor(core),
            None => {
                debug!(type_name, guid = core.guid(), "no constructor registered, using generic proxy");
                Arc::new(GenericObject::new(core))
            }
        }
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &types).finish()
    }
}

/// Live guid-keyed table of remote objects.
pub(crate) struct Registry {
    objects: HashMap<String, Arc<dyn RemoteObject>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Registry {
            objects: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, guid: &str) -> Option<Arc<dyn RemoteObject>> {
        self.objects.get(guid).cloned()
    }

    pub(crate) fn contains(&self, guid: &str) -> bool {
        self.objects.contains_key(guid)
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    /// Inserts a freshly constructed proxy and links it into its parent's
    /// child set. A duplicate guid keeps the existing entry.
    pub(crate) fn insert(&mut self, object: Arc<dyn RemoteObject>) -> bool {
        let guid = object.core().guid().to_owned();
        if self.objects.contains_key(&guid) {
            warn!(guid, "duplicate creation for live guid, keeping existing object");
            return false;
        }
        if let Some(parent_guid) = object.core().parent_guid() {
            match self.objects.get(parent_guid) {
                Some(parent) => parent.core().add_child(&guid),
                None => warn!(guid, parent_guid, "creation names an unknown parent"),
            }
        }
        self.objects.insert(guid, object);
        true
    }

    /// Removes `guid` and every transitive child, unlinking the subtree
    /// root from its parent. Returns the removed proxies; empty when the
    /// guid is unknown, which makes repeated disposal a no-op.
    pub(crate) fn remove_subtree(&mut self, guid: &str) -> Vec<Arc<dyn RemoteObject>> {
        let mut removed = Vec::new();
        let Some(root) = self.objects.remove(guid) else {
            return removed;
        };
        if let Some(parent_guid) = root.core().parent_guid() {
            if let Some(parent) = self.objects.get(parent_guid) {
                parent.core().remove_child(guid);
            }
        }
        let mut queue = vec![root];
        while let Some(object) = queue.pop() {
            for child_guid in object.core().children() {
                if let Some(child) = self.objects.remove(&child_guid) {
                    queue.push(child);
                }
            }
            removed.push(object);
        }
        removed
    }

    /// Empties the table, returning everything that was registered.
    pub(crate) fn drain_all(&mut self) -> Vec<Arc<dyn RemoteObject>> {
        self.objects.drain().map(|(_, object)| object).collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("objects", &self.objects.len()).finish()
    }
}
