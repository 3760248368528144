use rustc_hash::FxHashMap;
use slotmap::{Key, SlotMap};
use uuid::Uuid;

/// Typed arena for one asset kind.
///
/// The rendering core is single-threaded, so storage is plain `&mut` access:
/// every mesh holding the same handle sees a mutation immediately.
pub struct AssetStorage<H: Key, T> {
    map: SlotMap<H, T>,
    lookup: FxHashMap<Uuid, H>,
}

impl<H: Key, T> Default for AssetStorage<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Key, T> AssetStorage<H, T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: SlotMap::default(),
            lookup: FxHashMap::default(),
        }
    }

    pub fn add(&mut self, asset: impl Into<T>) -> H {
        self.map.insert(asset.into())
    }

    /// Adds an asset keyed by UUID; a second add with the same UUID returns the
    /// existing handle and drops the new value.
    pub fn add_with_uuid(&mut self, uuid: Uuid, asset: impl Into<T>) -> H {
        if let Some(&handle) = self.lookup.get(&uuid)
            && self.map.contains_key(handle)
        {
            return handle;
        }
        let handle = self.map.insert(asset.into());
        self.lookup.insert(uuid, handle);
        handle
    }

    #[must_use]
    pub fn get(&self, handle: H) -> Option<&T> {
        self.map.get(handle)
    }

    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.map.get_mut(handle)
    }

    #[must_use]
    pub fn get_handle_by_uuid(&self, uuid: &Uuid) -> Option<H> {
        self.lookup
            .get(uuid)
            .copied()
            .filter(|&h| self.map.contains_key(h))
    }

    #[must_use]
    pub fn contains(&self, handle: H) -> bool {
        self.map.contains_key(handle)
    }

    /// Removes the asset. GPU-side resources are released by the renderer's
    /// `dispose_*` calls, not here.
    pub fn remove(&mut self, handle: H) -> Option<T> {
        let removed = self.map.remove(handle);
        if removed.is_some() {
            self.lookup.retain(|_, h| *h != handle);
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.map.iter()
    }
}
