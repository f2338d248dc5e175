//! Compute-once property cache shared by the graph and cluster views
//!
//! Each view owns one [`PropertyCache`] and reads its derived values through
//! [`PropertyCache::get_or_compute`] with a `&'static str` key declared next to
//! the view. The first access runs the thunk and stores the result; every later
//! access returns the stored value. Entries are never invalidated because the
//! underlying tables are immutable once a view exists.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Cache key: property name plus the type stored under it
type Slot = (&'static str, TypeId);

/// Memoized derived values of a single immutable entity.
///
/// Not `Sync`: one instance is populated by a single owner.
#[derive(Default)]
pub struct PropertyCache {
    slots: RefCell<HashMap<Slot, Rc<dyn Any>>>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value stored under `key`, computing and storing it on first access
    pub fn get_or_compute<T, F>(&self, key: &'static str, compute: F) -> Rc<T>
    where
        T: 'static,
        F: FnOnce() -> T,
    {
        if let Some(value) = self.lookup::<T>(key) {
            return value;
        }

        log::trace!("property cache miss: {}", key);
        self.store(key, compute())
    }

    /// Fallible variant of [`get_or_compute`](Self::get_or_compute).
    ///
    /// An `Err` from `compute` is returned as-is and nothing is stored, so the
    /// next access runs `compute` again.
    pub fn try_get_or_compute<T, E, F>(&self, key: &'static str, compute: F) -> Result<Rc<T>, E>
    where
        T: 'static,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.lookup::<T>(key) {
            return Ok(value);
        }

        log::trace!("property cache miss: {}", key);
        let value = compute()?;
        Ok(self.store(key, value))
    }

    /// Whether a value of type `T` is already stored under `key`
    pub fn contains<T: 'static>(&self, key: &'static str) -> bool {
        self.slots.borrow().contains_key(&(key, TypeId::of::<T>()))
    }

    /// Number of stored properties
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    fn lookup<T: 'static>(&self, key: &'static str) -> Option<Rc<T>> {
        let slots = self.slots.borrow();
        let value = slots.get(&(key, TypeId::of::<T>()))?.clone();
        log::trace!("property cache hit: {}", key);
        value.downcast::<T>().ok()
    }

    // The borrow is only taken after `compute` has returned, so thunks may read
    // other keys of the same cache. If such a nested read already stored this
    // key, the first stored value wins.
    fn store<T: 'static>(&self, key: &'static str, value: T) -> Rc<T> {
        let slot = (key, TypeId::of::<T>());
        let mut slots = self.slots.borrow_mut();
        if let Some(existing) = slots.get(&slot).cloned().and_then(|v| v.downcast::<T>().ok()) {
            return existing;
        }

        let value = Rc::new(value);
        slots.insert(slot, value.clone() as Rc<dyn Any>);
        value
    }
}

impl std::fmt::Debug for PropertyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&'static str> = self.slots.borrow().keys().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        f.debug_struct("PropertyCache").field("keys", &keys).finish()
    }
}
