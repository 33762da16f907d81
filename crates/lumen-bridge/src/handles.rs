//! Integer handles for host-only objects.
//!
//! The guest cannot hold host references, so every graphics object it sees is
//! a small integer. Handles are allocated from a monotonically increasing
//! counter and never reused within one table. `0` is reserved as the
//! "no object" sentinel and is never handed out.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

/// An opaque integer standing in for a host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(u32);

impl Handle {
    /// The "no object" sentinel.
    pub const NULL: Handle = Handle(0);

    /// Interpret a raw value received from the guest.
    pub fn from_raw(raw: u32) -> Self {
        Handle(raw)
    }

    /// The raw value to hand back to the guest.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is the sentinel.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Maps handles to host objects.
///
/// A reverse index from object to live handles keeps [`HandleTable::intern`]
/// constant-time.
#[derive(Debug)]
pub struct HandleTable<T> {
    objects: HashMap<Handle, T>,
    index: HashMap<T, BTreeSet<Handle>>,
    last: u32,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            index: HashMap::new(),
            last: 0,
        }
    }

    /// Look up the object stored under `handle`.
    pub fn resolve(&self, handle: Handle) -> Option<&T> {
        if handle.is_null() {
            return None;
        }
        self.objects.get(&handle)
    }

    /// Whether `handle` is live.
    pub fn contains(&self, handle: Handle) -> bool {
        self.resolve(handle).is_some()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no handle is live.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl<T: Clone + Eq + Hash> HandleTable<T> {
    /// Store `object` under a fresh handle.
    ///
    /// Returns [`Handle::NULL`] once the counter is exhausted.
    pub fn allocate(&mut self, object: T) -> Handle {
        let Some(next) = self.last.checked_add(1) else {
            tracing::error!("handle space exhausted");
            return Handle::NULL;
        };
        self.last = next;
        let handle = Handle(next);
        self.index.entry(object.clone()).or_default().insert(handle);
        self.objects.insert(handle, object);
        handle
    }

    /// Remove and return the object stored under `handle`.
    pub fn release(&mut self, handle: Handle) -> Option<T> {
        if handle.is_null() {
            return None;
        }
        let object = self.objects.remove(&handle)?;
        if let Some(handles) = self.index.get_mut(&object) {
            handles.remove(&handle);
            if handles.is_empty() {
                self.index.remove(&object);
            }
        }
        Some(object)
    }

    /// Find the oldest live handle of an object equal to `object`.
    pub fn find(&self, object: &T) -> Option<Handle> {
        self.index.get(object).and_then(|handles| handles.first().copied())
    }

    /// Return the handle of an equal live object, allocating one if needed.
    pub fn intern(&mut self, object: T) -> Handle {
        match self.find(&object) {
            Some(handle) => handle,
            None => self.allocate(object),
        }
    }
}
