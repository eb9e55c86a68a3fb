//! Lazily filled, explicitly invalidated caches.

use crate::types::Direction;

/// Where a [`CacheState`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Never loaded.
    NotLoaded,
    /// Loaded and current as of the load.
    Loaded,
    /// Was loaded, then dropped; the next read reloads.
    Invalidated,
}

/// A lazily loaded value that can be dropped and reloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheState<T> {
    value: Option<T>,
    invalidated: bool,
}

impl<T> CacheState<T> {
    /// Returns the lifecycle status.
    pub fn status(&self) -> CacheStatus {
        match (&self.value, self.invalidated) {
            (Some(_), _) => CacheStatus::Loaded,
            (None, true) => CacheStatus::Invalidated,
            (None, false) => CacheStatus::NotLoaded,
        }
    }

    /// Returns `true` if the cache holds a value.
    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }

    /// Returns the cached value, if loaded.
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Returns the cached value, running `load` first unless loaded.
    ///
    /// A failed load leaves the state unchanged.
    pub fn get_or_try_load<E>(&mut self, load: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        let value = match self.value.take() {
            Some(value) => value,
            None => load()?,
        };
        self.invalidated = false;
        Ok(self.value.insert(value))
    }

    /// Drops a loaded value. A cache that was never loaded stays `NotLoaded`.
    pub fn invalidate(&mut self) {
        if self.value.take().is_some() {
            self.invalidated = true;
        }
    }
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self {
            value: None,
            invalidated: false,
        }
    }
}

/// One value per [`Direction`].
#[derive(Debug, Clone, Default)]
pub struct PerDirection<T> {
    outgoing: T,
    incoming: T,
    both: T,
}

impl<T> PerDirection<T> {
    /// Returns the value for `direction`.
    pub fn get(&self, direction: Direction) -> &T {
        match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
            Direction::Both => &self.both,
        }
    }

    /// Returns the value for `direction` mutably.
    pub fn get_mut(&mut self, direction: Direction) -> &mut T {
        match direction {
            Direction::Outgoing => &mut self.outgoing,
            Direction::Incoming => &mut self.incoming,
            Direction::Both => &mut self.both,
        }
    }

    /// Applies `f` to every direction.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        f(&mut self.outgoing);
        f(&mut self.incoming);
        f(&mut self.both);
    }
}
