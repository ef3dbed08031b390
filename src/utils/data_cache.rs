use std::{
    collections::{HashMap, hash_map::Entry},
    time::Instant,
};

/// A refcounted payload. Once `refs` reaches zero the entry carries an
/// expiry and is dropped by the next `drain_expired` past it.
#[derive(Debug)]
pub struct Cached<T> {
    pub payload: T,
    pub refs: usize,
    pub expires_at: Option<Instant>,
}

#[derive(Debug)]
pub struct DataCache<T> {
    data: HashMap<String, Cached<T>>,
}

impl<T> Default for DataCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DataCache<T> {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Cached<T>> {
        self.data.get(key)
    }

    /// Bumps the refcount of `key`, creating the payload when it is missing.
    /// A pending expiry is cancelled.
    pub fn insert_or_increment<F, E>(&mut self, key: &str, create: F) -> Result<&mut Cached<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let cached = match self.data.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                let cached = occupied.into_mut();
                cached.refs += 1;
                cached
            }
            Entry::Vacant(vacant) => vacant.insert(Cached {
                payload: create()?,
                refs: 1,
                expires_at: None,
            }),
        };
        cached.expires_at = None;
        Ok(cached)
    }

    /// Drops one reference; the last one schedules expiry at `expires_at`.
    pub fn decrement(&mut self, key: &str, expires_at: Instant) -> Option<&mut Cached<T>> {
        let cached = self.data.get_mut(key)?;
        cached.refs = cached.refs.saturating_sub(1);
        if cached.refs == 0 {
            cached.expires_at = Some(expires_at);
        }
        Some(cached)
    }

    /// Takes `key` out right away if nothing references it.
    pub fn remove_unreferenced(&mut self, key: &str) -> Option<T> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(occupied) if occupied.get().refs == 0 => Some(occupied.remove().payload),
            _ => None,
        }
    }

    pub fn drain_expired(&mut self, now: Instant) -> Vec<(String, T)> {
        let (expired, live): (HashMap<_, _>, HashMap<_, _>) = std::mem::take(&mut self.data)
            .into_iter()
            .partition(|(_, cached)| cached.expires_at.is_some_and(|at| at <= now));
        self.data = live;
        expired
            .into_iter()
            .map(|(key, cached)| (key, cached.payload))
            .collect()
    }

    /// Removes every entry regardless of refcount.
    pub fn drain_all(&mut self) -> Vec<(String, T)> {
        self.data
            .drain()
            .map(|(key, cached)| (key, cached.payload))
            .collect()
    }
}
