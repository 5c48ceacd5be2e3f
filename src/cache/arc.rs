//! Adaptive Replacement Cache with per-entry expiry
//!
//! Four lists: `t1` holds entries seen once recently, `t2` entries seen at
//! least twice, `b1`/`b2` are ghost lists of keys recently evicted from
//! `t1`/`t2`. `p` is the adaptive target size of `t1`. Hits in the ghost
//! lists shift `p` towards the list that would have kept the entry.
//!
//! Expired entries are dropped lazily by [`ArcCache::get`].

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// LRU ordered list; the smallest tick is the oldest entry
struct LruList<K, V> {
    entries: HashMap<K, (u64, V)>,
    order: BTreeMap<u64, K>,
    tick: u64,
}

impl<K: Hash + Eq + Clone, V> LruList<K, V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(_, v)| v)
    }

    /// Mark `key` most recently used
    fn touch(&mut self, key: &K) -> Option<&V> {
        self.tick += 1;
        let tick = self.tick;
        let (at, value) = self.entries.get_mut(key)?;
        self.order.remove(at);
        *at = tick;
        self.order.insert(tick, key.clone());
        Some(value)
    }

    fn push(&mut self, key: K, value: V) {
        self.tick += 1;
        if let Some((at, _)) = self.entries.get(&key) {
            self.order.remove(at);
        }
        self.order.insert(self.tick, key.clone());
        self.entries.insert(key, (self.tick, value));
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let (at, value) = self.entries.remove(key)?;
        self.order.remove(&at);
        Some(value)
    }

    fn pop_oldest(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let (_, value) = self.entries.remove(&key)?;
        Some((key, value))
    }
}

struct Entry<V> {
    value: V,
    expires_at: Option<DateTime<Utc>>,
}

impl<V> Entry<V> {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct State<K, V> {
    size: usize,
    p: usize,
    t1: LruList<K, Entry<V>>,
    t2: LruList<K, Entry<V>>,
    b1: LruList<K, ()>,
    b2: LruList<K, ()>,
}

impl<K: Hash + Eq + Clone, V> State<K, V> {
    /// Evict one resident entry into its ghost list. Falls back to `t1`
    /// when `t2` is empty so a full cache always frees a slot.
    fn replace(&mut self, b2_contains_key: bool) {
        let t1_len = self.t1.len();
        let from_t1 = t1_len > 0
            && (self.t2.len() == 0
                || t1_len > self.p
                || (t1_len == self.p && b2_contains_key));
        if from_t1 {
            if let Some((key, _)) = self.t1.pop_oldest() {
                Self::push_ghost(&mut self.b1, key, self.size);
            }
        } else if let Some((key, _)) = self.t2.pop_oldest() {
            Self::push_ghost(&mut self.b2, key, self.size);
        }
    }

    fn push_ghost(list: &mut LruList<K, ()>, key: K, size: usize) {
        list.push(key, ());
        if list.len() > size {
            list.pop_oldest();
        }
    }

    fn resident(&self) -> usize {
        self.t1.len() + self.t2.len()
    }
}

/// Thread-safe ARC of bounded capacity
pub struct ArcCache<K, V> {
    state: Mutex<State<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> ArcCache<K, V> {
    /// Cache holding at most `size` entries (at least one)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            state: Mutex::new(State {
                size,
                p: 0,
                t1: LruList::new(),
                t2: LruList::new(),
                b1: LruList::new(),
                b2: LruList::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().size
    }

    /// Number of resident entries, expired ones included until next access
    pub fn len(&self) -> usize {
        self.state.lock().resident()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `key`, dropping it if it expired at or before `now`
    pub fn get(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(entry) = state.t1.peek(key) {
            if entry.expired(now) {
                state.t1.remove(key);
                return None;
            }
            let entry = state.t1.remove(key)?;
            let value = entry.value.clone();
            state.t2.push(key.clone(), entry);
            return Some(value);
        }

        let expired = state.t2.peek(key)?.expired(now);
        if expired {
            state.t2.remove(key);
            return None;
        }
        state.t2.touch(key).map(|entry| entry.value.clone())
    }

    /// Insert or replace `key`; `expires_at = None` never expires
    pub fn insert(&self, key: K, value: V, expires_at: Option<DateTime<Utc>>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let entry = Entry { value, expires_at };

        if state.t1.remove(&key).is_some() || state.t2.contains(&key) {
            state.t2.push(key, entry);
            return;
        }

        if state.b1.contains(&key) {
            let (b1_len, b2_len) = (state.b1.len(), state.b2.len());
            let delta = if b2_len > b1_len { b2_len / b1_len } else { 1 };
            state.p = (state.p + delta).min(state.size);
            if state.resident() >= state.size {
                state.replace(false);
            }
            state.b1.remove(&key);
            state.t2.push(key, entry);
            return;
        }

        if state.b2.contains(&key) {
            let (b1_len, b2_len) = (state.b1.len(), state.b2.len());
            let delta = if b1_len > b2_len { b1_len / b2_len } else { 1 };
            state.p = state.p.saturating_sub(delta);
            if state.resident() >= state.size {
                state.replace(true);
            }
            state.b2.remove(&key);
            state.t2.push(key, entry);
            return;
        }

        if state.resident() >= state.size {
            state.replace(false);
        }
        if state.b1.len() > state.size - state.p {
            state.b1.pop_oldest();
        }
        if state.b2.len() > state.p {
            state.b2.pop_oldest();
        }
        state.t1.push(key, entry);
    }

    pub fn remove(&self, key: &K) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.t1.remove(key).is_some() || state.t2.remove(key).is_some() {
            return;
        }
        if state.b1.remove(key).is_none() {
            state.b2.remove(key);
        }
    }
}
