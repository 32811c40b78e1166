/// Read-Side Caching
///
/// In-memory LRU caches for frequently decoded index values. Headers
/// and event buckets dominate query traffic and are immutable once a
/// height is committed, so they cache indefinitely; eviction is purely
/// capacity-driven. The cache is read-through and never observable in
/// results.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::types::{Event, Header, Height};

pub struct ReadCache {
    /// Decoded headers by height.
    headers: Mutex<LruCache<Height, Header>>,
    /// Decoded event buckets by (height, kind hash).
    events: Mutex<LruCache<(Height, u64), Vec<Event>>>,
}

impl ReadCache {
    /// Default capacities: 1000 headers (~100KB) and 1000 event
    /// buckets (payload-dependent, typically a few MB).
    pub fn new() -> Self {
        Self::with_capacities(1000, 1000)
    }

    pub fn with_capacities(headers_cap: usize, events_cap: usize) -> Self {
        Self {
            headers: Mutex::new(LruCache::new(
                NonZeroUsize::new(headers_cap.max(1)).unwrap(),
            )),
            events: Mutex::new(LruCache::new(
                NonZeroUsize::new(events_cap.max(1)).unwrap(),
            )),
        }
    }

    pub fn get_header(&self, height: Height) -> Option<Header> {
        self.headers.lock().unwrap().get(&height).cloned()
    }

    pub fn put_header(&self, height: Height, header: Header) {
        self.headers.lock().unwrap().put(height, header);
    }

    pub fn get_events(&self, height: Height, kind_hash: u64) -> Option<Vec<Event>> {
        self.events.lock().unwrap().get(&(height, kind_hash)).cloned()
    }

    pub fn put_events(&self, height: Height, kind_hash: u64, bucket: Vec<Event>) {
        self.events.lock().unwrap().put((height, kind_hash), bucket);
    }
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new()
    }
}
