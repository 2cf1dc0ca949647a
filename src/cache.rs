use std::time::Duration;
use std::time::Instant;

/// Memoises one loaded value for a fixed time-to-live.
///
/// The cache only saves round-trips to the store; it gives no isolation.
/// Writers call [`TtlCache::invalidate`] so the next read goes to the store.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    entry: Option<(Instant, T)>,
}

impl<T> TtlCache<T> {
    pub fn new(ttl: Duration) -> TtlCache<T> {
        TtlCache { ttl, entry: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached value if it is younger than the time-to-live.
    pub fn get(&self) -> Option<&T> {
        self.get_at(Instant::now())
    }

    fn get_at(&self, now: Instant) -> Option<&T> {
        match &self.entry {
            Some((loaded_at, value)) if now.saturating_duration_since(*loaded_at) < self.ttl => Some(value),
            _ => None,
        }
    }

    /// Returns the cached value or loads, stores and returns a new one.
    /// A failed load leaves the cache empty.
    pub fn get_or_try_load<E>(&mut self, load: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        let now = Instant::now();
        let fresh = self.get_at(now).is_some();
        let entry = match self.entry.take() {
            Some(entry) if fresh => {
                log::trace!("cache hit");
                entry
            }
            _ => (now, load()?),
        };
        let (_, value) = self.entry.insert(entry);
        Ok(value)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
