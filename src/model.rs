use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("session {0} already registered")]
    AlreadyRegistered(SessionId),
    #[error("session {0} not registered")]
    UnknownSession(SessionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Hands out process-unique session ids, starting at 1.
#[derive(Debug)]
pub struct SessionIds {
    next: AtomicU64,
}

impl Default for SessionIds {
    fn default() -> Self {
        SessionIds {
            next: AtomicU64::new(1),
        }
    }
}

impl SessionIds {
    pub fn allocate(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Timestamp to price. A later insert at the same timestamp replaces the price.
type Samples = BTreeMap<i32, i32>;

/// Per-session sample sets behind a single lock.
///
/// Every operation takes the lock for its whole duration, so all operations
/// on all sessions are serialized. A session's own inserts and queries are
/// therefore observed in the order its connection issued them.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, Samples>>,
}

impl SessionStore {
    pub fn register(&self, id: SessionId) -> Result<(), StoreError> {
        let mut sessions = self.lock();
        if sessions.contains_key(&id) {
            return Err(StoreError::AlreadyRegistered(id));
        }
        sessions.insert(id, Samples::new());
        Ok(())
    }

    pub fn unregister(&self, id: SessionId) {
        self.lock().remove(&id);
    }

    pub fn insert(&self, id: SessionId, timestamp: i32, price: i32) -> Result<(), StoreError> {
        let mut sessions = self.lock();
        let samples = sessions
            .get_mut(&id)
            .ok_or(StoreError::UnknownSession(id))?;
        samples.insert(timestamp, price);
        Ok(())
    }

    /// Prices with `min_time <= timestamp <= max_time`, ascending by timestamp.
    pub fn query_range(
        &self,
        id: SessionId,
        min_time: i32,
        max_time: i32,
    ) -> Result<Vec<i32>, StoreError> {
        let sessions = self.lock();
        let samples = sessions.get(&id).ok_or(StoreError::UnknownSession(id))?;
        Ok(prices_within(samples, min_time, max_time).collect())
    }

    /// Integer mean of the prices in range, truncated toward zero. 0 for an
    /// empty range.
    pub fn query_average(
        &self,
        id: SessionId,
        min_time: i32,
        max_time: i32,
    ) -> Result<i32, StoreError> {
        let sessions = self.lock();
        let samples = sessions.get(&id).ok_or(StoreError::UnknownSession(id))?;

        let (sum, count) = prices_within(samples, min_time, max_time)
            .fold((0_i64, 0_i64), |(sum, count), price| {
                (sum + price as i64, count + 1)
            });

        if count == 0 {
            return Ok(0);
        }
        // The mean of i32 values always lies within the i32 range.
        Ok((sum / count) as i32)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    // Nothing panics while holding the lock with the map half-updated, so a
    // poisoned lock still guards a consistent map.
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Samples>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn prices_within(
    samples: &Samples,
    min_time: i32,
    max_time: i32,
) -> impl Iterator<Item = i32> + '_ {
    // BTreeMap::range panics on an inverted range.
    let range = (min_time <= max_time).then(|| samples.range(min_time..=max_time));
    range.into_iter().flatten().map(|(_, price)| *price)
}
