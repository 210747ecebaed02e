use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Local clock offset against the exchange clock, applied to signing
/// timestamps when auto timestamping is enabled
///
/// Fetching the server time is exchange specific; the exchange client checks
/// [`needs_update`](Self::needs_update) and feeds the result into
/// [`update`](Self::update).
#[derive(Debug)]
pub struct TimeSyncState {
    enabled: bool,
    recalculation_interval: Duration,
    inner: Mutex<SyncInner>,
}

#[derive(Debug, Default)]
struct SyncInner {
    offset: chrono::Duration,
    last_sync: Option<Instant>,
}

impl TimeSyncState {
    pub fn new(enabled: bool, recalculation_interval: Duration) -> Self {
        Self {
            enabled,
            recalculation_interval,
            inner: Mutex::new(SyncInner::default()),
        }
    }

    pub fn needs_update(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .last_sync
            .map_or(true, |at| at.elapsed() >= self.recalculation_interval)
    }

    /// Record the server time observed at `local_time`
    pub fn update(&self, server_time: DateTime<Utc>, local_time: DateTime<Utc>) {
        let offset = server_time - local_time;
        debug!(offset_ms = offset.num_milliseconds(), "Updated time offset");
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.offset = offset;
        inner.last_sync = Some(Instant::now());
    }

    pub fn offset(&self) -> chrono::Duration {
        if !self.enabled {
            return chrono::Duration::zero();
        }
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .offset
    }

    /// Current exchange time in milliseconds
    pub fn timestamp_ms(&self) -> u64 {
        (Utc::now() + self.offset()).timestamp_millis().max(0) as u64
    }
}
