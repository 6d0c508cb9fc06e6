//! Active stream tracking.
//!
//! Every upgraded socket registers itself in a `DashMap`-backed
//! [`StreamRegistry`] for as long as it lives. The returned [`StreamEntry`]
//! removes the record when dropped, including on panic unwind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sieve_core::WireFormat;

use crate::service::StreamMode;

/// Unique identifier for a stream, assigned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub mode: StreamMode,
    pub format: WireFormat,
    pub opened_at: Instant,
}

#[derive(Debug)]
pub struct StreamRegistry {
    streams: DashMap<StreamId, StreamInfo>,
    next_id: AtomicU64,
}

impl StreamRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Records a new stream. The record lives as long as the returned entry.
    #[must_use]
    pub fn open(self: &Arc<Self>, mode: StreamMode, format: WireFormat) -> StreamEntry {
        let id = StreamId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.streams.insert(
            id,
            StreamInfo {
                mode,
                format,
                opened_at: Instant::now(),
            },
        );
        metrics::gauge!("sieve_open_streams").increment(1.0);
        StreamEntry {
            id,
            registry: Arc::clone(self),
        }
    }

    /// Number of open streams.
    #[must_use]
    pub fn count(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn count_by_mode(&self, mode: StreamMode) -> usize {
        self.streams
            .iter()
            .filter(|entry| entry.value().mode == mode)
            .count()
    }

    #[must_use]
    pub fn count_by_format(&self, format: WireFormat) -> usize {
        self.streams
            .iter()
            .filter(|entry| entry.value().format == format)
            .count()
    }

    /// Age of the longest-running open stream.
    #[must_use]
    pub fn oldest_age(&self) -> Option<Duration> {
        self.streams
            .iter()
            .map(|entry| entry.value().opened_at.elapsed())
            .max()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration of one open stream.
#[derive(Debug)]
pub struct StreamEntry {
    id: StreamId,
    registry: Arc<StreamRegistry>,
}

impl StreamEntry {
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }
}

impl Drop for StreamEntry {
    fn drop(&mut self) {
        if self.registry.streams.remove(&self.id).is_some() {
            metrics::gauge!("sieve_open_streams").decrement(1.0);
        }
    }
}
