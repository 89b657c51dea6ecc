//! Bounded, deadline-ordered queue of pending viseme events

use std::cmp::Ordering;

use tracing::debug;
use visage_rig::VisemeClass;

use crate::clock::ClockSync;

/// A viseme event waiting for its local playback deadline.
#[derive(Debug, Clone)]
pub struct VisemeEvent {
    /// Ingestion id, `<utterance>#<sequence>`.
    pub id: String,
    /// Phoneme class to display.
    pub class: VisemeClass,
    /// Timestamp on the remote authoring clock, in ms.
    pub authoring_ms: f64,
    /// Local playback deadline; None while no clock sample exists.
    pub deadline_ms: Option<f64>,
    /// Utterance this event belongs to.
    pub utterance: String,
}

/// Sort key: scheduled events ascending by deadline, unscheduled last.
fn compare(a: &VisemeEvent, b: &VisemeEvent) -> Ordering {
    match (a.deadline_ms, b.deadline_ms) {
        (Some(da), Some(db)) => da.partial_cmp(&db).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Bounded, time-ordered event queue.
///
/// Overflow is handled by evicting the oldest fraction of the queue in one
/// cut instead of thrashing one event at a time: after a network burst,
/// stale mouth shapes are worse than skipping straight to recent ones.
/// Dropped events are counted, never retried.
#[derive(Debug)]
pub struct EventQueue {
    events: Vec<VisemeEvent>,
    capacity: usize,
    eviction_fraction: f32,
    evicted: u64,
    skipped_stale: u64,
}

impl EventQueue {
    pub fn new(capacity: usize, eviction_fraction: f32) -> Self {
        Self {
            events: Vec::with_capacity(capacity.max(2)),
            capacity: capacity.max(2),
            eviction_fraction: eviction_fraction.clamp(0.1, 0.9),
            evicted: 0,
            skipped_stale: 0,
        }
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Deadline of the next scheduled event, if any.
    pub fn next_deadline(&self) -> Option<f64> {
        self.events.first().and_then(|e| e.deadline_ms)
    }

    /// Insert an event in deadline order, evicting on overflow.
    pub fn push(&mut self, event: VisemeEvent) {
        if self.events.len() >= self.capacity {
            let cut = ((self.events.len() as f32 * self.eviction_fraction).ceil() as usize)
                .clamp(1, self.events.len());
            self.events.drain(..cut);
            self.evicted += cut as u64;
            debug!(cut, remaining = self.events.len(), "queue overflow, evicted oldest events");
        }

        let at = self
            .events
            .partition_point(|existing| compare(existing, &event) != Ordering::Greater);
        self.events.insert(at, event);
    }

    /// The head event if its deadline has passed. Unscheduled events are
    /// never due.
    pub fn peek_due(&self, now_ms: f64) -> Option<&VisemeEvent> {
        self.events
            .first()
            .filter(|e| e.deadline_ms.is_some_and(|d| d <= now_ms))
    }

    /// Remove and return the head event.
    pub fn pop(&mut self) -> Option<VisemeEvent> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.events.remove(0))
        }
    }

    /// Drain every due event and return the most recent one, counting the
    /// rest as skipped. Coalescing a burst this way keeps the mouth on the
    /// newest shape instead of flickering through stale ones.
    pub fn pop_latest_due(&mut self, now_ms: f64) -> Option<VisemeEvent> {
        let mut latest = None;
        while self.peek_due(now_ms).is_some() {
            if latest.is_some() {
                self.skipped_stale += 1;
            }
            latest = self.pop();
        }
        latest
    }

    /// Recompute every deadline from the clock and restore ordering.
    /// Must be called whenever the clock accepts a new sample.
    pub fn reschedule_all(&mut self, clock: &ClockSync) {
        for event in &mut self.events {
            event.deadline_ms = clock.to_local_deadline(event.authoring_ms);
        }
        self.events.sort_by(compare);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Events dropped by overflow eviction so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Due events skipped by burst coalescing so far.
    pub fn skipped_stale(&self) -> u64 {
        self.skipped_stale
    }
}
