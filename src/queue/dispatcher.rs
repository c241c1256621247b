//! Scheduler core.
//!
//! Keeps a FIFO of unit ids waiting for a slot and the set of busy slots, and
//! hands out work one unit per free slot. A slot is refilled as soon as its
//! completion event is applied, so no slot idles while work is queued and no
//! slot ever holds two jobs.

use super::job::{StatusKind, UnitId, UnitStatus};
use super::payload::PayloadCache;
use super::pool::JobSink;
use super::registry::Registry;
use super::worker::{Job, Outcome, PoolEvent};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const MISSING_PAYLOAD_MESSAGE: &str = "File not found";

/// A unit currently running on a slot
#[derive(Debug, Clone)]
pub struct InFlight {
    pub id: UnitId,
    pub attempt: u64,
    pub started_at: Instant,
}

/// What applying a pool event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// The unit's status was updated and its slot refilled
    Applied,
    /// The slot was freed but the unit no longer exists
    Orphaned,
    /// The slot is not running this dispatch (late event after reset or
    /// reclaim, including one for an earlier run of the same unit)
    Stale,
}

pub struct Dispatcher {
    pending: VecDeque<UnitId>,
    queued: HashSet<UnitId>,
    slots: Vec<Option<InFlight>>,
    quality: u8,
    next_attempt: u64,
}

impl Dispatcher {
    pub fn new(slot_count: usize, quality: u8) -> Self {
        Self {
            pending: VecDeque::new(),
            queued: HashSet::new(),
            slots: vec![None; slot_count.max(1)],
            quality,
            next_attempt: 0,
        }
    }

    pub fn set_quality(&mut self, quality: u8) {
        self.quality = quality.min(100);
    }

    /// Append ids in submission order. Ids already waiting are not queued twice.
    /// Returns how many were added.
    pub fn enqueue_batch(&mut self, ids: impl IntoIterator<Item = UnitId>) -> usize {
        let mut added = 0;
        for id in ids {
            if self.queued.insert(id.clone()) {
                self.pending.push_back(id);
                added += 1;
            }
        }
        debug!("Enqueued {} units, {} waiting", added, self.queued.len());
        added
    }

    /// Drop a waiting id; it is skipped when reached. Slot state is untouched.
    pub fn discard(&mut self, id: &UnitId) -> bool {
        self.queued.remove(id)
    }

    /// Give every idle slot one unit from the front of the queue
    pub fn fill_idle_slots<S: JobSink>(
        &mut self,
        registry: &mut Registry,
        payloads: &PayloadCache,
        sink: &mut S,
    ) {
        for slot in 0..self.slots.len() {
            if self.slots[slot].is_none() {
                self.fill_slot(slot, registry, payloads, sink);
            }
        }
    }

    /// Pop ids until one can be started on `slot`. Returns whether a job was
    /// submitted.
    pub fn fill_slot<S: JobSink>(
        &mut self,
        slot: usize,
        registry: &mut Registry,
        payloads: &PayloadCache,
        sink: &mut S,
    ) -> bool {
        if self.slots.get(slot).is_none_or(|s| s.is_some()) {
            return false;
        }

        while let Some(id) = self.pending.pop_front() {
            if !self.queued.remove(&id) {
                // Removed while waiting
                continue;
            }

            let Some(unit) = registry.get(&id) else {
                continue;
            };
            if !matches!(unit.kind(), StatusKind::Pending | StatusKind::Error) {
                warn!(%id, status = %unit.kind(), "Skipping queued unit that is not dispatchable");
                continue;
            }

            let Some(payload) = payloads.get(&id) else {
                warn!(%id, "Payload missing for queued unit");
                registry.update_status(&id, UnitStatus::error(MISSING_PAYLOAD_MESSAGE));
                continue;
            };

            let attempt = self.next_attempt;
            self.next_attempt += 1;

            registry.update_status(&id, UnitStatus::Converting);
            self.slots[slot] = Some(InFlight {
                id: id.clone(),
                attempt,
                started_at: Instant::now(),
            });
            debug!(slot, %id, attempt, "Dispatching unit");
            sink.submit(
                slot,
                Job {
                    id,
                    attempt,
                    payload,
                    quality: self.quality,
                },
            );
            return true;
        }
        false
    }

    /// Apply a completion: record the outcome, free the slot, refill it
    pub fn handle_event<S: JobSink>(
        &mut self,
        event: PoolEvent,
        registry: &mut Registry,
        payloads: &PayloadCache,
        sink: &mut S,
    ) -> EventDisposition {
        let PoolEvent {
            id,
            attempt,
            slot,
            outcome,
        } = event;

        let running_here = self
            .slots
            .get(slot)
            .and_then(|s| s.as_ref())
            .is_some_and(|f| f.attempt == attempt && f.id == id);
        if !running_here {
            debug!(slot, %id, attempt, "Ignoring stale pool event");
            return EventDisposition::Stale;
        }

        let status = match outcome {
            Outcome::Done { output, size } => {
                info!(%id, size, "Conversion done");
                UnitStatus::Done { output, size }
            }
            Outcome::Error(message) => {
                warn!(%id, error = %message, "Conversion failed");
                UnitStatus::Error { message }
            }
        };
        let applied = registry.update_status(&id, status);

        self.slots[slot] = None;
        self.fill_slot(slot, registry, payloads, sink);

        if applied {
            EventDisposition::Applied
        } else {
            EventDisposition::Orphaned
        }
    }

    /// Free a slot without an event, returning the unit it was running
    pub fn release_slot(&mut self, slot: usize) -> Option<UnitId> {
        self.slots.get_mut(slot)?.take().map(|f| f.id)
    }

    /// Slots whose job has been running for at least `timeout`
    pub fn stuck_slots(&self, timeout: Duration, now: Instant) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, s)| {
                s.as_ref()
                    .filter(|f| now.saturating_duration_since(f.started_at) >= timeout)
                    .map(|_| slot)
            })
            .collect()
    }

    /// Forget all queued work and mark every slot idle. Attempt numbers keep
    /// counting so events from before the reset never match.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.queued.clear();
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Nothing waiting and nothing running
    pub fn is_batch_complete(&self) -> bool {
        self.queued.is_empty() && self.busy_slots() == 0
    }

    pub fn queue_remaining(&self) -> usize {
        self.queued.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn busy_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_slot_busy(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|s| s.is_some())
    }

    pub fn in_flight(&self, slot: usize) -> Option<&UnitId> {
        self.slots.get(slot)?.as_ref().map(|f| &f.id)
    }

    pub fn started_at(&self, slot: usize) -> Option<Instant> {
        self.slots.get(slot)?.as_ref().map(|f| f.started_at)
    }

    /// Dispatch number of the job running on `slot`
    pub fn attempt(&self, slot: usize) -> Option<u64> {
        self.slots.get(slot)?.as_ref().map(|f| f.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::job::{MimeType, WorkUnit};
    use bytes::Bytes;

    /// Records submissions instead of running them
    struct RecordingSink {
        slots: usize,
        submitted: Vec<(usize, UnitId)>,
        attempts: Vec<u64>,
    }

    impl RecordingSink {
        fn new(slots: usize) -> Self {
            Self {
                slots,
                submitted: Vec::new(),
                attempts: Vec::new(),
            }
        }
    }

    impl JobSink for RecordingSink {
        fn slot_count(&self) -> usize {
            self.slots
        }

        fn submit(&mut self, slot: usize, job: Job) {
            self.submitted.push((slot, job.id));
            self.attempts.push(job.attempt);
        }
    }

    struct Fixture {
        registry: Registry,
        payloads: PayloadCache,
        dispatcher: Dispatcher,
        sink: RecordingSink,
    }

    impl Fixture {
        fn new(slots: usize) -> Self {
            Self {
                registry: Registry::new(),
                payloads: PayloadCache::new(),
                dispatcher: Dispatcher::new(slots, 80),
                sink: RecordingSink::new(slots),
            }
        }

        fn add(&mut self, name: &str) -> UnitId {
            let unit = WorkUnit::new(name, MimeType::Png, 4);
            let id = unit.id.clone();
            self.payloads.insert(id.clone(), Bytes::from_static(b"data"));
            self.registry.add([unit]);
            id
        }

        fn fill(&mut self) {
            self.dispatcher
                .fill_idle_slots(&mut self.registry, &self.payloads, &mut self.sink);
        }

        /// Attempt number of the most recent submission of `id`
        fn last_attempt(&self, id: &UnitId) -> u64 {
            let index = self
                .sink
                .submitted
                .iter()
                .rposition(|(_, submitted)| submitted == id)
                .unwrap();
            self.sink.attempts[index]
        }

        fn complete(&mut self, id: &UnitId, slot: usize, outcome: Outcome) -> EventDisposition {
            let attempt = self.last_attempt(id);
            self.complete_attempt(id, attempt, slot, outcome)
        }

        fn complete_attempt(
            &mut self,
            id: &UnitId,
            attempt: u64,
            slot: usize,
            outcome: Outcome,
        ) -> EventDisposition {
            self.dispatcher.handle_event(
                PoolEvent {
                    id: id.clone(),
                    attempt,
                    slot,
                    outcome,
                },
                &mut self.registry,
                &self.payloads,
                &mut self.sink,
            )
        }

        fn status(&self, id: &UnitId) -> StatusKind {
            self.registry.get(id).unwrap().kind()
        }
    }

    fn done() -> Outcome {
        Outcome::Done {
            output: Bytes::from_static(b"out"),
            size: 3,
        }
    }

    #[test]
    fn test_two_slots_three_units_refills_freed_slot() {
        let mut fx = Fixture::new(2);
        let a = fx.add("a.png");
        let b = fx.add("b.png");
        let c = fx.add("c.png");

        fx.dispatcher.enqueue_batch([a.clone(), b.clone(), c.clone()]);
        fx.fill();

        assert_eq!(fx.sink.submitted, vec![(0, a.clone()), (1, b.clone())]);
        assert_eq!(fx.status(&a), StatusKind::Converting);
        assert_eq!(fx.status(&b), StatusKind::Converting);
        assert_eq!(fx.status(&c), StatusKind::Pending);
        assert_eq!(fx.dispatcher.queue_remaining(), 1);

        assert_eq!(fx.complete(&a, 0, done()), EventDisposition::Applied);
        assert_eq!(fx.status(&a), StatusKind::Done);
        assert_eq!(fx.status(&c), StatusKind::Converting);
        assert_eq!(fx.sink.submitted.last(), Some(&(0, c.clone())));
        assert_eq!(fx.dispatcher.in_flight(0), Some(&c));
        assert!(!fx.dispatcher.is_batch_complete());

        fx.complete(&b, 1, Outcome::Error("broken".to_string()));
        fx.complete(&c, 0, done());
        assert!(fx.dispatcher.is_batch_complete());
        assert_eq!(
            fx.registry.get(&b).unwrap().error_message(),
            Some("broken")
        );
    }

    #[test]
    fn test_converting_never_exceeds_slot_count() {
        let mut fx = Fixture::new(3);
        let ids: Vec<UnitId> = (0..10).map(|i| fx.add(&format!("{}.png", i))).collect();
        fx.dispatcher.enqueue_batch(ids.clone());
        fx.fill();

        let mut completed = 0;
        while !fx.dispatcher.is_batch_complete() {
            assert!(fx.registry.count_by_status(StatusKind::Converting) <= 3);
            // Complete the busiest-numbered slot first to vary the order
            let slot = (0..3).rev().find(|s| fx.dispatcher.is_slot_busy(*s)).unwrap();
            let id = fx.dispatcher.in_flight(slot).unwrap().clone();
            fx.complete(&id, slot, done());
            completed += 1;
        }

        assert_eq!(completed, 10);
        assert_eq!(fx.registry.count_by_status(StatusKind::Done), 10);
        // Assignment order is FIFO
        let order: Vec<UnitId> = fx.sink.submitted.iter().map(|(_, id)| id.clone()).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn test_discarded_id_is_never_dispatched() {
        let mut fx = Fixture::new(1);
        let x = fx.add("x.png");
        let y = fx.add("y.png");
        fx.dispatcher.enqueue_batch([x.clone(), y.clone()]);
        fx.fill();

        assert!(fx.dispatcher.discard(&y));
        fx.registry.remove(&y);
        assert!(fx.dispatcher.is_slot_busy(0));
        assert_eq!(fx.dispatcher.queue_remaining(), 0);

        fx.complete(&x, 0, done());
        assert_eq!(fx.sink.submitted, vec![(0, x.clone())]);
        assert!(fx.dispatcher.is_batch_complete());
        assert_eq!(fx.registry.len(), 1);
    }

    #[test]
    fn test_missing_payload_marks_error_and_moves_on() {
        let mut fx = Fixture::new(1);
        let gone = fx.add("gone.png");
        let next = fx.add("next.png");
        fx.payloads.remove(&gone);

        fx.dispatcher.enqueue_batch([gone.clone(), next.clone()]);
        fx.fill();

        assert_eq!(fx.status(&gone), StatusKind::Error);
        assert_eq!(
            fx.registry.get(&gone).unwrap().error_message(),
            Some(MISSING_PAYLOAD_MESSAGE)
        );
        assert_eq!(fx.sink.submitted, vec![(0, next.clone())]);
    }

    #[test]
    fn test_duplicate_enqueue_is_ignored() {
        let mut fx = Fixture::new(1);
        let a = fx.add("a.png");
        assert_eq!(fx.dispatcher.enqueue_batch([a.clone()]), 1);
        assert_eq!(fx.dispatcher.enqueue_batch([a.clone()]), 0);
        fx.fill();
        fx.complete(&a, 0, done());
        assert_eq!(fx.sink.submitted.len(), 1);
        assert!(fx.dispatcher.is_batch_complete());
    }

    #[test]
    fn test_reset_ignores_late_events() {
        let mut fx = Fixture::new(2);
        let a = fx.add("a.png");
        let b = fx.add("b.png");
        fx.dispatcher.enqueue_batch([a.clone(), b.clone()]);
        fx.fill();

        fx.dispatcher.reset();
        fx.registry.clear();
        fx.payloads.clear();
        assert!(fx.dispatcher.is_batch_complete());

        assert_eq!(fx.complete(&a, 0, done()), EventDisposition::Stale);
        assert_eq!(fx.complete(&b, 1, done()), EventDisposition::Stale);
        assert!(fx.registry.is_empty());
        assert_eq!(fx.dispatcher.busy_slots(), 0);
    }

    #[test]
    fn test_late_event_does_not_free_reused_slot() {
        let mut fx = Fixture::new(1);
        let old = fx.add("old.png");
        fx.dispatcher.enqueue_batch([old.clone()]);
        fx.fill();
        fx.dispatcher.reset();

        let fresh = fx.add("fresh.png");
        fx.dispatcher.enqueue_batch([fresh.clone()]);
        fx.fill();
        assert_eq!(fx.dispatcher.in_flight(0), Some(&fresh));

        assert_eq!(fx.complete(&old, 0, done()), EventDisposition::Stale);
        assert_eq!(fx.dispatcher.in_flight(0), Some(&fresh));
        assert_eq!(fx.status(&fresh), StatusKind::Converting);
    }

    #[test]
    fn test_event_for_removed_running_unit_frees_slot() {
        let mut fx = Fixture::new(1);
        let a = fx.add("a.png");
        let b = fx.add("b.png");
        fx.dispatcher.enqueue_batch([a.clone(), b.clone()]);
        fx.fill();
        fx.registry.remove(&a);

        assert_eq!(fx.complete(&a, 0, done()), EventDisposition::Orphaned);
        assert_eq!(fx.dispatcher.in_flight(0), Some(&b));
    }

    #[test]
    fn test_stuck_slots_and_release() {
        let mut fx = Fixture::new(2);
        let a = fx.add("a.png");
        fx.dispatcher.enqueue_batch([a.clone()]);
        fx.fill();

        let later = Instant::now() + Duration::from_secs(10);
        assert_eq!(fx.dispatcher.stuck_slots(Duration::from_secs(5), later), vec![0]);
        assert!(fx.dispatcher.stuck_slots(Duration::from_secs(60), later).is_empty());

        assert_eq!(fx.dispatcher.release_slot(0), Some(a));
        assert_eq!(fx.dispatcher.release_slot(0), None);
        assert!(fx.dispatcher.is_batch_complete());
    }

    #[test]
    fn test_event_from_earlier_run_of_same_unit_is_stale() {
        let mut fx = Fixture::new(1);
        let a = fx.add("a.png");
        fx.dispatcher.enqueue_batch([a.clone()]);
        fx.fill();
        let first = fx.last_attempt(&a);

        // Reclaimed, failed, then dispatched again onto the same slot
        assert_eq!(fx.dispatcher.release_slot(0), Some(a.clone()));
        fx.registry.update_status(&a, UnitStatus::error("timed out"));
        fx.dispatcher.enqueue_batch([a.clone()]);
        fx.fill();
        let second = fx.last_attempt(&a);
        assert_ne!(first, second);
        assert_eq!(fx.dispatcher.attempt(0), Some(second));

        assert_eq!(
            fx.complete_attempt(&a, first, 0, done()),
            EventDisposition::Stale
        );
        assert_eq!(fx.status(&a), StatusKind::Converting);
        assert!(fx.dispatcher.is_slot_busy(0));
        assert_eq!(fx.sink.submitted.len(), 2);

        assert_eq!(
            fx.complete_attempt(&a, second, 0, done()),
            EventDisposition::Applied
        );
        assert_eq!(fx.status(&a), StatusKind::Done);
        assert!(fx.dispatcher.is_batch_complete());
    }

    #[test]
    fn test_attempts_keep_counting_across_reset() {
        let mut fx = Fixture::new(1);
        let a = fx.add("a.png");
        fx.dispatcher.enqueue_batch([a.clone()]);
        fx.fill();
        fx.dispatcher.reset();

        let b = fx.add("b.png");
        fx.dispatcher.enqueue_batch([b.clone()]);
        fx.fill();
        assert!(fx.last_attempt(&b) > fx.last_attempt(&a));
    }
}
