use super::worker::{Job, Outcome, PoolEvent, run_slot};
use crate::encoder::ImageEncoder;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where the dispatcher sends jobs. Implemented by [`ExecutionPool`].
pub trait JobSink {
    /// Number of slots, fixed for the sink's lifetime
    fn slot_count(&self) -> usize;

    /// Start `job` on `slot`. The slot must be idle; that is the caller's job
    /// to guarantee.
    fn submit(&mut self, slot: usize, job: Job);
}

struct Slot {
    jobs: UnboundedSender<Job>,
    task: JoinHandle<()>,
}

/// Fixed set of isolated execution slots sharing one outbound event stream
pub struct ExecutionPool {
    encoder: Arc<dyn ImageEncoder>,
    slots: Vec<Slot>,
    events_tx: UnboundedSender<PoolEvent>,
    events: UnboundedReceiver<PoolEvent>,
    torn_down: bool,
}

impl ExecutionPool {
    /// Spawn `size` slots (at least one). Must be called inside a tokio runtime.
    pub fn new(size: usize, encoder: Arc<dyn ImageEncoder>) -> Self {
        let size = size.max(1);
        let (events_tx, events) = mpsc::unbounded_channel();
        let slots = (0..size)
            .map(|index| spawn_slot(index, encoder.clone(), events_tx.clone()))
            .collect();

        info!("Execution pool started with {} slots", size);
        Self {
            encoder,
            slots,
            events_tx,
            events,
            torn_down: false,
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Wait for the next completion. Returns `None` once torn down.
    pub async fn next_event(&mut self) -> Option<PoolEvent> {
        if self.torn_down {
            return None;
        }
        self.events.recv().await
    }

    /// Abandon whatever `slot` is running and replace it with a fresh task.
    ///
    /// A blocking encode that is already running finishes in the background;
    /// its result is dropped with the old task.
    pub fn respawn_slot(&mut self, slot: usize) {
        if self.torn_down {
            return;
        }
        let Some(old) = self.slots.get_mut(slot) else {
            warn!(slot, "Cannot respawn unknown slot");
            return;
        };
        old.task.abort();
        *old = spawn_slot(slot, self.encoder.clone(), self.events_tx.clone());
        info!(slot, "Slot respawned");
    }

    /// Stop every slot. In-flight work is abandoned and no event is delivered
    /// after this returns.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        for slot in &self.slots {
            slot.task.abort();
        }
        self.events.close();
        let mut dropped = 0;
        while self.events.try_recv().is_ok() {
            dropped += 1;
        }
        self.torn_down = true;
        info!("Execution pool torn down, {} undelivered events dropped", dropped);
    }
}

impl JobSink for ExecutionPool {
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn submit(&mut self, slot: usize, job: Job) {
        if self.torn_down {
            debug!(slot, id = %job.id, "Pool torn down, dropping job");
            return;
        }
        let Some(target) = self.slots.get(slot) else {
            warn!(slot, id = %job.id, "Job submitted to unknown slot");
            self.fail(slot, job, "Execution slot unavailable");
            return;
        };

        debug!(slot, id = %job.id, "Submitting job");
        if let Err(mpsc::error::SendError(job)) = target.jobs.send(job) {
            // The slot task died; report the job so it is not lost
            self.fail(slot, job, "Execution slot unavailable");
        }
    }
}

impl ExecutionPool {
    fn fail(&self, slot: usize, job: Job, message: &str) {
        let _ = self.events_tx.send(PoolEvent {
            id: job.id,
            attempt: job.attempt,
            slot,
            outcome: Outcome::Error(message.to_string()),
        });
    }
}

impl Drop for ExecutionPool {
    fn drop(&mut self) {
        for slot in &self.slots {
            slot.task.abort();
        }
    }
}

fn spawn_slot(
    index: usize,
    encoder: Arc<dyn ImageEncoder>,
    events: UnboundedSender<PoolEvent>,
) -> Slot {
    let (jobs, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_slot(index, rx, encoder, events));
    Slot { jobs, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EncodeError;
    use crate::queue::job::UnitId;
    use bytes::Bytes;

    struct Upper;

    impl ImageEncoder for Upper {
        fn encode(&self, input: &[u8], _quality: u8) -> Result<Bytes, EncodeError> {
            Ok(Bytes::from(input.to_ascii_uppercase()))
        }

        fn encode_fallback(&self, input: &[u8], quality: u8) -> Result<Bytes, EncodeError> {
            self.encode(input, quality)
        }
    }

    fn job(id: &str) -> Job {
        Job {
            id: UnitId::from(id),
            attempt: 0,
            payload: Bytes::from(id.as_bytes().to_vec()),
            quality: 75,
        }
    }

    #[tokio::test]
    async fn test_pool_size_is_at_least_one() {
        let pool = ExecutionPool::new(0, Arc::new(Upper));
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.slot_count(), 1);
    }

    #[tokio::test]
    async fn test_events_carry_slot_and_output() {
        let mut pool = ExecutionPool::new(2, Arc::new(Upper));
        pool.submit(0, job("left"));
        pool.submit(1, job("right"));

        let mut seen = Vec::new();
        for _ in 0..2 {
            let event = pool.next_event().await.unwrap();
            match event.outcome {
                Outcome::Done { output, size } => {
                    assert_eq!(size, output.len() as u64);
                    seen.push((event.slot, output));
                }
                Outcome::Error(e) => panic!("unexpected error {}", e),
            }
        }
        seen.sort_by_key(|(slot, _)| *slot);
        assert_eq!(seen[0], (0, Bytes::from_static(b"LEFT")));
        assert_eq!(seen[1], (1, Bytes::from_static(b"RIGHT")));
    }

    #[tokio::test]
    async fn test_unknown_slot_reports_error() {
        let mut pool = ExecutionPool::new(1, Arc::new(Upper));
        pool.submit(5, job("lost"));
        let event = pool.next_event().await.unwrap();
        assert_eq!(event.id, UnitId::from("lost"));
        assert!(matches!(event.outcome, Outcome::Error(_)));
    }

    #[tokio::test]
    async fn test_no_events_after_teardown() {
        let mut pool = ExecutionPool::new(1, Arc::new(Upper));
        pool.submit(0, job("late"));
        pool.teardown();
        assert!(pool.next_event().await.is_none());
        // Submitting after teardown is silently dropped
        pool.submit(0, job("ignored"));
        assert!(pool.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_respawned_slot_accepts_jobs() {
        let mut pool = ExecutionPool::new(1, Arc::new(Upper));
        pool.respawn_slot(0);
        pool.submit(0, job("again"));
        let event = pool.next_event().await.unwrap();
        assert_eq!(event.id, UnitId::from("again"));
    }
}
