use super::dispatcher::{Dispatcher, EventDisposition};
use super::job::{InputFile, MimeType, StatusChange, StatusKind, UnitId, UnitStatus, WorkUnit};
use super::payload::PayloadCache;
use super::pool::ExecutionPool;
use super::registry::Registry;
use super::worker::PoolEvent;
use crate::config::{AppConfig, OutputFormat};
use bytes::Bytes;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Settings the controller needs for a session
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub quality: u8,
    pub format: OutputFormat,
    pub suffix: String,
    pub job_timeout: Option<Duration>,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ConversionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            quality: config.conversion.quality,
            format: config.conversion.format,
            suffix: config.output.suffix.clone(),
            job_timeout: config.performance.job_timeout(),
        }
    }
}

/// Result of handing a batch of files to the controller
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub accepted: Vec<UnitId>,
    pub rejected: Vec<String>,
}

impl Registration {
    /// One message for the whole batch when files were refused
    pub fn rejection_message(&self) -> Option<String> {
        match self.rejected.len() {
            0 => None,
            1 => Some(format!(
                "Skipped {}: only PNG and JPEG images are supported",
                self.rejected[0]
            )),
            n => Some(format!(
                "Skipped {} files: only PNG and JPEG images are supported",
                n
            )),
        }
    }
}

/// Aggregate counts for display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub pending_or_error: usize,
    pub converting: usize,
    pub done: usize,
    pub queue_remaining: usize,
}

impl Progress {
    /// Percentage of units that reached Done
    pub fn percent_done(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.done as f32 / self.total as f32 * 100.0).min(100.0)
    }
}

/// A converted file ready to be saved or bundled
#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub id: UnitId,
    pub output_name: String,
    pub payload: Bytes,
}

/// Lifecycle controller: owns the registry, the payload cache, the dispatcher
/// and the pool, and is the only place any of them is mutated.
pub struct Controller {
    registry: Registry,
    payloads: PayloadCache,
    dispatcher: Dispatcher,
    pool: ExecutionPool,
    settings: ConversionSettings,
    batch_started: Option<Instant>,
}

impl Controller {
    pub fn new(pool: ExecutionPool, settings: ConversionSettings) -> Self {
        let dispatcher = Dispatcher::new(pool.size(), settings.quality);
        Self {
            registry: Registry::new(),
            payloads: PayloadCache::new(),
            dispatcher,
            pool,
            settings,
            batch_started: None,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn get(&self, id: &UnitId) -> Option<&WorkUnit> {
        self.registry.get(id)
    }

    /// Status changes for display
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.registry.subscribe()
    }

    /// Validate and register input files. Unsupported types never become units.
    pub fn register(&mut self, inputs: impl IntoIterator<Item = InputFile>) -> Registration {
        let mut registration = Registration::default();
        let mut units = Vec::new();

        for input in inputs {
            let Some(mime) = MimeType::parse(&input.mime) else {
                debug!(name = %input.name, mime = %input.mime, "Rejecting unsupported input");
                registration.rejected.push(input.name);
                continue;
            };
            let unit = WorkUnit::new(input.name, mime, input.size);
            self.payloads.insert(unit.id.clone(), input.payload);
            registration.accepted.push(unit.id.clone());
            units.push(unit);
        }
        self.registry.add(units);

        if let Some(message) = registration.rejection_message() {
            warn!("{}", message);
        }
        info!(
            "Registered {} files ({} rejected)",
            registration.accepted.len(),
            registration.rejected.len()
        );
        registration
    }

    /// Queue every Pending or Error unit and start as many as there are idle
    /// slots. Returns how many units were queued.
    pub fn submit_all(&mut self) -> usize {
        let eligible: Vec<UnitId> = self
            .registry
            .iter()
            .filter(|u| matches!(u.kind(), StatusKind::Pending | StatusKind::Error))
            .map(|u| u.id.clone())
            .collect();

        let added = self.dispatcher.enqueue_batch(eligible);
        if added > 0 && self.batch_started.is_none() {
            self.batch_started = Some(Instant::now());
        }
        self.dispatcher
            .fill_idle_slots(&mut self.registry, &self.payloads, &mut self.pool);
        info!("Submitted {} units", added);
        added
    }

    /// Error -> Pending. Does not queue; the unit runs on the next `submit_all`.
    pub fn retry(&mut self, id: &UnitId) -> bool {
        let failed = self
            .registry
            .get(id)
            .is_some_and(|u| u.kind() == StatusKind::Error);
        if !failed {
            return false;
        }
        self.registry.update_status(id, UnitStatus::Pending)
    }

    /// Retry every failed unit; returns how many were reset
    pub fn retry_failed(&mut self) -> usize {
        self.registry
            .list_by_status(StatusKind::Error)
            .iter()
            .filter(|id| self.retry(id))
            .count()
    }

    /// Destroy a unit and its payload. A queued unit will never be dispatched;
    /// a running one finishes in the background and its result is dropped.
    pub fn remove(&mut self, id: &UnitId) -> bool {
        let removed = self.registry.remove(id).is_some();
        self.payloads.remove(id);
        self.dispatcher.discard(id);
        if removed {
            info!(%id, "Removed unit");
        }
        removed
    }

    /// Destroy everything. In-flight jobs are not cancelled; their events are
    /// ignored when they arrive.
    pub fn reset_all(&mut self) {
        self.registry.clear();
        self.payloads.clear();
        self.dispatcher.reset();
        self.batch_started = None;
        info!("Reset all units");
    }

    /// Change the quality used for jobs dispatched from now on
    pub fn set_quality(&mut self, quality: u8) {
        self.settings.quality = quality.min(100);
        self.dispatcher.set_quality(quality);
    }

    pub fn progress(&self) -> Progress {
        Progress {
            total: self.registry.len(),
            pending_or_error: self.registry.count_by_status(StatusKind::Pending)
                + self.registry.count_by_status(StatusKind::Error),
            converting: self.registry.count_by_status(StatusKind::Converting),
            done: self.registry.count_by_status(StatusKind::Done),
            queue_remaining: self.dispatcher.queue_remaining(),
        }
    }

    pub fn is_batch_complete(&self) -> bool {
        self.dispatcher.is_batch_complete()
    }

    /// Time since the first unit was queued
    pub fn elapsed(&self) -> Option<Duration> {
        self.batch_started.map(|start| start.elapsed())
    }

    /// Apply one pool event and refill the slot it freed
    pub fn apply_event(&mut self, event: PoolEvent) -> EventDisposition {
        self.dispatcher
            .handle_event(event, &mut self.registry, &self.payloads, &mut self.pool)
    }

    /// Wait for the next pool event without applying it
    pub async fn next_event(&mut self) -> Option<PoolEvent> {
        self.pool.next_event().await
    }

    /// Apply pool events until nothing is queued or running.
    ///
    /// With a job timeout configured, slots busy for longer than the bound
    /// are reclaimed and their unit marked failed.
    pub async fn run_until_complete(&mut self) {
        while !self.dispatcher.is_batch_complete() {
            let event = match self.settings.job_timeout {
                Some(timeout) => {
                    match tokio::time::timeout(self.wait_budget(timeout), self.pool.next_event())
                        .await
                    {
                        Ok(event) => event,
                        Err(_) => {
                            self.reclaim_stuck(timeout);
                            continue;
                        }
                    }
                }
                None => self.pool.next_event().await,
            };

            match event {
                Some(event) => {
                    self.apply_event(event);
                }
                None => {
                    warn!("Execution pool closed with work outstanding");
                    break;
                }
            }
        }
        if let Some(elapsed) = self.elapsed() {
            info!("Batch complete in {:.1}s", elapsed.as_secs_f64());
        }
    }

    /// Fail and free every slot whose job has run for `timeout` or longer.
    /// Returns the ids that were timed out.
    pub fn reclaim_stuck(&mut self, timeout: Duration) -> Vec<UnitId> {
        let mut reclaimed = Vec::new();
        for slot in self.dispatcher.stuck_slots(timeout, Instant::now()) {
            let Some(id) = self.dispatcher.release_slot(slot) else {
                continue;
            };
            warn!(slot, %id, "Job exceeded {}s, reclaiming slot", timeout.as_secs());
            self.registry.update_status(
                &id,
                UnitStatus::error(format!(
                    "Conversion timed out after {}s",
                    timeout.as_secs()
                )),
            );
            self.pool.respawn_slot(slot);
            self.dispatcher
                .fill_slot(slot, &mut self.registry, &self.payloads, &mut self.pool);
            reclaimed.push(id);
        }
        reclaimed
    }

    /// Converted outputs of every Done unit, in submission order
    pub fn exports(&self) -> Vec<ExportEntry> {
        self.registry
            .iter()
            .filter_map(|unit| match &unit.status {
                UnitStatus::Done { output, .. } => Some(ExportEntry {
                    id: unit.id.clone(),
                    output_name: unit.output_name(self.settings.format, &self.settings.suffix),
                    payload: output.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Stop the pool; no further events are delivered
    pub fn teardown(&mut self) {
        self.pool.teardown();
    }

    /// Time left before the oldest in-flight job hits the timeout
    fn wait_budget(&self, timeout: Duration) -> Duration {
        let now = Instant::now();
        (0..self.dispatcher.slot_count())
            .filter_map(|slot| self.dispatcher.started_at(slot))
            .map(|started| timeout.saturating_sub(now.saturating_duration_since(started)))
            .min()
            .unwrap_or(timeout)
            .max(Duration::from_millis(1))
    }
}
