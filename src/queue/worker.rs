use super::job::UnitId;
use crate::encoder::{self, ImageEncoder};
use bytes::Bytes;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Data a slot needs to convert one unit
#[derive(Debug, Clone)]
pub struct Job {
    pub id: UnitId,
    /// Dispatch number, unique per submission; echoed back in the event
    pub attempt: u64,
    pub payload: Bytes,
    pub quality: u8,
}

/// Terminal result of a job
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Encoding completed successfully
    Done { output: Bytes, size: u64 },
    /// Encoding failed on every path, or the slot itself failed
    Error(String),
}

/// Message sent from a slot back to the dispatcher, exactly one per job
#[derive(Debug, Clone)]
pub struct PoolEvent {
    pub id: UnitId,
    pub attempt: u64,
    pub slot: usize,
    pub outcome: Outcome,
}

/// Run one execution slot until its job channel closes.
///
/// Jobs are processed strictly one after the other; the CPU-bound encode runs
/// on the blocking pool so slots do not starve the runtime.
pub async fn run_slot(
    slot: usize,
    mut jobs: UnboundedReceiver<Job>,
    encoder: Arc<dyn ImageEncoder>,
    events: UnboundedSender<PoolEvent>,
) {
    while let Some(job) = jobs.recv().await {
        let Job {
            id,
            attempt,
            payload,
            quality,
        } = job;
        debug!(slot, %id, attempt, "Slot picked up job");

        let encoder = encoder.clone();
        let result = tokio::task::spawn_blocking(move || {
            encoder::encode_with_fallback(encoder.as_ref(), &payload, quality)
        })
        .await;

        let outcome = match result {
            Ok(Ok(encoded)) => Outcome::Done {
                size: encoded.size(),
                output: encoded.data,
            },
            Ok(Err(e)) => Outcome::Error(e.to_string()),
            Err(join_error) if join_error.is_panic() => {
                Outcome::Error(panic_message(join_error.into_panic()))
            }
            Err(join_error) => Outcome::Error(format!("Conversion task failed: {}", join_error)),
        };

        if events
            .send(PoolEvent {
                id,
                attempt,
                slot,
                outcome,
            })
            .is_err()
        {
            // Receiver is gone, the pool was torn down
            break;
        }
    }
    info!(slot, "Slot stopped");
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("Conversion crashed: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("Conversion crashed: {}", message)
    } else {
        "Conversion crashed".to_string()
    }
}
