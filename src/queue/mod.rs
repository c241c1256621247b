pub mod controller;
pub mod dispatcher;
pub mod job;
pub mod payload;
pub mod pool;
pub mod registry;
pub mod worker;

pub use controller::{ConversionSettings, Controller, ExportEntry, Progress, Registration};
pub use dispatcher::{Dispatcher, EventDisposition, MISSING_PAYLOAD_MESSAGE};
pub use job::{
    InputFile, MimeType, StatusBadge, StatusChange, StatusKind, UnitId, UnitStatus, WorkUnit,
    is_image_file,
};
pub use payload::PayloadCache;
pub use pool::{ExecutionPool, JobSink};
pub use registry::Registry;
pub use worker::{Job, Outcome, PoolEvent, run_slot};
