pub mod controller;
pub mod dedup;
pub mod log;
pub mod model;
pub mod paginator;
pub mod webhook;

pub use controller::{run_job, spawn_job, JobContext, JobReport, JobServices, JobTally};
pub use log::JobLog;
pub use model::{
    select_pages, DelayPolicy, JobSpec, RunMode, DEFAULT_DELAY_MAX_SECS, DEFAULT_DELAY_MIN_SECS,
    MAX_PAGES_PER_JOB,
};
pub use webhook::{DispatchOutcome, WebhookDispatcher};
