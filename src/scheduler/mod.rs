//! Job store and dispatch state machine.
//!
//! - [`JobStore`]: owns every [`JobRecord`] and the indices over them
//! - [`Scheduler`]: atomically claims the next queued job
//! - [`RetryPolicy`]: applies pass/fail reports, re-queueing failures
//!   until the retry bound is spent
//! - [`Dispatcher`]: the three above behind one lock, shared by the HTTP
//!   layer and in-process workers
//!
//! A job that is claimed and never reported stays `running` forever. There
//! is no lease or timeout.

pub mod claim;
pub mod dispatcher;
pub mod job;
pub mod retry;
pub mod store;

pub use claim::Scheduler;
pub use dispatcher::{Dispatcher, QueueStats, QueuedJobSummary};
pub use job::{JobDescriptor, JobRecord, JobStatus, Outcome, SubmitJobRequest, Target};
pub use retry::{Completion, RetryPolicy};
pub use store::JobStore;
