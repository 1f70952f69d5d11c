//! A minimal distributed test-execution queue.
//!
//! Clients submit test jobs, workers claim the highest-priority queued job,
//! run it and report pass/fail, and the server re-queues failures until
//! each job's retry bound is spent. All state lives in process memory and
//! is lost when the server restarts.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod worker;
