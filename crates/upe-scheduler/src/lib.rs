//! Asynchronous job execution for upe
//!
//! [`JobScheduler`] keeps a priority queue of jobs, runs at most
//! `max_concurrent` attempts at a time on the Tokio runtime, retries compute
//! failures up to each job's `max_attempts` and retains terminal jobs for
//! status lookups until they are purged. What a job does is decided by a
//! [`JobHandler`]; [`CompileJobHandler`] wraps the compile pipeline.

mod handler;
mod job;
mod scheduler;

pub use handler::{COMPILE_JOB, CompileJobHandler, GENERATE_JOB, JobHandler};
pub use job::{
    JobContext, JobError, JobId, JobOptions, JobState, JobStatus, JobSubmission, SchedulerStats,
};
pub use scheduler::{JobScheduler, SchedulerOptions, SlotLease};
