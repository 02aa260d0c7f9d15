//! Asynchronous report lifecycle for the DV360 Bid Manager API.
//!
//! A report run goes through four stages, each in its own module:
//! - `spec`: the immutable report specification submitted to the API
//! - `submit`: create-or-reuse a report definition and trigger an async run
//! - `poll`: check run status with capped exponential backoff until terminal
//! - `artifact`: download and decode the finished CSV artifact

pub mod artifact;
pub mod job;
pub mod poll;
pub mod spec;
pub mod submit;

pub use artifact::{ArtifactLocator, ArtifactRetriever};
pub use job::{JobSnapshot, JobState, ReportJob};
pub use poll::{PollConfig, ReportPoller, Sleeper, TokioSleeper};
pub use spec::ReportSpecification;
pub use submit::{submit_report, BidManager};
