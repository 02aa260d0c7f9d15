//! gale: advertising report connectors for BigQuery.
//!
//! This library provides per-platform connectors (DV360, Google Ads,
//! TikTok, LinkedIn) that pull reporting data from vendor APIs, normalize
//! it into tabular rows, and load it into BigQuery with optional
//! delete-then-append refresh. The DV360 path runs the asynchronous
//! report lifecycle: submit a report run, poll with capped exponential
//! backoff, then retrieve the finished artifact from Cloud Storage.
//!
//! # Example
//!
//! ```ignore
//! use gale::{Config, http, error::ConfigError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ConfigError> {
//!     let config = Config::from_file("config.yaml")?;
//!     http::serve(config).await
//! }
//! ```

pub mod config;
pub mod connectors;
pub mod dates;
pub mod error;
pub mod frame;
pub mod google;
pub mod http;
pub mod metrics;
pub mod report;
pub mod secrets;
pub mod storage;
pub mod vendor;
pub mod warehouse;

// Re-export main types
pub use config::Config;
pub use connectors::LoadOutcome;
pub use frame::Frame;
pub use report::{JobState, PollConfig, ReportJob, ReportSpecification};
