//! Report status polling with capped exponential backoff.
//!
//! Report generation is a minutes-to-hours server-side batch job, so the
//! poller backs off exponentially (base 2) from `min_interval` up to
//! `max_interval` and gives up after `max_attempts` non-terminal checks.
//! The status check is a pure read; "still running" is a state, not an
//! error, and the poller returns whichever terminal snapshot the server
//! reports. Classifying FAILED as an error is the caller's job.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::emit;
use crate::error::{ExhaustedSnafu, PollError, StatusCheckSnafu};
use crate::metrics::events::PollAttempted;
use crate::report::job::JobSnapshot;
use crate::report::submit::BidManager;
use crate::report::ReportJob;
use snafu::prelude::*;

/// Backoff and attempt bounds for a polling run.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Delay before the second status check.
    pub min_interval: Duration,
    /// Ceiling for the backoff schedule.
    pub max_interval: Duration,
    /// Number of status checks before giving up.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(30),
            max_interval: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

impl PollConfig {
    /// Delay to wait before attempt `attempt` (zero-based).
    ///
    /// The first check happens immediately; after `k` non-terminal
    /// results the next delay is `min(min_interval * 2^(k-1), max_interval)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let doubled = self
            .min_interval
            .checked_mul(1u32 << (attempt - 1).min(30))
            .unwrap_or(self.max_interval);
        doubled.min(self.max_interval)
    }
}

/// Sleep primitive injected into the poller so tests can run with a
/// recording fake instead of wall-clock waits.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Polls a report run until it reaches a terminal state.
///
/// One poller instance serves one job; callers must not poll the same
/// `(query_id, report_id)` pair concurrently, since a lost race would be
/// resolved by re-submission, which is never idempotent.
pub struct ReportPoller<'a> {
    config: PollConfig,
    sleeper: &'a dyn Sleeper,
}

impl<'a> ReportPoller<'a> {
    pub fn new(config: PollConfig, sleeper: &'a dyn Sleeper) -> Self {
        Self { config, sleeper }
    }

    /// Poll until the server reports DONE or FAILED.
    ///
    /// Returns the terminal snapshot, or `PollError::Exhausted` when
    /// `max_attempts` checks all observed a non-terminal state. Any state
    /// the server reports that is not DONE or FAILED consumes an attempt.
    pub async fn poll(
        &self,
        api: &dyn BidManager,
        job: &ReportJob,
    ) -> Result<JobSnapshot, PollError> {
        for attempt in 0..self.config.max_attempts {
            let delay = self.config.delay_before(attempt);
            if !delay.is_zero() {
                debug!(
                    report_id = %job.report_id,
                    delay_secs = delay.as_secs(),
                    "Report still running, waiting before next status check"
                );
                self.sleeper.sleep(delay).await;
            }

            let snapshot = api.get_report(job).await.context(StatusCheckSnafu {
                query_id: job.query_id.clone(),
                report_id: job.report_id.clone(),
            })?;
            emit!(PollAttempted {
                attempt: attempt + 1
            });

            if snapshot.state.is_terminal() {
                info!(
                    query_id = %job.query_id,
                    report_id = %job.report_id,
                    state = ?snapshot.state,
                    attempts = attempt + 1,
                    "Report reached terminal state"
                );
                return Ok(snapshot);
            }
        }

        ExhaustedSnafu {
            query_id: job.query_id.clone(),
            report_id: job.report_id.clone(),
            attempts: self.config.max_attempts,
        }
        .fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VendorError;
    use crate::report::job::JobState;
    use std::sync::Mutex;

    /// Sleeper that records requested delays and returns immediately.
    pub(crate) struct RecordingSleeper {
        pub delays: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn new() -> Self {
            Self {
                delays: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    /// Bid Manager fake that replays a scripted state sequence.
    struct ScriptedApi {
        states: Mutex<Vec<JobState>>,
        checks: Mutex<u32>,
        locator: Option<String>,
    }

    impl ScriptedApi {
        fn new(states: Vec<JobState>, locator: Option<&str>) -> Self {
            Self {
                states: Mutex::new(states),
                checks: Mutex::new(0),
                locator: locator.map(String::from),
            }
        }

        fn checks(&self) -> u32 {
            *self.checks.lock().unwrap()
        }
    }

    #[async_trait]
    impl BidManager for ScriptedApi {
        async fn create_query(
            &self,
            _body: serde_json::Value,
        ) -> Result<String, VendorError> {
            unreachable!()
        }

        async fn run_query(&self, _query_id: &str) -> Result<ReportJob, VendorError> {
            unreachable!()
        }

        async fn get_report(&self, job: &ReportJob) -> Result<JobSnapshot, VendorError> {
            *self.checks.lock().unwrap() += 1;
            let mut states = self.states.lock().unwrap();
            let state = if states.is_empty() {
                JobState::Running
            } else {
                states.remove(0)
            };
            let artifact_locator = if state == JobState::Done {
                self.locator.clone()
            } else {
                None
            };
            Ok(JobSnapshot {
                job: job.clone(),
                state,
                artifact_locator,
            })
        }
    }

    fn job() -> ReportJob {
        ReportJob {
            query_id: "Q1".into(),
            report_id: "R1".into(),
        }
    }

    fn config(min: u64, max: u64, attempts: u32) -> PollConfig {
        PollConfig {
            min_interval: Duration::from_secs(min),
            max_interval: Duration::from_secs(max),
            max_attempts: attempts,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = config(30, 300, 10);
        let delays: Vec<u64> = (0..7)
            .map(|k| config.delay_before(k).as_secs())
            .collect();
        assert_eq!(delays, vec![0, 30, 60, 120, 240, 300, 300]);
    }

    #[test]
    fn backoff_is_monotone_non_decreasing() {
        let config = config(7, 113, 64);
        let mut last = Duration::ZERO;
        for attempt in 0..64 {
            let delay = config.delay_before(attempt);
            assert!(delay >= last);
            assert!(delay <= config.max_interval);
            last = delay;
        }
    }

    #[tokio::test]
    async fn done_after_two_running_takes_three_checks() {
        let api = ScriptedApi::new(
            vec![JobState::Running, JobState::Running, JobState::Done],
            Some("gs://bucket/r1.csv"),
        );
        let sleeper = RecordingSleeper::new();
        let poller = ReportPoller::new(config(30, 60, 10), &sleeper);

        let snapshot = poller.poll(&api, &job()).await.unwrap();
        assert_eq!(api.checks(), 3);
        assert_eq!(snapshot.state, JobState::Done);
        assert_eq!(snapshot.locator(), Some("gs://bucket/r1.csv"));
        // Delay before 2nd and 3rd check only, doubled then capped.
        assert_eq!(
            sleeper.delays.lock().unwrap().as_slice(),
            &[Duration::from_secs(30), Duration::from_secs(60)]
        );
    }

    #[tokio::test]
    async fn all_running_exhausts_after_max_attempts() {
        let api = ScriptedApi::new(vec![], None);
        let sleeper = RecordingSleeper::new();
        let poller = ReportPoller::new(config(1, 4, 5), &sleeper);

        let err = poller.poll(&api, &job()).await.unwrap_err();
        assert_eq!(api.checks(), 5);
        match err {
            PollError::Exhausted { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_is_returned_not_raised() {
        let api = ScriptedApi::new(vec![JobState::Running, JobState::Failed], None);
        let sleeper = RecordingSleeper::new();
        let poller = ReportPoller::new(config(30, 60, 10), &sleeper);

        let snapshot = poller.poll(&api, &job()).await.unwrap();
        assert_eq!(api.checks(), 2);
        assert_eq!(snapshot.state, JobState::Failed);
        assert!(snapshot.locator().is_none());
    }

    #[tokio::test]
    async fn unrecognized_state_is_non_terminal() {
        let api = ScriptedApi::new(
            vec![JobState::Unspecified, JobState::Done],
            Some("gs://bucket/r1.csv"),
        );
        let sleeper = RecordingSleeper::new();
        let poller = ReportPoller::new(config(30, 60, 10), &sleeper);

        let snapshot = poller.poll(&api, &job()).await.unwrap();
        assert_eq!(api.checks(), 2);
        assert_eq!(snapshot.state, JobState::Done);
    }

    #[tokio::test]
    async fn no_sleep_before_first_check() {
        let api = ScriptedApi::new(vec![JobState::Done], Some("gs://b/p.csv"));
        let sleeper = RecordingSleeper::new();
        let poller = ReportPoller::new(config(30, 60, 10), &sleeper);

        poller.poll(&api, &job()).await.unwrap();
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }
}
