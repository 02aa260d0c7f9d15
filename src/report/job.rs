//! Report job handles and status snapshots.

use serde::Deserialize;

/// Handle to a triggered report run.
///
/// `query_id` identifies the report definition (reusable across runs);
/// `report_id` identifies this specific run. Both are always populated:
/// the submitter only constructs a job once the run trigger has returned
/// a key, so a poller can never query unset ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportJob {
    pub query_id: String,
    pub report_id: String,
}

/// Server-reported state of a report run.
///
/// Anything the server reports that is not DONE or FAILED is treated as
/// still running; unknown values must never be terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Running,
    Done,
    Failed,
    #[serde(other)]
    Unspecified,
}

impl JobState {
    /// True for states from which no further transition occurs.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// One observation of a report run's status.
///
/// `artifact_locator` is the Cloud Storage path of the finished report;
/// the server only sets it once the run is DONE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub job: ReportJob,
    pub state: JobState,
    pub artifact_locator: Option<String>,
}

impl JobSnapshot {
    /// The artifact locator, if present and non-empty.
    pub fn locator(&self) -> Option<&str> {
        self.artifact_locator.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_and_failed_are_terminal() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Unspecified.is_terminal());
    }

    #[test]
    fn unknown_state_deserializes_as_non_terminal() {
        let state: JobState = serde_json::from_str("\"QUEUED\"").unwrap();
        assert_eq!(state, JobState::Unspecified);
        assert!(!state.is_terminal());
    }

    #[test]
    fn empty_locator_reads_as_absent() {
        let snapshot = JobSnapshot {
            job: ReportJob {
                query_id: "Q1".into(),
                report_id: "R1".into(),
            },
            state: JobState::Done,
            artifact_locator: Some(String::new()),
        };
        assert!(snapshot.locator().is_none());
    }
}
