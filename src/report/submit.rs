//! Report job submission.
//!
//! Creates a report definition when no existing `query_id` is supplied,
//! then triggers an asynchronous run. Submission failures surface
//! immediately: retrying `queries.create` could leave duplicate report
//! definitions behind, so no retry happens at this layer.

use async_trait::async_trait;
use snafu::prelude::*;
use tracing::info;

use crate::error::{CreateRejectedSnafu, RunRejectedSnafu, SubmissionError, VendorError};
use crate::report::job::{JobSnapshot, ReportJob};
use crate::report::spec::ReportSpecification;

/// The three Bid Manager operations the report lifecycle depends on.
///
/// `get_report` must be a pure read: it never re-triggers the run.
#[async_trait]
pub trait BidManager: Send + Sync {
    /// Create a report definition, returning its query id.
    async fn create_query(
        &self,
        body: serde_json::Value,
    ) -> Result<String, VendorError>;

    /// Trigger an asynchronous run of an existing definition.
    async fn run_query(&self, query_id: &str) -> Result<ReportJob, VendorError>;

    /// Fetch the current status snapshot of a run.
    async fn get_report(&self, job: &ReportJob) -> Result<JobSnapshot, VendorError>;
}

/// Submit a report run.
///
/// When `query_id` is `None` a new definition is created from the
/// specification; otherwise the existing definition is reused and only a
/// run is triggered.
pub async fn submit_report(
    api: &dyn BidManager,
    spec: &ReportSpecification,
    title: &str,
    query_id: Option<String>,
) -> Result<ReportJob, SubmissionError> {
    let query_id = match query_id {
        Some(id) => id,
        None => {
            let id = api
                .create_query(spec.to_create_body(title))
                .await
                .context(CreateRejectedSnafu)?;
            info!(query_id = %id, "Created report definition");
            id
        }
    };

    let job = api
        .run_query(&query_id)
        .await
        .context(RunRejectedSnafu {
            query_id: query_id.clone(),
        })?;
    info!(
        query_id = %job.query_id,
        report_id = %job.report_id,
        "Report run triggered, generation in progress"
    );
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::job::JobState;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct RecordingApi {
        created: Mutex<Vec<serde_json::Value>>,
        ran: Mutex<Vec<String>>,
    }

    impl RecordingApi {
        fn new() -> Self {
            Self {
                created: Mutex::new(Vec::new()),
                ran: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BidManager for RecordingApi {
        async fn create_query(
            &self,
            body: serde_json::Value,
        ) -> Result<String, VendorError> {
            self.created.lock().unwrap().push(body);
            Ok("Q1".to_string())
        }

        async fn run_query(&self, query_id: &str) -> Result<ReportJob, VendorError> {
            self.ran.lock().unwrap().push(query_id.to_string());
            Ok(ReportJob {
                query_id: query_id.to_string(),
                report_id: "R1".to_string(),
            })
        }

        async fn get_report(&self, job: &ReportJob) -> Result<JobSnapshot, VendorError> {
            Ok(JobSnapshot {
                job: job.clone(),
                state: JobState::Running,
                artifact_locator: None,
            })
        }
    }

    fn spec() -> ReportSpecification {
        ReportSpecification::new(
            vec!["42".into()],
            vec!["FILTER_DATE".into()],
            vec!["METRIC_IMPRESSIONS".into()],
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
    }

    #[tokio::test]
    async fn submit_without_query_id_creates_definition() {
        let api = RecordingApi::new();
        let job = submit_report(&api, &spec(), "march", None).await.unwrap();
        assert_eq!(job.query_id, "Q1");
        assert_eq!(job.report_id, "R1");
        assert_eq!(api.created.lock().unwrap().len(), 1);
        assert_eq!(api.ran.lock().unwrap().as_slice(), &["Q1".to_string()]);
    }

    #[tokio::test]
    async fn submit_with_query_id_skips_creation() {
        let api = RecordingApi::new();
        let job = submit_report(&api, &spec(), "march", Some("Q7".into()))
            .await
            .unwrap();
        assert_eq!(job.query_id, "Q7");
        assert!(api.created.lock().unwrap().is_empty());
        assert_eq!(api.ran.lock().unwrap().as_slice(), &["Q7".to_string()]);
    }

    #[tokio::test]
    async fn create_failure_surfaces_as_submission_error() {
        struct FailingApi;

        #[async_trait]
        impl BidManager for FailingApi {
            async fn create_query(
                &self,
                _body: serde_json::Value,
            ) -> Result<String, VendorError> {
                Err(VendorError::Status {
                    platform: "bidmanager",
                    status: 400,
                    detail: "invalid spec".into(),
                })
            }

            async fn run_query(&self, _query_id: &str) -> Result<ReportJob, VendorError> {
                unreachable!("run must not be attempted after a failed create")
            }

            async fn get_report(
                &self,
                _job: &ReportJob,
            ) -> Result<JobSnapshot, VendorError> {
                unreachable!()
            }
        }

        let err = submit_report(&FailingApi, &spec(), "march", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::CreateRejected { .. }));
    }
}
