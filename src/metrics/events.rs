//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in a connector
//! run. Events implement the `InternalEvent` trait which emits the
//! corresponding Prometheus metric.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Status of a finished request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a connector load request finishes.
pub struct ConnectorRequest {
    pub platform: &'static str,
    pub status: RequestStatus,
}

impl InternalEvent for ConnectorRequest {
    fn emit(self) {
        trace!(
            platform = self.platform,
            status = self.status.as_str(),
            "Connector request"
        );
        counter!(
            "gale_connector_requests_total",
            "platform" => self.platform,
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a secret version is resolved.
pub struct SecretResolved;

impl InternalEvent for SecretResolved {
    fn emit(self) {
        trace!("Secret resolved");
        counter!("gale_secrets_resolved_total").increment(1);
    }
}

/// Event emitted when a report run is triggered.
pub struct ReportSubmitted;

impl InternalEvent for ReportSubmitted {
    fn emit(self) {
        trace!("Report submitted");
        counter!("gale_reports_submitted_total").increment(1);
    }
}

/// Event emitted after each report status check.
pub struct PollAttempted {
    pub attempt: u32,
}

impl InternalEvent for PollAttempted {
    fn emit(self) {
        trace!(attempt = self.attempt, "Poll attempted");
        counter!("gale_poll_attempts_total").increment(1);
    }
}

/// Terminal outcome of a polled report run.
#[derive(Debug, Clone, Copy)]
pub enum ReportOutcome {
    Done,
    Failed,
    Exhausted,
}

impl ReportOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            ReportOutcome::Done => "done",
            ReportOutcome::Failed => "failed",
            ReportOutcome::Exhausted => "exhausted",
        }
    }
}

/// Event emitted when a report run reaches a terminal outcome.
pub struct ReportCompleted {
    pub outcome: ReportOutcome,
}

impl InternalEvent for ReportCompleted {
    fn emit(self) {
        trace!(outcome = self.outcome.as_str(), "Report completed");
        counter!(
            "gale_reports_completed_total",
            "outcome" => self.outcome.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a vendor API call completes.
pub struct VendorRequest {
    pub platform: &'static str,
    pub status: RequestStatus,
}

impl InternalEvent for VendorRequest {
    fn emit(self) {
        trace!(
            platform = self.platform,
            status = self.status.as_str(),
            "Vendor request"
        );
        counter!(
            "gale_vendor_requests_total",
            "platform" => self.platform,
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Storage request");
        counter!(
            "gale_storage_requests_total",
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when an artifact download completes.
pub struct ArtifactDownloadCompleted {
    pub duration: Duration,
}

impl InternalEvent for ArtifactDownloadCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Artifact download completed"
        );
        histogram!("gale_artifact_download_duration_seconds")
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when rows land in the warehouse.
pub struct RowsLoaded {
    pub count: u64,
}

impl InternalEvent for RowsLoaded {
    fn emit(self) {
        trace!(count = self.count, "Rows loaded");
        counter!("gale_rows_loaded_total").increment(self.count);
    }
}

/// Event emitted when a delete-then-append refresh removes old rows.
pub struct RefreshDeleteCompleted {
    pub duration: Duration,
}

impl InternalEvent for RefreshDeleteCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Refresh delete completed"
        );
        histogram!("gale_refresh_delete_duration_seconds").record(self.duration.as_secs_f64());
    }
}
