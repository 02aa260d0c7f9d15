//! DV360 connector.
//!
//! The one connector with an asynchronous fetch: submit a Bid Manager
//! report run, poll until terminal, classify the outcome, then pull the
//! finished CSV artifact out of Cloud Storage. The fetch half is written
//! against the `BidManager`/`ObjectDownloader`/`Sleeper` traits so the
//! whole lifecycle runs under test without a network.

use serde_json::json;
use snafu::prelude::*;
use tracing::{error, info};

use crate::connectors::{refresh_policy, LoadOutcome};
use crate::dates::resolve_date_range;
use crate::emit;
use crate::error::{
    ArtifactError, ArtifactSnafu, ConnectorError, GenerationSnafu, PollError, PollSnafu,
    ReportSnafu, SecretSnafu, SubmissionSnafu, WarehouseSnafu,
};
use crate::frame::Frame;
use crate::google::auth::service_account_authenticator;
use crate::metrics::events::{ReportCompleted, ReportOutcome};
use crate::report::artifact::ArtifactRetriever;
use crate::report::job::JobState;
use crate::report::poll::{PollConfig, ReportPoller, Sleeper, TokioSleeper};
use crate::report::submit::{submit_report, BidManager};
use crate::report::ReportSpecification;
use crate::secrets::SecretResolver;
use crate::storage::{GcsDownloader, ObjectDownloader};
use crate::vendor::BidManagerClient;
use crate::warehouse::{BigQueryLoader, Destination, Warehouse};

/// Timestamp columns stamped onto DV360 rows before loading.
const TIMESTAMP_COLUMNS: &[&str] = &["ingestion_time"];

/// Fully resolved parameters for one DV360 load.
#[derive(Debug, Clone)]
pub struct Dv360Params {
    pub timezone: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub reprocess_last_x_days: Option<i64>,
    pub advertiser_ids: Vec<String>,
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
    pub file_name: String,
    pub query_id: Option<String>,
    pub secret_project_id: String,
    pub dv360_secret_id: String,
    pub bq_secret_id: String,
    pub destination: Destination,
    pub delete_existing: bool,
    pub partition_column: Option<String>,
    pub poll: PollConfig,
}

/// Run the full submit → poll → retrieve fetch against injected
/// collaborators, returning the decoded artifact rows.
pub async fn fetch_report_frame(
    api: &dyn BidManager,
    downloader: &dyn ObjectDownloader,
    sleeper: &dyn Sleeper,
    spec: &ReportSpecification,
    title: &str,
    query_id: Option<String>,
    poll: PollConfig,
) -> Result<Frame, ConnectorError> {
    let job = submit_report(api, spec, title, query_id)
        .await
        .context(SubmissionSnafu)?;

    let poller = ReportPoller::new(poll, sleeper);
    let snapshot = match poller.poll(api, &job).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            if matches!(err, PollError::Exhausted { .. }) {
                emit!(ReportCompleted {
                    outcome: ReportOutcome::Exhausted
                });
            }
            return Err(err).context(PollSnafu);
        }
    };

    if snapshot.state == JobState::Failed {
        emit!(ReportCompleted {
            outcome: ReportOutcome::Failed
        });
        error!(
            query_id = %job.query_id,
            report_id = %job.report_id,
            "Report generation failed server-side"
        );
        return GenerationSnafu {
            query_id: job.query_id.clone(),
            report_id: job.report_id.clone(),
        }
        .fail()
        .context(ReportSnafu);
    }

    emit!(ReportCompleted {
        outcome: ReportOutcome::Done
    });

    // A DONE report without a storage path is a protocol violation.
    let locator = snapshot
        .locator()
        .map(String::from)
        .ok_or(ArtifactError::InvalidLocator {
            uri: snapshot.artifact_locator.clone().unwrap_or_default(),
        })
        .context(ArtifactSnafu)?;

    let retriever = ArtifactRetriever::new(downloader);
    retriever.retrieve(&locator).await.context(ArtifactSnafu)
}

/// Handle one DV360 load request end-to-end.
pub async fn run(
    params: Dv360Params,
    secrets: &dyn SecretResolver,
) -> Result<LoadOutcome, ConnectorError> {
    // Validation happens before any secret leaves the store.
    let range = resolve_date_range(
        &params.timezone,
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        params.reprocess_last_x_days,
    )?;

    let dv360_payload = secrets
        .resolve(&params.secret_project_id, &params.dv360_secret_id, "latest")
        .await
        .context(SecretSnafu)?;
    let dv360_key = dv360_payload
        .service_account_json(&params.dv360_secret_id)
        .context(SecretSnafu)?;

    let bq_payload = secrets
        .resolve(&params.secret_project_id, &params.bq_secret_id, "latest")
        .await
        .context(SecretSnafu)?;
    let bq_key = bq_payload
        .service_account_json(&params.bq_secret_id)
        .context(SecretSnafu)?;

    let auth = service_account_authenticator(&dv360_key)
        .await
        .map_err(|source| ConnectorError::Vendor {
            source: crate::error::VendorError::VendorAuth {
                platform: "dv360",
                source,
            },
        })?;
    let http = reqwest::Client::new();
    let api = BidManagerClient::new(http, auth);
    let downloader = GcsDownloader::new(dv360_key);

    let spec = ReportSpecification::new(
        params.advertiser_ids.clone(),
        params.dimensions.clone(),
        params.metrics.clone(),
        range.start,
        range.end,
    );

    info!(
        advertisers = params.advertiser_ids.len(),
        start_date = %range.start,
        end_date = %range.end,
        "Requesting DV360 report"
    );

    let mut frame = fetch_report_frame(
        &api,
        &downloader,
        &TokioSleeper,
        &spec,
        &params.file_name,
        params.query_id.clone(),
        params.poll,
    )
    .await?;

    frame.push_constant_column(
        "ingestion_time",
        json!(chrono::Utc::now().to_rfc3339()),
    );
    let frame = frame.normalize(TIMESTAMP_COLUMNS);

    let warehouse = BigQueryLoader::from_service_account_json(&bq_key)
        .await
        .context(WarehouseSnafu)?;
    let refresh = refresh_policy(
        params.delete_existing,
        params.partition_column.as_deref(),
        range,
        &params.advertiser_ids,
    );
    let rows_loaded = warehouse
        .load(&frame, &params.destination, refresh.as_ref())
        .await
        .context(WarehouseSnafu)?;

    Ok(LoadOutcome {
        success: true,
        rows_loaded,
        date_range: range.to_iso_pair(),
        destination: params.destination.table_ref(),
    })
}
