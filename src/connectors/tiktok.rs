//! TikTok connector.
//!
//! Synchronous fetch: one single-day report per advertiser per day in
//! the range, decorated with the account id, the report date, and the
//! ingestion time. Refresh is keyed on the report-date column so reruns
//! replace exactly the days they cover.

use chrono::NaiveDate;
use serde_json::json;
use snafu::prelude::*;
use tracing::info;

use crate::connectors::{refresh_policy, LoadOutcome};
use crate::dates::resolve_date_range;
use crate::error::{validation_error, ConnectorError, SecretSnafu, VendorSnafu, WarehouseSnafu};
use crate::frame::Frame;
use crate::secrets::SecretResolver;
use crate::vendor::TikTokClient;
use crate::warehouse::{BigQueryLoader, Destination, Warehouse};

/// Timestamp columns in a TikTok report frame.
const TIMESTAMP_COLUMNS: &[&str] = &["created_time", "ingestion_time"];

/// Partition column used when a refresh is requested.
const PARTITION_COLUMN: &str = "created_time";

/// Fully resolved parameters for one TikTok load.
#[derive(Debug, Clone)]
pub struct TikTokParams {
    pub timezone: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub reprocess_last_x_days: Option<i64>,
    pub account_ids: Vec<String>,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub level: String,
    pub report_type: String,
    pub secret_project_id: String,
    pub tiktok_secret_id: String,
    pub bq_secret_id: String,
    pub destination: Destination,
    pub delete_existing: bool,
}

/// Handle one TikTok load request end-to-end.
pub async fn run(
    params: TikTokParams,
    secrets: &dyn SecretResolver,
) -> Result<LoadOutcome, ConnectorError> {
    let range = resolve_date_range(
        &params.timezone,
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        params.reprocess_last_x_days,
    )?;
    let dates = range.day_list();

    let tiktok_payload = secrets
        .resolve(&params.secret_project_id, &params.tiktok_secret_id, "latest")
        .await
        .context(SecretSnafu)?;
    let access_token = tiktok_payload
        .extract_access_token(&params.tiktok_secret_id)
        .context(SecretSnafu)?;

    let bq_payload = secrets
        .resolve(&params.secret_project_id, &params.bq_secret_id, "latest")
        .await
        .context(SecretSnafu)?;
    let bq_key = bq_payload
        .service_account_json(&params.bq_secret_id)
        .context(SecretSnafu)?;

    let client = TikTokClient::new(reqwest::Client::new(), access_token);
    let ingestion_time = chrono::Utc::now().to_rfc3339();

    let mut combined = Frame::default();
    for account_id in &params.account_ids {
        for date in &dates {
            let day: NaiveDate = date
                .parse()
                .map_err(|_| validation_error(format!("Invalid date in range: {date}")))?;
            let mut frame = client
                .request_report(
                    account_id,
                    day,
                    day,
                    &params.dimensions,
                    &params.metrics,
                    &params.level,
                    &params.report_type,
                )
                .await
                .context(VendorSnafu)?;
            if frame.is_empty() {
                continue;
            }
            frame.push_constant_column("account_id", json!(account_id));
            frame.push_constant_column("created_time", json!(date));
            frame.push_constant_column("ingestion_time", json!(ingestion_time));
            combined.concat(frame);
        }
    }

    info!(
        accounts = params.account_ids.len(),
        days = dates.len(),
        rows = combined.len(),
        "Fetched TikTok report"
    );

    let frame = combined.normalize(TIMESTAMP_COLUMNS);

    let warehouse = BigQueryLoader::from_service_account_json(&bq_key)
        .await
        .context(WarehouseSnafu)?;
    let refresh = refresh_policy(
        params.delete_existing,
        Some(PARTITION_COLUMN),
        range,
        &params.account_ids,
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
