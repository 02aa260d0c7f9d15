//! Google Ads connector.
//!
//! Synchronous fetch: one searchStream call per customer id, flattened
//! rows concatenated and decorated with the customer id and ingestion
//! time before loading.

use serde_json::json;
use snafu::prelude::*;
use tracing::info;

use crate::connectors::{refresh_policy, LoadOutcome};
use crate::dates::resolve_date_range;
use crate::error::{ConnectorError, SecretSnafu, VendorSnafu, WarehouseSnafu};
use crate::frame::Frame;
use crate::secrets::SecretResolver;
use crate::vendor::{GoogleAdsClient, GoogleAdsCredentials};
use crate::warehouse::{BigQueryLoader, Destination, Warehouse};

/// Timestamp columns in a Google Ads report frame.
const TIMESTAMP_COLUMNS: &[&str] = &["segments.date", "ingestion_time"];

/// Fully resolved parameters for one Google Ads load.
#[derive(Debug, Clone)]
pub struct GoogleAdsParams {
    pub timezone: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub reprocess_last_x_days: Option<i64>,
    pub customer_ids: Vec<String>,
    pub query: String,
    pub secret_project_id: String,
    pub google_ads_secret_id: String,
    pub bq_secret_id: String,
    pub destination: Destination,
    pub delete_existing: bool,
    pub partition_column: Option<String>,
}

/// Handle one Google Ads load request end-to-end.
pub async fn run(
    params: GoogleAdsParams,
    secrets: &dyn SecretResolver,
) -> Result<LoadOutcome, ConnectorError> {
    let range = resolve_date_range(
        &params.timezone,
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        params.reprocess_last_x_days,
    )?;

    let ads_payload = secrets
        .resolve(
            &params.secret_project_id,
            &params.google_ads_secret_id,
            "latest",
        )
        .await
        .context(SecretSnafu)?;
    let credentials =
        GoogleAdsCredentials::from_payload(&ads_payload, &params.google_ads_secret_id)
            .context(SecretSnafu)?;

    let bq_payload = secrets
        .resolve(&params.secret_project_id, &params.bq_secret_id, "latest")
        .await
        .context(SecretSnafu)?;
    let bq_key = bq_payload
        .service_account_json(&params.bq_secret_id)
        .context(SecretSnafu)?;

    let client = GoogleAdsClient::new(reqwest::Client::new(), credentials);
    let ingestion_time = chrono::Utc::now().to_rfc3339();

    let mut combined = Frame::default();
    for customer_id in &params.customer_ids {
        let mut frame = client
            .search_stream(customer_id, &params.query)
            .await
            .context(VendorSnafu)?;
        if frame.is_empty() {
            info!(customer_id, "No report rows for customer");
            continue;
        }
        frame.push_constant_column("customer_id", json!(customer_id));
        frame.push_constant_column("ingestion_time", json!(ingestion_time));
        combined.concat(frame);
    }

    let frame = combined.normalize(TIMESTAMP_COLUMNS);

    let warehouse = BigQueryLoader::from_service_account_json(&bq_key)
        .await
        .context(WarehouseSnafu)?;
    let refresh = refresh_policy(
        params.delete_existing,
        params.partition_column.as_deref(),
        range,
        &params.customer_ids,
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
