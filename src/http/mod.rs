//! HTTP surface.
//!
//! One router serves every connector: `GET /health`, `GET /metrics`,
//! and a `POST /{platform}/load` per platform. Request bodies mirror
//! the connector parameters; fields the caller leaves out fall back to
//! the per-connector defaults in the service config. Validation errors
//! map to 400, everything downstream to 500, both with a `detail` body.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::connectors::{self, require, require_list, LoadOutcome};
use crate::emit;
use crate::error::{
    AddressParseSnafu, BindSnafu, ConfigError, ConnectorError, SecretSnafu, SecretTokenSnafu,
    ServeSnafu,
};
use crate::google::auth::adc_authenticator;
use crate::metrics::events::{ConnectorRequest, RequestStatus};
use crate::metrics::install_recorder;
use crate::report::PollConfig;
use crate::secrets::SecretManagerResolver;
use crate::warehouse::Destination;

const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    metrics_handle: Option<PrometheusHandle>,
}

/// Build the service router.
pub fn router(config: Arc<Config>, metrics_handle: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/dv360/load", post(dv360_load))
        .route("/google-ads/load", post(google_ads_load))
        .route("/tiktok/load", post(tiktok_load))
        .route("/linkedin/load", post(linkedin_load))
        .with_state(AppState {
            config,
            metrics_handle,
        })
}

/// Bind and serve until interrupted.
pub async fn serve(config: Config) -> Result<(), ConfigError> {
    let metrics_handle = if config.metrics.enabled {
        Some(install_recorder()?)
    } else {
        None
    };

    let address = config.server.address.clone();
    let addr: std::net::SocketAddr = address.parse().context(AddressParseSnafu {
        address: address.clone(),
    })?;

    let app = router(Arc::new(config), metrics_handle);

    let listener = TcpListener::bind(addr).await.context(BindSnafu {
        address: address.clone(),
    })?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context(ServeSnafu)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown requested");
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Render a connector result, mapping the error taxonomy onto statuses.
fn respond<T: serde::Serialize>(
    platform: &'static str,
    result: Result<T, ConnectorError>,
) -> Response {
    match result {
        Ok(outcome) => {
            emit!(ConnectorRequest {
                platform,
                status: RequestStatus::Success,
            });
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Err(err) => {
            emit!(ConnectorRequest {
                platform,
                status: RequestStatus::Error,
            });
            let status = if err.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            let detail = err.detail();
            error!(platform, %detail, "Load request failed");
            (status, Json(json!({"detail": detail}))).into_response()
        }
    }
}

/// Build the per-request secret resolver on the host's own credentials.
async fn secret_resolver() -> Result<SecretManagerResolver, ConnectorError> {
    let auth = adc_authenticator()
        .await
        .context(SecretTokenSnafu)
        .context(SecretSnafu)?;
    Ok(SecretManagerResolver::new(reqwest::Client::new(), auth))
}

// ============ DV360 ============

#[derive(Debug, Deserialize)]
struct Dv360LoadRequest {
    timezone: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    reprocess_last_x_days: Option<i64>,
    advertiser_ids: Vec<String>,
    metrics: Vec<String>,
    dimensions: Vec<String>,
    file_name: Option<String>,
    query_id: Option<String>,
    secret_project_id: Option<String>,
    dv360_secret_id: Option<String>,
    bq_secret_id: Option<String>,
    destination_project_id: Option<String>,
    destination_dataset: Option<String>,
    destination_table: Option<String>,
    delete_existing: Option<bool>,
    partition_column: Option<String>,
    max_retry_count: Option<u32>,
    min_retry_interval: Option<u64>,
    max_retry_interval: Option<u64>,
}

async fn dv360_load(
    State(state): State<AppState>,
    Json(request): Json<Dv360LoadRequest>,
) -> Response {
    respond("dv360", handle_dv360(&state, request).await)
}

async fn handle_dv360(
    state: &AppState,
    request: Dv360LoadRequest,
) -> Result<LoadOutcome, ConnectorError> {
    let defaults = |key: &str| state.config.connector_default("dv360", key);

    let params = connectors::dv360::Dv360Params {
        timezone: request
            .timezone
            .or_else(|| defaults("timezone"))
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        start_date: request.start_date,
        end_date: request.end_date,
        reprocess_last_x_days: request.reprocess_last_x_days,
        advertiser_ids: require_list(request.advertiser_ids, "advertiser_ids")?,
        metrics: require_list(request.metrics, "metrics")?,
        dimensions: require_list(request.dimensions, "dimensions")?,
        file_name: request
            .file_name
            .unwrap_or_else(|| "dv360_report".to_string()),
        query_id: request.query_id,
        secret_project_id: require(
            request.secret_project_id.or_else(|| defaults("secret_project_id")),
            "secret_project_id",
        )?,
        dv360_secret_id: require(
            request.dv360_secret_id.or_else(|| defaults("dv360_secret_id")),
            "dv360_secret_id",
        )?,
        bq_secret_id: require(
            request.bq_secret_id.or_else(|| defaults("bq_secret_id")),
            "bq_secret_id",
        )?,
        destination: destination(state, "dv360", DestinationFields {
            project_id: request.destination_project_id,
            dataset: request.destination_dataset,
            table: request.destination_table,
            table_key: "destination_table",
        })?,
        delete_existing: request.delete_existing.unwrap_or(false),
        partition_column: request.partition_column,
        poll: PollConfig {
            min_interval: Duration::from_secs(request.min_retry_interval.unwrap_or(30)),
            max_interval: Duration::from_secs(request.max_retry_interval.unwrap_or(60)),
            max_attempts: request.max_retry_count.unwrap_or(10),
        },
    };

    let resolver = secret_resolver().await?;
    connectors::dv360::run(params, &resolver).await
}

// ============ Google Ads ============

#[derive(Debug, Deserialize)]
struct GoogleAdsLoadRequest {
    timezone: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    reprocess_last_x_days: Option<i64>,
    customer_ids: Vec<String>,
    query: String,
    secret_project_id: Option<String>,
    google_ads_secret_id: Option<String>,
    bq_secret_id: Option<String>,
    destination_project_id: Option<String>,
    destination_dataset: Option<String>,
    destination_table: Option<String>,
    delete_existing: Option<bool>,
    partition_column: Option<String>,
}

async fn google_ads_load(
    State(state): State<AppState>,
    Json(request): Json<GoogleAdsLoadRequest>,
) -> Response {
    respond("google_ads", handle_google_ads(&state, request).await)
}

async fn handle_google_ads(
    state: &AppState,
    request: GoogleAdsLoadRequest,
) -> Result<LoadOutcome, ConnectorError> {
    let defaults = |key: &str| state.config.connector_default("google_ads", key);

    let params = connectors::google_ads::GoogleAdsParams {
        timezone: request
            .timezone
            .or_else(|| defaults("timezone"))
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        start_date: request.start_date,
        end_date: request.end_date,
        reprocess_last_x_days: request.reprocess_last_x_days,
        customer_ids: require_list(request.customer_ids, "customer_ids")?,
        query: require(Some(request.query), "query")?,
        secret_project_id: require(
            request.secret_project_id.or_else(|| defaults("secret_project_id")),
            "secret_project_id",
        )?,
        google_ads_secret_id: require(
            request
                .google_ads_secret_id
                .or_else(|| defaults("google_ads_secret_id")),
            "google_ads_secret_id",
        )?,
        bq_secret_id: require(
            request.bq_secret_id.or_else(|| defaults("bq_secret_id")),
            "bq_secret_id",
        )?,
        destination: destination(state, "google_ads", DestinationFields {
            project_id: request.destination_project_id,
            dataset: request.destination_dataset,
            table: request.destination_table,
            table_key: "destination_table",
        })?,
        delete_existing: request.delete_existing.unwrap_or(false),
        partition_column: request.partition_column,
    };

    let resolver = secret_resolver().await?;
    connectors::google_ads::run(params, &resolver).await
}

// ============ TikTok ============

#[derive(Debug, Deserialize)]
struct TikTokLoadRequest {
    timezone: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    reprocess_last_x_days: Option<i64>,
    account_ids: Vec<String>,
    dimensions: Vec<String>,
    metrics: Vec<String>,
    level: Option<String>,
    report_type: Option<String>,
    secret_project_id: Option<String>,
    tiktok_secret_id: Option<String>,
    bq_secret_id: Option<String>,
    destination_project_id: Option<String>,
    destination_dataset: Option<String>,
    destination_table: Option<String>,
    delete_existing: Option<bool>,
}

async fn tiktok_load(
    State(state): State<AppState>,
    Json(request): Json<TikTokLoadRequest>,
) -> Response {
    respond("tiktok", handle_tiktok(&state, request).await)
}

async fn handle_tiktok(
    state: &AppState,
    request: TikTokLoadRequest,
) -> Result<LoadOutcome, ConnectorError> {
    let defaults = |key: &str| state.config.connector_default("tiktok", key);

    let params = connectors::tiktok::TikTokParams {
        timezone: request
            .timezone
            .or_else(|| defaults("timezone"))
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        start_date: request.start_date,
        end_date: request.end_date,
        reprocess_last_x_days: request.reprocess_last_x_days,
        account_ids: require_list(request.account_ids, "account_ids")?,
        dimensions: require_list(request.dimensions, "dimensions")?,
        metrics: require_list(request.metrics, "metrics")?,
        level: request.level.unwrap_or_else(|| "AUCTION_AD".to_string()),
        report_type: request.report_type.unwrap_or_else(|| "BASIC".to_string()),
        secret_project_id: require(
            request.secret_project_id.or_else(|| defaults("secret_project_id")),
            "secret_project_id",
        )?,
        tiktok_secret_id: require(
            request.tiktok_secret_id.or_else(|| defaults("tiktok_secret_id")),
            "tiktok_secret_id",
        )?,
        bq_secret_id: require(
            request.bq_secret_id.or_else(|| defaults("bq_secret_id")),
            "bq_secret_id",
        )?,
        destination: destination(state, "tiktok", DestinationFields {
            project_id: request.destination_project_id,
            dataset: request.destination_dataset,
            table: request.destination_table,
            table_key: "destination_table",
        })?,
        delete_existing: request.delete_existing.unwrap_or(true),
    };

    let resolver = secret_resolver().await?;
    connectors::tiktok::run(params, &resolver).await
}

// ============ LinkedIn ============

#[derive(Debug, Deserialize)]
struct LinkedInLoadRequest {
    organization_urn: Option<String>,
    client_name: Option<String>,
    posts_count: Option<u32>,
    timezone: Option<String>,
    secret_project_id: Option<String>,
    linkedin_secret_id: Option<String>,
    bq_secret_id: Option<String>,
    destination_project_id: Option<String>,
    destination_dataset: Option<String>,
    destination_general_table: Option<String>,
    destination_posts_table: Option<String>,
}

async fn linkedin_load(
    State(state): State<AppState>,
    Json(request): Json<LinkedInLoadRequest>,
) -> Response {
    respond("linkedin", handle_linkedin(&state, request).await)
}

async fn handle_linkedin(
    state: &AppState,
    request: LinkedInLoadRequest,
) -> Result<connectors::linkedin::LinkedInOutcome, ConnectorError> {
    let defaults = |key: &str| state.config.connector_default("linkedin", key);

    let general_destination = destination(state, "linkedin", DestinationFields {
        project_id: request.destination_project_id.clone(),
        dataset: request.destination_dataset.clone(),
        table: request.destination_general_table,
        table_key: "destination_general_table",
    })?;
    let posts_destination = destination(state, "linkedin", DestinationFields {
        project_id: request.destination_project_id,
        dataset: request.destination_dataset,
        table: request.destination_posts_table,
        table_key: "destination_posts_table",
    })?;

    let params = connectors::linkedin::LinkedInParams {
        organization_urn: require(
            request.organization_urn.or_else(|| defaults("organization_urn")),
            "organization_urn",
        )?,
        client_name: require(
            request.client_name.or_else(|| defaults("client_name")),
            "client_name",
        )?,
        posts_count: request
            .posts_count
            .or_else(|| defaults("posts_count").and_then(|v| v.parse().ok()))
            .unwrap_or(40),
        timezone: request
            .timezone
            .or_else(|| defaults("timezone"))
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        secret_project_id: require(
            request.secret_project_id.or_else(|| defaults("secret_project_id")),
            "secret_project_id",
        )?,
        linkedin_secret_id: require(
            request.linkedin_secret_id.or_else(|| defaults("linkedin_secret_id")),
            "linkedin_secret_id",
        )?,
        bq_secret_id: require(
            request.bq_secret_id.or_else(|| defaults("bq_secret_id")),
            "bq_secret_id",
        )?,
        general_destination,
        posts_destination,
    };

    let resolver = secret_resolver().await?;
    connectors::linkedin::run(params, &resolver).await
}

// ============ Shared ============

struct DestinationFields {
    project_id: Option<String>,
    dataset: Option<String>,
    table: Option<String>,
    table_key: &'static str,
}

/// Resolve a destination triple from the request and config defaults.
fn destination(
    state: &AppState,
    platform: &str,
    fields: DestinationFields,
) -> Result<Destination, ConnectorError> {
    let defaults = |key: &str| state.config.connector_default(platform, key);
    Ok(Destination {
        project_id: require(
            fields.project_id.or_else(|| defaults("destination_project_id")),
            "destination_project_id",
        )?,
        dataset: require(
            fields.dataset.or_else(|| defaults("destination_dataset")),
            "destination_dataset",
        )?,
        table: require(
            fields.table.or_else(|| defaults(fields.table_key)),
            fields.table_key,
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(yaml: &str) -> AppState {
        AppState {
            config: Arc::new(serde_yaml::from_str(yaml).unwrap()),
            metrics_handle: None,
        }
    }

    #[test]
    fn request_fields_win_over_config_defaults() {
        let state = state_with(
            r#"
connectors:
  dv360:
    destination_project_id: "default-project"
    destination_dataset: "default-dataset"
    destination_table: "default-table"
"#,
        );
        let resolved = destination(&state, "dv360", DestinationFields {
            project_id: Some("request-project".into()),
            dataset: None,
            table: None,
            table_key: "destination_table",
        })
        .unwrap();
        assert_eq!(resolved.project_id, "request-project");
        assert_eq!(resolved.dataset, "default-dataset");
        assert_eq!(resolved.table, "default-table");
    }

    #[test]
    fn missing_destination_is_a_validation_error() {
        let state = state_with("{}");
        let err = destination(&state, "dv360", DestinationFields {
            project_id: None,
            dataset: None,
            table: None,
            table_key: "destination_table",
        })
        .unwrap_err();
        assert!(err.is_client_error());
        assert!(err.detail().contains("destination_project_id"));
    }

    #[test]
    fn dv360_request_minimal_body_deserializes() {
        let body = r#"{
            "advertiser_ids": ["1"],
            "metrics": ["METRIC_IMPRESSIONS"],
            "dimensions": ["FILTER_DATE"]
        }"#;
        let request: Dv360LoadRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.advertiser_ids, vec!["1"]);
        assert!(request.query_id.is_none());
        assert!(request.delete_existing.is_none());
    }

    #[test]
    fn tiktok_defaults_level_and_report_type() {
        let body = r#"{
            "account_ids": ["a"],
            "dimensions": ["ad_id"],
            "metrics": ["spend"]
        }"#;
        let request: TikTokLoadRequest = serde_json::from_str(body).unwrap();
        assert!(request.level.is_none());
        assert!(request.report_type.is_none());
    }
}
