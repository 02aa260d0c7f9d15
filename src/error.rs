//! Error types for gale using snafu.
//!
//! Each stage of a connector run has its own error enum; `ConnectorError`
//! aggregates them and drives the HTTP status mapping.

use snafu::prelude::*;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Bind address is empty.
    #[snafu(display("Server bind address cannot be empty"))]
    EmptyBindAddress,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },

    /// Address parsing error.
    #[snafu(display("Failed to parse bind address {address}"))]
    AddressParse {
        address: String,
        source: std::net::AddrParseError,
    },

    /// Failed to bind the listen address.
    #[snafu(display("Failed to bind {address}"))]
    Bind {
        address: String,
        source: std::io::Error,
    },

    /// The HTTP server exited with an error.
    #[snafu(display("Server error"))]
    Serve { source: std::io::Error },

    /// Metrics recorder initialization failed.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Auth Errors ============

/// Errors that can occur while acquiring Google OAuth tokens.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AuthError {
    /// Service account key JSON could not be parsed.
    #[snafu(display("Invalid service account key"))]
    InvalidKey { source: std::io::Error },

    /// Authenticator construction failed.
    #[snafu(display("Failed to build authenticator"))]
    AuthenticatorBuild { source: std::io::Error },

    /// Token request was rejected.
    #[snafu(display("Token request failed"))]
    TokenRequest { source: yup_oauth2::Error },

    /// The token response carried no access token.
    #[snafu(display("Token response contained no access token"))]
    EmptyToken,

    /// OAuth refresh-token exchange failed.
    #[snafu(display("OAuth token exchange failed"))]
    TokenExchange { source: reqwest::Error },

    /// OAuth refresh-token exchange was rejected.
    #[snafu(display("OAuth token exchange returned {status}"))]
    TokenExchangeStatus { status: u16 },
}

// ============ Secret Errors ============

/// Errors that can occur while resolving secrets.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SecretError {
    /// Secret Manager request failed.
    #[snafu(display("Secret Manager request failed for {secret_id}"))]
    AccessRequest {
        secret_id: String,
        source: reqwest::Error,
    },

    /// Secret Manager returned a non-success status.
    #[snafu(display("Secret Manager returned {status} for {secret_id}"))]
    AccessDenied { secret_id: String, status: u16 },

    /// Secret payload was not valid base64.
    #[snafu(display("Secret payload for {secret_id} is not valid base64"))]
    PayloadDecode {
        secret_id: String,
        source: base64::DecodeError,
    },

    /// Secret payload was not valid UTF-8.
    #[snafu(display("Secret payload for {secret_id} is not valid UTF-8"))]
    PayloadUtf8 {
        secret_id: String,
        source: std::string::FromUtf8Error,
    },

    /// The secret payload did not have the expected shape.
    #[snafu(display("Secret {secret_id}: {message}"))]
    PayloadShape { secret_id: String, message: String },

    /// Token acquisition for the Secret Manager call failed.
    #[snafu(display("Failed to obtain a token for Secret Manager"))]
    SecretToken { source: AuthError },
}

// ============ Vendor Errors ============

/// Errors from vendor API calls (Bid Manager, Google Ads, TikTok, LinkedIn).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum VendorError {
    /// Transport-level request failure.
    #[snafu(display("{platform} request failed"))]
    Request {
        platform: &'static str,
        source: reqwest::Error,
    },

    /// The vendor returned a non-success HTTP status.
    #[snafu(display("{platform} returned {status}: {detail}"))]
    Status {
        platform: &'static str,
        status: u16,
        detail: String,
    },

    /// The vendor response was missing an expected field.
    #[snafu(display("{platform} response missing field {field}"))]
    MissingResponseField {
        platform: &'static str,
        field: String,
    },

    /// Vendor authentication failed.
    #[snafu(display("{platform} authentication failed"))]
    VendorAuth {
        platform: &'static str,
        source: AuthError,
    },

    /// The requested entity was not found at the vendor.
    #[snafu(display("{platform}: {detail}"))]
    NotFound {
        platform: &'static str,
        detail: String,
    },
}

// ============ Submission Errors ============

/// Errors raised while creating or triggering a report run.
///
/// Submission is never retried: re-creating a report definition is not
/// idempotent.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SubmissionError {
    /// The queries.create call was rejected.
    #[snafu(display("Report definition creation was rejected"))]
    CreateRejected { source: VendorError },

    /// The queries.run call was rejected.
    #[snafu(display("Report run trigger failed for query {query_id}"))]
    RunRejected {
        query_id: String,
        source: VendorError,
    },
}

// ============ Poll Errors ============

/// Errors raised by the report poller.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PollError {
    /// The status check itself failed.
    #[snafu(display("Status check failed for query {query_id} report {report_id}"))]
    StatusCheck {
        query_id: String,
        report_id: String,
        source: VendorError,
    },

    /// Gave up after the configured number of non-terminal checks.
    ///
    /// Client-side terminal state, distinct from a server-reported FAILED.
    #[snafu(display("Report {report_id} still running after {attempts} status checks"))]
    Exhausted {
        query_id: String,
        report_id: String,
        attempts: u32,
    },
}

// ============ Report Errors ============

/// Errors raised at the boundary between polling and artifact retrieval.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReportError {
    /// The server reported the report run as FAILED.
    #[snafu(display("Report {report_id} of query {query_id} finished with error"))]
    Generation { query_id: String, report_id: String },
}

// ============ Artifact Errors ============

/// Errors raised while retrieving and decoding a finished report artifact.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ArtifactError {
    /// The artifact locator is not a well-formed gs:// URI.
    #[snafu(display("Invalid artifact locator: {uri}"))]
    InvalidLocator { uri: String },

    /// Download from object storage failed.
    #[snafu(display("Artifact download failed for {uri}"))]
    Download {
        uri: String,
        source: object_store::Error,
    },

    /// Storage client construction failed.
    #[snafu(display("Failed to build storage client for bucket {bucket}"))]
    StorageClient {
        bucket: String,
        source: object_store::Error,
    },

    /// The downloaded artifact could not be decoded as CSV.
    #[snafu(display("Failed to decode artifact {uri} as CSV"))]
    CsvDecode { uri: String, source: csv::Error },
}

// ============ Warehouse Errors ============

/// Errors raised by the BigQuery loader.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    /// The warehouse service account key could not be parsed.
    #[snafu(display("Invalid warehouse service account key"))]
    InvalidLoaderKey { source: std::io::Error },

    /// Loader client construction failed.
    #[snafu(display("Failed to build BigQuery client"))]
    ClientBuild {
        source: gcp_bigquery_client::error::BQError,
    },

    /// The delete-range query failed.
    #[snafu(display("Delete of existing rows failed for {table}"))]
    DeleteQuery {
        table: String,
        source: gcp_bigquery_client::error::BQError,
    },

    /// The append insert failed.
    #[snafu(display("Append to {table} failed"))]
    Append {
        table: String,
        source: gcp_bigquery_client::error::BQError,
    },

    /// A row could not be serialized for insertion.
    #[snafu(display("Failed to serialize row {index} for {table}"))]
    RowSerialize {
        table: String,
        index: usize,
        source: gcp_bigquery_client::error::BQError,
    },

    /// BigQuery reported per-row insert errors.
    #[snafu(display("{count} rows were rejected while appending to {table}"))]
    RowsRejected { table: String, count: usize },
}

// ============ Connector Error (top-level) ============

/// Top-level connector errors that aggregate all stage errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnectorError {
    /// Bad or contradictory request parameters. Mapped to HTTP 400.
    #[snafu(display("{message}"))]
    Validation { message: String },

    /// Secret resolution failed.
    #[snafu(display("Secret resolution failed"))]
    Secret { source: SecretError },

    /// Report submission failed.
    #[snafu(display("Report submission failed"))]
    Submission { source: SubmissionError },

    /// Polling failed or was exhausted.
    #[snafu(display("Report polling failed"))]
    Poll { source: PollError },

    /// The server reported report generation as failed.
    #[snafu(display("Report generation failed"))]
    Report { source: ReportError },

    /// Artifact retrieval failed.
    #[snafu(display("Artifact retrieval failed"))]
    Artifact { source: ArtifactError },

    /// A direct vendor fetch failed.
    #[snafu(display("Vendor fetch failed"))]
    Vendor { source: VendorError },

    /// The warehouse load failed.
    #[snafu(display("Warehouse load failed"))]
    Warehouse { source: WarehouseError },
}

impl ConnectorError {
    /// True for errors caused by the request itself (HTTP 400); everything
    /// else is a downstream failure (HTTP 500).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ConnectorError::Validation { .. })
    }

    /// Human-readable detail for the HTTP error body, including the full
    /// source chain so job ids and account ids stay visible.
    pub fn detail(&self) -> String {
        use std::error::Error;

        let mut detail = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            detail.push_str(": ");
            detail.push_str(&err.to_string());
            source = err.source();
        }
        detail
    }
}

/// Shorthand for the validation failure used across request handling.
pub fn validation_error(message: impl Into<String>) -> ConnectorError {
    ConnectorError::Validation {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_client_error() {
        let err = validation_error("both start_date and reprocess window set");
        assert!(err.is_client_error());
    }

    #[test]
    fn poll_exhausted_is_server_error() {
        let err = ConnectorError::Poll {
            source: PollError::Exhausted {
                query_id: "Q1".into(),
                report_id: "R1".into(),
                attempts: 10,
            },
        };
        assert!(!err.is_client_error());
        let detail = err.detail();
        assert!(detail.contains("R1"));
        assert!(detail.contains("10"));
    }

    #[test]
    fn detail_includes_source_chain() {
        let err = ConnectorError::Report {
            source: ReportError::Generation {
                query_id: "Q9".into(),
                report_id: "R9".into(),
            },
        };
        let detail = err.detail();
        assert!(detail.starts_with("Report generation failed"));
        assert!(detail.contains("Q9"));
    }
}
