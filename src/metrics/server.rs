//! Prometheus metrics infrastructure for gale.
//!
//! Installs the Prometheus recorder and hands the render handle to the
//! HTTP router, which serves `/metrics` alongside the connector routes.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;

use crate::error::{ConfigError, PrometheusInitSnafu};

/// Install the Prometheus recorder and return its render handle.
pub fn install_recorder() -> Result<PrometheusHandle, ConfigError> {
    PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)
}
