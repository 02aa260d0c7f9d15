//! BigQuery warehouse loading.
//!
//! The loader appends normalized rows to a destination table, optionally
//! preceded by a parameterized delete of the rows the new load replaces
//! (same date range and account ids on a named partition column). An
//! empty frame skips the whole operation, delete included, so a refresh
//! can never remove rows without appending their replacements.

use async_trait::async_trait;
use chrono::NaiveDate;
use gcp_bigquery_client::model::query_parameter::QueryParameter;
use gcp_bigquery_client::model::query_parameter_type::QueryParameterType;
use gcp_bigquery_client::model::query_parameter_value::QueryParameterValue;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::table_data_insert_all_request::TableDataInsertAllRequest;
use gcp_bigquery_client::Client;
use snafu::prelude::*;
use std::time::Instant;
use tracing::info;

use crate::emit;
use crate::error::{
    AppendSnafu, ClientBuildSnafu, DeleteQuerySnafu, InvalidLoaderKeySnafu, RowSerializeSnafu,
    RowsRejectedSnafu, WarehouseError,
};
use crate::frame::Frame;
use crate::metrics::events::{RefreshDeleteCompleted, RowsLoaded};

/// Rows per insertAll request, well under the API's row cap.
const INSERT_BATCH_SIZE: usize = 500;

/// Fully qualified destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub project_id: String,
    pub dataset: String,
    pub table: String,
}

impl Destination {
    /// `project.dataset.table` form used in queries and responses.
    pub fn table_ref(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset, self.table)
    }
}

/// Delete-then-append refresh scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub entity_ids: Vec<String>,
    pub partition_column: String,
}

/// Destination-agnostic loading contract.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Load a frame, optionally refreshing the covered partition first.
    /// Returns the number of rows appended.
    async fn load(
        &self,
        frame: &Frame,
        destination: &Destination,
        refresh: Option<&RefreshPolicy>,
    ) -> Result<usize, WarehouseError>;
}

/// BigQuery-backed loader.
pub struct BigQueryLoader {
    client: Client,
}

impl BigQueryLoader {
    /// Build a loader from a service account key JSON string.
    pub async fn from_service_account_json(key_json: &str) -> Result<Self, WarehouseError> {
        let key = yup_oauth2::parse_service_account_key(key_json)
            .context(InvalidLoaderKeySnafu)?;
        let client = Client::from_service_account_key(key, false)
            .await
            .context(ClientBuildSnafu)?;
        Ok(Self { client })
    }

    /// Delete rows in the refresh scope before the append.
    async fn delete_existing(
        &self,
        destination: &Destination,
        refresh: &RefreshPolicy,
    ) -> Result<(), WarehouseError> {
        let table_ref = destination.table_ref();

        let mut filter = format!(
            "DATE({}) BETWEEN @start_date AND @end_date",
            refresh.partition_column
        );
        let mut parameters = vec![
            date_parameter("start_date", refresh.start_date),
            date_parameter("end_date", refresh.end_date),
        ];

        if !refresh.entity_ids.is_empty() {
            filter.push_str(" AND account_id IN UNNEST(@account_ids)");
            parameters.push(string_array_parameter("account_ids", &refresh.entity_ids));
        }

        let mut request = QueryRequest::new(format!(
            "DELETE FROM `{table_ref}` WHERE {filter}"
        ));
        request.use_legacy_sql = false;
        request.parameter_mode = Some("NAMED".to_string());
        request.query_parameters = Some(parameters);

        let start = Instant::now();
        self.client
            .job()
            .query(&destination.project_id, request)
            .await
            .context(DeleteQuerySnafu {
                table: table_ref.clone(),
            })?;
        emit!(RefreshDeleteCompleted {
            duration: start.elapsed()
        });

        info!(
            table = %table_ref,
            start_date = %refresh.start_date,
            end_date = %refresh.end_date,
            accounts = refresh.entity_ids.len(),
            "Removed existing rows for refresh window"
        );
        Ok(())
    }
}

#[async_trait]
impl Warehouse for BigQueryLoader {
    async fn load(
        &self,
        frame: &Frame,
        destination: &Destination,
        refresh: Option<&RefreshPolicy>,
    ) -> Result<usize, WarehouseError> {
        let table_ref = destination.table_ref();

        // Nothing to append: skip the delete as well, otherwise the
        // refresh would remove rows it cannot replace.
        if frame.is_empty() {
            info!(table = %table_ref, "No rows to load");
            return Ok(0);
        }

        if let Some(refresh) = refresh {
            self.delete_existing(destination, refresh).await?;
        }

        let rows = frame.to_json_rows();
        for (chunk_index, chunk) in rows.chunks(INSERT_BATCH_SIZE).enumerate() {
            let mut request = TableDataInsertAllRequest::new();
            for (offset, row) in chunk.iter().enumerate() {
                request.add_row(None, row).context(RowSerializeSnafu {
                    table: table_ref.clone(),
                    index: chunk_index * INSERT_BATCH_SIZE + offset,
                })?;
            }

            let response = self
                .client
                .tabledata()
                .insert_all(
                    &destination.project_id,
                    &destination.dataset,
                    &destination.table,
                    request,
                )
                .await
                .context(AppendSnafu {
                    table: table_ref.clone(),
                })?;

            if let Some(errors) = response.insert_errors {
                if !errors.is_empty() {
                    return RowsRejectedSnafu {
                        table: table_ref,
                        count: errors.len(),
                    }
                    .fail();
                }
            }
        }

        emit!(RowsLoaded {
            count: frame.len() as u64
        });
        info!(table = %table_ref, rows = frame.len(), "Loaded rows");
        Ok(frame.len())
    }
}

fn date_parameter(name: &str, date: NaiveDate) -> QueryParameter {
    QueryParameter {
        name: Some(name.to_string()),
        parameter_type: Some(QueryParameterType {
            r#type: "DATE".to_string(),
            array_type: None,
            struct_types: None,
        }),
        parameter_value: Some(QueryParameterValue {
            value: Some(date.to_string()),
            array_values: None,
            struct_values: None,
        }),
    }
}

fn string_array_parameter(name: &str, values: &[String]) -> QueryParameter {
    QueryParameter {
        name: Some(name.to_string()),
        parameter_type: Some(QueryParameterType {
            r#type: "ARRAY".to_string(),
            array_type: Some(Box::new(QueryParameterType {
                r#type: "STRING".to_string(),
                array_type: None,
                struct_types: None,
            })),
            struct_types: None,
        }),
        parameter_value: Some(QueryParameterValue {
            value: None,
            array_values: Some(
                values
                    .iter()
                    .map(|v| QueryParameterValue {
                        value: Some(v.clone()),
                        array_values: None,
                        struct_values: None,
                    })
                    .collect(),
            ),
            struct_values: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_renders_table_ref() {
        let destination = Destination {
            project_id: "proj".into(),
            dataset: "ads".into(),
            table: "dv360_daily".into(),
        };
        assert_eq!(destination.table_ref(), "proj.ads.dv360_daily");
    }

    #[test]
    fn date_parameter_carries_iso_value() {
        let parameter = date_parameter(
            "start_date",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        assert_eq!(parameter.name.as_deref(), Some("start_date"));
        assert_eq!(
            parameter.parameter_value.unwrap().value.as_deref(),
            Some("2024-01-01")
        );
        assert_eq!(parameter.parameter_type.unwrap().r#type, "DATE");
    }

    #[test]
    fn array_parameter_wraps_each_value() {
        let parameter =
            string_array_parameter("account_ids", &["1".to_string(), "2".to_string()]);
        let values = parameter.parameter_value.unwrap().array_values.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].value.as_deref(), Some("1"));
        assert_eq!(
            parameter
                .parameter_type
                .unwrap()
                .array_type
                .unwrap()
                .r#type,
            "STRING"
        );
    }
}
