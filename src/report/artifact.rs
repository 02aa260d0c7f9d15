//! Finished-report artifact retrieval.
//!
//! A DONE report snapshot carries a `gs://bucket/path` locator. The
//! retriever parses it, downloads the whole object, and decodes it as
//! CSV with a header row. Report sizes are bounded by the reporting
//! API's own export limits, so there is no streamed retrieval.

use regex::Regex;
use serde_json::Value;
use snafu::prelude::*;
use std::sync::OnceLock;
use tracing::info;

use crate::error::{ArtifactError, CsvDecodeSnafu, InvalidLocatorSnafu};
use crate::frame::Frame;
use crate::storage::ObjectDownloader;

const GCS_URL: &str = r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)/(?P<key>.+)$";

fn locator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(GCS_URL).expect("locator pattern is valid"))
}

/// A parsed `gs://` artifact locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    pub bucket: String,
    pub path: String,
}

impl ArtifactLocator {
    /// Parse a `gs://bucket/path` URI.
    ///
    /// Any other scheme (or a missing object path) is rejected: a DONE
    /// report that does not point into Cloud Storage is a protocol
    /// violation.
    pub fn parse(uri: &str) -> Result<Self, ArtifactError> {
        let captures = locator_pattern()
            .captures(uri)
            .context(InvalidLocatorSnafu { uri })?;

        Ok(Self {
            bucket: captures["bucket"].to_string(),
            path: captures["key"].to_string(),
        })
    }
}

/// Downloads and decodes finished report artifacts.
pub struct ArtifactRetriever<'a> {
    downloader: &'a dyn ObjectDownloader,
}

impl<'a> ArtifactRetriever<'a> {
    pub fn new(downloader: &'a dyn ObjectDownloader) -> Self {
        Self { downloader }
    }

    /// Fetch the artifact at `uri` and decode it into a frame.
    ///
    /// The same locator always yields the same rows: the artifact is
    /// immutable once the run is DONE.
    pub async fn retrieve(&self, uri: &str) -> Result<Frame, ArtifactError> {
        let locator = ArtifactLocator::parse(uri)?;
        let bytes = self
            .downloader
            .download(&locator.bucket, &locator.path)
            .await?;

        let frame = decode_csv(&bytes, uri)?;
        info!(
            uri,
            rows = frame.len(),
            columns = frame.columns().len(),
            "Artifact decoded"
        );
        Ok(frame)
    }
}

/// Decode header-first CSV bytes into a frame of string cells.
fn decode_csv(bytes: &[u8], uri: &str) -> Result<Frame, ArtifactError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .context(CsvDecodeSnafu { uri })?
        .iter()
        .map(String::from)
        .collect::<Vec<_>>();
    let width = headers.len();

    let mut frame = Frame::new(headers);
    for record in reader.records() {
        let record = record.context(CsvDecodeSnafu { uri })?;
        let mut row: Vec<Value> = record
            .iter()
            .take(width)
            .map(|cell| Value::String(cell.to_string()))
            .collect();
        row.resize(width, Value::Null);
        frame.push_row(row);
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;

    struct StaticDownloader {
        content: &'static [u8],
    }

    #[async_trait]
    impl ObjectDownloader for StaticDownloader {
        async fn download(
            &self,
            _bucket: &str,
            _path: &str,
        ) -> Result<Bytes, ArtifactError> {
            Ok(Bytes::from_static(self.content))
        }
    }

    #[test]
    fn parses_gcs_locator() {
        let locator = ArtifactLocator::parse("gs://report-bucket/exports/r1.csv").unwrap();
        assert_eq!(locator.bucket, "report-bucket");
        assert_eq!(locator.path, "exports/r1.csv");
    }

    #[test]
    fn rejects_non_gcs_scheme() {
        let err = ArtifactLocator::parse("s3://bucket/r1.csv").unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidLocator { .. }));
    }

    #[test]
    fn rejects_bucket_only_locator() {
        assert!(ArtifactLocator::parse("gs://bucket").is_err());
    }

    #[tokio::test]
    async fn decodes_csv_with_header() {
        let downloader = StaticDownloader {
            content: b"date,impressions\n2024-01-01,100\n2024-01-02,200\n",
        };
        let retriever = ArtifactRetriever::new(&downloader);
        let frame = retriever.retrieve("gs://bucket/r1.csv").await.unwrap();

        assert_eq!(frame.columns(), &["date", "impressions"]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.rows()[0][0], json!("2024-01-01"));
        assert_eq!(frame.rows()[1][1], json!("200"));
    }

    #[tokio::test]
    async fn retrieval_is_idempotent() {
        let downloader = StaticDownloader {
            content: b"a,b\n1,2\n",
        };
        let retriever = ArtifactRetriever::new(&downloader);
        let first = retriever.retrieve("gs://bucket/r1.csv").await.unwrap();
        let second = retriever.retrieve("gs://bucket/r1.csv").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn short_rows_pad_with_nulls() {
        let downloader = StaticDownloader {
            content: b"a,b,c\n1,2\n",
        };
        let retriever = ArtifactRetriever::new(&downloader);
        let frame = retriever.retrieve("gs://bucket/r1.csv").await.unwrap();
        assert_eq!(frame.rows()[0][2], Value::Null);
    }
}
