//! LinkedIn connector.
//!
//! Synchronous fetch of two frames: a one-row organization snapshot
//! (follower count) and a posts frame joining recent posts with their
//! share statistics. Each frame loads into its own table.

use chrono::{Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{json, Map, Value};
use snafu::prelude::*;
use tracing::info;

use crate::error::{validation_error, ConnectorError, SecretSnafu, VendorSnafu, WarehouseSnafu};
use crate::frame::Frame;
use crate::secrets::SecretResolver;
use crate::vendor::LinkedInClient;
use crate::warehouse::{BigQueryLoader, Destination, Warehouse};

/// Fully resolved parameters for one LinkedIn load.
#[derive(Debug, Clone)]
pub struct LinkedInParams {
    pub organization_urn: String,
    pub client_name: String,
    pub posts_count: u32,
    pub timezone: String,
    pub secret_project_id: String,
    pub linkedin_secret_id: String,
    pub bq_secret_id: String,
    pub general_destination: Destination,
    pub posts_destination: Destination,
}

/// Row counts and destinations for the two LinkedIn tables.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LinkedInOutcome {
    pub success: bool,
    pub general_rows: usize,
    pub posts_rows: usize,
    pub general_destination: String,
    pub posts_destination: String,
}

/// Handle one LinkedIn load request end-to-end.
pub async fn run(
    params: LinkedInParams,
    secrets: &dyn SecretResolver,
) -> Result<LinkedInOutcome, ConnectorError> {
    let tz: Tz = params
        .timezone
        .parse()
        .map_err(|_| validation_error(format!("Unknown timezone: {}", params.timezone)))?;
    // Share statistics lag; snapshot two days back like the reports do.
    let date_insertion = (Utc::now().with_timezone(&tz) - Duration::days(2))
        .format("%d-%m-%Y")
        .to_string();

    let linkedin_payload = secrets
        .resolve(
            &params.secret_project_id,
            &params.linkedin_secret_id,
            "latest",
        )
        .await
        .context(SecretSnafu)?;
    let access_token = linkedin_payload
        .extract_access_token(&params.linkedin_secret_id)
        .context(SecretSnafu)?;

    let bq_payload = secrets
        .resolve(&params.secret_project_id, &params.bq_secret_id, "latest")
        .await
        .context(SecretSnafu)?;
    let bq_key = bq_payload
        .service_account_json(&params.bq_secret_id)
        .context(SecretSnafu)?;

    let client = LinkedInClient::new(reqwest::Client::new(), access_token);

    let (org_id, org_name) = client
        .find_organization(&params.client_name)
        .await
        .context(VendorSnafu)?;
    let followers = client
        .fetch_followers(&params.organization_urn)
        .await
        .context(VendorSnafu)?;

    let general_frame = build_general_frame(&date_insertion, &org_id, &org_name, followers)
        .normalize(&["date_insertion"]);

    let posts = client
        .fetch_posts(&params.organization_urn, params.posts_count)
        .await
        .context(VendorSnafu)?;

    let mut post_records: Vec<Map<String, Value>> = Vec::new();
    for post in &posts {
        let Some(post_id) = post.get("id").and_then(Value::as_str) else {
            continue;
        };
        let statistics = client
            .fetch_post_statistics(&params.organization_urn, post_id)
            .await
            .context(VendorSnafu)?;
        post_records.push(build_post_record(&date_insertion, post, post_id, &statistics));
    }
    let posts_frame =
        Frame::from_records(post_records).normalize(&["created", "date_insertion"]);

    info!(
        organization = %org_name,
        followers,
        posts = posts_frame.len(),
        "Fetched LinkedIn snapshot"
    );

    let warehouse = BigQueryLoader::from_service_account_json(&bq_key)
        .await
        .context(WarehouseSnafu)?;
    let general_rows = warehouse
        .load(&general_frame, &params.general_destination, None)
        .await
        .context(WarehouseSnafu)?;
    let posts_rows = warehouse
        .load(&posts_frame, &params.posts_destination, None)
        .await
        .context(WarehouseSnafu)?;

    Ok(LinkedInOutcome {
        success: true,
        general_rows,
        posts_rows,
        general_destination: params.general_destination.table_ref(),
        posts_destination: params.posts_destination.table_ref(),
    })
}

/// One-row organization snapshot.
fn build_general_frame(
    date_insertion: &str,
    org_id: &str,
    org_name: &str,
    followers: i64,
) -> Frame {
    let mut record = Map::new();
    record.insert("date_insertion".into(), json!(date_insertion));
    record.insert("id".into(), json!(org_id));
    record.insert("client".into(), json!(org_name));
    record.insert("followers".into(), json!(followers));
    Frame::from_records(vec![record])
}

/// Flatten one post plus its share statistics into a row.
fn build_post_record(
    date_insertion: &str,
    post: &Value,
    post_id: &str,
    statistics: &Value,
) -> Map<String, Value> {
    let created = post
        .get("created")
        .and_then(|c| c.get("time"))
        .and_then(Value::as_i64)
        .and_then(|millis| chrono::DateTime::from_timestamp_millis(millis))
        .map(|dt| dt.date_naive().to_string());

    let share_content = post
        .get("specificContent")
        .and_then(|c| c.get("com.linkedin.ugc.ShareContent"));
    let post_type = share_content
        .and_then(|c| c.get("shareMediaCategory"))
        .cloned()
        .unwrap_or(Value::Null);
    let text = share_content
        .and_then(|c| c.get("shareCommentary"))
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .replace(['\n', '\r'], " ");
    let thumbnail_url = share_content
        .and_then(|c| c.get("media"))
        .and_then(Value::as_array)
        .and_then(|media| media.first())
        .and_then(|m| m.get("originalUrl"))
        .cloned()
        .unwrap_or(json!(""));

    let mut record = Map::new();
    record.insert("date_insertion".into(), json!(date_insertion));
    record.insert(
        "author".into(),
        post.get("author").cloned().unwrap_or(Value::Null),
    );
    record.insert(
        "created".into(),
        created.map(Value::String).unwrap_or(Value::Null),
    );
    record.insert("post_id".into(), json!(post_id));
    record.insert("post_type".into(), post_type);
    record.insert("text".into(), json!(text));
    record.insert("thumbnail_url".into(), thumbnail_url);
    record.insert(
        "url".into(),
        json!(format!("https://www.linkedin.com/embed/feed/update/{post_id}")),
    );
    for (source_key, column) in [
        ("uniqueImpressionsCount", "uniqueImpressionsCount"),
        ("shareCount", "sharecount"),
        ("engagement", "engagement"),
        ("clickCount", "clickcount"),
        ("likeCount", "likeCount"),
        ("impressionCount", "impressioncount"),
        ("commentCount", "commentcount"),
    ] {
        record.insert(
            column.into(),
            statistics.get(source_key).cloned().unwrap_or(Value::Null),
        );
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_frame_has_one_row() {
        let frame = build_general_frame("05-08-2026", "urn:li:organization:1", "Acme", 1234);
        assert_eq!(frame.len(), 1);
        assert_eq!(
            frame.columns(),
            &["date_insertion", "id", "client", "followers"]
        );
        assert_eq!(frame.rows()[0][3], json!(1234));
    }

    #[test]
    fn post_record_flattens_content_and_statistics() {
        let post = json!({
            "author": "urn:li:organization:1",
            "created": {"time": 1704067200000i64},
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareMediaCategory": "IMAGE",
                    "shareCommentary": {"text": "line one\nline two"},
                    "media": [{"originalUrl": "https://cdn/img.png"}]
                }
            }
        });
        let statistics = json!({"likeCount": 10, "shareCount": 2});

        let record = build_post_record("05-08-2026", &post, "urn:li:ugcPost:9", &statistics);
        assert_eq!(record["created"], json!("2024-01-01"));
        assert_eq!(record["post_type"], json!("IMAGE"));
        assert_eq!(record["text"], json!("line one line two"));
        assert_eq!(record["likeCount"], json!(10));
        assert_eq!(record["sharecount"], json!(2));
        assert_eq!(record["commentcount"], Value::Null);
        assert_eq!(
            record["url"],
            json!("https://www.linkedin.com/embed/feed/update/urn:li:ugcPost:9")
        );
    }

    #[test]
    fn post_record_tolerates_missing_media() {
        let post = json!({"created": {"time": 1704067200000i64}});
        let record = build_post_record("05-08-2026", &post, "p", &json!({}));
        assert_eq!(record["thumbnail_url"], json!(""));
        assert_eq!(record["text"], json!(""));
    }
}
