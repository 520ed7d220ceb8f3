use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{PageRequest, RecordPage, RecordSink, RecordSource};
use crate::config::SupabaseConfig;
use crate::error::{service_message, truncate_for_log, SinkError, SourceError};
use crate::model::{Record, RecordId};

/// Supabase PostgREST client for the records table.
///
/// Reads `id`, the source column and the destination column; writes only the
/// destination column (PATCH, never a full-row upsert).
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    endpoint: String,
    http: Client,
    api_key: String,
    source_column: String,
    destination_column: String,
    page_size: usize,
}

impl SupabaseStore {
    pub fn new(cfg: &SupabaseConfig, http: Client, page_size: usize) -> Self {
        Self {
            endpoint: cfg.rest_endpoint(),
            http,
            api_key: cfg.api_key.clone(),
            source_column: cfg.source_column.clone(),
            destination_column: cfg.destination_column.clone(),
            page_size: page_size.max(1),
        }
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
    }

    fn select_clause(&self) -> String {
        format!("id,{},{}", self.source_column, self.destination_column)
    }
}

#[async_trait]
impl RecordSource for SupabaseStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn fetch_page(&self, page: PageRequest) -> Result<RecordPage, SourceError> {
        let req = self.http.get(&self.endpoint).query(&[
            ("select", self.select_clause()),
            ("order", "id.asc".to_string()),
            ("limit", page.limit.to_string()),
            ("offset", page.offset.to_string()),
        ]);
        let resp = self.authed(req).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        let records = parse_page_response(status, &body, &self.source_column, &self.destination_column)?;
        let next = page.next_after(records.len());
        Ok(RecordPage { records, next })
    }
}

#[async_trait]
impl RecordSink for SupabaseStore {
    async fn update_record(&self, id: &RecordId, destination_images: &[String]) -> Result<(), SinkError> {
        let filter = format!("eq.{id}");
        let mut patch = Map::new();
        patch.insert(self.destination_column.clone(), json!(destination_images));
        let req = self
            .http
            .patch(&self.endpoint)
            .query(&[("id", filter.as_str()), ("select", "id")])
            .header("Prefer", "return=representation")
            .json(&patch);
        let resp = self.authed(req).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        check_update_response(status, &body, id)?;
        debug!(record_id = %id, images = destination_images.len(), "destination list written");
        Ok(())
    }
}

/// Status and body of a page read, as records.
fn parse_page_response(
    status: u16,
    body: &str,
    source_column: &str,
    destination_column: &str,
) -> Result<Vec<Record>, SourceError> {
    if !(200..300).contains(&status) {
        return Err(SourceError::Rejected {
            status,
            message: service_message(body),
        });
    }
    let rows: Value = serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;
    parse_records(&rows, source_column, destination_column)
}

/// Status and body of a `return=representation` PATCH. Row-level security
/// turns a forbidden update into an empty array, which is reported as no match.
fn check_update_response(status: u16, body: &str, id: &RecordId) -> Result<(), SinkError> {
    if !(200..300).contains(&status) {
        return Err(SinkError::Rejected {
            status,
            message: service_message(body),
        });
    }
    let rows: Value = serde_json::from_str(body).map_err(|e| SinkError::Malformed(e.to_string()))?;
    match rows.as_array() {
        Some(rows) if !rows.is_empty() => Ok(()),
        Some(_) => Err(SinkError::NoMatchingRecord(id.clone())),
        None => Err(SinkError::Malformed(format!(
            "expected a JSON array of updated rows, got {}",
            truncate_for_log(rows.to_string(), 200)
        ))),
    }
}

/// Turn a PostgREST row array into records.
fn parse_records(body: &Value, source_column: &str, destination_column: &str) -> Result<Vec<Record>, SourceError> {
    let rows = body
        .as_array()
        .ok_or_else(|| SourceError::Malformed("expected a JSON array of rows".into()))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id: RecordId = row
            .get("id")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| SourceError::Malformed(format!("row without a usable id: {row}")))?;

        let source_images = string_list(row.get(source_column), &id, source_column).unwrap_or_default();
        let destination_images = string_list(row.get(destination_column), &id, destination_column);
        out.push(Record {
            id,
            source_images,
            destination_images,
        });
    }
    Ok(out)
}

/// Null/absent column is `None`; anything that is not an array is warned and
/// treated as absent; non-string entries are dropped.
fn string_list(v: Option<&Value>, id: &RecordId, column: &str) -> Option<Vec<String>> {
    match v {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => warn!(record_id = %id, column, entry = %item, "dropping non-string image entry"),
                }
            }
            Some(out)
        }
        Some(other) => {
            warn!(record_id = %id, column, value = %other, "image column is not an array; treating as empty");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_DESTINATION_COLUMN, DEFAULT_SOURCE_COLUMN};

    fn parse(body: Value) -> Result<Vec<Record>, SourceError> {
        parse_records(&body, DEFAULT_SOURCE_COLUMN, DEFAULT_DESTINATION_COLUMN)
    }

    #[test]
    fn parses_rows_with_mixed_columns() {
        let records = parse(json!([
            { "id": 1, "images": ["http://a/1.jpg", "http://a/2.jpg"], "used_images": null },
            { "id": "b7e0", "images": [], "used_images": ["https://res.cloudinary.com/x.jpg"] },
            { "id": 3, "images": null }
        ]))
        .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, RecordId::Int(1));
        assert_eq!(records[0].source_images.len(), 2);
        assert_eq!(records[0].destination_images, None);
        assert_eq!(records[1].id, RecordId::Text("b7e0".into()));
        assert!(records[1].source_images.is_empty());
        assert_eq!(records[1].destination_images.as_ref().map(Vec::len), Some(1));
        assert!(records[2].source_images.is_empty());
    }

    #[test]
    fn drops_non_string_entries_and_non_array_columns() {
        let records = parse(json!([
            { "id": 1, "images": ["http://a/1.jpg", 5, null, "http://a/2.jpg"] },
            { "id": 2, "images": "http://a/only.jpg" }
        ]))
        .unwrap();
        assert_eq!(records[0].source_images, vec!["http://a/1.jpg", "http://a/2.jpg"]);
        assert!(records[1].source_images.is_empty());
    }

    #[test]
    fn empty_array_is_a_valid_empty_result() {
        assert!(parse(json!([])).unwrap().is_empty());
    }

    #[test]
    fn non_array_body_is_malformed() {
        let err = parse(json!({ "message": "nope" })).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn row_without_id_is_malformed() {
        let err = parse(json!([{ "images": [] }])).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn rejected_read_carries_status_and_message() {
        let body = r#"{"code":"42501","message":"permission denied for table products"}"#;
        match parse_page_response(401, body, DEFAULT_SOURCE_COLUMN, DEFAULT_DESTINATION_COLUMN) {
            Err(SourceError::Rejected { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "permission denied for table products");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_page_is_malformed() {
        let err = parse_page_response(200, "<html>gateway</html>", DEFAULT_SOURCE_COLUMN, DEFAULT_DESTINATION_COLUMN)
            .unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
        let ok = parse_page_response(200, r#"[{"id":1,"images":["http://a/1.jpg"]}]"#, "images", "used_images").unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn update_with_returned_row_succeeds() {
        assert!(check_update_response(200, r#"[{"id":7}]"#, &RecordId::Int(7)).is_ok());
    }

    #[test]
    fn update_matching_no_row_is_reported() {
        let err = check_update_response(200, "[]", &RecordId::Int(7)).unwrap_err();
        assert!(matches!(err, SinkError::NoMatchingRecord(RecordId::Int(7))));
    }

    #[test]
    fn rejected_update_carries_status_and_message() {
        let body = r#"{"code":"PGRST301","message":"JWT expired"}"#;
        match check_update_response(401, body, &RecordId::Int(7)) {
            Err(SinkError::Rejected { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "JWT expired");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_update_body_is_not_mistaken_for_no_match() {
        let id = RecordId::Int(7);
        assert!(matches!(
            check_update_response(204, "", &id),
            Err(SinkError::Malformed(_))
        ));
        assert!(matches!(
            check_update_response(200, "<html>proxy</html>", &id),
            Err(SinkError::Malformed(_))
        ));
        assert!(matches!(
            check_update_response(200, r#"{"id":7}"#, &id),
            Err(SinkError::Malformed(_))
        ));
    }

    #[test]
    fn select_clause_uses_configured_columns() {
        let cfg = SupabaseConfig {
            url: "https://abc.supabase.co".into(),
            api_key: "k".into(),
            table: "products".into(),
            source_column: "gallery".into(),
            destination_column: "hosted_gallery".into(),
        };
        let store = SupabaseStore::new(&cfg, Client::new(), 0);
        assert_eq!(store.select_clause(), "id,gallery,hosted_gallery");
        assert_eq!(store.page_size, 1);
        assert_eq!(store.endpoint, "https://abc.supabase.co/rest/v1/products");
    }

    #[tokio::test]
    #[ignore] // Requires SUPABASE_URL and a key in the environment
    async fn live_fetch_first_page() {
        crate::util::env::init_env();
        let cfg = crate::config::MigrationConfig::from_env().unwrap();
        let store = SupabaseStore::new(&cfg.supabase, Client::new(), 5);
        let page = store.fetch_page(PageRequest::first(5)).await;
        assert!(page.is_ok(), "fetch failed: {:?}", page.err());
    }
}
