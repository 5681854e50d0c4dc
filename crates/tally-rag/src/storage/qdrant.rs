use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::VectorStore;
use crate::config::TallyConfig;
use crate::http;
use crate::types::{Hit, Payload, Record, ScanCursor, ScanPage};

/// Qdrant REST client. Vectors are never requested back, only payloads.
pub struct QdrantStore {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    id: Value,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Default, Deserialize)]
struct RawScroll {
    #[serde(default)]
    points: Option<Vec<RawPoint>>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawCollectionInfo {
    #[serde(default)]
    points_count: Option<u64>,
}

/// Qdrant ids are either unsigned integers or UUID strings.
fn point_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl RawPoint {
    fn into_record(self) -> Record {
        Record {
            id: point_id(&self.id),
            payload: self.payload.unwrap_or_default(),
        }
    }

    fn into_hit(self) -> Hit {
        Hit {
            record_id: point_id(&self.id),
            score: self.score.unwrap_or(0.0),
            payload: self.payload.unwrap_or_default(),
        }
    }
}

impl RawScroll {
    fn into_page(self) -> ScanPage {
        ScanPage {
            records: self
                .points
                .unwrap_or_default()
                .into_iter()
                .map(RawPoint::into_record)
                .collect(),
            next_cursor: ScanCursor::from_token(self.next_page_offset),
        }
    }
}

impl QdrantStore {
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = http::build_client(connect_timeout, timeout)?;

        tracing::info!(
            base_url = %base_url,
            timeout_secs = timeout.as_secs(),
            "Creating QdrantStore"
        );

        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &TallyConfig) -> Result<Self> {
        Self::new(
            config.services.qdrant_url.clone(),
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.vector_store_secs),
        )
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/collections/{}", self.base_url, collection)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<Hit>> {
        let endpoint = format!("{}/points/search", self.collection_url(collection));
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });

        let response: Envelope<Vec<RawPoint>> =
            http::send_json(self.client.post(&endpoint).json(&body), &endpoint)
                .await
                .context("Qdrant search failed")?;

        let hits: Vec<Hit> = response
            .result
            .unwrap_or_default()
            .into_iter()
            .map(RawPoint::into_hit)
            .collect();

        tracing::debug!(collection = %collection, limit, hits = hits.len(), "Qdrant search");
        Ok(hits)
    }

    async fn scroll(
        &self,
        collection: &str,
        batch_size: usize,
        cursor: Option<&ScanCursor>,
    ) -> Result<ScanPage> {
        let endpoint = format!("{}/points/scroll", self.collection_url(collection));
        let mut body = json!({
            "limit": batch_size,
            "with_payload": true,
            "with_vectors": false,
        });
        if let Some(cursor) = cursor {
            body["offset"] = cursor.as_value().clone();
        }

        let response: Envelope<RawScroll> =
            http::send_json(self.client.post(&endpoint).json(&body), &endpoint)
                .await
                .context("Qdrant scroll failed")?;

        Ok(response.result.unwrap_or_default().into_page())
    }

    async fn count(&self, collection: &str) -> Result<Option<u64>> {
        let endpoint = self.collection_url(collection);
        let response: Envelope<RawCollectionInfo> =
            http::send_json(self.client.get(&endpoint), &endpoint)
                .await
                .context("Qdrant collection info failed")?;

        Ok(response.result.and_then(|info| info.points_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_page_decoding() {
        let body = r#"{
            "result": {
                "points": [
                    {"id": 7, "payload": {"EMPLOYEEID": "7", "BASICSALARY": 1200}},
                    {"id": "4b0f3f0c-3c53-4a57-9a53-3f5f5b8f0e11", "payload": null}
                ],
                "next_page_offset": 9
            },
            "status": "ok"
        }"#;
        let envelope: Envelope<RawScroll> = http::decode_body(body, "x", 200).unwrap();
        let page = envelope.result.unwrap().into_page();

        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].id, "7");
        assert_eq!(page.records[1].id, "4b0f3f0c-3c53-4a57-9a53-3f5f5b8f0e11");
        assert!(page.records[1].payload.is_empty());
        assert_eq!(page.next_cursor, Some(ScanCursor(json!(9))));
    }

    #[test]
    fn test_last_scroll_page_has_no_cursor() {
        let body = r#"{"result": {"points": [], "next_page_offset": null}}"#;
        let envelope: Envelope<RawScroll> = http::decode_body(body, "x", 200).unwrap();
        let page = envelope.result.unwrap().into_page();
        assert!(page.records.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_search_hits_keep_order_and_scores() {
        let body = r#"{"result": [
            {"id": 2, "score": 0.91, "payload": {"prompt": "b"}},
            {"id": 1, "score": 0.42, "payload": {"prompt": "a"}}
        ]}"#;
        let envelope: Envelope<Vec<RawPoint>> = http::decode_body(body, "x", 200).unwrap();
        let hits: Vec<Hit> = envelope.result.unwrap().into_iter().map(RawPoint::into_hit).collect();
        assert_eq!(hits[0].record_id, "2");
        assert!((hits[0].score - 0.91).abs() < 1e-6);
        assert_eq!(hits[1].record_id, "1");
    }

    #[test]
    fn test_collection_info_points_count() {
        let body = r#"{"result": {"status": "green", "points_count": 1532}}"#;
        let envelope: Envelope<RawCollectionInfo> = http::decode_body(body, "x", 200).unwrap();
        assert_eq!(envelope.result.unwrap().points_count, Some(1532));
    }
}
