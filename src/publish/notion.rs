//! Notion database destination.
//!
//! The database is expected to carry these properties:
//!
//! | Property | Type |
//! |----------|------|
//! | `Title` | title |
//! | `Published` | date |
//! | `URL` | url |
//! | `UID` | rich_text |
//! | `Source` | select |
//! | `Tags` | multi_select |
//!
//! Bullets become `bulleted_list_item` blocks on the created page.

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::config::NotionConfig;
use crate::error::{AppError, Result};
use crate::http::{RetryPolicy, send_with_retry};
use crate::publish::{Destination, PageRecord};
use crate::utils::{truncate_chars, truncate_for_log};

pub const NOTION_API_URL: &str = "https://api.notion.com/v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
    Retry,
    Once,
}

/// Children per append call accepted by the API.
const APPEND_BATCH: usize = 50;

/// Longest text content of a single rich-text object.
const MAX_TEXT: usize = 2000;

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Deserialize)]
struct CreatedPage {
    id: String,
}

pub struct NotionDestination {
    client: Client,
    retry: RetryPolicy,
    base_url: String,
    database_id: String,
    headers: HeaderMap,
}

impl NotionDestination {
    pub fn new(client: Client, retry: RetryPolicy, config: &NotionConfig) -> Result<Self> {
        Self::with_base_url(client, retry, config, NOTION_API_URL)
    }

    pub fn with_base_url(
        client: Client,
        retry: RetryPolicy,
        config: &NotionConfig,
        base_url: &str,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| AppError::config("NOTION_TOKEN is not a valid header value"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            "notion-version",
            HeaderValue::from_str(&config.version)
                .map_err(|_| AppError::config("NOTION_VERSION is not a valid header value"))?,
        );
        Ok(Self {
            client,
            retry,
            base_url: base_url.trim_end_matches('/').to_string(),
            database_id: config.database_id.clone(),
            headers,
        })
    }

    fn request(&self, method: Method, path: &str, body: &Value) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .headers(self.headers.clone())
            .json(body)
    }

    /// Send `request`. Only reads are retried: a write that timed out may
    /// still have been applied, and sending it again would duplicate it.
    async fn send(&self, context: &str, request: RequestBuilder, delivery: Delivery) -> Result<Response> {
        let response = match delivery {
            Delivery::Retry => send_with_retry(request, &self.retry).await?,
            Delivery::Once => request.send().await?,
        };
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                context,
                status = status.as_u16(),
                body = %truncate_for_log(&detail, 400),
                "Notion returned an error"
            );
            return Err(AppError::status(format!("notion {context}"), status));
        }
        Ok(response)
    }
}

fn text(content: &str) -> Value {
    json!([{ "type": "text", "text": { "content": truncate_chars(content, MAX_TEXT) } }])
}

/// Page properties for `record`.
pub fn page_properties(record: &PageRecord) -> Value {
    let mut properties = json!({
        "Title": { "title": text(&record.title) },
        "Published": { "date": { "start": record.published.to_rfc3339_opts(SecondsFormat::Secs, true) } },
        "URL": { "url": record.url },
        "UID": { "rich_text": text(&record.uid) },
        "Source": { "select": { "name": record.source } },
    });
    if !record.tags.is_empty() {
        let tags: Vec<Value> = record.tags.iter().map(|t| json!({ "name": t })).collect();
        properties["Tags"] = json!({ "multi_select": tags });
    }
    properties
}

/// `bulleted_list_item` blocks, one per bullet.
pub fn bullet_blocks(bullets: &[String]) -> Vec<Value> {
    bullets
        .iter()
        .map(|b| {
            json!({
                "object": "block",
                "type": "bulleted_list_item",
                "bulleted_list_item": { "rich_text": text(b) }
            })
        })
        .collect()
}

#[async_trait]
impl Destination for NotionDestination {
    fn name(&self) -> &'static str {
        "notion"
    }

    #[instrument(level = "info", skip_all, fields(%uid))]
    async fn exists(&self, uid: &str, url: &str) -> Result<bool> {
        let body = json!({
            "filter": { "or": [
                { "property": "UID", "rich_text": { "equals": uid } },
                { "property": "URL", "url": { "equals": url } }
            ] },
            "page_size": 1
        });
        let path = format!("/databases/{}/query", self.database_id);
        let response = self.send("query", self.request(Method::POST, &path, &body), Delivery::Retry).await?;
        let parsed: QueryResponse = response.json().await?;
        debug!(matches = parsed.results.len(), "Notion query answered");
        Ok(!parsed.results.is_empty())
    }

    #[instrument(level = "info", skip_all, fields(url = %record.url))]
    async fn create(&self, record: &PageRecord) -> Result<String> {
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": page_properties(record),
        });
        let response = self.send("create", self.request(Method::POST, "/pages", &body), Delivery::Once).await?;
        let page: CreatedPage = response.json().await?;
        Ok(page.id)
    }

    #[instrument(level = "info", skip_all, fields(%record_id, count = bullets.len()))]
    async fn append(&self, record_id: &str, bullets: &[String]) -> Result<()> {
        if bullets.is_empty() {
            return Ok(());
        }
        let body = json!({ "children": bullet_blocks(bullets) });
        let path = format!("/blocks/{record_id}/children");
        self.send("append", self.request(Method::PATCH, &path, &body), Delivery::Once).await?;
        Ok(())
    }

    fn max_append_batch(&self) -> usize {
        APPEND_BATCH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn record(tags: &[&str]) -> PageRecord {
        PageRecord {
            title: "Lab releases model".into(),
            url: "https://example.com/news/model".into(),
            uid: "0123456789ab".into(),
            published: Utc.with_ymd_and_hms(2025, 10, 15, 8, 0, 0).unwrap(),
            source: "AI News".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_page_properties() {
        let props = page_properties(&record(&["llm", "agents"]));
        assert_eq!(props["Title"]["title"][0]["text"]["content"], "Lab releases model");
        assert_eq!(props["Published"]["date"]["start"], "2025-10-15T08:00:00Z");
        assert_eq!(props["URL"]["url"], "https://example.com/news/model");
        assert_eq!(props["UID"]["rich_text"][0]["text"]["content"], "0123456789ab");
        assert_eq!(props["Source"]["select"]["name"], "AI News");
        assert_eq!(props["Tags"]["multi_select"][1]["name"], "agents");

        assert!(page_properties(&record(&[])).get("Tags").is_none());
    }

    #[test]
    fn test_bullet_blocks_truncate_long_text() {
        let blocks = bullet_blocks(&["short".to_string(), "x".repeat(2500)]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["type"], "bulleted_list_item");
        let long = blocks[1]["bulleted_list_item"]["rich_text"][0]["text"]["content"]
            .as_str()
            .unwrap();
        assert_eq!(long.len(), 2000);
    }

    /// Answers successive connections with `responses`, forwarding each raw request.
    async fn serve(responses: Vec<String>) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            for response in responses {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut data = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = sock.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    data.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&data).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text[..end]
                            .lines()
                            .find_map(|l| {
                                let (k, v) = l.split_once(':')?;
                                k.eq_ignore_ascii_case("content-length")
                                    .then(|| v.trim().parse::<usize>().ok())
                                    .flatten()
                            })
                            .unwrap_or(0);
                        if data.len() >= end + 4 + length {
                            break;
                        }
                    }
                }
                let _ = tx.send(String::from_utf8_lossy(&data).to_string());
                sock.write_all(response.as_bytes()).await.unwrap();
                sock.shutdown().await.ok();
            }
        });
        (format!("http://{addr}/v1"), rx)
    }

    fn http_json(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn destination(base: &str) -> NotionDestination {
        destination_with_retries(base, 0)
    }

    fn destination_with_retries(base: &str, retries: usize) -> NotionDestination {
        let client = crate::http::build_client(Duration::from_secs(5)).unwrap();
        let config = NotionConfig {
            token: "secret-token".into(),
            database_id: "db123".into(),
            version: "2022-06-28".into(),
        };
        NotionDestination::with_base_url(client, RetryPolicy::new(retries, Duration::ZERO), &config, base).unwrap()
    }

    #[tokio::test]
    async fn test_query_sends_or_filter_and_reads_results() {
        let (base, mut requests) = serve(vec![
            http_json("200 OK", r#"{"results":[{"id":"p1"}]}"#),
            http_json("200 OK", r#"{"results":[]}"#),
        ])
        .await;
        let dest = destination(&base);

        assert!(dest.exists("0123456789ab", "https://example.com/a").await.unwrap());
        assert!(!dest.exists("ffffffffffff", "https://example.com/b").await.unwrap());

        let first = requests.recv().await.unwrap();
        assert!(first.starts_with("POST /v1/databases/db123/query"));
        let lower = first.to_lowercase();
        assert!(lower.contains("authorization: bearer secret-token"));
        assert!(lower.contains("notion-version: 2022-06-28"));
        assert!(first.contains(r#""property":"UID""#));
        assert!(first.contains(r#""property":"URL""#));
        assert!(first.contains(r#""page_size":1"#));
    }

    #[tokio::test]
    async fn test_query_error_status_is_error() {
        let (base, _requests) = serve(vec![http_json("400 Bad Request", r#"{"code":"validation_error"}"#)]).await;
        let err = destination(&base).exists("u", "https://example.com/a").await.unwrap_err();
        assert!(matches!(err, AppError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_create_and_append() {
        let (base, mut requests) = serve(vec![
            http_json("200 OK", r#"{"object":"page","id":"page-42"}"#),
            http_json("200 OK", r#"{"object":"list","results":[]}"#),
        ])
        .await;
        let dest = destination(&base);

        let id = dest.create(&record(&["llm"])).await.unwrap();
        assert_eq!(id, "page-42");
        dest.append(&id, &["First bullet.".to_string()]).await.unwrap();

        let create = requests.recv().await.unwrap();
        assert!(create.starts_with("POST /v1/pages"));
        assert!(create.contains(r#""database_id":"db123""#));
        let append = requests.recv().await.unwrap();
        assert!(append.starts_with("PATCH /v1/blocks/page-42/children"));
        assert!(append.contains("First bullet."));
    }

    #[tokio::test]
    async fn test_query_is_retried_on_server_error() {
        let (base, mut requests) = serve(vec![
            http_json("503 Service Unavailable", "{}"),
            http_json("200 OK", r#"{"results":[{"id":"p1"}]}"#),
        ])
        .await;
        let dest = destination_with_retries(&base, 2);

        assert!(dest.exists("0123456789ab", "https://example.com/a").await.unwrap());
        assert!(requests.recv().await.is_some());
        assert!(requests.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_writes_are_sent_once() {
        let (base, mut requests) = serve(vec![
            http_json("503 Service Unavailable", "{}"),
            http_json("200 OK", r#"{"object":"page","id":"page-42"}"#),
            http_json("503 Service Unavailable", "{}"),
            http_json("200 OK", r#"{"object":"list","results":[]}"#),
        ])
        .await;
        let dest = destination_with_retries(&base, 3);

        let err = dest.create(&record(&[])).await.unwrap_err();
        assert!(matches!(err, AppError::Status { status: 503, .. }));
        assert!(requests.recv().await.unwrap().starts_with("POST /v1/pages"));
        assert!(requests.try_recv().is_err());

        // The next connection is the second scripted answer, so a fresh create succeeds.
        assert_eq!(dest.create(&record(&[])).await.unwrap(), "page-42");
        assert!(requests.recv().await.is_some());

        let err = dest.append("page-42", &["One.".to_string()]).await.unwrap_err();
        assert!(matches!(err, AppError::Status { status: 503, .. }));
        assert!(requests.recv().await.unwrap().starts_with("PATCH /v1/blocks/page-42/children"));
        assert!(requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_create_timeout_is_not_resent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut received) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let (mut sock, _) = listener.accept().await.unwrap();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = sock.read(&mut buf).await;
                    let _ = tx.send(());
                    // Applied server-side, but answered after the client gave up.
                    tokio::time::sleep(Duration::from_millis(600)).await;
                    let body = r#"{"object":"page","id":"late"}"#;
                    let _ = sock.write_all(http_json("200 OK", body).as_bytes()).await;
                });
            }
        });

        let client = crate::http::build_client(Duration::from_millis(200)).unwrap();
        let config = NotionConfig {
            token: "secret-token".into(),
            database_id: "db123".into(),
            version: "2022-06-28".into(),
        };
        let base = format!("http://{addr}/v1");
        let dest =
            NotionDestination::with_base_url(client, RetryPolicy::new(3, Duration::ZERO), &config, &base).unwrap();

        assert!(dest.create(&record(&[])).await.is_err());
        assert!(received.recv().await.is_some());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(received.try_recv().is_err());
    }
}
