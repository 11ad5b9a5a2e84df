//! Naver Land complex listing fetcher

use crate::{
    config::IngestConfig,
    constants::{COMPLEX_ARTICLES_PATH, DEFAULT_FILTERS},
    error::FetchError,
    fetcher::PageFetcher,
    metrics::{MetricsSink, RequestTimer},
    types::{AuthContext, PageRequest, PageResult, RawRecord},
};
use async_trait::async_trait;
use reqwest::{header::COOKIE, Client, Url};
use serde_json::Value;
use std::sync::Arc;

/// Longest error body kept in an `HttpStatus` error
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Parameters owned by the pagination itself; caller filters cannot set them
const RESERVED_PARAMS: &[&str] = &["page", "complexNo"];

/// Fetches complex listing pages over HTTP
pub struct NaverLandFetcher {
    client: Client,
    base_url: String,
    metrics: Arc<MetricsSink>,
}

impl NaverLandFetcher {
    /// Creates a new fetcher sharing the given metrics sink
    pub fn new(config: &IngestConfig, metrics: Arc<MetricsSink>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            metrics,
        })
    }

    /// Builds the listing URL: default filter superset, caller filters, then paging
    fn build_url(&self, request: &PageRequest) -> Result<Url, FetchError> {
        let mut params: Vec<(String, String)> = DEFAULT_FILTERS
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        for (key, value) in &request.filters {
            if RESERVED_PARAMS.contains(&key.as_str()) {
                log::warn!("Ignoring reserved filter parameter {}", key);
                continue;
            }
            match params.iter_mut().find(|(existing, _)| existing == key) {
                Some(slot) => slot.1 = value.clone(),
                None => params.push((key.clone(), value.clone())),
            }
        }

        params.push(("page".to_string(), request.page_index.to_string()));
        params.push(("complexNo".to_string(), request.target.to_string()));

        let path = format!(
            "{}{}/{}",
            self.base_url, COMPLEX_ARTICLES_PATH, request.target
        );
        Url::parse_with_params(&path, &params)
            .map_err(|e| FetchError::transport(format!("Invalid listing URL {}: {}", path, e)))
    }
}

/// Parses a listing response body
///
/// A missing or null `articleList` is an empty page and a missing
/// `isMoreData` means no more data; anything that is not a JSON object is a
/// decode error. List elements that are not objects are skipped.
fn parse_page(body: &str) -> Result<PageResult, FetchError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        FetchError::decode(format!(
            "Failed to parse listing response: {}. Response: {}",
            e,
            truncate(body)
        ))
    })?;

    let Value::Object(mut fields) = value else {
        return Err(FetchError::decode(format!(
            "Listing response is not an object. Response: {}",
            truncate(body)
        )));
    };

    let records = match fields.remove("articleList") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let total = items.len();
            let records: Vec<RawRecord> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(RawRecord::new(map)),
                    _ => None,
                })
                .collect();
            if records.len() < total {
                log::warn!("Skipped {} non-object listing entries", total - records.len());
            }
            records
        }
        Some(other) => {
            return Err(FetchError::decode(format!(
                "articleList is not an array: {}",
                truncate(&other.to_string())
            )))
        }
    };

    let has_more = match fields.get("isMoreData") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(other) => {
            return Err(FetchError::decode(format!(
                "isMoreData is not a boolean: {}",
                truncate(&other.to_string())
            )))
        }
    };

    Ok(PageResult { records, has_more })
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[async_trait]
impl PageFetcher for NaverLandFetcher {
    async fn fetch(
        &self,
        request: &PageRequest,
        auth: &AuthContext,
    ) -> Result<PageResult, FetchError> {
        let mut timer = RequestTimer::new(self.metrics.clone(), request.target.as_str());

        let url = self.build_url(request)?;
        log::debug!(
            "Fetching page {} of complex {}: {}",
            request.page_index,
            request.target,
            url
        );

        let mut builder = self.client.get(url);
        for (name, value) in auth.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = auth.cookie_header() {
            builder = builder.header(COOKIE, cookie);
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::http_status(status.as_u16(), truncate(&body)));
        }

        let body = response.text().await?;
        let page = parse_page(&body)?;
        timer.mark_success();

        log::debug!(
            "Fetched {} records from page {} of complex {} (more: {})",
            page.records.len(),
            request.page_index,
            request.target,
            page.has_more
        );

        Ok(page)
    }

    fn fetcher_name(&self) -> &'static str {
        "naver_land"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FilterParams, IngestionTarget};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one canned HTTP response on a local port; the task yields the request head
    async fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&head).to_ascii_lowercase()
        });

        (format!("http://{}", addr), handle)
    }

    fn request(page_index: u32, filters: FilterParams) -> PageRequest {
        PageRequest {
            target: IngestionTarget::from(131345u64),
            page_index,
            filters,
        }
    }

    fn fetcher(base_url: &str, metrics: Arc<MetricsSink>) -> NaverLandFetcher {
        let config = IngestConfig::default()
            .with_base_url(base_url)
            .with_request_timeout(Duration::from_secs(2));
        NaverLandFetcher::new(&config, metrics).unwrap()
    }

    #[test]
    fn test_build_url() {
        let fetcher = fetcher("https://new.land.naver.com", Arc::new(MetricsSink::new()));
        let mut filters = FilterParams::new();
        filters.insert("tradeType".to_string(), "A1".to_string());
        filters.insert("page".to_string(), "99".to_string());
        filters.insert("custom".to_string(), "x".to_string());

        let url = fetcher.build_url(&request(3, filters)).unwrap();
        assert_eq!(url.path(), "/api/articles/complex/131345");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |key: &str| {
            pairs
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .collect::<Vec<_>>()
        };

        assert_eq!(get("realEstateType"), vec!["APT:PRE:ABYG:JGC:OPST"]);
        assert_eq!(get("tradeType"), vec!["A1"]);
        assert_eq!(get("priceMax"), vec!["900000000"]);
        assert_eq!(get("custom"), vec!["x"]);
        assert_eq!(get("page"), vec!["3"]);
        assert_eq!(get("complexNo"), vec!["131345"]);
    }

    #[test]
    fn test_parse_page() {
        let page = parse_page(
            r#"{"isMoreData": true, "articleList": [{"articleNo": "1"}, {"articleNo": "2"}]}"#,
        )
        .unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].text("articleNo"), "1");
        assert!(page.has_more);
    }

    #[test]
    fn test_parse_page_missing_fields() {
        assert_eq!(parse_page("{}").unwrap(), PageResult::default());
        assert_eq!(
            parse_page(r#"{"articleList": null, "isMoreData": null}"#).unwrap(),
            PageResult::default()
        );
        let page = parse_page(r#"{"articleList": [{"articleNo": "1"}]}"#).unwrap();
        assert!(!page.has_more);
    }

    #[test]
    fn test_parse_page_decode_errors() {
        assert!(matches!(
            parse_page("<html>blocked</html>"),
            Err(FetchError::Decode { .. })
        ));
        assert!(matches!(parse_page("[]"), Err(FetchError::Decode { .. })));
        assert!(matches!(parse_page("null"), Err(FetchError::Decode { .. })));
        assert!(matches!(parse_page("\"ok\""), Err(FetchError::Decode { .. })));
        assert!(matches!(
            parse_page(r#"{"articleList": {"articleNo": "1"}}"#),
            Err(FetchError::Decode { .. })
        ));
        assert!(matches!(
            parse_page(r#"{"articleList": [], "isMoreData": "yes"}"#),
            Err(FetchError::Decode { .. })
        ));
    }

    #[test]
    fn test_parse_page_skips_non_object_entries() {
        let page = parse_page(
            r#"{"isMoreData": true, "articleList": [null, {"articleNo": "1"}, 7, {"articleNo": "2"}]}"#,
        )
        .unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].text("articleNo"), "2");
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn test_success_forwards_auth() {
        let metrics = Arc::new(MetricsSink::new());
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"isMoreData": false, "articleList": [{"articleNo": "9"}]}"#,
        )
        .await;
        let fetcher = fetcher(&base_url, metrics.clone());
        let auth = AuthContext::new()
            .with_header("X-Test-Auth", "token-1")
            .with_cookie("NID_SES", "abc")
            .with_cookie("NID_AUT", "def");

        let page = fetcher
            .fetch(&request(2, FilterParams::new()), &auth)
            .await
            .unwrap();
        let head = server.await.unwrap();

        assert_eq!(page.records.len(), 1);
        assert!(!page.has_more);
        assert!(head.starts_with("get /api/articles/complex/131345?"));
        assert!(head.contains("page=2"));
        assert!(head.contains("x-test-auth: token-1"));
        assert!(head.contains("cookie: nid_ses=abc; nid_aut=def"));
        assert_eq!(metrics.request_latency_count("131345"), 1);
        assert_eq!(metrics.latency_snapshot("131345").failed_requests, 0);
    }

    #[tokio::test]
    async fn test_non_success_status_is_http_status() {
        let metrics = Arc::new(MetricsSink::new());
        let (base_url, server) = serve_once("503 Service Unavailable", "busy").await;
        let fetcher = fetcher(&base_url, metrics.clone());

        let result = fetcher
            .fetch(&request(1, FilterParams::new()), &AuthContext::new())
            .await;
        server.await.unwrap();

        assert_eq!(result, Err(FetchError::http_status(503, "busy")));
        assert_eq!(metrics.request_latency_count("131345"), 1);
        assert_eq!(metrics.latency_snapshot("131345").failed_requests, 1);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_error() {
        let metrics = Arc::new(MetricsSink::new());
        let (base_url, server) = serve_once("200 OK", "<html>captcha</html>").await;
        let fetcher = fetcher(&base_url, metrics.clone());

        let result = fetcher
            .fetch(&request(1, FilterParams::new()), &AuthContext::new())
            .await;
        server.await.unwrap();

        assert!(matches!(result, Err(FetchError::Decode { .. })));
        assert_eq!(metrics.latency_snapshot("131345").failed_requests, 1);
    }

    #[tokio::test]
    async fn test_invalid_base_url_is_still_timed() {
        let metrics = Arc::new(MetricsSink::new());
        let fetcher = fetcher("not a url", metrics.clone());

        let result = fetcher
            .fetch(&request(1, FilterParams::new()), &AuthContext::new())
            .await;

        assert!(matches!(result, Err(FetchError::Transport { .. })));
        assert_eq!(metrics.request_latency_count("131345"), 1);
        assert_eq!(metrics.latency_snapshot("131345").failed_requests, 1);
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_and_timed() {
        let metrics = Arc::new(MetricsSink::new());
        // nothing listens on the discard port
        let fetcher = fetcher("http://127.0.0.1:9", metrics.clone());

        let result = fetcher
            .fetch(&request(1, FilterParams::new()), &AuthContext::new())
            .await;

        assert!(matches!(result, Err(FetchError::Transport { .. })));
        assert_eq!(metrics.request_latency_count("131345"), 1);
        assert_eq!(metrics.latency_snapshot("131345").failed_requests, 1);
    }
}
