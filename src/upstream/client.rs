//! HTTP client for the upstream relationship API.
//!
//! API: `GET {base}/?date_start=YYYY-MM-DD&date_end=YYYY-MM-DD` and
//! `GET {base}/?avs={id}`, both answering `{ "data": [ ... ] }`.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::records::data_array;
use crate::error::FetchError;

/// One request against the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// Every record whose status date falls inside the window.
    Window { date_start: String, date_end: String },
    /// Every record of one AVS.
    Avs(String),
}

impl Query {
    /// Query-string pairs for this request.
    pub fn params(&self) -> Vec<(&'static str, &str)> {
        match self {
            Query::Window {
                date_start,
                date_end,
            } => vec![("date_start", date_start.as_str()), ("date_end", date_end.as_str())],
            Query::Avs(id) => vec![("avs", id.as_str())],
        }
    }
}

/// Something that can answer relationship queries with raw records.
///
/// The HTTP client implements this; tests substitute an in-memory source.
pub trait RelationshipSource: Send + Sync {
    /// Returns the raw items of the response's `data` array.
    fn fetch_batch(&self, query: &Query)
        -> impl Future<Output = Result<Vec<Value>, FetchError>> + Send;
}

/// Upstream API client.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a client. Without a timeout the transport default applies.
    pub fn new(base_url: &str, timeout_seconds: Option<u64>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The request URL without its query string.
    pub fn endpoint(&self) -> String {
        format!("{}/", self.base_url)
    }
}

impl RelationshipSource for ApiClient {
    async fn fetch_batch(&self, query: &Query) -> Result<Vec<Value>, FetchError> {
        let url = self.endpoint();
        debug!("GET {} {:?}", url, query.params());

        let response = self.client.get(&url).query(&query.params()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("request failed"),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::MalformedResponse(format!("body is not JSON: {}", e)))?;

        data_array(body)
            .ok_or_else(|| FetchError::MalformedResponse("missing `data` array".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server() -> MockServer {
        MockServer::start().await
    }

    fn new_client(mock_server: &MockServer) -> ApiClient {
        ApiClient::new(&format!("{}/relationships", mock_server.uri()), Some(5)).unwrap()
    }

    #[test]
    fn test_window_params() {
        let query = Query::Window {
            date_start: "2024-01-01".to_string(),
            date_end: "2025-01-01".to_string(),
        };
        assert_eq!(
            query.params(),
            vec![("date_start", "2024-01-01"), ("date_end", "2025-01-01")]
        );
    }

    #[test]
    fn test_avs_params() {
        assert_eq!(Query::Avs("0xA".to_string()).params(), vec![("avs", "0xA")]);
    }

    #[test]
    fn test_endpoint_normalizes_trailing_slash() {
        let client = ApiClient::new("https://api.example.org/relationships/", None).unwrap();
        assert_eq!(client.endpoint(), "https://api.example.org/relationships/");

        let client = ApiClient::new("https://api.example.org/relationships", Some(5)).unwrap();
        assert_eq!(client.endpoint(), "https://api.example.org/relationships/");
    }

    #[tokio::test]
    async fn test_window_query_returns_data_items() {
        let mock_server = setup_mock_server().await;
        Mock::given(method("GET"))
            .and(path("/relationships/"))
            .and(query_param("date_start", "2024-01-01"))
            .and(query_param("date_end", "2025-01-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"avs": "0xA", "operator": "0xO", "strategy": "0xS", "eth": 1}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let query = Query::Window {
            date_start: "2024-01-01".to_string(),
            date_end: "2025-01-01".to_string(),
        };
        let items = new_client(&mock_server).fetch_batch(&query).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["avs"], "0xA");
    }

    #[tokio::test]
    async fn test_avs_query_is_encoded() {
        let mock_server = setup_mock_server().await;
        Mock::given(method("GET"))
            .and(path("/relationships/"))
            .and(query_param("avs", "0xA&b=1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let items = new_client(&mock_server)
            .fetch_batch(&Query::Avs("0xA&b=1".to_string()))
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_upstream_unavailable() {
        let mock_server = setup_mock_server().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({"data": []})))
            .mount(&mock_server)
            .await;

        let err = new_client(&mock_server)
            .fetch_batch(&Query::Avs("0xA".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::UpstreamUnavailable { .. }));
        assert_eq!(err.status_code(), Some(503));
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let mock_server = setup_mock_server().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let err = new_client(&mock_server)
            .fetch_batch(&Query::Avs("0xA".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_missing_or_non_array_data_is_malformed() {
        for body in [json!({"items": []}), json!({"data": {"avs": "0xA"}})] {
            let mock_server = setup_mock_server().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&mock_server)
                .await;

            let err = new_client(&mock_server)
                .fetch_batch(&Query::Avs("0xA".to_string()))
                .await
                .unwrap_err();
            assert!(matches!(err, FetchError::MalformedResponse(_)));
        }
    }
}
