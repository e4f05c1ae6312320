use std::time::Duration;

use async_trait::async_trait;
use dbfuse_core::config::ClientConfig;
use dbfuse_core::pagination::PageRequest;
use dbfuse_core::query_runner::{
    ExecuteResponse, QueryBackend, QueryBackendError, GENERIC_EXECUTION_ERROR,
};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

const EXECUTE_PATH: &str = "/api/query/execute";

#[derive(Debug, Error)]
pub enum HttpBackendError {
    #[error("backend url `{0}` must start with http:// or https://")]
    InvalidUrl(String),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest<'a> {
    query: &'a str,
    database: Option<&'a str>,
    page: u32,
    page_size: u32,
}

#[derive(Debug, Clone)]
pub struct HttpQueryBackend {
    client: Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpQueryBackend {
    pub fn from_config(config: &ClientConfig) -> Result<Self, HttpBackendError> {
        let base_url = config.backend_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(HttpBackendError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(HttpBackendError::Client)?;

        Ok(Self {
            client,
            endpoint: execute_endpoint(base_url),
            auth_token: config
                .auth_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QueryBackend for HttpQueryBackend {
    async fn execute_query(
        &self,
        query: &str,
        database: Option<&str>,
        page: PageRequest,
    ) -> Result<Option<ExecuteResponse>, QueryBackendError> {
        let body = ExecuteRequest {
            query,
            database,
            page: page.page,
            page_size: page.page_size,
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(to_query_error)?;
        let status = response.status();
        let text = response.text().await.map_err(to_query_error)?;

        if !status.is_success() {
            let message = error_message_from_body(&text);
            tracing::warn!(%status, %message, "query backend rejected request");
            return Err(QueryBackendError::new(message));
        }

        tracing::debug!(%status, bytes = text.len(), "query backend responded");
        decode_response_body(&text)
    }
}

fn execute_endpoint(base_url: &str) -> String {
    format!("{}{EXECUTE_PATH}", base_url.trim_end_matches('/'))
}

fn decode_response_body(body: &str) -> Result<Option<ExecuteResponse>, QueryBackendError> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(body).map_err(|error| {
        tracing::warn!(%error, "query backend returned malformed json");
        QueryBackendError::generic()
    })?;
    ExecuteResponse::from_json(value).map_err(|error| {
        tracing::warn!(%error, "query backend returned an unexpected shape");
        QueryBackendError::generic()
    })
}

/// Reads `error`, `error.message` or `message` from a JSON error body.
fn error_message_from_body(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return GENERIC_EXECUTION_ERROR.to_string();
    };

    let candidates = [
        value.get("error").and_then(Value::as_str),
        value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str),
        value.get("message").and_then(Value::as_str),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map_or_else(|| GENERIC_EXECUTION_ERROR.to_string(), str::to_string);
    message
}

fn to_query_error(error: reqwest::Error) -> QueryBackendError {
    tracing::warn!(%error, "query backend transport failure");
    QueryBackendError::generic()
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use dbfuse_core::config::ClientConfig;
    use dbfuse_core::pagination::PageRequest;
    use dbfuse_core::query_runner::{ExecuteResponse, QueryBackend, GENERIC_EXECUTION_ERROR};

    use super::{
        decode_response_body, error_message_from_body, execute_endpoint, HttpBackendError,
        HttpQueryBackend,
    };

    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind test listener");
        let address = listener.local_addr().expect("listener has an address");

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("failed to accept connection");
            let mut received = Vec::new();
            let mut chunk = [0_u8; 4096];
            loop {
                let read = stream.read(&mut chunk).expect("failed to read request");
                if read == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..read]);
                if request_is_complete(&received) {
                    break;
                }
            }

            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .expect("failed to write response");
            String::from_utf8_lossy(&received).into_owned()
        });

        (format!("http://{address}"), handle)
    }

    fn request_is_complete(received: &[u8]) -> bool {
        let text = String::from_utf8_lossy(received);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        received.len() >= header_end + 4 + content_length
    }

    fn config_for(base_url: String) -> ClientConfig {
        ClientConfig {
            backend_url: base_url,
            auth_token: Some("secret-token".to_string()),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            execute_endpoint("http://localhost:8080/"),
            "http://localhost:8080/api/query/execute"
        );
        assert_eq!(
            execute_endpoint("https://db.example.com/gateway"),
            "https://db.example.com/gateway/api/query/execute"
        );
    }

    #[test]
    fn non_http_backend_url_is_rejected() {
        let config = ClientConfig {
            backend_url: "localhost:8080".to_string(),
            ..ClientConfig::default()
        };
        let error = HttpQueryBackend::from_config(&config).expect_err("url should be rejected");
        assert!(matches!(error, HttpBackendError::InvalidUrl(_)));
    }

    #[test]
    fn error_message_prefers_structured_fields() {
        assert_eq!(
            error_message_from_body(r#"{"error": "syntax error at or near \"SELEC\""}"#),
            "syntax error at or near \"SELEC\""
        );
        assert_eq!(
            error_message_from_body(r#"{"error": {"message": "permission denied"}}"#),
            "permission denied"
        );
        assert_eq!(
            error_message_from_body(r#"{"message": "database is offline"}"#),
            "database is offline"
        );
        assert_eq!(error_message_from_body(r#"{"error": "  "}"#), GENERIC_EXECUTION_ERROR);
        assert_eq!(error_message_from_body("<html>502</html>"), GENERIC_EXECUTION_ERROR);
    }

    #[test]
    fn empty_body_decodes_as_absent_response() {
        assert_eq!(decode_response_body("  ").expect("empty body decodes"), None);
        assert_eq!(decode_response_body("null").expect("null body decodes"), None);
        assert!(decode_response_body("not json").is_err());
    }

    #[tokio::test]
    async fn posts_paginated_request_with_bearer_token() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"queries":[{"query":"SELECT * FROM users","rows":[{"id":1}],"totalRows":1}]}"#,
        );
        let backend =
            HttpQueryBackend::from_config(&config_for(base_url)).expect("backend should build");

        let response = backend
            .execute_query("SELECT * FROM users", Some("sales"), PageRequest::new(2, 25))
            .await
            .expect("request should succeed")
            .expect("response should not be empty");

        let request = server.join().expect("server thread should finish");
        assert!(request.starts_with("POST /api/query/execute "));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer secret-token"));
        assert!(request.contains(r#""database":"sales""#));
        assert!(request.contains(r#""page":2"#));
        assert!(request.contains(r#""pageSize":25"#));
        assert!(matches!(response, ExecuteResponse::Multi { queries } if queries.len() == 1));
    }

    #[tokio::test]
    async fn backend_error_body_becomes_query_error() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 400 Bad Request",
            r#"{"error":"relation \"nope\" does not exist"}"#,
        );
        let backend =
            HttpQueryBackend::from_config(&config_for(base_url)).expect("backend should build");

        let error = backend
            .execute_query("SELECT * FROM nope", Some("sales"), PageRequest::new(1, 25))
            .await
            .expect_err("request should fail");

        server.join().expect("server thread should finish");
        assert_eq!(error.message(), "relation \"nope\" does not exist");
    }
}
