use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::DomainError;

/// Response headers that may carry a provider correlation id
const REQUEST_ID_HEADERS: [&str; 3] = ["x-request-id", "request-id", "apim-request-id"];

/// Status, parsed body and correlation id of a provider response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
    pub request_id: Option<String>,
}

impl HttpResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            request_id: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

/// Trait for HTTP client operations (for mocking)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    /// POST a JSON body. Non-2xx statuses are returned, not raised;
    /// only transport failures are errors.
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &Value,
    ) -> Result<HttpResponse, DomainError>;
}

#[async_trait]
impl<C: HttpClientTrait + ?Sized> HttpClientTrait for Arc<C> {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &Value,
    ) -> Result<HttpResponse, DomainError> {
        (**self).post_json(url, headers, body).await
    }
}

/// Real HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &Value,
    ) -> Result<HttpResponse, DomainError> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| DomainError::provider("http", format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let request_id = REQUEST_ID_HEADERS.iter().find_map(|name| {
            response
                .headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

        let text = response
            .text()
            .await
            .map_err(|e| DomainError::provider("http", format!("Failed to read response: {}", e)))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(HttpResponse {
            status,
            body,
            request_id,
        })
    }
}

/// Turn an error status into a provider error carrying the provider's message
pub fn error_for_status(provider: &str, response: HttpResponse) -> Result<HttpResponse, DomainError> {
    if response.is_success() {
        return Ok(response);
    }

    let message = error_message(&response.body);
    Err(DomainError::provider_status(
        provider,
        response.status,
        format!("HTTP {}: {}", response.status, message),
    ))
}

/// Pull a readable message from `error.message`, `error`, `message`, or the raw body
fn error_message(body: &Value) -> String {
    let candidates = [
        body.pointer("/error/message"),
        body.get("error").filter(|e| e.is_string()),
        body.get("message").filter(|m| m.is_string()),
    ];

    if let Some(message) = candidates.into_iter().flatten().find_map(Value::as_str) {
        return message.to_string();
    }

    match body {
        Value::String(s) => s.clone(),
        Value::Null => "empty response body".to_string(),
        other => other.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_error_for_status_prefers_nested_message() {
        let response = HttpResponse {
            status: 401,
            body: json!({"error": {"message": "Incorrect API key provided"}}),
            request_id: None,
        };

        let err = error_for_status("openai", response).unwrap_err();
        assert_eq!(
            err,
            DomainError::provider_status("openai", 401, "HTTP 401: Incorrect API key provided")
        );
    }

    #[test]
    fn test_error_for_status_fallbacks() {
        let plain = HttpResponse {
            status: 500,
            body: json!({"error": "overloaded"}),
            request_id: None,
        };
        assert!(error_for_status("anthropic", plain)
            .unwrap_err()
            .to_string()
            .contains("HTTP 500: overloaded"));

        let raw = HttpResponse {
            status: 502,
            body: Value::String("Bad Gateway".to_string()),
            request_id: None,
        };
        assert!(error_for_status("google", raw)
            .unwrap_err()
            .to_string()
            .contains("HTTP 502: Bad Gateway"));

        let ok = HttpResponse::ok(json!({}));
        assert!(error_for_status("google", ok).is_ok());
    }

    #[tokio::test]
    async fn test_http_client_returns_status_body_and_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("x-request-id", "req-42")
                    .set_body_json(json!({"error": {"message": "rate limited"}})),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let response = client
            .post_json(
                &format!("{}/v1/chat/completions", server.uri()),
                vec![("Authorization", "Bearer sk-test")],
                &json!({"model": "gpt-4o"}),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 429);
        assert_eq!(response.request_id.as_deref(), Some("req-42"));
        assert_eq!(response.body["error"]["message"], "rate limited");
    }

    #[tokio::test]
    async fn test_http_client_keeps_non_json_body_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let response = HttpClient::new()
            .post_json(&server.uri(), vec![], &json!({}))
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.body, Value::String("upstream unavailable".to_string()));
    }
}
