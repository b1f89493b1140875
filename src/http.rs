//! The narrow HTTP capability the rest of the crate is written against.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use reqwest::Client;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

use crate::config::ClientOptions;
use crate::error::{DriveError, Result};
use crate::models::ApiErrorResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// One outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn json<T: serde::Serialize>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }
}

/// Status, headers and body of a completed exchange. Header names are
/// lower-cased.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes HTTP requests. Only transport failures are errors here; any
/// response the server sends back, whatever its status, is `Ok`.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Like [`execute`](Self::execute), but a successful body goes to `sink`
    /// instead of the returned response, whose body is then empty. Error
    /// bodies are still returned so they can be reported.
    async fn execute_into(
        &self,
        request: HttpRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<HttpResponse> {
        let mut response = self.execute(request).await?;
        if response.is_success() {
            sink.write_all(&response.body).await?;
            sink.flush().await?;
            response.body.clear();
        }
        Ok(response)
    }
}

/// [`HttpExecutor`] backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestExecutor {
    http: Client,
}

impl ReqwestExecutor {
    pub fn new(options: &ClientOptions) -> Result<Self> {
        // Drive answers an incomplete upload with 308 and no Location; the
        // session has to see that response as-is.
        let http = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(options.connect_timeout)
            .read_timeout(options.stall_timeout)
            .build()?;
        Ok(Self { http })
    }

    async fn start(&self, request: HttpRequest) -> Result<reqwest::Response> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.http.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        Ok(builder.body(request.body).send().await?)
    }
}

fn response_headers(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.start(request).await?;
        let status = response.status().as_u16();
        let headers = response_headers(&response);
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_into(
        &self,
        request: HttpRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<HttpResponse> {
        let response = self.start(request).await?;
        let status = response.status().as_u16();
        let headers = response_headers(&response);
        if !response.status().is_success() {
            let body = response.bytes().await?.to_vec();
            return Ok(HttpResponse {
                status,
                headers,
                body,
            });
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
        }
        sink.flush().await?;

        Ok(HttpResponse {
            status,
            headers,
            body: Vec::new(),
        })
    }
}

/// Turn a non-success response into a [`DriveError`], preferring the message
/// from Google's JSON error envelope when there is one. The status is always
/// the one on the response.
pub fn error_from_response(status: u16, body: &[u8]) -> DriveError {
    let message = match serde_json::from_slice::<ApiErrorResponse>(body) {
        Ok(api_error) => api_error.error.message,
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    };
    DriveError::ApiError { status, message }
}

/// Append query parameters to `base`, escaping them.
pub fn url_with_params(base: &str, params: &[(&str, &str)]) -> Result<String> {
    let url = Url::parse_with_params(base, params)
        .map_err(|e| DriveError::InvalidArgument(format!("bad URL {}: {}", base, e)))?;
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_google_envelope() {
        let body = br#"{"error": {"code": 404, "message": "File not found: abc"}}"#;
        let err = error_from_response(404, body);
        assert_eq!(
            err,
            DriveError::ApiError {
                status: 404,
                message: "File not found: abc".to_string()
            }
        );
    }

    #[test]
    fn test_error_status_comes_from_response_not_envelope() {
        let body = br#"{"error": {"code": 500, "message": "Rate limit exceeded"}}"#;
        let err = error_from_response(429, body);
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.kind(), crate::ErrorKind::TransportUnavailable);
        assert!(err.to_string().contains("Rate limit exceeded"));
    }

    #[test]
    fn test_error_from_plain_body() {
        let err = error_from_response(503, b"backend down");
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("backend down"));
    }

    #[test]
    fn test_url_with_params_escapes() {
        let url = url_with_params("https://example.com/files", &[("q", "name = 'a b'")]).unwrap();
        assert_eq!(url, "https://example.com/files?q=name+%3D+%27a+b%27");
    }

    struct CannedExecutor {
        status: u16,
        body: &'static [u8],
    }

    #[async_trait]
    impl HttpExecutor for CannedExecutor {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse> {
            Ok(HttpResponse {
                status: self.status,
                headers: HashMap::new(),
                body: self.body.to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn test_execute_into_writes_successful_body_to_sink() {
        let executor = CannedExecutor {
            status: 200,
            body: b"file content",
        };
        let mut sink: Vec<u8> = Vec::new();
        let response = executor
            .execute_into(HttpRequest::new(Method::Get, "http://drive.test/f"), &mut sink)
            .await
            .unwrap();

        assert_eq!(sink, b"file content");
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_execute_into_keeps_error_body() {
        let executor = CannedExecutor {
            status: 404,
            body: b"not here",
        };
        let mut sink: Vec<u8> = Vec::new();
        let response = executor
            .execute_into(HttpRequest::new(Method::Get, "http://drive.test/f"), &mut sink)
            .await
            .unwrap();

        assert!(sink.is_empty());
        assert_eq!(response.text(), "not here");
    }

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let mut response = HttpResponse::default();
        response
            .headers
            .insert("range".to_string(), "bytes=0-9".to_string());
        assert_eq!(response.header("Range"), Some("bytes=0-9"));
    }
}
