//! Credentials for Google APIs.
//!
//! Every credential type produces a complete `Authorization` header value.
//! The refreshing kinds share [`RefreshingCredentialsWrapper`], which caches
//! one token per credential and serializes refreshes.

mod oauth2;
mod service_account;
mod token_cache;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{DriveError, Result};
use crate::http::{error_from_response, HttpExecutor, HttpResponse};

pub use oauth2::{OAuth2Credentials, OAuth2CredentialsInfo};
pub use service_account::{ServiceAccountCredentials, ServiceAccountInfo};
pub use token_cache::{BearerToken, RefreshingCredentialsWrapper, TOKEN_EXPIRY_MARGIN};

/// Source of `Authorization` header values.
#[async_trait]
pub trait Credentials: Send + Sync {
    async fn authorization_header(&self) -> Result<String>;
}

/// Source of the current time, injected so expiry logic can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A fixed bearer token obtained elsewhere. Never refreshed.
#[derive(Debug, Clone)]
pub struct AccessTokenCredentials {
    header: String,
}

impl AccessTokenCredentials {
    pub fn new(access_token: impl AsRef<str>) -> Self {
        Self {
            header: format!("Bearer {}", access_token.as_ref()),
        }
    }
}

#[async_trait]
impl Credentials for AccessTokenCredentials {
    async fn authorization_header(&self) -> Result<String> {
        Ok(self.header.clone())
    }
}

/// Load a credentials file, choosing the flow from its `"type"` field.
///
/// Files without a `type` are treated as authorized-user files, which is what
/// the OAuth consent flow tools write out.
pub fn load_credentials_file<P: AsRef<Path>>(
    path: P,
    executor: Arc<dyn HttpExecutor>,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn Credentials>> {
    let path = path.as_ref();
    let source = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| {
        DriveError::InvalidArgument(format!("cannot read credentials file {}: {}", source, e))
    })?;
    let json: Value = serde_json::from_str(&content).map_err(|e| {
        DriveError::InvalidArgument(format!("credentials file {} is not valid JSON: {}", source, e))
    })?;

    match json.get("type").and_then(Value::as_str) {
        None | Some("authorized_user") => {
            let info = OAuth2CredentialsInfo::from_json(&json, &source)?;
            Ok(Arc::new(OAuth2Credentials::new(info, executor, clock)))
        }
        Some("service_account") => {
            let info = ServiceAccountInfo::from_json(&json, &source)?;
            Ok(Arc::new(ServiceAccountCredentials::new(info, executor, clock)))
        }
        Some(other) => Err(DriveError::InvalidArgument(format!(
            "unsupported credential type {:?} in {}",
            other, source
        ))),
    }
}

/// Read a required, non-empty string field out of a credentials document.
fn required_field(json: &Value, field: &str, source: &str) -> Result<String> {
    match json.get(field).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(DriveError::InvalidArgument(format!(
            "invalid credentials file {}: the {} field is missing or empty",
            source, field
        ))),
    }
}

/// Turn a token endpoint response into a cached token.
fn parse_token_response(response: &HttpResponse, now: SystemTime) -> Result<BearerToken> {
    if response.status >= 300 {
        return Err(error_from_response(response.status, &response.body));
    }

    let payload = response.text();
    let json: Value = serde_json::from_str(&payload).map_err(|e| {
        DriveError::InvalidArgument(format!("token response is not JSON ({}): {}", e, payload))
    })?;

    let access_token = json.get("access_token").and_then(Value::as_str);
    let token_type = json.get("token_type").and_then(Value::as_str);
    let expires_in = json.get("expires_in").and_then(Value::as_u64);

    match (access_token, token_type, expires_in) {
        (Some(access_token), Some(token_type), Some(expires_in)) => Ok(BearerToken {
            value: format!("{} {}", token_type, access_token),
            expiration: now + Duration::from_secs(expires_in),
        }),
        _ => Err(DriveError::InvalidArgument(format!(
            "could not find all required fields in token response \
             (access_token, expires_in, token_type): {}",
            payload
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_token_response() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(500);
        let token = parse_token_response(
            &response(
                200,
                r#"{"access_token": "ya29.x", "token_type": "Bearer", "expires_in": 3599}"#,
            ),
            now,
        )
        .unwrap();

        assert_eq!(token.value, "Bearer ya29.x");
        assert_eq!(token.expiration, now + Duration::from_secs(3599));
    }

    #[test]
    fn test_parse_token_response_missing_field() {
        let now = SystemTime::UNIX_EPOCH;
        let err = parse_token_response(
            &response(200, r#"{"access_token": "ya29.x", "expires_in": 3599}"#),
            now,
        )
        .unwrap_err();

        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("token_type"));
        assert!(err.to_string().contains("ya29.x"));
    }

    #[test]
    fn test_parse_token_response_http_error() {
        let err = parse_token_response(
            &response(401, r#"{"error": "invalid_grant"}"#),
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert_eq!(err.kind(), crate::ErrorKind::PermissionDenied);
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[test]
    fn test_required_field() {
        let json = serde_json::json!({"client_id": "", "client_secret": "s"});
        assert_eq!(required_field(&json, "client_secret", "f.json").unwrap(), "s");

        let err = required_field(&json, "client_id", "f.json").unwrap_err();
        assert!(err.to_string().contains("f.json"));
        assert!(err.to_string().contains("client_id"));
    }
}
