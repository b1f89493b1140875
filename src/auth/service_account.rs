//! Service account authentication via signed JWT assertions.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use url::form_urlencoded;

use super::{
    parse_token_response, required_field, BearerToken, Clock, Credentials,
    RefreshingCredentialsWrapper,
};
use crate::config::TOKEN_URI;
use crate::error::{DriveError, Result};
use crate::http::{HttpExecutor, HttpRequest, Method};

/// Google Drive API scope.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Lifetime requested for each assertion.
const ASSERTION_LIFETIME_SECS: u64 = 3600;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,   // Issuer (service account email)
    scope: &'a str, // OAuth scope
    aud: &'a str,   // Audience (token endpoint)
    exp: u64,
    iat: u64,
}

/// Contents of a service account key file.
#[derive(Debug, Clone)]
pub struct ServiceAccountInfo {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

impl ServiceAccountInfo {
    pub fn from_json(json: &Value, source: &str) -> Result<Self> {
        Ok(Self {
            client_email: required_field(json, "client_email", source)?,
            private_key: required_field(json, "private_key", source)?,
            token_uri: json
                .get("token_uri")
                .and_then(Value::as_str)
                .filter(|uri| !uri.is_empty())
                .unwrap_or(TOKEN_URI)
                .to_string(),
        })
    }
}

pub struct ServiceAccountCredentials {
    info: ServiceAccountInfo,
    executor: Arc<dyn HttpExecutor>,
    clock: Arc<dyn Clock>,
    cache: RefreshingCredentialsWrapper,
}

impl ServiceAccountCredentials {
    pub fn new(
        info: ServiceAccountInfo,
        executor: Arc<dyn HttpExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            info,
            executor,
            clock,
            cache: RefreshingCredentialsWrapper::new(),
        }
    }

    fn assertion(&self, now: SystemTime) -> Result<String> {
        let iat = now
            .duration_since(UNIX_EPOCH)
            .map_err(|_| DriveError::InvalidArgument("clock is before the epoch".to_string()))?
            .as_secs();
        let claims = Claims {
            iss: &self.info.client_email,
            scope: DRIVE_SCOPE,
            aud: &self.info.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        let key = EncodingKey::from_rsa_pem(self.info.private_key.as_bytes())?;
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }

    async fn refresh(&self, now: SystemTime) -> Result<BearerToken> {
        let jwt = self.assertion(now)?;
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", &jwt)
            .finish();

        debug!(account = %self.info.client_email, "requesting service account token");
        let request = HttpRequest::new(Method::Post, &self.info.token_uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body.into_bytes());
        let response = self.executor.execute(request).await?;

        let token = parse_token_response(&response, now)?;
        info!(account = %self.info.client_email, "refreshed service account token");
        Ok(token)
    }
}

#[async_trait]
impl Credentials for ServiceAccountCredentials {
    async fn authorization_header(&self) -> Result<String> {
        let now = self.clock.now();
        self.cache
            .authorization_header(now, || self.refresh(now))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SystemClock;
    use crate::error::ErrorKind;
    use crate::http::HttpResponse;

    struct Unreachable;

    #[async_trait]
    impl HttpExecutor for Unreachable {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse> {
            Err(DriveError::TransportUnavailable("unreachable".to_string()))
        }
    }

    #[test]
    fn test_claims_serialization() {
        let claims = Claims {
            iss: "test@example.iam.gserviceaccount.com",
            scope: DRIVE_SCOPE,
            aud: TOKEN_URI,
            iat: 1234567890,
            exp: 1234571490,
        };

        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains("test@example.iam.gserviceaccount.com"));
        assert!(json.contains(DRIVE_SCOPE));
    }

    #[test]
    fn test_info_requires_private_key() {
        let json = serde_json::json!({
            "type": "service_account",
            "client_email": "svc@project.iam.gserviceaccount.com"
        });
        let err = ServiceAccountInfo::from_json(&json, "key.json").unwrap_err();
        assert!(err.to_string().contains("private_key"));
    }

    #[tokio::test]
    async fn test_bad_private_key_is_invalid_argument() {
        let info = ServiceAccountInfo {
            client_email: "svc@project.iam.gserviceaccount.com".to_string(),
            private_key: "not a pem".to_string(),
            token_uri: TOKEN_URI.to_string(),
        };
        let credentials =
            ServiceAccountCredentials::new(info, Arc::new(Unreachable), Arc::new(SystemClock));

        let err = credentials.authorization_header().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
