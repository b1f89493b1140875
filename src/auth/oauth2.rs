//! Authorized-user credentials: a long-lived refresh token traded for short
//! lived access tokens.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use url::form_urlencoded;

use super::{
    parse_token_response, required_field, BearerToken, Clock, Credentials,
    RefreshingCredentialsWrapper,
};
use crate::config::TOKEN_URI;
use crate::error::Result;
use crate::http::{HttpExecutor, HttpRequest, Method};

/// Contents of an authorized-user credentials file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2CredentialsInfo {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_uri: String,
}

impl OAuth2CredentialsInfo {
    /// Validate a parsed credentials document. `source` names the file in
    /// error messages.
    pub fn from_json(json: &Value, source: &str) -> Result<Self> {
        Ok(Self {
            client_id: required_field(json, "client_id", source)?,
            client_secret: required_field(json, "client_secret", source)?,
            refresh_token: required_field(json, "refresh_token", source)?,
            token_uri: json
                .get("token_uri")
                .and_then(Value::as_str)
                .filter(|uri| !uri.is_empty())
                .unwrap_or(TOKEN_URI)
                .to_string(),
        })
    }
}

pub struct OAuth2Credentials {
    info: OAuth2CredentialsInfo,
    executor: Arc<dyn HttpExecutor>,
    clock: Arc<dyn Clock>,
    cache: RefreshingCredentialsWrapper,
}

impl OAuth2Credentials {
    pub fn new(
        info: OAuth2CredentialsInfo,
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

    async fn refresh(&self, now: SystemTime) -> Result<BearerToken> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("client_id", &self.info.client_id)
            .append_pair("client_secret", &self.info.client_secret)
            .append_pair("refresh_token", &self.info.refresh_token)
            .finish();

        debug!(token_uri = %self.info.token_uri, "refreshing access token");
        let request = HttpRequest::new(Method::Post, &self.info.token_uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body.into_bytes());
        let response = self.executor.execute(request).await?;

        let token = parse_token_response(&response, now)?;
        info!("refreshed OAuth2 access token");
        Ok(token)
    }
}

#[async_trait]
impl Credentials for OAuth2Credentials {
    async fn authorization_header(&self) -> Result<String> {
        let now = self.clock.now();
        self.cache
            .authorization_header(now, || self.refresh(now))
            .await
    }
}
