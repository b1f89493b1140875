//! Client configuration and credential file discovery.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::upload::{DEFAULT_CHUNK_SIZE, UPLOAD_QUANTUM};

/// Environment variable that overrides the credentials file location.
pub const CREDENTIALS_ENV_VAR: &str = "GDRIVE_CLIENT_CREDENTIALS";

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API.
pub const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Google OAuth2 token endpoint.
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Settings shared by every request a [`DriveClient`](crate::DriveClient) makes.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_endpoint: String,
    pub upload_endpoint: String,
    /// Chunk size used by `upload_file` when the caller does not pick one.
    pub upload_chunk_size: usize,
    pub connect_timeout: Duration,
    /// Longest wait for the next bytes of a response. A transfer that keeps
    /// moving may take as long as it needs; one that goes quiet this long
    /// surfaces as `DeadlineExceeded`.
    pub stall_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_endpoint: DRIVE_API_BASE.to_string(),
            upload_endpoint: UPLOAD_API_BASE.to_string(),
            upload_chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(30),
            stall_timeout: Duration::from_secs(300),
        }
    }
}

impl ClientOptions {
    /// Point both the metadata and upload endpoints at `base`.
    ///
    /// Mostly useful against emulators and test servers, which serve both APIs
    /// from one origin under `/drive/v3` and `/upload/drive/v3`.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.api_endpoint = format!("{}/drive/v3", base);
        self.upload_endpoint = format!("{}/upload/drive/v3", base);
        self
    }

    pub fn with_upload_chunk_size(mut self, size: usize) -> Self {
        self.upload_chunk_size = size.max(UPLOAD_QUANTUM as usize);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }
}

/// Locate the credentials file: the environment override first, then the
/// per-user config directory. The file is not required to exist.
pub fn load_default_credentials_path() -> Option<PathBuf> {
    resolve_credentials_path(std::env::var_os(CREDENTIALS_ENV_VAR), dirs::config_dir())
}

fn resolve_credentials_path(
    env_value: Option<OsString>,
    config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(value));
    }
    config_dir.map(|dir| dir.join("gdrive_client").join("credentials.json"))
}
