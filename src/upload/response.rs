use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DriveError, Result};
use crate::http::{error_from_response, HttpResponse};
use crate::models::FileMetadata;

/// `Range` header of a 308 response. Drive always reports a prefix.
static COMMITTED_RANGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^bytes=0-(\d+)$").expect("Invalid range regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadState {
    #[default]
    InProgress,
    Done,
}

/// What the server said after a chunk upload or a status query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResumableUploadResponse {
    /// Empty unless the server named the session in this response.
    pub upload_session_url: String,
    /// Last byte offset the server holds; zero when it reported nothing.
    pub last_committed_byte: u64,
    /// Metadata of the created file, once the upload is done.
    pub payload: Option<FileMetadata>,
    pub upload_state: UploadState,
    pub headers: HashMap<String, String>,
}

impl ResumableUploadResponse {
    /// Interpret a response to a chunk upload or status query.
    ///
    /// 200 and 201 mean the upload is complete, 308 means the server wants
    /// more data. Anything else is an error.
    pub fn from_http_response(response: HttpResponse) -> Result<Self> {
        let upload_state = match response.status {
            200 | 201 => UploadState::Done,
            308 => UploadState::InProgress,
            status => return Err(error_from_response(status, &response.body)),
        };

        let last_committed_byte = match response.header("range") {
            Some(range) => parse_committed_range(range)?,
            None => 0,
        };

        let payload = if upload_state == UploadState::Done && !response.body.is_empty() {
            Some(serde_json::from_slice(&response.body).map_err(|e| {
                DriveError::Unknown(format!(
                    "upload completed but the file metadata is unreadable: {}",
                    e
                ))
            })?)
        } else {
            None
        };

        Ok(Self {
            upload_session_url: response.header("location").unwrap_or_default().to_string(),
            last_committed_byte,
            payload,
            upload_state,
            headers: response.headers,
        })
    }
}

fn parse_committed_range(range: &str) -> Result<u64> {
    COMMITTED_RANGE_REGEX
        .captures(range.trim())
        .and_then(|captures| captures.get(1))
        .and_then(|last| last.as_str().parse::<u64>().ok())
        .ok_or_else(|| {
            DriveError::InvalidArgument(format!("cannot parse Range header: {:?}", range))
        })
}
