use std::sync::Arc;

use tracing::debug;

use super::{
    QueryResumableUploadRequest, ResumableUploadClient, ResumableUploadResponse, UploadChunkRequest,
    UploadState,
};
use crate::error::Result;

/// Client-side state of one resumable upload.
///
/// The server's most recent answer is the only source of truth for progress:
/// after every exchange [`next_expected_byte`](Self::next_expected_byte) is
/// reconciled against it. Failed exchanges change nothing but
/// [`last_response`](Self::last_response), so the caller can retry the same
/// range or call [`reset_session`](Self::reset_session) to find out where the
/// server stands.
///
/// Sessions are single-writer; chunks must go out one at a time.
pub struct ResumableUploadSession {
    client: Arc<dyn ResumableUploadClient>,
    session_id: String,
    next_expected: u64,
    done: bool,
    last_response: Result<ResumableUploadResponse>,
}

impl ResumableUploadSession {
    /// Wrap a session the server has already created. `session_id` is the
    /// session URL; it may be empty if the server assigns one on first contact.
    pub fn new(client: Arc<dyn ResumableUploadClient>, session_id: impl Into<String>) -> Self {
        Self {
            client,
            session_id: session_id.into(),
            next_expected: 0,
            done: false,
            last_response: Ok(ResumableUploadResponse::default()),
        }
    }

    /// Send a chunk starting at [`next_expected_byte`](Self::next_expected_byte).
    pub async fn upload_chunk(&mut self, payload: &[u8]) -> Result<ResumableUploadResponse> {
        self.send(payload, None).await
    }

    /// Send the last chunk, declaring the size of the whole upload.
    pub async fn upload_final_chunk(
        &mut self,
        payload: &[u8],
        total_size: u64,
    ) -> Result<ResumableUploadResponse> {
        self.send(payload, Some(total_size)).await
    }

    /// Ask the server what it has committed and resynchronize with it.
    pub async fn reset_session(&mut self) -> Result<ResumableUploadResponse> {
        let request = QueryResumableUploadRequest {
            session_url: self.session_id.clone(),
        };
        let result = self.client.query_resumable_upload(request).await;
        self.update(result, 0);
        self.last_response.clone()
    }

    pub fn next_expected_byte(&self) -> u64 {
        self.next_expected
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn last_response(&self) -> &Result<ResumableUploadResponse> {
        &self.last_response
    }

    /// Chunk sizes (except for the last chunk) must be multiples of this.
    pub fn file_chunk_quantum(&self) -> u64 {
        self.client.file_chunk_quantum()
    }

    async fn send(
        &mut self,
        payload: &[u8],
        total_size: Option<u64>,
    ) -> Result<ResumableUploadResponse> {
        let request = UploadChunkRequest {
            session_url: self.session_id.clone(),
            range_begin: self.next_expected,
            payload: payload.to_vec(),
            total_size,
        };
        debug!(
            range = %request.content_range(),
            session = %self.session_id,
            "uploading chunk"
        );
        let result = self.client.upload_chunk(request).await;
        self.update(result, payload.len() as u64);
        self.last_response.clone()
    }

    fn update(&mut self, result: Result<ResumableUploadResponse>, chunk_size: u64) {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, next_expected = self.next_expected, "upload exchange failed");
                self.last_response = Err(err);
                return;
            }
        };

        self.done = response.upload_state == UploadState::Done;
        if self.done && response.last_committed_byte == 0 {
            // Completion without a committed range: the whole chunk landed.
            self.next_expected += chunk_size;
        } else if response.last_committed_byte != 0 {
            self.next_expected = response.last_committed_byte + 1;
        } else {
            self.next_expected = 0;
        }

        if self.session_id.is_empty() && !response.upload_session_url.is_empty() {
            self.session_id = response.upload_session_url.clone();
        }

        debug!(
            next_expected = self.next_expected,
            done = self.done,
            "reconciled upload progress"
        );
        self.last_response = Ok(response);
    }
}

impl std::fmt::Debug for ResumableUploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumableUploadSession")
            .field("session_id", &self.session_id)
            .field("next_expected", &self.next_expected)
            .field("done", &self.done)
            .finish()
    }
}
