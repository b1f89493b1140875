//! Resumable uploads.
//!
//! A [`ResumableUploadSession`] tracks how much of one upload the server has
//! committed. [`upload_from_reader`] drives a session over a seekable byte
//! source, chunk by chunk, re-reading whatever the server did not keep.

mod driver;
mod response;
mod session;

use async_trait::async_trait;

use crate::error::Result;

pub use driver::{round_up_to_quantum, upload_from_reader};
pub use response::{ResumableUploadResponse, UploadState};
pub use session::ResumableUploadSession;

/// Drive requires every chunk except the last to be a multiple of 256 KiB.
pub const UPLOAD_QUANTUM: u64 = 256 * 1024;

/// Default chunk size for file uploads (8 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 32 * UPLOAD_QUANTUM as usize;

/// One chunk of an upload, addressed by its offset within the whole object.
#[derive(Debug, Clone)]
pub struct UploadChunkRequest {
    pub session_url: String,
    pub range_begin: u64,
    pub payload: Vec<u8>,
    /// Set on the final chunk only.
    pub total_size: Option<u64>,
}

impl UploadChunkRequest {
    /// Value of the `Content-Range` header for this chunk.
    pub fn content_range(&self) -> String {
        let total = self
            .total_size
            .map(|size| size.to_string())
            .unwrap_or_else(|| "*".to_string());
        if self.payload.is_empty() {
            format!("bytes */{}", total)
        } else {
            let last = self.range_begin + self.payload.len() as u64 - 1;
            format!("bytes {}-{}/{}", self.range_begin, last, total)
        }
    }
}

/// Ask the server how much of an upload it holds, without sending data.
#[derive(Debug, Clone)]
pub struct QueryResumableUploadRequest {
    pub session_url: String,
}

impl QueryResumableUploadRequest {
    pub const CONTENT_RANGE: &'static str = "bytes */*";
}

/// The part of a storage client a resumable session needs.
#[async_trait]
pub trait ResumableUploadClient: Send + Sync {
    async fn upload_chunk(&self, request: UploadChunkRequest) -> Result<ResumableUploadResponse>;

    async fn query_resumable_upload(
        &self,
        request: QueryResumableUploadRequest,
    ) -> Result<ResumableUploadResponse>;

    /// Chunk sizes (except for the last chunk) must be multiples of this.
    fn file_chunk_quantum(&self) -> u64 {
        UPLOAD_QUANTUM
    }
}
