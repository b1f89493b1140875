//! Tests for the chunked upload loop against an in-memory server.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gdrive_client::error::{DriveError, ErrorKind, Result};
use gdrive_client::models::FileMetadata;
use gdrive_client::upload::{
    upload_from_reader, QueryResumableUploadRequest, ResumableUploadClient,
    ResumableUploadResponse, ResumableUploadSession, UploadChunkRequest, UploadState,
};

const QUANTUM: u64 = 4;

/// Keeps the committed bytes of one upload, like Drive does.
#[derive(Default)]
struct ServerState {
    data: Vec<u8>,
    /// Commit at most this many new bytes per request.
    commit_limit: Option<usize>,
    /// Fail the request with this 1-based index.
    fail_call: Option<usize>,
    calls: Vec<(u64, usize, Option<u64>)>,
    complete: bool,
}

#[derive(Default)]
struct FakeServer {
    state: Mutex<ServerState>,
}

impl FakeServer {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn data(&self) -> Vec<u8> {
        self.state.lock().unwrap().data.clone()
    }

    fn calls(&self) -> Vec<(u64, usize, Option<u64>)> {
        self.state.lock().unwrap().calls.clone()
    }

    fn response(state: &ServerState) -> ResumableUploadResponse {
        if state.complete {
            return ResumableUploadResponse {
                payload: Some(FileMetadata {
                    id: "file-1".to_string(),
                    name: "upload.bin".to_string(),
                    mime_type: None,
                    parents: vec![],
                    modified_time: None,
                    web_view_link: None,
                    size: Some(state.data.len() as u64),
                }),
                upload_state: UploadState::Done,
                ..Default::default()
            };
        }
        ResumableUploadResponse {
            last_committed_byte: (state.data.len() as u64).saturating_sub(1),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ResumableUploadClient for FakeServer {
    async fn upload_chunk(&self, request: UploadChunkRequest) -> Result<ResumableUploadResponse> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push((request.range_begin, request.payload.len(), request.total_size));
        if state.fail_call == Some(state.calls.len()) {
            return Err(DriveError::TransportUnavailable("connection reset".to_string()));
        }

        let held = state.data.len() as u64;
        if request.range_begin > held {
            return Err(DriveError::ApiError {
                status: 400,
                message: "gap in upload".to_string(),
            });
        }
        let skip = (held - request.range_begin) as usize;
        let mut fresh = request.payload.get(skip..).unwrap_or_default();
        if let Some(limit) = state.commit_limit {
            fresh = &fresh[..fresh.len().min(limit)];
        }
        state.data.extend_from_slice(fresh);

        if request.total_size == Some(state.data.len() as u64) {
            state.complete = true;
        }
        Ok(Self::response(&state))
    }

    async fn query_resumable_upload(
        &self,
        _request: QueryResumableUploadRequest,
    ) -> Result<ResumableUploadResponse> {
        Ok(Self::response(&self.state.lock().unwrap()))
    }

    fn file_chunk_quantum(&self) -> u64 {
        QUANTUM
    }
}

fn source(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn uploads_all_bytes_in_order() {
    let server = FakeServer::new();
    let mut session = ResumableUploadSession::new(server.clone(), "session-1");
    let content = source(50);
    let mut reader = Cursor::new(content.clone());

    let metadata = upload_from_reader(&mut session, &mut reader, 12).await.unwrap();

    assert_eq!(metadata.size, Some(50));
    assert_eq!(server.data(), content);
    assert_eq!(
        server.calls(),
        vec![
            (0, 12, None),
            (12, 12, None),
            (24, 12, None),
            (36, 12, None),
            (48, 2, Some(50)),
        ]
    );
    assert!(session.done());
    assert_eq!(session.next_expected_byte(), 50);
}

#[tokio::test]
async fn exact_multiple_ends_with_empty_final_chunk() {
    let server = FakeServer::new();
    let mut session = ResumableUploadSession::new(server.clone(), "session-1");
    let content = source(24);

    upload_from_reader(&mut session, &mut Cursor::new(content.clone()), 12)
        .await
        .unwrap();

    assert_eq!(server.data(), content);
    assert_eq!(
        server.calls(),
        vec![(0, 12, None), (12, 12, None), (24, 0, Some(24))]
    );
}

#[tokio::test]
async fn empty_source_sends_one_final_chunk() {
    let server = FakeServer::new();
    let mut session = ResumableUploadSession::new(server.clone(), "session-1");

    let metadata = upload_from_reader(&mut session, &mut Cursor::new(Vec::new()), 12)
        .await
        .unwrap();

    assert_eq!(metadata.size, Some(0));
    assert_eq!(server.calls(), vec![(0, 0, Some(0))]);
    assert!(session.done());
}

#[tokio::test]
async fn chunk_size_is_rounded_up_to_quantum() {
    let server = FakeServer::new();
    let mut session = ResumableUploadSession::new(server.clone(), "session-1");

    upload_from_reader(&mut session, &mut Cursor::new(source(20)), 10)
        .await
        .unwrap();

    assert_eq!(
        server.calls(),
        vec![(0, 12, None), (12, 8, Some(20))]
    );
}

#[tokio::test]
async fn zero_chunk_size_uses_quantum() {
    let server = FakeServer::new();
    let mut session = ResumableUploadSession::new(server.clone(), "session-1");

    upload_from_reader(&mut session, &mut Cursor::new(source(6)), 0)
        .await
        .unwrap();

    assert_eq!(server.calls(), vec![(0, 4, None), (4, 2, Some(6))]);
}

#[tokio::test]
async fn partial_commits_are_resent() {
    let server = FakeServer::new();
    server.state.lock().unwrap().commit_limit = Some(5);
    let mut session = ResumableUploadSession::new(server.clone(), "session-1");
    let content = source(30);

    upload_from_reader(&mut session, &mut Cursor::new(content.clone()), 8)
        .await
        .unwrap();

    assert_eq!(server.data(), content);
    let calls = server.calls();
    // Every request resumes exactly where the previous commit ended.
    let mut expected_begin = 0;
    for (begin, _, _) in &calls {
        assert_eq!(*begin, expected_begin);
        expected_begin = (*begin + 5).min(30);
    }
    assert_eq!(calls.last().unwrap().2, Some(30));
}

#[tokio::test]
async fn failure_leaves_progress_and_caller_can_resume() {
    let server = FakeServer::new();
    server.state.lock().unwrap().fail_call = Some(2);
    let mut session = ResumableUploadSession::new(server.clone(), "session-1");
    let content = source(40);
    let mut reader = Cursor::new(content.clone());

    let err = upload_from_reader(&mut session, &mut reader, 12).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportUnavailable);
    assert!(err.to_string().contains("upload of bytes 12..24"));
    assert_eq!(session.next_expected_byte(), 12);
    assert!(session.last_response().is_err());

    session.reset_session().await.unwrap();
    assert_eq!(session.next_expected_byte(), 12);

    upload_from_reader(&mut session, &mut reader, 12).await.unwrap();
    assert_eq!(server.data(), content);
}

#[tokio::test]
async fn restored_session_skips_committed_bytes() {
    let server = FakeServer::new();
    let content = source(40);
    server.state.lock().unwrap().data = content[..20].to_vec();

    let mut session = ResumableUploadSession::new(server.clone(), "session-1");
    session.reset_session().await.unwrap();
    assert_eq!(session.next_expected_byte(), 20);

    upload_from_reader(&mut session, &mut Cursor::new(content.clone()), 12)
        .await
        .unwrap();

    assert_eq!(server.data(), content);
    assert_eq!(server.calls(), vec![(20, 12, None), (32, 8, Some(40))]);
}

#[tokio::test]
async fn completed_session_returns_metadata_without_sending() {
    let server = FakeServer::new();
    {
        let mut state = server.state.lock().unwrap();
        state.data = source(8);
        state.complete = true;
    }

    let mut session = ResumableUploadSession::new(server.clone(), "session-1");
    session.reset_session().await.unwrap();
    assert!(session.done());

    let metadata = upload_from_reader(&mut session, &mut Cursor::new(source(8)), 12)
        .await
        .unwrap();
    assert_eq!(metadata.id, "file-1");
    assert!(server.calls().is_empty());
}
