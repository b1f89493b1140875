//! Google Drive API client.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::auth::Credentials;
use crate::config::ClientOptions;
use crate::error::{DriveError, Result};
use crate::http::{
    error_from_response, url_with_params, HttpExecutor, HttpRequest, HttpResponse, Method,
    ReqwestExecutor,
};
use crate::models::{FileListResponse, FileMetadata, NewFile, FILE_FIELDS, FOLDER_MIME_TYPE};
use crate::upload::{
    upload_from_reader, QueryResumableUploadRequest, ResumableUploadClient,
    ResumableUploadResponse, ResumableUploadSession, UploadChunkRequest, UPLOAD_QUANTUM,
};

/// How `upload_file` should behave.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Overrides [`ClientOptions::upload_chunk_size`].
    pub chunk_size: Option<usize>,
    /// Continue a previously created session instead of starting a new one.
    pub resume_session: Option<String>,
    /// Delete a same-named file in the destination folder first.
    pub overwrite: bool,
}

/// Client for Google Drive.
///
/// Cloning is cheap; clones share the transport and the credential cache.
#[derive(Clone)]
pub struct DriveClient {
    executor: Arc<dyn HttpExecutor>,
    credentials: Arc<dyn Credentials>,
    options: Arc<ClientOptions>,
}

impl DriveClient {
    /// Create a client that talks to Drive through `reqwest`.
    pub fn new(credentials: Arc<dyn Credentials>, options: ClientOptions) -> Result<Self> {
        let executor = Arc::new(ReqwestExecutor::new(&options)?);
        Ok(Self::with_executor(credentials, executor, options))
    }

    pub fn with_executor(
        credentials: Arc<dyn Credentials>,
        executor: Arc<dyn HttpExecutor>,
        options: ClientOptions,
    ) -> Self {
        Self {
            executor,
            credentials,
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Get file metadata by ID.
    pub async fn get_file_metadata(&self, file_id: &str) -> Result<FileMetadata> {
        let url = url_with_params(
            &self.file_url(file_id),
            &[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)],
        )?;
        let response = self.send(HttpRequest::new(Method::Get, url)).await?;
        parse_json(&response).map_err(|e| e.in_operation("get metadata"))
    }

    /// List everything directly inside a folder.
    pub async fn list_folder(&self, parent_id: &str) -> Result<Vec<FileMetadata>> {
        let query = format!("'{}' in parents and trashed = false", escape_query(parent_id));
        self.query_files(&query).await
    }

    /// Query files using Google Drive query syntax. Follows every page.
    pub async fn query_files(&self, query: &str) -> Result<Vec<FileMetadata>> {
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query),
                ("includeItemsFromAllDrives", "true"),
                ("supportsAllDrives", "true"),
                ("fields", fields.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let url = url_with_params(&format!("{}/files", self.options.api_endpoint), &params)?;
            let response = self.send(HttpRequest::new(Method::Get, url)).await?;
            let page: FileListResponse =
                parse_json(&response).map_err(|e| e.in_operation("list files"))?;
            all_files.extend(page.files);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    /// Find a file by name in a folder.
    pub async fn find_file(&self, name: &str, parent_id: &str) -> Result<Option<FileMetadata>> {
        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            escape_query(name),
            escape_query(parent_id)
        );
        let files = self.query_files(&query).await?;
        Ok(files.into_iter().last())
    }

    pub async fn create_folder(&self, name: &str, parent_id: &str) -> Result<FileMetadata> {
        let body = NewFile::new(name)
            .with_parent(parent_id)
            .with_mime_type(FOLDER_MIME_TYPE);
        let url = url_with_params(
            &format!("{}/files", self.options.api_endpoint),
            &[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)],
        )?;
        let response = self.send(HttpRequest::new(Method::Post, url).json(&body)?).await?;
        parse_json(&response).map_err(|e| e.in_operation("create folder"))
    }

    pub async fn rename_file(&self, file_id: &str, new_name: &str) -> Result<FileMetadata> {
        let url = url_with_params(
            &self.file_url(file_id),
            &[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)],
        )?;
        let body = serde_json::json!({ "name": new_name });
        let response = self.send(HttpRequest::new(Method::Patch, url).json(&body)?).await?;
        parse_json(&response).map_err(|e| e.in_operation("rename"))
    }

    /// Delete a file or folder by ID.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let url = url_with_params(&self.file_url(file_id), &[("supportsAllDrives", "true")])?;
        let response = self.send(HttpRequest::new(Method::Delete, url)).await?;
        if !response.is_success() {
            return Err(error_from_response(response.status, &response.body).in_operation("delete"));
        }
        Ok(())
    }

    /// Read the whole content of a file.
    ///
    /// The content is held in memory; use [`download_file`](Self::download_file)
    /// for anything large.
    pub async fn read_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .send(HttpRequest::new(Method::Get, self.media_url(file_id)?))
            .await?;
        if !response.is_success() {
            return Err(error_from_response(response.status, &response.body).in_operation("download"));
        }
        Ok(response.body)
    }

    /// Download a file to a local path.
    ///
    /// If `destination` is a directory the remote file name is appended.
    pub async fn download_file<P: AsRef<Path>>(
        &self,
        file_id: &str,
        destination: P,
    ) -> Result<FileMetadata> {
        let destination = destination.as_ref();
        let metadata = self.get_file_metadata(file_id).await?;

        let final_path = if destination.is_dir() {
            destination.join(&metadata.name)
        } else {
            destination.to_path_buf()
        };

        let mut file = File::create(&final_path).await?;
        let result = self
            .send_into(HttpRequest::new(Method::Get, self.media_url(file_id)?), &mut file)
            .await
            .and_then(|response| {
                if response.is_success() {
                    Ok(())
                } else {
                    Err(error_from_response(response.status, &response.body))
                }
            });
        drop(file);
        if let Err(err) = result {
            // Leave no partial file behind.
            let _ = tokio::fs::remove_file(&final_path).await;
            return Err(err.in_operation("download"));
        }

        info!(id = %file_id, path = %final_path.display(), "downloaded file");
        Ok(metadata)
    }

    /// Create a small file from an in-memory buffer.
    ///
    /// The content goes out as a single final chunk; whatever the server does
    /// not commit is sent again.
    pub async fn insert_file(&self, file: &NewFile, content: &[u8]) -> Result<FileMetadata> {
        let mut session = self.create_resumable_session(file).await?;
        let mut source = Cursor::new(content);
        upload_from_reader(&mut session, &mut source, content.len() + 1)
            .await
            .map_err(|e| e.in_operation("insert file"))
    }

    /// Start a resumable upload. The session URL comes back in `Location`.
    pub async fn create_resumable_session(&self, file: &NewFile) -> Result<ResumableUploadSession> {
        let url = url_with_params(
            &format!("{}/files", self.options.upload_endpoint),
            &[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ],
        )?;
        let mut request = HttpRequest::new(Method::Post, url).json(file)?;
        if let Some(mime_type) = &file.mime_type {
            request = request.header("X-Upload-Content-Type", mime_type.as_str());
        }

        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(error_from_response(response.status, &response.body)
                .in_operation("create upload session"));
        }
        let session_url = response
            .header("location")
            .filter(|location| !location.is_empty())
            .ok_or_else(|| {
                DriveError::Unknown("no upload session URL in response".to_string())
                    .in_operation("create upload session")
            })?
            .to_string();

        info!(name = %file.name, session = %session_url, "created resumable upload session");
        Ok(ResumableUploadSession::new(Arc::new(self.clone()), session_url))
    }

    /// Reattach to an existing session and learn how much it already holds.
    pub async fn restore_resumable_session(&self, session_id: &str) -> Result<ResumableUploadSession> {
        let mut session = ResumableUploadSession::new(Arc::new(self.clone()), session_id);
        session
            .reset_session()
            .await
            .map_err(|e| e.in_operation("restore upload session"))?;
        info!(
            session = %session_id,
            next_expected = session.next_expected_byte(),
            "restored resumable upload session"
        );
        Ok(session)
    }

    /// Upload a local file into a folder using a resumable session.
    pub async fn upload_file<P: AsRef<Path>>(
        &self,
        local_path: P,
        parent_id: &str,
        options: &UploadOptions,
    ) -> Result<FileMetadata> {
        let local_path = local_path.as_ref();
        let filename = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DriveError::InvalidArgument(format!("not a file path: {}", local_path.display()))
            })?;

        let mut source = File::open(local_path).await.map_err(|e| {
            DriveError::from(e).in_operation(format!("open {}", local_path.display()))
        })?;

        let mut session = match &options.resume_session {
            Some(session_id) => self.restore_resumable_session(session_id).await?,
            None => {
                if options.overwrite {
                    if let Some(existing) = self.find_file(filename, parent_id).await? {
                        debug!(id = %existing.id, "deleting file before overwrite");
                        self.delete_file(&existing.id).await?;
                    }
                }
                let mime_type = mime_guess::from_path(local_path)
                    .first_or_octet_stream()
                    .to_string();
                let file = NewFile::new(filename)
                    .with_parent(parent_id)
                    .with_mime_type(mime_type);
                self.create_resumable_session(&file).await?
            }
        };

        let chunk_size = options.chunk_size.unwrap_or(self.options.upload_chunk_size);
        upload_from_reader(&mut session, &mut source, chunk_size).await
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("{}/files/{}", self.options.api_endpoint, file_id)
    }

    fn media_url(&self, file_id: &str) -> Result<String> {
        url_with_params(
            &self.file_url(file_id),
            &[("alt", "media"), ("supportsAllDrives", "true")],
        )
    }

    /// Attach credentials and execute.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let authorization = self.credentials.authorization_header().await?;
        debug!(method = %request.method, url = %request.url, "sending request");
        self.executor
            .execute(request.header("Authorization", authorization))
            .await
    }

    /// Like `send`, streaming a successful body into `sink`.
    async fn send_into(
        &self,
        request: HttpRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<HttpResponse> {
        let authorization = self.credentials.authorization_header().await?;
        debug!(method = %request.method, url = %request.url, "sending streamed request");
        self.executor
            .execute_into(request.header("Authorization", authorization), sink)
            .await
    }
}

#[async_trait]
impl ResumableUploadClient for DriveClient {
    async fn upload_chunk(&self, request: UploadChunkRequest) -> Result<ResumableUploadResponse> {
        let http_request = HttpRequest::new(Method::Put, &request.session_url)
            .header("Content-Range", request.content_range())
            .body(request.payload);
        let response = self.send(http_request).await?;
        ResumableUploadResponse::from_http_response(response)
    }

    async fn query_resumable_upload(
        &self,
        request: QueryResumableUploadRequest,
    ) -> Result<ResumableUploadResponse> {
        let http_request = HttpRequest::new(Method::Put, &request.session_url)
            .header("Content-Range", QueryResumableUploadRequest::CONTENT_RANGE);
        let response = self.send(http_request).await?;
        ResumableUploadResponse::from_http_response(response)
    }

    fn file_chunk_quantum(&self) -> u64 {
        UPLOAD_QUANTUM
    }
}

fn parse_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    if !response.is_success() {
        return Err(error_from_response(response.status, &response.body));
    }
    serde_json::from_slice(&response.body).map_err(|e| {
        DriveError::Unknown(format!("unexpected response from Drive: {}", e))
    })
}

/// Escape a value for use inside a single-quoted Drive query string.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
