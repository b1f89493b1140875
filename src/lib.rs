//! gdrive_client - A Google Drive client with resumable uploads.
//!
//! This library provides:
//! - File and folder CRUD and metadata queries
//! - Chunked, resumable uploads that survive interrupted transfers
//! - OAuth2 (authorized user) and service account credentials with a shared,
//!   refreshing token cache
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gdrive_client::auth::{load_credentials_file, SystemClock};
//! use gdrive_client::{ClientOptions, DriveClient, ReqwestExecutor, UploadOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = ClientOptions::default();
//!     let executor = Arc::new(ReqwestExecutor::new(&options)?);
//!     let credentials =
//!         load_credentials_file("credentials.json", executor.clone(), Arc::new(SystemClock))?;
//!     let client = DriveClient::with_executor(credentials, executor, options);
//!
//!     let file = client
//!         .upload_file("backup.tar", "folder-id", &UploadOptions::default())
//!         .await?;
//!     println!("{}", file);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod upload;

// Re-exports for convenience
pub use auth::Credentials;
pub use client::{DriveClient, UploadOptions};
pub use config::{load_default_credentials_path, ClientOptions};
pub use error::{DriveError, ErrorKind, Result};
pub use http::{HttpExecutor, ReqwestExecutor};
pub use models::{FileMetadata, NewFile};
pub use upload::{ResumableUploadSession, UploadState};
