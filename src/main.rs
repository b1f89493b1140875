//! gdrive_client CLI - Manage files in Google Drive.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use gdrive_client::auth::{load_credentials_file, SystemClock};
use gdrive_client::config::CREDENTIALS_ENV_VAR;
use gdrive_client::{
    load_default_credentials_path, ClientOptions, DriveClient, ReqwestExecutor, UploadOptions,
};

/// CLI tool for managing files in Google Drive.
#[derive(Parser)]
#[command(name = "gdrive_client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the credentials JSON file (authorized user or service account).
    #[arg(long, env = CREDENTIALS_ENV_VAR)]
    credentials: Option<PathBuf>,

    /// Log debug output.
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files in a folder.
    List {
        /// Folder ID ("root" for My Drive).
        folder: String,
    },

    /// Show metadata of a file or folder.
    Stat { id: String },

    /// Create a folder.
    Mkdir {
        name: String,

        /// Parent folder ID.
        #[arg(long, default_value = "root")]
        parent: String,
    },

    /// Delete a file or folder.
    Rm { id: String },

    /// Rename a file or folder.
    Mv { id: String, new_name: String },

    /// Upload files to a folder.
    Upload {
        /// Files to upload (glob patterns and `{a,b}` alternatives are expanded).
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Destination folder ID.
        #[arg(long, short = 't', default_value = "root")]
        to: String,

        /// Chunk size in bytes; rounded up to a multiple of 256 KiB.
        #[arg(long, env = "GDRIVE_CLIENT_CHUNK_SIZE")]
        chunk_size: Option<usize>,

        /// Resume an interrupted upload session (single file only).
        #[arg(long)]
        resume: Option<String>,

        /// Replace a file with the same name in the destination folder.
        #[arg(long)]
        overwrite: bool,
    },

    /// Download a file to the local filesystem.
    Download {
        id: String,

        /// Local destination path (file or directory).
        #[arg(long, short = 't', default_value = ".")]
        to: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string()))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let credentials_path = cli
        .credentials
        .clone()
        .or_else(load_default_credentials_path)
        .context("No credentials file given and no config directory to look in")?;

    let options = ClientOptions::default();
    let executor = Arc::new(ReqwestExecutor::new(&options)?);
    let credentials = load_credentials_file(&credentials_path, executor.clone(), Arc::new(SystemClock))
        .with_context(|| format!("Failed to load credentials from {:?}", credentials_path))?;
    let client = DriveClient::with_executor(credentials, executor, options);

    match cli.command {
        Commands::List { folder } => {
            let files = client
                .list_folder(&folder)
                .await
                .with_context(|| format!("Failed to list files in folder: {}", folder))?;

            if files.is_empty() {
                println!("No files found.");
            } else {
                println!("{:<44} {:>10} {:<24} {}", "ID", "SIZE", "MODIFIED", "NAME");
                println!("{}", "-".repeat(100));
                for file in files {
                    println!("{}", file);
                }
            }
        }

        Commands::Stat { id } => {
            let file = client
                .get_file_metadata(&id)
                .await
                .with_context(|| format!("Failed to get metadata of {}", id))?;
            println!("{}", serde_json::to_string_pretty(&file)?);
        }

        Commands::Mkdir { name, parent } => {
            let folder = client
                .create_folder(&name, &parent)
                .await
                .with_context(|| format!("Failed to create folder {}", name))?;
            println!("{}", folder.id);
        }

        Commands::Rm { id } => {
            client
                .delete_file(&id)
                .await
                .with_context(|| format!("Failed to delete {}", id))?;
        }

        Commands::Mv { id, new_name } => {
            let file = client
                .rename_file(&id, &new_name)
                .await
                .with_context(|| format!("Failed to rename {}", id))?;
            println!("{}", file);
        }

        Commands::Upload {
            patterns,
            to,
            chunk_size,
            resume,
            overwrite,
        } => {
            let files_to_upload = collect_upload_sources(&patterns)?;

            if files_to_upload.is_empty() {
                anyhow::bail!("No files to upload");
            }
            if resume.is_some() && files_to_upload.len() > 1 {
                anyhow::bail!("--resume needs exactly one file, got {}", files_to_upload.len());
            }

            let options = UploadOptions {
                chunk_size,
                resume_session: resume,
                overwrite,
            };

            let mut failures = 0;
            for (idx, file_path) in files_to_upload.iter().enumerate() {
                let filename = file_path.file_name().unwrap_or_default().to_string_lossy();
                print!("[{}/{}] Uploading {}... ", idx + 1, files_to_upload.len(), filename);

                match client.upload_file(file_path, &to, &options).await {
                    Ok(metadata) => println!("OK ({})", metadata.id),
                    Err(e) => {
                        failures += 1;
                        println!("FAILED");
                        eprintln!("  Error: {}", e);
                    }
                }
            }

            if failures > 0 {
                anyhow::bail!("{} upload(s) failed", failures);
            }
        }

        Commands::Download { id, to } => {
            if to.to_string_lossy().ends_with('/') {
                std::fs::create_dir_all(&to)
                    .with_context(|| format!("Failed to create directory: {:?}", to))?;
            }

            let metadata = client
                .download_file(&id, &to)
                .await
                .with_context(|| format!("Failed to download file: {}", id))?;
            println!("Downloaded {} ({} bytes)", metadata.name, metadata.size.unwrap_or(0));
        }
    }

    Ok(())
}

/// Expand every pattern into the regular files it names, sorted and deduplicated.
fn collect_upload_sources(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        for expanded in expand_braces(pattern) {
            let matches: Vec<PathBuf> = glob(&expanded)
                .with_context(|| format!("Invalid glob pattern: {}", expanded))?
                .filter_map(|r| r.ok())
                .filter(|p| p.is_file())
                .collect();

            if !matches.is_empty() {
                files.extend(matches);
                continue;
            }
            // Names with glob metacharacters can still be plain files.
            let literal = PathBuf::from(&expanded);
            if literal.is_file() {
                files.push(literal);
            } else {
                eprintln!("Warning: No files matched pattern: {}", expanded);
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Shell-style brace expansion, which `glob` does not do: `a_{1,2}.txt`
/// becomes `a_1.txt` and `a_2.txt`. Groups expand left to right.
fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|i| open + i) else {
        return vec![pattern.to_string()];
    };

    let (head, tail) = (&pattern[..open], &pattern[close + 1..]);
    pattern[open + 1..close]
        .split(',')
        .flat_map(|choice| expand_braces(&format!("{}{}{}", head, choice.trim(), tail)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_braces_alternatives() {
        assert_eq!(expand_braces("*.{txt,md}"), vec!["*.txt", "*.md"]);
    }

    #[test]
    fn test_expand_braces_without_group() {
        assert_eq!(expand_braces("backup.tar"), vec!["backup.tar"]);
        assert_eq!(expand_braces("dir/*.bin"), vec!["dir/*.bin"]);
    }

    #[test]
    fn test_expand_braces_several_groups() {
        assert_eq!(
            expand_braces("{a,b}_{1,2}.log"),
            vec!["a_1.log", "a_2.log", "b_1.log", "b_2.log"]
        );
    }

    #[test]
    fn test_expand_braces_unclosed_group_is_literal() {
        assert_eq!(expand_braces("odd{name.txt"), vec!["odd{name.txt"]);
    }

    #[test]
    fn test_collect_upload_sources_expands_braces() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "b.md", "c.bin"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let pattern = format!("{}/*.{{txt,md}}", dir.path().display());
        let files = collect_upload_sources(&[pattern]).unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md"]);
    }
}
