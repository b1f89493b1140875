use std::io::SeekFrom;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::{info, warn};

use super::ResumableUploadSession;
use crate::error::{DriveError, Result};
use crate::models::FileMetadata;

/// Round `size` up to the next multiple of `quantum`.
pub fn round_up_to_quantum(size: u64, quantum: u64) -> u64 {
    if quantum == 0 {
        return size;
    }
    size.div_ceil(quantum) * quantum
}

/// Upload everything `reader` yields through `session`.
///
/// `reader` must be positioned relative to the start of the upload: byte `n`
/// of the reader is byte `n` of the uploaded file. Before the first chunk the
/// reader is moved to the session's `next_expected_byte`, which lets a
/// restored session pick up where it left off. Whenever the server commits
/// less than was sent, the reader is moved back so the uncommitted tail is
/// read again.
///
/// `chunk_size` is rounded up to the provider's quantum. A source that is
/// empty still produces one final, empty chunk.
pub async fn upload_from_reader<R>(
    session: &mut ResumableUploadSession,
    reader: &mut R,
    chunk_size: usize,
) -> Result<FileMetadata>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let quantum = session.file_chunk_quantum();
    let chunk_size = round_up_to_quantum(chunk_size as u64, quantum).max(quantum) as usize;

    reader.seek(SeekFrom::Start(session.next_expected_byte())).await?;
    let mut buffer = vec![0u8; chunk_size];

    while !session.done() {
        let begin = session.next_expected_byte();
        let read = read_full(reader, &mut buffer).await?;
        let chunk = &buffer[..read];

        let result = if read < chunk_size {
            session.upload_final_chunk(chunk, begin + read as u64).await
        } else {
            session.upload_chunk(chunk).await
        };
        let response = result.map_err(|e| {
            e.in_operation(format!("upload of bytes {}..{}", begin, begin + read as u64))
        })?;

        if session.done() {
            return match response.payload {
                Some(metadata) => {
                    info!(
                        id = %metadata.id,
                        bytes = session.next_expected_byte(),
                        "upload complete"
                    );
                    Ok(metadata)
                }
                None => Err(DriveError::Unknown(
                    "upload completed but the server returned no file metadata".to_string(),
                )),
            };
        }

        let expected = begin + read as u64;
        if session.next_expected_byte() != expected {
            warn!(
                sent_through = expected,
                committed_through = session.next_expected_byte(),
                "server committed a different range than sent; rereading"
            );
            reader.seek(SeekFrom::Start(session.next_expected_byte())).await?;
        }
    }

    // The session was complete before any data was sent.
    match session.last_response() {
        Ok(response) => response.payload.clone().ok_or_else(|| {
            DriveError::Unknown("upload session is already complete".to_string())
        }),
        Err(err) => Err(err.clone()),
    }
}

/// Fill `buffer` unless the source ends first. Returns the bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
