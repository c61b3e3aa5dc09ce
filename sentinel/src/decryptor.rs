// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Streaming Decryptor
//!
//! Orchestrates the ciphertext file reader, the `tbenc/v1` codec, and the
//! pipe sink. Plaintext chunk buffers are zeroized immediately after the
//! sink write returns.

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroize;

use sentinel_domain::codec::{self, Header, HEADER_LEN, LEN_PREFIX_LEN, TAG_LEN};
use sentinel_domain::{DecryptionKey, Result, SentinelError};

use crate::pipe_sink::PipeSink;

pub type ProgressCallback = Box<dyn Fn(u64) + Send + Sync>;

pub struct DecryptRequest<'a> {
    pub ciphertext_path: &'a Path,
    pub key: &'a DecryptionKey,
    pub total_plaintext_size: Option<u64>,
    pub progress: Option<ProgressCallback>,
}

/// Outcome of a completed (or failed) streaming decryption.
pub struct DecryptOutcome {
    pub bytes_written: u64,
}

/// Drives the codec from `request.ciphertext_path` into `pipe`. The pipe
/// is opened for writing on a worker task so the calling task observes
/// cancellation even while the open blocks for a reader.
pub async fn decrypt_to_pipe(pipe: &PipeSink, request: DecryptRequest<'_>, cancel: CancellationToken) -> Result<DecryptOutcome> {
    pipe.ensure_pipe().await?;

    let mut ciphertext_file = tokio::fs::File::open(request.ciphertext_path).await?;
    let mut header_buf = [0u8; HEADER_LEN];
    ciphertext_file.read_exact(&mut header_buf).await?;
    let header = Header::parse(&header_buf)?;

    let mut writer = pipe.open_for_write(cancel.clone()).await?;

    let mut bytes_written = 0u64;
    let mut chunk_index = 0u64;
    let mut next_log_decile = 1u64;

    loop {
        if cancel.is_cancelled() {
            return Err(SentinelError::Cancelled);
        }

        let mut len_buf = [0u8; LEN_PREFIX_LEN];
        match ciphertext_file.read_exact(&mut len_buf).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(SentinelError::from(e)),
        }
        let pt_len = u32::from_be_bytes(len_buf);
        if pt_len == 0 || pt_len > header.chunk_bytes {
            return Err(SentinelError::invalid_format(format!(
                "chunk {chunk_index}: declared pt_len {pt_len} invalid for chunk_bytes {}",
                header.chunk_bytes
            )));
        }

        let mut body = vec![0u8; pt_len as usize + TAG_LEN];
        ciphertext_file.read_exact(&mut body).await?;

        let mut plaintext = codec::decrypt_chunk(request.key, &header, chunk_index, pt_len, &body)?;
        body.zeroize();

        writer.write_all(&plaintext).await?;
        bytes_written += plaintext.len() as u64;
        plaintext.zeroize();

        if let Some(cb) = request.progress.as_ref() {
            cb(bytes_written);
        }
        if let Some(total) = request.total_plaintext_size {
            if total > 0 {
                while next_log_decile <= 10 && bytes_written * 10 >= next_log_decile * total {
                    tracing::info!(percent = next_log_decile * 10, bytes_written, total, "decryption progress");
                    next_log_decile += 1;
                }
            }
        }

        chunk_index += 1;
    }

    writer.flush().await?;
    Ok(DecryptOutcome { bytes_written })
}
