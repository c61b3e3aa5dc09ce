// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Downloader
//!
//! Concurrent range-based fetch of the encrypted weights blob from the
//! object store, with retry/backoff and whole-file integrity verification.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use sentinel_domain::{Result, SentinelError};

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 32;
pub const MIN_CHUNK_SIZE: u64 = 1024;
pub const MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub concurrency: usize,
    pub chunk_size: u64,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            chunk_size: 8 * 1024 * 1024,
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl DownloaderConfig {
    /// Clamps every field into its valid range.
    pub fn clamped(mut self) -> Self {
        self.concurrency = self.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        self.chunk_size = self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }
}

/// How a failed request should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Transient,
    SasExpired,
    Terminal,
}

/// Classifies an HTTP status code per the downloader's retry policy.
pub fn classify_status(status: u16) -> RetryClass {
    match status {
        401 | 403 => RetryClass::SasExpired,
        404 | 400 => RetryClass::Terminal,
        429 | 500 | 502 | 503 | 504 => RetryClass::Transient,
        _ => RetryClass::Terminal,
    }
}

/// One contiguous half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Tiles `[0, total)` into contiguous ranges of `chunk_size`, the final
/// range possibly smaller; ranges never gap or overlap.
pub fn partition_ranges(total: u64, chunk_size: u64) -> Vec<ByteRange> {
    if total == 0 {
        return Vec::new();
    }
    let mut ranges = Vec::with_capacity((total / chunk_size.max(1) + 1) as usize);
    let mut start = 0u64;
    while start < total {
        let end = (start + chunk_size).min(total);
        ranges.push(ByteRange { start, end });
        start = end;
    }
    ranges
}

/// Computes the exponential backoff duration for `attempt` (0-indexed),
/// doubling from `initial` and capped at `max`, with the supplied
/// `jitter_unit` in `[-0.1, 0.1]` applied.
pub fn backoff_for_attempt(attempt: u32, initial: Duration, max: Duration, jitter_unit: f64) -> Duration {
    let base = initial.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX)).min(max);
    let jitter = 1.0 + jitter_unit.clamp(-0.1, 0.1);
    Duration::from_secs_f64((base.as_secs_f64() * jitter).max(0.0))
}

fn random_jitter_unit() -> f64 {
    use rand::Rng;
    rand::thread_rng().gen_range(-0.1..=0.1)
}

pub struct Downloader {
    client: reqwest::Client,
    config: DownloaderConfig,
}

impl Downloader {
    pub fn new(config: DownloaderConfig) -> Result<Self> {
        let config = config.clamped();
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SentinelError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Downloads `url` to `dest_path`, verifying the result's SHA-256
    /// against `expected_sha256_hex`. Returns the number of bytes written.
    pub async fn download(
        &self,
        url: &str,
        dest_path: &Path,
        expected_sha256_hex: &str,
        cancel: CancellationToken,
    ) -> Result<u64> {
        let probe = self.probe_range_support(url).await?;

        let bytes_written = match probe {
            Some(total) if total > self.config.chunk_size => {
                self.download_concurrent(url, dest_path, total, cancel.clone()).await?
            }
            _ => self.download_single_stream(url, dest_path, cancel.clone()).await?,
        };

        if cancel.is_cancelled() {
            return Err(SentinelError::Cancelled);
        }

        self.verify_integrity(dest_path, expected_sha256_hex).await?;
        Ok(bytes_written)
    }

    /// HEAD-probes for byte-range support; falls back to a 1-byte `Range`
    /// GET when HEAD is inconclusive.
    async fn probe_range_support(&self, url: &str) -> Result<Option<u64>> {
        if let Ok(resp) = self.client.head(url).send().await {
            if resp.status().is_success() {
                let accepts_ranges = resp
                    .headers()
                    .get(reqwest::header::ACCEPT_RANGES)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.eq_ignore_ascii_case("bytes"))
                    .unwrap_or(false);
                let content_length = resp.content_length();
                if accepts_ranges {
                    if let Some(len) = content_length {
                        return Ok(Some(len));
                    }
                }
            }
        }

        let probe = self
            .client
            .get(url)
            .header(reqwest::header::RANGE, "bytes=0-0")
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if probe.status().as_u16() == 206 {
            if let Some(total) = parse_content_range_total(probe.headers()) {
                return Ok(Some(total));
            }
        }
        Ok(None)
    }

    async fn download_concurrent(&self, url: &str, dest_path: &Path, total: u64, cancel: CancellationToken) -> Result<u64> {
        let file = tokio::fs::File::create(dest_path).await?;
        file.set_len(total).await?;
        drop(file);

        let ranges = partition_ranges(total, self.config.chunk_size);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let dest_path = Arc::new(dest_path.to_path_buf());
        let worker_cancel = cancel.child_token();

        let mut tasks = Vec::with_capacity(ranges.len());
        for range in ranges {
            let permit_sem = semaphore.clone();
            let client = self.client.clone();
            let url = url.to_string();
            let dest_path = dest_path.clone();
            let max_retries = self.config.max_retries;
            let initial_backoff = self.config.initial_backoff;
            let max_backoff = self.config.max_backoff;
            let token = worker_cancel.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = permit_sem.acquire_owned().await.expect("semaphore not closed");
                fetch_range_with_retry(&client, &url, &dest_path, range, max_retries, initial_backoff, max_backoff, &token).await
            }));
        }

        let mut first_error: Option<SentinelError> = None;
        let mut total_written = 0u64;
        for task in tasks {
            match task.await {
                Ok(Ok(written)) => total_written += written,
                Ok(Err(e)) => {
                    worker_cancel.cancel();
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    worker_cancel.cancel();
                    if first_error.is_none() {
                        first_error = Some(SentinelError::internal(format!("download worker panicked: {join_err}")));
                    }
                }
            }
        }

        if let Some(e) = first_error {
            let _ = tokio::fs::remove_file(dest_path.as_path()).await;
            return Err(e);
        }
        Ok(total_written)
    }

    async fn download_single_stream(&self, url: &str, dest_path: &Path, cancel: CancellationToken) -> Result<u64> {
        let resp = self.client.get(url).send().await.map_err(|e| classify_reqwest_error(&e))?;
        if !resp.status().is_success() {
            return Err(status_to_error(resp.status().as_u16(), "GET"));
        }

        let mut file = tokio::fs::File::create(dest_path).await?;
        let mut written = 0u64;
        let mut stream = resp.bytes_stream();
        use futures::StreamExt;
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(SentinelError::Cancelled);
            }
            let chunk = chunk.map_err(|e| classify_reqwest_error(&e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn verify_integrity(&self, path: &Path, expected_sha256_hex: &str) -> Result<()> {
        let actual = hash_file(path).await?;
        if !actual.eq_ignore_ascii_case(expected_sha256_hex) {
            let _ = tokio::fs::remove_file(path).await;
            return Err(SentinelError::HashMismatch {
                expected: expected_sha256_hex.to_string(),
                actual,
            });
        }
        Ok(())
    }
}

async fn fetch_range_with_retry(
    client: &reqwest::Client,
    url: &str,
    dest_path: &Path,
    range: ByteRange,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(SentinelError::Cancelled);
        }
        match fetch_range_once(client, url, dest_path, range).await {
            Ok(written) => return Ok(written),
            Err(e) if e.is_recoverable() && attempt < max_retries => {
                let delay = backoff_for_attempt(attempt, initial_backoff, max_backoff, random_jitter_unit());
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(SentinelError::Cancelled),
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fetch_range_once(client: &reqwest::Client, url: &str, dest_path: &Path, range: ByteRange) -> Result<u64> {
    let header_value = format!("bytes={}-{}", range.start, range.end.saturating_sub(1));
    let resp = client
        .get(url)
        .header(reqwest::header::RANGE, header_value)
        .send()
        .await
        .map_err(|e| classify_reqwest_error(&e))?;

    let status = resp.status().as_u16();
    if status != 206 && status != 200 {
        return Err(status_to_error(status, "range GET"));
    }

    let bytes = resp.bytes().await.map_err(|e| classify_reqwest_error(&e))?;
    let mut file = tokio::fs::OpenOptions::new().write(true).open(dest_path).await?;
    file.seek(SeekFrom::Start(range.start)).await?;
    file.write_all(&bytes).await?;
    Ok(bytes.len() as u64)
}

async fn hash_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String> {
        use std::io::Read;
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 1024 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| SentinelError::internal(format!("hash task panicked: {e}")))?
}

fn classify_reqwest_error(e: &reqwest::Error) -> SentinelError {
    if let Some(status) = e.status() {
        status_to_error(status.as_u16(), "request")
    } else {
        SentinelError::RangeTransient(redact_url(&e.to_string()))
    }
}

fn status_to_error(status: u16, context: &str) -> SentinelError {
    match classify_status(status) {
        RetryClass::Transient => SentinelError::RangeTransient(format!("{context} returned HTTP {status}")),
        RetryClass::SasExpired => SentinelError::SasExpired(format!("{context} returned HTTP {status}")),
        RetryClass::Terminal => SentinelError::DownloadTerminal(format!("{context} returned HTTP {status}")),
    }
}

/// Replaces a URL's query string with `[REDACTED]` before it is logged or
/// embedded in an error.
pub fn redact_url(text: &str) -> String {
    if let Some(idx) = text.find('?') {
        let mut redacted = text[..idx].to_string();
        redacted.push_str("?[REDACTED]");
        redacted
    } else {
        text.to_string()
    }
}

fn parse_content_range_total(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::CONTENT_RANGE)?.to_str().ok()?;
    let total_part = value.rsplit('/').next()?;
    total_part.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_tile_with_no_gaps_or_overlaps() {
        for total in [0u64, 1, 1023, 1024, 2500, 1_000_000] {
            for chunk_size in [1u64, 1000, 1024] {
                let ranges = partition_ranges(total, chunk_size);
                let mut covered = 0u64;
                for window in ranges.windows(2) {
                    assert_eq!(window[0].end, window[1].start, "gap or overlap between ranges");
                }
                for r in &ranges {
                    covered += r.len();
                }
                assert_eq!(covered, total);
            }
        }
    }

    #[test]
    fn partition_respects_chunk_size_scenario() {
        let ranges = partition_ranges(1_048_576, 256 * 1024);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0], ByteRange { start: 0, end: 262144 });
        assert_eq!(ranges[3], ByteRange { start: 786432, end: 1048576 });
    }

    #[test]
    fn classifies_status_codes_into_retry_classes() {
        assert_eq!(classify_status(401), RetryClass::SasExpired);
        assert_eq!(classify_status(403), RetryClass::SasExpired);
        assert_eq!(classify_status(404), RetryClass::Terminal);
        assert_eq!(classify_status(400), RetryClass::Terminal);
        assert_eq!(classify_status(429), RetryClass::Transient);
        assert_eq!(classify_status(500), RetryClass::Transient);
        assert_eq!(classify_status(503), RetryClass::Transient);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let initial = Duration::from_secs(1);
        let max = Duration::from_secs(30);
        assert_eq!(backoff_for_attempt(0, initial, max, 0.0), Duration::from_secs(1));
        assert_eq!(backoff_for_attempt(1, initial, max, 0.0), Duration::from_secs(2));
        assert_eq!(backoff_for_attempt(2, initial, max, 0.0), Duration::from_secs(4));
        assert_eq!(backoff_for_attempt(10, initial, max, 0.0), max);
    }

    #[test]
    fn backoff_jitter_stays_within_ten_percent() {
        let initial = Duration::from_secs(10);
        let max = Duration::from_secs(30);
        let low = backoff_for_attempt(0, initial, max, -0.1);
        let high = backoff_for_attempt(0, initial, max, 0.1);
        assert!(low.as_secs_f64() >= 9.0 && low.as_secs_f64() <= 9.01);
        assert!(high.as_secs_f64() >= 10.99 && high.as_secs_f64() <= 11.0);
    }

    #[test]
    fn config_clamps_out_of_range_values() {
        let config = DownloaderConfig {
            concurrency: 0,
            chunk_size: 1,
            ..Default::default()
        }
        .clamped();
        assert_eq!(config.concurrency, MIN_CONCURRENCY);
        assert_eq!(config.chunk_size, MIN_CHUNK_SIZE);

        let config = DownloaderConfig {
            concurrency: 1000,
            chunk_size: u64::MAX,
            ..Default::default()
        }
        .clamped();
        assert_eq!(config.concurrency, MAX_CONCURRENCY);
        assert_eq!(config.chunk_size, MAX_CHUNK_SIZE);
    }

    #[test]
    fn redacts_query_string_from_urls() {
        assert_eq!(redact_url("https://store.example.com/a?sig=topsecret"), "https://store.example.com/a?[REDACTED]");
        assert_eq!(redact_url("https://store.example.com/a"), "https://store.example.com/a");
    }

    #[tokio::test]
    async fn verify_integrity_deletes_file_on_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ciphertext.bin");
        tokio::fs::write(&path, b"some bytes").await.unwrap();

        let downloader = Downloader::new(DownloaderConfig::default()).unwrap();
        let result = downloader.verify_integrity(&path, &"0".repeat(64)).await;

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn verify_integrity_passes_on_matching_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ciphertext.bin");
        tokio::fs::write(&path, b"hello world").await.unwrap();
        let expected = hex::encode(Sha256::digest(b"hello world"));

        let downloader = Downloader::new(DownloaderConfig::default()).unwrap();
        let result = downloader.verify_integrity(&path, &expected).await;

        assert!(result.is_ok());
        assert!(path.exists());
    }
}
