use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use log::{debug, warn};
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use super::error::GameError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const MAX_ATTEMPTS: u32 = 3;
pub(crate) const BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Progress callbacks are coalesced to at most one per interval (~4/s).
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Downloads a single artifact: streams to `<dest>.part`, hashes while
/// writing, verifies sha1, then renames into place. The destination never
/// holds unverified bytes.
pub struct ArtifactFetcher {
    client: reqwest::Client,
}

impl ArtifactFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .user_agent(concat!("launcher-daemon/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetches `url` into `dest`, returning the byte count written.
    ///
    /// Transient transport errors are retried with exponential backoff up
    /// to [`MAX_ATTEMPTS`]. A checksum mismatch is corruption, reported
    /// immediately and never retried. `on_progress(downloaded, total)` is
    /// invoked at a throttled cadence plus once with the final counts.
    pub async fn fetch<F>(
        &self,
        url: &str,
        expected_sha1: &str,
        dest: &Path,
        cancel: &AtomicBool,
        mut on_progress: F,
    ) -> Result<u64, GameError>
    where
        F: FnMut(u64, u64),
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .try_fetch(url, expected_sha1, dest, cancel, &mut on_progress, attempt)
                .await
            {
                Ok(written) => return Ok(written),
                Err(err @ GameError::Network { .. }) if attempt < MAX_ATTEMPTS => {
                    let backoff = BACKOFF_BASE * 2u32.pow(attempt - 1);
                    warn!(
                        "fetch attempt {}/{} for {} failed ({}), retrying in {:?}",
                        attempt, MAX_ATTEMPTS, url, err, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_fetch<F>(
        &self,
        url: &str,
        expected_sha1: &str,
        dest: &Path,
        cancel: &AtomicBool,
        on_progress: &mut F,
        attempt: u32,
    ) -> Result<u64, GameError>
    where
        F: FnMut(u64, u64),
    {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = part_path(dest);

        let net = |source: reqwest::Error| GameError::Network {
            attempts: attempt,
            source,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(net)?;
        let total = response.content_length().unwrap_or(0);

        let mut file = tokio::fs::File::create(&tmp).await?;
        let mut hasher = Sha1::new();
        let mut downloaded: u64 = 0;
        let mut last_emit = Instant::now() - PROGRESS_INTERVAL;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if cancel.load(Ordering::Relaxed) {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(GameError::Cancelled);
            }
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(source) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(net(source));
                }
            };
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if last_emit.elapsed() >= PROGRESS_INTERVAL {
                last_emit = Instant::now();
                on_progress(downloaded, total.max(downloaded));
            }
        }
        file.flush().await?;
        drop(file);

        let actual = format!("{:x}", hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected_sha1) {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(GameError::Integrity {
                url: url.to_string(),
                expected: expected_sha1.to_lowercase(),
                actual,
            });
        }

        tokio::fs::rename(&tmp, dest).await?;
        on_progress(downloaded, downloaded.max(total));
        debug!("fetched {} ({} bytes) -> {}", url, downloaded, dest.display());
        Ok(downloaded)
    }
}

impl Default for ArtifactFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".part");
    PathBuf::from(tmp)
}
