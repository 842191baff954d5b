//! 单张图片下载：有限次重试 + 指数退避，失败时不留半截文件。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Url;
use reqwest::header::HeaderMap;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use super::pool::{FetchError, HttpPool};
use crate::base_system::context::{Config, safe_fs_name};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(10),
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.max_retries.max(1),
            timeout: cfg.request_timeout(),
            base_delay: cfg.retry_base_delay(),
        }
    }

    /// 第 `attempt` 次（从 1 开始）失败后、下一次尝试前的等待：`base * 2^attempt`。
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// 由 URL 最后一段路径得到本地文件名；取不到时用 URL 的 sha1。
pub fn asset_file_name(url: &str) -> String {
    let segment = Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut segs| segs.next_back().map(str::to_string))
            .filter(|s| !s.is_empty())
    });
    match segment {
        Some(name) => safe_fs_name(&name, "_", 200),
        None => {
            let digest = Sha1::digest(url.as_bytes());
            format!("{}.bin", hex::encode(digest))
        }
    }
}

/// 下载一张图片到 `target`。成功返回该路径；重试耗尽返回 `None`，由调用方记录缺页。
pub async fn fetch_asset(
    pool: &HttpPool,
    url: &str,
    target: &Path,
    headers: &HeaderMap,
    policy: &RetryPolicy,
) -> Option<PathBuf> {
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match fetch_once(pool, url, target, headers, policy.timeout).await {
            Ok(()) => {
                debug!(target: "fetch", url, attempt, "图片已保存");
                return Some(target.to_path_buf());
            }
            Err(err) if attempt < attempts => {
                let delay = policy.delay_after(attempt);
                debug!(target: "fetch", url, attempt, error = %err, ?delay, "下载失败，等待重试");
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                warn!(target: "fetch", "图片下载失败 {url}: {err}");
            }
        }
    }
    None
}

async fn fetch_once(
    pool: &HttpPool,
    url: &str,
    target: &Path,
    headers: &HeaderMap,
    timeout: Duration,
) -> Result<(), FetchError> {
    let bytes = pool.get_bytes(url, headers, timeout).await?;
    write_atomic(target, &bytes).await?;
    Ok(())
}

/// 先写同目录临时文件再 rename，失败时删除临时文件。
async fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = target.with_file_name(format!(".{file_name}.{seq}.part"));

    let result = async {
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, target).await
    }
    .await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}
