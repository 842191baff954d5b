//! 共享连接池：一个 `reqwest::Client` + 全局连接上限 + 带 TTL 的 DNS 缓存。
//!
//! 同一次运行里所有章节、所有图片请求共用这个池，池本身可并发使用，无需外部加锁。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::header::{ACCEPT_ENCODING, CONNECTION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("bad status {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("connection pool closed")]
    PoolClosed,
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub max_connections: usize,
    pub dns_ttl: Duration,
    pub connect_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 100,
            dns_ttl: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub struct HttpPool {
    client: Client,
    connections: Semaphore,
    max_connections: usize,
}

impl HttpPool {
    pub fn new(options: PoolOptions) -> Result<Self, reqwest::Error> {
        // reqwest 未启用 gzip 解码，请求 identity 编码保证拿到的字节可直接落盘
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        default_headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let max_connections = options.max_connections.max(1);
        let client = Client::builder()
            .default_headers(default_headers)
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(options.connect_timeout)
            .dns_resolver(Arc::new(CachingResolver::new(options.dns_ttl)))
            .build()?;

        Ok(Self {
            client,
            connections: Semaphore::new(max_connections),
            max_connections,
        })
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// GET 并读完整个响应体；只有 200 视为成功。连接许可覆盖请求与读体全过程。
    pub async fn get_bytes(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<Vec<u8>, FetchError> {
        let _permit = self
            .connections
            .acquire()
            .await
            .map_err(|_| FetchError::PoolClosed)?;

        let resp = self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status {
                status: resp.status(),
                url: url.to_string(),
            });
        }
        let bytes = resp.bytes().await?;
        Ok(bytes.to_vec())
    }

    pub async fn get_text(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let bytes = self.get_bytes(url, headers, timeout).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

// ── DNS 缓存 ──────────────────────────────────────────────────

struct CachingResolver {
    inner: Arc<DnsCache>,
}

impl CachingResolver {
    fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DnsCache::new(ttl)),
        }
    }
}

struct DnsCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Vec<SocketAddr>)>>,
}

impl DnsCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lookup(&self, host: &str) -> Option<Vec<SocketAddr>> {
        let entries = self.entries.lock().ok()?;
        let (at, addrs) = entries.get(host)?;
        if at.elapsed() < self.ttl {
            Some(addrs.clone())
        } else {
            None
        }
    }

    fn store(&self, host: String, addrs: Vec<SocketAddr>) {
        if self.ttl.is_zero() || addrs.is_empty() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, (at, _)| at.elapsed() < self.ttl);
            entries.insert(host, (Instant::now(), addrs));
        }
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let cache = Arc::clone(&self.inner);
        let host = name.as_str().to_string();
        Box::pin(async move {
            if let Some(addrs) = cache.lookup(&host) {
                let addrs: Addrs = Box::new(addrs.into_iter());
                return Ok(addrs);
            }
            // 端口由 reqwest 按 URL 覆盖，这里填 0
            let resolved: Vec<SocketAddr> = match tokio::net::lookup_host((host.as_str(), 0)).await
            {
                Ok(iter) => iter.collect(),
                Err(err) => return Err(Box::new(err) as Box<dyn std::error::Error + Send + Sync>),
            };
            debug!(target: "fetch", host = %host, count = resolved.len(), "dns resolved");
            cache.store(host, resolved.clone());
            let addrs: Addrs = Box::new(resolved.into_iter());
            Ok(addrs)
        })
    }
}
