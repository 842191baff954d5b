//! 来源站点适配。
//!
//! 每个站点实现 [`SourceAdapter`]，把页面解析成统一的 `SeriesInfo` + `Vec<Chapter>`；
//! 下游的下载与打包不关心来源。新增站点只需实现 trait 并登记到 `PROVIDERS`。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::download::models::{Chapter, SeriesInfo};
use crate::download::pool::{FetchError, HttpPool};

pub mod flamecomics;
mod languages;
pub(crate) mod markup;
pub mod mangapill;

pub(crate) const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected page layout at {url}: {detail}")]
    Layout { url: String, detail: String },
}

impl SourceError {
    pub(crate) fn layout(url: &str, detail: impl Into<String>) -> Self {
        Self::Layout {
            url: url.to_string(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn domain(&self) -> &'static str;

    /// 作品的规范地址，写入断点续传缓存。
    fn url(&self) -> String;

    /// 请求页面与图片时附带的请求头。
    fn headers(&self) -> HeaderMap;

    async fn media_info(&self) -> Result<(SeriesInfo, Vec<Chapter>), SourceError>;
}

/// 站点共用的页面抓取句柄。
#[derive(Clone)]
pub struct SourceClient {
    pool: Arc<HttpPool>,
    timeout: Duration,
}

impl SourceClient {
    pub fn new(pool: Arc<HttpPool>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub(crate) async fn page(&self, url: &str, headers: &HeaderMap) -> Result<String, SourceError> {
        debug!(target: "source", url, "fetch page");
        Ok(self.pool.get_text(url, headers, self.timeout).await?)
    }

    /// 并发抓取多个页面（上限 `limit`），结果与输入一一对应、顺序不变。
    pub(crate) async fn pages(
        &self,
        urls: Vec<String>,
        headers: &HeaderMap,
        limit: usize,
    ) -> Vec<Result<String, SourceError>> {
        let slots = Arc::new(Semaphore::new(limit.max(1)));
        let headers = Arc::new(headers.clone());
        let handles: Vec<_> = urls
            .into_iter()
            .map(|url| {
                let client = self.clone();
                let slots = Arc::clone(&slots);
                let headers = Arc::clone(&headers);
                tokio::spawn(async move {
                    let _slot = slots
                        .acquire_owned()
                        .await
                        .map_err(|_| SourceError::Fetch(FetchError::PoolClosed))?;
                    client.page(&url, &headers).await
                })
            })
            .collect();

        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(match handle.await {
                Ok(result) => result,
                Err(err) => Err(SourceError::layout("", format!("page task failed: {err}"))),
            });
        }
        out
    }
}

type Constructor = fn(SourceClient, &str) -> Option<Box<dyn SourceAdapter>>;

const PROVIDERS: &[(&str, Constructor)] = &[
    (flamecomics::DOMAIN, flamecomics::FlameComics::boxed),
    (mangapill::DOMAIN, mangapill::Mangapill::boxed),
];

/// 按域名挑选第一个匹配的站点；地址里缺少作品 id 时同样返回 `None`。
pub fn parse_provider(client: SourceClient, url: &str) -> Option<Box<dyn SourceAdapter>> {
    PROVIDERS
        .iter()
        .find(|(domain, _)| url.contains(domain))
        .and_then(|(_, make)| make(client, url))
}

pub(crate) fn browser_headers(referer: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    headers.insert(reqwest::header::REFERER, HeaderValue::from_static(referer));
    headers
}
