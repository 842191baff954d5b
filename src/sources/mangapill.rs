//! Mangapill（mangapill.com）：服务端渲染页面，章节图片在各章节页的 `img.js-page` 上。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tracing::{info, warn};

use super::markup::{attr_value, elements, has_classes, text_lines, void_tags};
use super::{SourceAdapter, SourceClient, SourceError, browser_headers};
use crate::download::models::{Chapter, ChapterNumber, SeriesInfo};

pub const DOMAIN: &str = "mangapill.com";
const BASE_URL: &str = "https://mangapill.com";
const SCAN_INFORMATION: &str = "MangaPill";
const CHAPTER_PAGE_CONCURRENCY: usize = 25;

fn re_manga_id() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"manga/(\d+)").unwrap())
}

fn re_chapter_number() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)Chapter\s*([\d.]+)").unwrap())
}

pub struct Mangapill {
    client: SourceClient,
    id: String,
    base: String,
}

impl Mangapill {
    pub fn new(client: SourceClient, url: &str) -> Option<Self> {
        let id = re_manga_id().captures(url)?.get(1)?.as_str().to_string();
        Some(Self {
            client,
            id,
            base: BASE_URL.to_string(),
        })
    }

    pub(crate) fn boxed(client: SourceClient, url: &str) -> Option<Box<dyn SourceAdapter>> {
        Self::new(client, url).map(|s| Box::new(s) as Box<dyn SourceAdapter>)
    }

    fn info_url(&self) -> String {
        format!("{}/manga/{}", self.base, self.id)
    }
}

#[async_trait]
impl SourceAdapter for Mangapill {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn url(&self) -> String {
        format!("{BASE_URL}/manga/{}", self.id)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = browser_headers("https://mangapill.com/");
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers
    }

    async fn media_info(&self) -> Result<(SeriesInfo, Vec<Chapter>), SourceError> {
        let headers = self.headers();
        let html = self.client.page(&self.info_url(), &headers).await?;
        let info = parse_info(&html);
        let listed = parse_chapter_links(&html);
        info!(target: "source", series = %info.title, chapters = listed.len(), "读取 Mangapill 作品信息");

        let urls = listed
            .iter()
            .map(|(href, _, _)| format!("{}{href}", self.base))
            .collect();
        let pages = self
            .client
            .pages(urls, &headers, CHAPTER_PAGE_CONCURRENCY)
            .await;

        let mut chapters: Vec<Chapter> = listed
            .into_iter()
            .zip(pages)
            .map(|((href, title, number), page)| {
                let pages = match page {
                    Ok(html) => page_images(&html),
                    Err(err) => {
                        // 单章页面失败按无图处理，不影响其他章节
                        warn!(target: "source", chapter = %number, "章节页面获取失败 {href}: {err}");
                        Vec::new()
                    }
                };
                Chapter {
                    number,
                    title,
                    pages,
                }
            })
            .collect();
        chapters.sort_by_key(|c| c.number);
        Ok((info, chapters))
    }
}

// ── 解析 ──────────────────────────────────────────────────────

fn parse_info(html: &str) -> SeriesInfo {
    let title = elements(html, "h1")
        .into_iter()
        .find(|e| e.has_classes(&["font-bold"]))
        .map(|e| e.text())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Unknown Title".to_string());

    let summary = elements(html, "p")
        .into_iter()
        .find(|e| e.has_classes(&["text-sm", "text--secondary"]))
        .and_then(|e| description(e.inner));

    let genres = elements(html, "a")
        .into_iter()
        .filter(|a| {
            a.attr("href")
                .is_some_and(|h| h.starts_with("/search?genre="))
        })
        .map(|a| a.text())
        .filter(|g| !g.is_empty())
        .collect();

    SeriesInfo {
        title,
        genres,
        summary,
        scan_information: Some(SCAN_INFORMATION.to_string()),
        ..SeriesInfo::default()
    }
}

/// 简介段落前面常带别名列表，用 `<br><br>` 分隔；正文从第一行 "The " 开头处算起。
fn description(inner: &str) -> Option<String> {
    let body = match inner.split_once("<br><br>") {
        Some((_, rest)) => rest,
        None => inner,
    };
    let mut lines = text_lines(body);
    if let Some(start) = lines.iter().position(|l| l.starts_with("The ")) {
        lines.drain(..start);
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n\n"))
    }
}

/// `#chapters` 区域里指向 `/chapters/` 的链接：(href, 标题, 章节号)。
fn parse_chapter_links(html: &str) -> Vec<(String, String, ChapterNumber)> {
    let section = match html.find("id=\"chapters\"").or_else(|| html.find("id='chapters'")) {
        Some(pos) => &html[pos..],
        None => return Vec::new(),
    };
    let links: Vec<(String, String)> = elements(section, "a")
        .into_iter()
        .filter_map(|a| {
            let href = a.attr("href")?;
            href.starts_with("/chapters/").then(|| (href, a.text()))
        })
        .collect();

    let total = links.len();
    links
        .into_iter()
        .enumerate()
        .map(|(i, (href, title))| {
            // 列表按新到旧排列，解析不出章节号时用倒序下标
            let number = re_chapter_number()
                .captures(&title)
                .and_then(|c| c.get(1)?.as_str().parse::<f64>().ok())
                .and_then(ChapterNumber::new)
                .unwrap_or_else(|| ChapterNumber::from((total - i) as u32));
            (href, title, number)
        })
        .collect()
}

fn page_images(html: &str) -> Vec<String> {
    void_tags(html, "img")
        .into_iter()
        .filter(|attrs| has_classes(attrs, &["js-page"]))
        .filter_map(|attrs| {
            attr_value(attrs, "data-src")
                .filter(|s| !s.is_empty())
                .or_else(|| attr_value(attrs, "src"))
        })
        .filter(|s| !s.is_empty())
        .collect()
}
