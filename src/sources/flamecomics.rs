//! FlameComics（flamecomics.xyz）：Next.js 站点，作品与章节数据都在 `__NEXT_DATA__` 里。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, info};

use super::languages::iso_639_1;
use super::markup::{inner_text, next_page_props};
use super::{SourceAdapter, SourceClient, SourceError, browser_headers};
use crate::download::models::{Chapter, ChapterNumber, SeriesInfo};

pub const DOMAIN: &str = "flamecomics.xyz";
const SITE_URL: &str = "https://flamecomics.xyz";
const CDN_URL: &str = "https://cdn.flamecomics.xyz";
const SCAN_INFORMATION: &str = "Reaper_Scans & Flame Comics";

fn re_series_id() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"series/(\d+)").unwrap())
}

pub struct FlameComics {
    client: SourceClient,
    id: String,
}

impl FlameComics {
    pub fn new(client: SourceClient, url: &str) -> Option<Self> {
        let id = re_series_id().captures(url)?.get(1)?.as_str().to_string();
        Some(Self { client, id })
    }

    pub(crate) fn boxed(client: SourceClient, url: &str) -> Option<Box<dyn SourceAdapter>> {
        Self::new(client, url).map(|s| Box::new(s) as Box<dyn SourceAdapter>)
    }

    fn chapter_url(&self, token: &str) -> String {
        format!("{SITE_URL}/series/{}/{token}", self.id)
    }

    fn image_url(&self, token: &str, file: &str) -> String {
        format!("{CDN_URL}/uploads/images/series/{}/{token}/{file}", self.id)
    }
}

#[async_trait]
impl SourceAdapter for FlameComics {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn url(&self) -> String {
        format!("{SITE_URL}/series/{}", self.id)
    }

    fn headers(&self) -> HeaderMap {
        browser_headers("https://flamecomics.xyz/")
    }

    async fn media_info(&self) -> Result<(SeriesInfo, Vec<Chapter>), SourceError> {
        let url = self.url();
        let headers = self.headers();
        let html = self.client.page(&url, &headers).await?;
        let props = next_page_props(&html)
            .ok_or_else(|| SourceError::layout(&url, "missing __NEXT_DATA__"))?;
        let series = props
            .get("series")
            .ok_or_else(|| SourceError::layout(&url, "missing series"))?;
        let info = parse_series(series);

        let entries = props
            .get("chapters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        info!(target: "source", series = %info.title, chapters = entries.len(), "读取 FlameComics 作品信息");

        let mut chapters = Vec::with_capacity(entries.len());
        for entry in &entries {
            let Some(listed) = parse_chapter_entry(entry) else {
                debug!(target: "source", ?entry, "跳过无法识别的章节条目");
                continue;
            };
            let page_url = self.chapter_url(&listed.token);
            let page = self.client.page(&page_url, &headers).await?;
            let chapter = next_page_props(&page)
                .and_then(|mut p| p.get_mut("chapter").map(Value::take))
                .ok_or_else(|| SourceError::layout(&page_url, "missing chapter payload"))?;
            let token = chapter
                .get("token")
                .and_then(Value::as_str)
                .unwrap_or(listed.token.as_str())
                .to_string();
            let pages = image_names(chapter.get("images"))
                .into_iter()
                // 第一张是站点横幅
                .skip(1)
                .map(|name| self.image_url(&token, &name))
                .collect();
            chapters.push(Chapter {
                number: listed.number,
                title: listed.title,
                pages,
            });
        }
        Ok((info, chapters))
    }
}

// ── 解析 ──────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct ListedChapter {
    number: ChapterNumber,
    title: String,
    token: String,
}

fn parse_series(series: &Value) -> SeriesInfo {
    SeriesInfo {
        title: str_field(series, "title").unwrap_or_default(),
        writers: string_list(series.get("author")),
        pencillers: string_list(series.get("artist")),
        genres: string_list(series.get("tags")),
        summary: str_field(series, "description")
            .map(|d| inner_text(&d))
            .filter(|d| !d.is_empty()),
        language_iso: str_field(series, "language")
            .and_then(|l| iso_639_1(&l))
            .map(str::to_string),
        scan_information: Some(SCAN_INFORMATION.to_string()),
    }
}

/// 章节号按整数截断；标题为空时用 `Chapter <n>`。
fn parse_chapter_entry(entry: &Value) -> Option<ListedChapter> {
    let raw = match entry.get("chapter") {
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok()?,
        _ => 0.0,
    };
    let number = ChapterNumber::new(raw.trunc())?;
    let token = entry.get("token").and_then(Value::as_str)?.to_string();
    let title = str_field(entry, "title")
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("Chapter {number}"));
    Some(ListedChapter {
        number,
        title,
        token,
    })
}

/// `images` 是以序号为键的对象（偶尔是数组），按序号数值排序后取 `name`。
fn image_names(images: Option<&Value>) -> Vec<String> {
    let mut keyed: Vec<(Option<u64>, String, &Value)> = match images {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.parse::<u64>().ok(), k.clone(), v))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (Some(i as u64), i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    };
    // 数字键在前，按数值；其余按字符串
    keyed.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });
    keyed
        .into_iter()
        .filter_map(|(_, _, v)| v.get("name").and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(|s| s.trim().to_string())
}

/// 字段可能是字符串，也可能是字符串数组。
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::pool::{HttpPool, PoolOptions};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter() -> FlameComics {
        let pool = Arc::new(HttpPool::new(PoolOptions::default()).unwrap());
        FlameComics::new(SourceClient::new(pool, Duration::from_secs(5)), "https://flamecomics.xyz/series/42").unwrap()
    }

    #[test]
    fn series_fields_are_normalised() {
        let info = parse_series(&json!({
            "title": " Omniscient Reader ",
            "author": "sing N song",
            "artist": ["Sleepy-C"],
            "tags": ["Action", "Fantasy"],
            "description": "<p>The world&#39;s <b>end</b></p>",
            "language": "Korean"
        }));
        assert_eq!(info.title, "Omniscient Reader");
        assert_eq!(info.writers, vec!["sing N song"]);
        assert_eq!(info.pencillers, vec!["Sleepy-C"]);
        assert_eq!(info.genres, vec!["Action", "Fantasy"]);
        assert_eq!(info.summary.as_deref(), Some("The world's end"));
        assert_eq!(info.language_iso.as_deref(), Some("ko"));
        assert_eq!(info.scan_information.as_deref(), Some(SCAN_INFORMATION));
    }

    #[test]
    fn chapter_numbers_are_truncated_and_titles_defaulted() {
        let listed = parse_chapter_entry(&json!({"chapter": "12.50", "title": "", "token": "abc"})).unwrap();
        assert_eq!(listed.number, ChapterNumber::from(12));
        assert_eq!(listed.title, "Chapter 12");
        assert_eq!(listed.token, "abc");
        assert!(parse_chapter_entry(&json!({"chapter": 3})).is_none());
    }

    #[test]
    fn images_sorted_numerically() {
        let names = image_names(Some(&json!({
            "10": {"name": "k.jpg"},
            "2": {"name": "c.jpg"},
            "0": {"name": "banner.jpg"},
            "1": {"name": "b.jpg"}
        })));
        assert_eq!(names, vec!["banner.jpg", "b.jpg", "c.jpg", "k.jpg"]);
    }

    #[test]
    fn urls_follow_site_layout() {
        let a = adapter();
        assert_eq!(a.url(), "https://flamecomics.xyz/series/42");
        assert_eq!(a.chapter_url("tok"), "https://flamecomics.xyz/series/42/tok");
        assert_eq!(
            a.image_url("tok", "001.webp"),
            "https://cdn.flamecomics.xyz/uploads/images/series/42/tok/001.webp"
        );
    }
}
