//! 单章节处理：临时目录 → ComicInfo.xml → 并发拉图（受全局图片上限约束）→ 打包。
//!
//! 临时目录由 `TempDir` 持有，无论成功、失败还是 panic 都会随之删除。

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::HeaderMap;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::fetcher::{RetryPolicy, asset_file_name, fetch_asset};
use super::gauge::ActivityGauge;
use super::models::{Chapter, ChapterNumber, SeriesInfo};
use super::pool::HttpPool;
use crate::packager::comic_info::COMIC_INFO_FILE;
use crate::packager::{self, PackError};

#[derive(Debug, Error)]
pub enum ChapterError {
    #[error("create staging area failed: {0}")]
    Staging(#[source] io::Error),
    #[error("write ComicInfo.xml failed: {0}")]
    Manifest(#[source] io::Error),
    #[error(transparent)]
    Package(#[from] PackError),
    #[error("chapter task failed: {0}")]
    Worker(String),
}

/// 同一次运行里所有章节共享的资源。
#[derive(Clone)]
pub(crate) struct ChapterContext {
    pub(crate) pool: Arc<HttpPool>,
    pub(crate) image_slots: Arc<Semaphore>,
    pub(crate) headers: Arc<HeaderMap>,
    pub(crate) policy: RetryPolicy,
    pub(crate) gauge: Arc<ActivityGauge>,
    pub(crate) staging_root: Option<PathBuf>,
}

#[derive(Debug)]
pub(crate) struct ChapterOutcome {
    pub(crate) archive: PathBuf,
    /// 重试耗尽后仍缺失的图片，按页序排列
    pub(crate) missing: Vec<String>,
}

pub(crate) async fn process_chapter(
    ctx: &ChapterContext,
    series: &SeriesInfo,
    slug: &str,
    chapter: &Chapter,
    dest: &Path,
) -> Result<ChapterOutcome, ChapterError> {
    let staging = create_staging(ctx.staging_root.as_deref(), chapter.number)?;
    let manifest = packager::write_comic_info(series, chapter, staging.path())
        .map_err(ChapterError::Manifest)?;

    let handles: Vec<_> = chapter
        .pages
        .iter()
        .zip(staged_names(&chapter.pages))
        .map(|(url, name)| {
            let pool = Arc::clone(&ctx.pool);
            let slots = Arc::clone(&ctx.image_slots);
            let headers = Arc::clone(&ctx.headers);
            let gauge = Arc::clone(&ctx.gauge);
            let policy = ctx.policy;
            let url = url.clone();
            let target = staging.path().join(name);
            tokio::spawn(async move {
                // 许可只覆盖这一张图的全部尝试
                let _slot = slots.acquire_owned().await.ok()?;
                let _active = gauge.enter_asset();
                fetch_asset(&pool, &url, &target, &headers, &policy).await
            })
        })
        .collect();

    let mut files = vec![manifest];
    let mut missing = Vec::new();
    for (url, handle) in chapter.pages.iter().zip(handles) {
        match handle.await {
            Ok(Some(path)) => files.push(path),
            Ok(None) => missing.push(url.clone()),
            Err(err) => {
                warn!(target: "download", chapter = %chapter.number, "图片任务异常 {url}: {err}");
                missing.push(url.clone());
            }
        }
    }
    debug!(
        target: "download",
        chapter = %chapter.number,
        fetched = files.len() - 1,
        requested = chapter.pages.len(),
        "章节图片下载结束"
    );

    let slug = slug.to_string();
    let number = chapter.number;
    let dest = dest.to_path_buf();
    let archive = tokio::task::spawn_blocking(move || packager::pack(&slug, number, &files, &dest))
        .await
        .map_err(|err| ChapterError::Worker(err.to_string()))??;

    drop(staging);
    Ok(ChapterOutcome { archive, missing })
}

/// 每页在临时目录里的文件名。沿用 URL 里的原名，与前面的页或清单重名时加 `<页序>_` 前缀。
fn staged_names(pages: &[String]) -> Vec<String> {
    let mut taken = HashSet::from([COMIC_INFO_FILE.to_string()]);
    pages
        .iter()
        .enumerate()
        .map(|(index, url)| {
            let original = asset_file_name(url);
            let mut name = original.clone();
            let mut round = 0;
            while !taken.insert(name.clone()) {
                round += 1;
                name = match round {
                    1 => format!("{:03}_{original}", index + 1),
                    _ => format!("{:03}_{round}_{original}", index + 1),
                };
            }
            name
        })
        .collect()
}

fn create_staging(
    root: Option<&Path>,
    number: ChapterNumber,
) -> Result<tempfile::TempDir, ChapterError> {
    let prefix = format!("manga_ch_{number}_");
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix);
    match root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .map_err(ChapterError::Staging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::pool::PoolOptions;
    use std::io::Read;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(staging_root: Option<PathBuf>) -> ChapterContext {
        ChapterContext {
            pool: Arc::new(HttpPool::new(PoolOptions::default()).unwrap()),
            image_slots: Arc::new(Semaphore::new(4)),
            headers: Arc::new(HeaderMap::new()),
            policy: RetryPolicy {
                max_attempts: 2,
                timeout: Duration::from_secs(5),
                base_delay: Duration::from_millis(10),
            },
            gauge: Arc::new(ActivityGauge::default()),
            staging_root,
        }
    }

    fn series() -> SeriesInfo {
        SeriesInfo {
            title: "Foo".to_string(),
            ..SeriesInfo::default()
        }
    }

    fn entry_names(archive: &Path) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(std::fs::File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[tokio::test]
    async fn chapter_without_any_asset_is_still_packaged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let staging_root = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let chapter = Chapter {
            number: ChapterNumber::from(7),
            title: "Seven".to_string(),
            pages: vec![format!("{}/a.jpg", server.uri()), format!("{}/b.jpg", server.uri())],
        };

        let outcome = process_chapter(
            &context(Some(staging_root.path().to_path_buf())),
            &series(),
            "Foo",
            &chapter,
            out.path(),
        )
        .await
        .unwrap();

        assert_eq!(entry_names(&outcome.archive), vec!["ComicInfo.xml"]);
        assert_eq!(outcome.missing, chapter.pages);
        // 临时目录已删除
        assert_eq!(std::fs::read_dir(staging_root.path()).unwrap().count(), 0);

        let mut zip = zip::ZipArchive::new(std::fs::File::open(&outcome.archive).unwrap()).unwrap();
        let mut xml = String::new();
        zip.by_name("ComicInfo.xml").unwrap().read_to_string(&mut xml).unwrap();
        assert!(xml.contains("<PageCount>2</PageCount>"));
    }

    #[tokio::test]
    async fn pages_keep_their_original_names() {
        let server = MockServer::start().await;
        for name in ["001.jpg", "002.png"] {
            Mock::given(method("GET"))
                .and(path(format!("/ch/{name}")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(name.as_bytes().to_vec()))
                .mount(&server)
                .await;
        }

        let out = tempfile::tempdir().unwrap();
        let chapter = Chapter {
            number: ChapterNumber::new(1.5).unwrap(),
            title: String::new(),
            pages: vec![
                format!("{}/ch/001.jpg", server.uri()),
                format!("{}/ch/002.png", server.uri()),
            ],
        };
        let outcome = process_chapter(&context(None), &series(), "Foo", &chapter, out.path())
            .await
            .unwrap();

        assert!(outcome.missing.is_empty());
        assert_eq!(outcome.archive, out.path().join("Foo").join("Foo Ch.1.5.cbz"));
        assert_eq!(
            entry_names(&outcome.archive),
            vec!["ComicInfo.xml", "001.jpg", "002.png"]
        );
    }

    #[test]
    fn colliding_names_get_page_prefix() {
        let pages: Vec<String> = [
            "https://cdn.example.com/a/1.jpg",
            "https://cdn.example.com/b/1.jpg",
            "https://cdn.example.com/c/2.jpg",
            "https://cdn.example.com/x/ComicInfo.xml",
            "https://cdn.example.com/d/002_1.jpg",
            "https://cdn.example.com/e/1.jpg",
        ]
        .map(String::from)
        .to_vec();
        assert_eq!(
            staged_names(&pages),
            vec!["1.jpg", "002_1.jpg", "2.jpg", "004_ComicInfo.xml", "005_002_1.jpg", "006_1.jpg"]
        );
    }

    #[tokio::test]
    async fn same_file_name_in_two_folders_keeps_both_pages() {
        let server = MockServer::start().await;
        for (dir, body) in [("a", "AAA"), ("b", "BBB")] {
            Mock::given(method("GET"))
                .and(path(format!("/{dir}/1.jpg")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(body.as_bytes().to_vec()))
                .mount(&server)
                .await;
        }

        let out = tempfile::tempdir().unwrap();
        let chapter = Chapter {
            number: ChapterNumber::from(3),
            title: String::new(),
            pages: vec![
                format!("{}/a/1.jpg", server.uri()),
                format!("{}/b/1.jpg", server.uri()),
            ],
        };
        let outcome = process_chapter(&context(None), &series(), "Foo", &chapter, out.path())
            .await
            .unwrap();

        assert!(outcome.missing.is_empty());
        assert_eq!(
            entry_names(&outcome.archive),
            vec!["ComicInfo.xml", "1.jpg", "002_1.jpg"]
        );
        let mut zip = zip::ZipArchive::new(std::fs::File::open(&outcome.archive).unwrap()).unwrap();
        for (name, body) in [("1.jpg", "AAA"), ("002_1.jpg", "BBB")] {
            let mut text = String::new();
            zip.by_name(name).unwrap().read_to_string(&mut text).unwrap();
            assert_eq!(text, body);
        }
    }

    #[tokio::test]
    async fn missing_staging_root_fails_only_this_chapter() {
        let root = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let chapter = Chapter {
            number: ChapterNumber::from(1),
            title: String::new(),
            pages: vec![],
        };
        let err = process_chapter(
            &context(Some(root.path().join("does-not-exist"))),
            &series(),
            "Foo",
            &chapter,
            out.path(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChapterError::Staging(_)));
        assert!(!out.path().join("Foo").exists());
    }
}
