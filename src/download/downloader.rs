//! 下载主流程编排：章节级并发 + 全局图片级并发，两级信号量相互独立。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::HeaderMap;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{error, info, warn};

use super::chapter_worker::{ChapterContext, ChapterError, ChapterOutcome, process_chapter};
use super::fetcher::RetryPolicy;
use super::gauge::ActivityGauge;
use super::models::{Chapter, ChapterNumber, FailedChapter, MissingAsset, RunReport, SeriesInfo};
use super::pool::{HttpPool, PoolOptions};
use super::progress::{ProgressCallback, ProgressReporter, make_reporter};
use super::resume::ResumeTracker;
use crate::base_system::context::{Config, slugify};

type ChapterTasks = JoinSet<(ChapterNumber, Result<ChapterOutcome, ChapterError>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub chapters: usize,
    pub images: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            chapters: 8,
            images: 40,
        }
    }
}

impl Limits {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            chapters: cfg.chapter_concurrency.max(1),
            images: cfg.image_concurrency.max(1),
        }
    }
}

/// 单次运行的可选挂钩：UI 进度回调、断点续传记录、是否绘制进度条。
#[derive(Default)]
pub struct RunHooks {
    pub progress: Option<ProgressCallback>,
    pub resume: Option<ResumeTracker>,
    pub show_bar: bool,
}

pub struct Downloader {
    pool: Arc<HttpPool>,
    headers: Arc<HeaderMap>,
    limits: Limits,
    policy: RetryPolicy,
    staging_root: Option<PathBuf>,
}

pub fn pool_from_config(cfg: &Config) -> Result<HttpPool, reqwest::Error> {
    HttpPool::new(PoolOptions {
        max_connections: cfg.max_connections,
        dns_ttl: cfg.dns_cache_ttl(),
        connect_timeout: cfg.request_timeout(),
    })
}

impl Downloader {
    pub fn new(pool: Arc<HttpPool>, limits: Limits, policy: RetryPolicy) -> Self {
        Self {
            pool,
            headers: Arc::new(HeaderMap::new()),
            limits,
            policy,
            staging_root: None,
        }
    }

    pub fn from_config(pool: Arc<HttpPool>, cfg: &Config) -> Self {
        Self::new(pool, Limits::from_config(cfg), RetryPolicy::from_config(cfg))
    }

    /// 图片请求附带的请求头（UA、Referer 等由来源决定）。
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Arc::new(headers);
        self
    }

    /// 章节临时目录的父目录；默认使用系统临时目录。
    pub fn with_staging_root(mut self, root: PathBuf) -> Self {
        self.staging_root = Some(root);
        self
    }

    pub async fn run(&self, series: &SeriesInfo, chapters: Vec<Chapter>, dest: &Path) -> RunReport {
        self.run_with(series, chapters, dest, RunHooks::default())
            .await
    }

    pub async fn run_with(
        &self,
        series: &SeriesInfo,
        chapters: Vec<Chapter>,
        dest: &Path,
        hooks: RunHooks,
    ) -> RunReport {
        let mut report = RunReport::default();
        if chapters.is_empty() {
            info!(target: "download", series = %series.title, "没有新的章节");
            return report;
        }

        let total = chapters.len();
        info!(
            target: "download",
            series = %series.title,
            total,
            chapter_limit = self.limits.chapters,
            image_limit = self.limits.images,
            "开始下载"
        );

        let gauge = Arc::new(ActivityGauge::default());
        let ctx = ChapterContext {
            pool: Arc::clone(&self.pool),
            image_slots: Arc::new(Semaphore::new(self.limits.images.max(1))),
            headers: Arc::clone(&self.headers),
            policy: self.policy,
            gauge: Arc::clone(&gauge),
            staging_root: self.staging_root.clone(),
        };
        let chapter_slots = Arc::new(Semaphore::new(self.limits.chapters.max(1)));
        let series = Arc::new(series.clone());
        let slug: Arc<str> = Arc::from(slugify(&series.title));
        let dest: Arc<Path> = Arc::from(dest);

        let mut reporter = make_reporter(&series.title, total, hooks.progress, hooks.show_bar);
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();

        for chapter in chapters {
            let number = chapter.number;
            let slots = Arc::clone(&chapter_slots);
            let ctx = ctx.clone();
            let series = Arc::clone(&series);
            let slug = Arc::clone(&slug);
            let dest = Arc::clone(&dest);
            let handle = tasks.spawn(async move {
                let Ok(_slot) = slots.acquire_owned().await else {
                    return (number, Err(ChapterError::Worker("chapter limiter closed".into())));
                };
                // 内层再 spawn 一次，panic 时仍能知道是哪一章
                let worker = tokio::spawn(async move {
                    let _active = ctx.gauge.enter_chapter();
                    process_chapter(&ctx, &series, &slug, &chapter, &dest).await
                });
                let result = match worker.await {
                    Ok(result) => result,
                    Err(err) => Err(ChapterError::Worker(err.to_string())),
                };
                (number, result)
            });
            pending.insert(handle.id(), number);
        }

        collect_chapters(tasks, pending, &mut reporter, hooks.resume.as_ref(), &mut report).await;
        reporter.finish();

        report.archives.sort();
        report.failed_chapters.sort_by_key(|f| f.chapter);
        // 稳定排序，同一章节内保持页序
        report.missing_assets.sort_by_key(|m| m.chapter);
        report.peak_active_chapters = gauge.peak_chapters();
        report.peak_active_assets = gauge.peak_assets();

        info!(
            target: "download",
            series = %series.title,
            "下载完成：成功 {} 章，失败 {} 章，缺页 {} 张",
            report.completed.len(),
            report.failed_chapters.len(),
            report.missing_assets.len()
        );
        report
    }
}

/// 逐个收回章节任务并记入报告，每收回一个推进一次进度。
async fn collect_chapters(
    mut tasks: ChapterTasks,
    pending: HashMap<task::Id, ChapterNumber>,
    reporter: &mut ProgressReporter,
    resume: Option<&ResumeTracker>,
    report: &mut RunReport,
) {
    while let Some(joined) = tasks.join_next_with_id().await {
        let (number, result) = match joined {
            Ok((_, pair)) => pair,
            Err(err) => {
                let Some(&number) = pending.get(&err.id()) else {
                    error!(target: "download", "章节任务异常退出: {err}");
                    reporter.inc_chapter();
                    continue;
                };
                (number, Err(ChapterError::Worker(err.to_string())))
            }
        };
        match result {
            Ok(outcome) => {
                for url in &outcome.missing {
                    warn!(target: "download", chapter = %number, "缺失图片 {url}");
                    report.missing_assets.push(MissingAsset {
                        chapter: number,
                        url: url.clone(),
                    });
                }
                reporter.add_failed_assets(outcome.missing.len());
                if let Some(tracker) = resume {
                    tracker.record(number);
                }
                report.completed.insert(number);
                report.archives.push(outcome.archive);
            }
            Err(err) => {
                error!(target: "download", chapter = %number, "章节处理失败: {err}");
                report.failed_chapters.push(FailedChapter {
                    chapter: number,
                    reason: err.to_string(),
                });
            }
        }
        reporter.inc_chapter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::{ChapterNumber, ProgressSnapshot};
    use crate::download::resume::ResumeStore;
    use std::collections::BTreeSet;
    use std::io::Read;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(10),
        }
    }

    fn downloader(limits: Limits, staging: &Path) -> Downloader {
        let pool = Arc::new(HttpPool::new(PoolOptions::default()).unwrap());
        Downloader::new(pool, limits, fast_policy()).with_staging_root(staging.to_path_buf())
    }

    fn series() -> SeriesInfo {
        SeriesInfo {
            title: "Foo: Bar?".to_string(),
            ..SeriesInfo::default()
        }
    }

    fn chapter(server: &MockServer, number: f64, pages: usize) -> Chapter {
        Chapter {
            number: ChapterNumber::new(number).unwrap(),
            title: format!("Chapter {number}"),
            pages: (1..=pages)
                .map(|i| format!("{}/c{number}/{i:03}.jpg", server.uri()))
                .collect(),
        }
    }

    async fn serve_images(server: &MockServer, delay: Duration) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/c[0-9.]+/[0-9]{3}\.jpg$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"img".to_vec())
                    .set_delay(delay),
            )
            .mount(server)
            .await;
    }

    fn zip_entries(archive: &Path) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(std::fs::File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn archive_names(dir: &Path) -> BTreeSet<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn empty_selection_is_a_no_op() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let report = downloader(Limits::default(), staging.path())
            .run(&series(), Vec::new(), out.path())
            .await;
        assert!(report.completed.is_empty());
        assert!(report.is_clean());
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn partial_failure_keeps_successful_pages() {
        let server = MockServer::start().await;
        let failing = [3usize, 6, 9];
        for i in failing {
            Mock::given(method("GET"))
                .and(path(format!("/c1/{i:03}.jpg")))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
        }
        serve_images(&server, Duration::ZERO).await;

        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let ch = chapter(&server, 1.0, 10);
        let report = downloader(Limits::default(), staging.path())
            .run(&series(), vec![ch.clone()], out.path())
            .await;

        assert_eq!(report.completed.len(), 1);
        assert!(report.failed_chapters.is_empty());
        let missing: Vec<_> = report.missing_assets.iter().map(|m| m.url.clone()).collect();
        let expected: Vec<_> = failing.iter().map(|i| ch.pages[i - 1].clone()).collect();
        assert_eq!(missing, expected);

        let archive = out.path().join("Foo Bar").join("Foo Bar Ch.1.cbz");
        assert_eq!(report.archives, vec![archive.clone()]);
        let entries = zip_entries(&archive);
        assert_eq!(entries.len(), 1 + 7);
        assert_eq!(entries[0], "ComicInfo.xml");
        assert!(!entries.contains(&"003.jpg".to_string()));

        // PageCount 记录请求页数
        let mut zip = zip::ZipArchive::new(std::fs::File::open(&archive).unwrap()).unwrap();
        let mut xml = String::new();
        zip.by_name("ComicInfo.xml").unwrap().read_to_string(&mut xml).unwrap();
        assert!(xml.contains("<PageCount>10</PageCount>"));

        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_limits() {
        let server = MockServer::start().await;
        serve_images(&server, Duration::from_millis(40)).await;

        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let chapters = (1..=5).map(|n| chapter(&server, n as f64, 6)).collect();
        let limits = Limits {
            chapters: 2,
            images: 3,
        };
        let report = downloader(limits, staging.path())
            .run(&series(), chapters, out.path())
            .await;

        assert_eq!(report.completed.len(), 5);
        assert!(report.is_clean());
        assert!(report.peak_active_chapters >= 1 && report.peak_active_chapters <= 2);
        assert!(report.peak_active_assets >= 1 && report.peak_active_assets <= 3);
    }

    #[tokio::test]
    async fn rerun_is_idempotent_and_resume_skips_everything() {
        let server = MockServer::start().await;
        serve_images(&server, Duration::ZERO).await;

        let data = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let store = Arc::new(Mutex::new(
            ResumeStore::load(&data.path().join("manga.json")).unwrap(),
        ));
        let chapters = vec![chapter(&server, 1.0, 2), chapter(&server, 2.5, 2)];
        let dl = downloader(Limits::default(), staging.path());

        let progress = Arc::new(Mutex::new(Vec::<ProgressSnapshot>::new()));
        let sink = Arc::clone(&progress);
        let hooks = RunHooks {
            progress: Some(Box::new(move |s| sink.lock().unwrap().push(s))),
            resume: Some(ResumeTracker::new(Arc::clone(&store), "Foo: Bar?", "https://x/foo")),
            show_bar: false,
        };
        let first = dl.run_with(&series(), chapters.clone(), out.path(), hooks).await;
        let first_names = archive_names(&out.path().join("Foo Bar"));
        assert_eq!(
            first_names,
            BTreeSet::from(["Foo Bar Ch.1.cbz".to_string(), "Foo Bar Ch.2.5.cbz".to_string()])
        );
        assert_eq!(first.completed.len(), 2);
        let last = *progress.lock().unwrap().last().unwrap();
        assert_eq!((last.chapters_done, last.chapters_total), (2, 2));

        dl.run(&series(), chapters.clone(), out.path()).await;
        assert_eq!(archive_names(&out.path().join("Foo Bar")), first_names);

        // 写盘后重新读取，下一次运行默认不选任何章节
        store.lock().unwrap().save().unwrap();
        let reloaded = ResumeStore::load(&data.path().join("manga.json")).unwrap();
        assert_eq!(reloaded.get("Foo: Bar?").unwrap().url, "https://x/foo");
        let cached = reloaded.cached("Foo: Bar?");
        let pending: Vec<_> = chapters
            .into_iter()
            .filter(|c| !cached.contains(&c.number))
            .collect();
        assert!(pending.is_empty());

        let second = dl.run(&series(), pending, out.path()).await;
        assert!(second.completed.is_empty());
        assert!(second.archives.is_empty());
        assert_eq!(archive_names(&out.path().join("Foo Bar")), first_names);
    }

    async fn crashing_chapter() -> (ChapterNumber, Result<ChapterOutcome, ChapterError>) {
        panic!("chapter task lost")
    }

    #[tokio::test]
    async fn crashed_chapter_task_is_reported_and_counted() {
        let mut tasks: ChapterTasks = JoinSet::new();
        let mut pending = HashMap::new();
        let crashed = tasks.spawn(crashing_chapter());
        pending.insert(crashed.id(), ChapterNumber::from(4));
        let failed = tasks.spawn(async {
            (ChapterNumber::from(5), Err(ChapterError::Worker("manifest".into())))
        });
        pending.insert(failed.id(), ChapterNumber::from(5));

        let mut reporter = make_reporter("Foo", 2, None, false);
        let mut report = RunReport::default();
        collect_chapters(tasks, pending, &mut reporter, None, &mut report).await;

        let mut failed: Vec<_> = report.failed_chapters.iter().map(|f| f.chapter).collect();
        failed.sort();
        assert_eq!(failed, vec![ChapterNumber::from(4), ChapterNumber::from(5)]);
        assert!(report.completed.is_empty());
        assert_eq!(reporter.snapshot.chapters_done, 2);
    }
}
