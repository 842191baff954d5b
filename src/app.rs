//! 一次完整运行：选作品 → 拉目录 → 选章节 → 下载打包 → 汇总 → 写回缓存。

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, MutexGuard};
use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

use crate::base_system::context::Config;
use crate::download::downloader::{Downloader, RunHooks, pool_from_config};
use crate::download::models::{ChapterNumber, RunReport};
use crate::download::resume::{ResumeStore, ResumeTracker, SharedResume};
use crate::sources::{SourceClient, parse_provider};
use crate::ui::noui::{self, SeriesChoice};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub auto: bool,
    pub save_dir: PathBuf,
}

/// 所有作品处理完后的总计。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunTotals {
    pub series: usize,
    pub chapters: usize,
    pub failed_chapters: usize,
    pub missing_assets: usize,
}

pub fn run(cfg: &Config, opts: &RunOptions, store: SharedResume, rt: &Runtime) -> Result<RunTotals> {
    let urls = series_urls(opts.auto, &store)?;
    if urls.is_empty() {
        println!("没有需要处理的作品。");
        return Ok(RunTotals::default());
    }

    let pool = Arc::new(pool_from_config(cfg).map_err(|e| anyhow!("初始化 HTTP 客户端失败: {e}"))?);
    let client = SourceClient::new(Arc::clone(&pool), cfg.request_timeout());
    let mut totals = RunTotals::default();

    for url in urls {
        let Some(adapter) = parse_provider(client.clone(), &url) else {
            warn!(target: "startup", "无法解析的链接: {url}");
            println!("无法解析: {url}");
            continue;
        };

        let started = Instant::now();
        println!("\n正在获取作品信息: {}", adapter.url());
        let (info, chapters) = match rt.block_on(adapter.media_info()) {
            Ok(v) => v,
            Err(err) => {
                error!(target: "source", url = %adapter.url(), "获取作品信息失败: {err}");
                println!("获取作品信息失败: {err}\n");
                continue;
            }
        };
        println!("作品: {} | 章节数: {}", info.title, chapters.len());

        let cached = lock(&store)?.cached(&info.title);
        let selected = if opts.auto {
            noui::uncached(chapters, &cached)
        } else {
            noui::choose_chapters(chapters, &cached)?
        };

        let canonical = adapter.url();
        let downloader = Downloader::from_config(Arc::clone(&pool), cfg).with_headers(adapter.headers());
        let hooks = RunHooks {
            progress: None,
            resume: Some(ResumeTracker::new(Arc::clone(&store), &info.title, &canonical)),
            show_bar: true,
        };
        let report = rt.block_on(downloader.run_with(&info, selected, &opts.save_dir, hooks));
        print_summary(&info.title, &report, started);

        persist_series(&store, &info.title, &canonical, &report.completed)?;

        totals.series += 1;
        totals.chapters += report.completed.len();
        totals.failed_chapters += report.failed_chapters.len();
        totals.missing_assets += report.missing_assets.len();
    }

    info!(target: "download", ?totals, "全部作品处理完成");
    Ok(totals)
}

/// 自动模式与“从缓存选择”都取缓存里的全部作品；缓存为空时报错。
fn series_urls(auto: bool, store: &SharedResume) -> Result<Vec<String>> {
    let choice = if auto {
        SeriesChoice::Cached
    } else {
        noui::choose_series()?
    };
    match choice {
        SeriesChoice::Cached => {
            let guard = lock(store)?;
            if guard.is_empty() {
                bail!("缓存为空: {}", guard.path().display());
            }
            Ok(guard.entries().values().map(|e| e.url.clone()).collect())
        }
        SeriesChoice::Urls(urls) => Ok(urls),
    }
}

/// 合并本作品新完成的章节并写盘。写盘失败不影响后续作品，缓存保持未保存状态，退出钩子会再写一次。
fn persist_series(
    store: &SharedResume,
    title: &str,
    url: &str,
    completed: &BTreeSet<ChapterNumber>,
) -> Result<()> {
    let mut guard = lock(store)?;
    guard.merge(title, url, completed.iter().copied());
    if let Err(err) = guard.save() {
        error!(target: "resume", series = title, "保存缓存失败: {err}");
        println!("保存缓存失败: {err}（退出时会再次尝试）");
    }
    Ok(())
}

fn lock(store: &SharedResume) -> Result<MutexGuard<'_, ResumeStore>> {
    store.lock().map_err(|_| anyhow!("缓存状态已损坏"))
}

fn print_summary(title: &str, report: &RunReport, started: Instant) {
    if report.completed.is_empty() && report.failed_chapters.is_empty() {
        println!("{title}: 没有新的章节\n");
        return;
    }
    println!(
        "\n{title}: 完成 {} 章，失败 {} 章，缺页 {} 张，用时 {:.1}s",
        report.completed.len(),
        report.failed_chapters.len(),
        report.missing_assets.len(),
        started.elapsed().as_secs_f64()
    );
    for failed in &report.failed_chapters {
        println!("  失败 Ch.{}: {}", failed.chapter, failed.reason);
    }
    for missing in &report.missing_assets {
        println!("  缺页 Ch.{}: {}", missing.chapter, missing.url);
    }
    println!();
}
