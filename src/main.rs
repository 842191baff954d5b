//! Manga Downloader：把漫画章节下载并打包为带 ComicInfo.xml 的 CBZ。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/文件名清洗等基础设施
//! - `download`：连接池、图片下载、章节处理、多章节编排、断点续传缓存
//! - `packager`：ComicInfo.xml 生成与 CBZ 归档
//! - `sources`：各站点适配（FlameComics / Mangapill）
//! - `ui`：标准输入输出交互
//! - `app`：一次完整运行的流程

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tracing::{info, warn};

mod app;
mod base_system;
mod download;
mod packager;
mod sources;
mod ui;

use base_system::config::{config_path, load_or_create, write_with_comments};
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use download::resume::ResumeStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "manga-downloader")]
#[command(about = "Download your favourite manga as CBZ archives")]
struct Cli {
    /// 自动模式：更新缓存里的全部作品，只下载未下载过的章节
    #[arg(long, default_value_t = false)]
    auto: bool,

    /// 本次运行的保存目录（不写入配置）
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml、manga.json 和 logs）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Manga Downloader v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let log = init_logging(cli.debug, &data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    // 自动模式不做任何询问，配置文件必须事先存在
    if cli.auto && !config_path::<Config>(&data_dir).exists() {
        bail!("配置文件不存在: {}", config_path::<Config>(&data_dir).display());
    }
    let loaded = load_or_create::<Config>(&data_dir).map_err(|e| anyhow!(e.to_string()))?;
    let mut config = loaded.config;
    config.set_data_dir(&data_dir);

    let save_dir = match cli.save_dir.clone().or_else(|| config.default_save_dir()) {
        Some(dir) => dir,
        None if cli.auto => bail!("配置中没有保存路径 save_path"),
        None => {
            let dir = ui::noui::ask_save_path()?;
            config.save_path = dir.to_string_lossy().into_owned();
            write_with_comments(&config, &loaded.path).map_err(|e| anyhow!(e.to_string()))?;
            dir
        }
    };

    // 缓存损坏时在任何下载开始前中止
    let cache_path = config.cache_path();
    let store = ResumeStore::load(&cache_path)
        .with_context(|| format!("读取缓存失败: {}", cache_path.display()))?;
    let store = Arc::new(Mutex::new(store));
    register_resume_hook(&log, &store);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("创建 tokio 运行时失败")?;

    let opts = app::RunOptions {
        auto: cli.auto,
        save_dir,
    };
    let totals = app::run(&config, &opts, store, &rt)?;
    info!(
        target: "startup",
        series = totals.series,
        chapters = totals.chapters,
        failed = totals.failed_chapters,
        missing = totals.missing_assets,
        "运行结束"
    );
    Ok(())
}

/// 被中断时把已完成的章节写回缓存，下次运行可从断点继续。
fn register_resume_hook(log: &LogSystem, store: &download::resume::SharedResume) {
    let store = Arc::clone(store);
    log.add_exit_hook(move || {
        let Ok(mut guard) = store.lock() else {
            return;
        };
        if let Err(err) = guard.save_if_dirty() {
            warn!(target: "resume", "退出时保存缓存失败: {err}");
        }
    });
}

fn init_logging(debug: bool, base_dir: &Path) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: true,
    };
    LogSystem::init(opts, base_dir).map_err(|e| anyhow!(e))
}
