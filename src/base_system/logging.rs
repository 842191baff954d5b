//! 日志系统：控制台 + `logs/latest.log`，退出时归档为 zip。
//!
//! 退出路径（Ctrl+C、主线程 panic、`LogSystem` 被 drop）只走一次：
//! 先执行退出钩子（写回断点缓存），再关闭文件日志并归档。
//! 工作线程里的 panic 会被 tokio 的 `JoinHandle` 收回，只记录，不触发退出。

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{io, panic, thread, time::Duration};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const LATEST_LOG: &str = "latest.log";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const DRAIN_WAIT: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: true,
            console: true,
        }
    }
}

pub struct LogSystem {
    shutdown: Arc<Shutdown>,
}

impl LogSystem {
    /// 日志目录为 `<base_dir>/logs`；上次遗留的超大 `latest.log` 先归档。
    pub fn init(options: LogOptions, base_dir: &Path) -> Result<Self, LogError> {
        let logs_dir = base_dir.join("logs");
        fs::create_dir_all(&logs_dir)?;
        let latest_log = logs_dir.join(LATEST_LOG);
        if fs::metadata(&latest_log).is_ok_and(|m| m.len() >= ROTATE_AT_BYTES) {
            archive_log_file(&latest_log, &logs_dir)?;
        }

        let (file_writer, guard) = non_blocking::NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&logs_dir, LATEST_LOG));

        let console_writer = if options.console {
            BoxMakeWriter::new(io::stderr)
        } else {
            BoxMakeWriter::new(io::sink)
        };
        let console_level = if options.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(options.use_color)
                    .with_writer(console_writer)
                    .with_filter(console_level),
            )
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_ansi(false)
                    .with_writer(file_writer)
                    .with_filter(LevelFilter::DEBUG),
            )
            .try_init()
            .map_err(|e| {
                if e.to_string().contains("already") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;

        let shutdown = Arc::new(Shutdown::new(logs_dir, Some(guard), options.archive_on_exit));
        shutdown.install_signal_handler();
        shutdown.install_panic_hook();
        Ok(Self { shutdown })
    }

    /// 注册退出钩子：Ctrl+C、主线程 panic 或正常退出时各执行一次（后注册先执行）。
    pub fn add_exit_hook<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shutdown.add_hook(func);
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.shutdown.run();
    }
}

type ExitHook = Box<dyn FnOnce() + Send + 'static>;

struct Shutdown {
    logs_dir: PathBuf,
    guard: Mutex<Option<WorkerGuard>>,
    hooks: Mutex<Vec<ExitHook>>,
    done: AtomicBool,
    archive: bool,
}

impl Shutdown {
    fn new(logs_dir: PathBuf, guard: Option<WorkerGuard>, archive: bool) -> Self {
        Self {
            logs_dir,
            guard: Mutex::new(guard),
            hooks: Mutex::new(Vec::new()),
            done: AtomicBool::new(false),
            archive,
        }
    }

    fn add_hook<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.push(Box::new(func));
        }
    }

    fn install_signal_handler(self: &Arc<Self>) {
        let shutdown = Arc::clone(self);
        let _ = ctrlc::set_handler(move || {
            eprintln!("\n收到中断信号，正在保存已完成的章节记录...");
            shutdown.run();
            std::process::exit(130);
        });
    }

    fn install_panic_hook(self: &Arc<Self>) {
        let shutdown = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            shutdown.on_panic(thread::current().name(), &info.to_string());
            previous(info);
        }));
    }

    /// 主线程 panic 之后进程即将结束，走退出流程；其余线程只记录。
    fn on_panic(&self, thread_name: Option<&str>, message: &str) {
        let thread_name = thread_name.unwrap_or("<unnamed>");
        error!(target: "startup", thread = thread_name, "panic: {message}");
        if thread_name == "main" {
            self.run();
        }
    }

    fn has_run(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }

        let hooks = self
            .hooks
            .lock()
            .map(|mut hooks| std::mem::take(&mut *hooks))
            .unwrap_or_default();
        for hook in hooks.into_iter().rev() {
            hook();
        }

        // 丢掉 guard 才会把缓冲区刷进 latest.log
        let flushed = self.guard.lock().ok().and_then(|mut g| g.take()).is_some();
        if flushed {
            thread::sleep(DRAIN_WAIT);
        }

        if self.archive
            && let Err(err) = archive_log_file(&self.logs_dir.join(LATEST_LOG), &self.logs_dir)
        {
            eprintln!("日志归档失败: {err}");
        }
    }
}

/// 把 `latest.log` 压进 `log_<时间戳>.zip` 并删除原文件；空日志直接删除。
fn archive_log_file(latest_log: &Path, logs_dir: &Path) -> Result<Option<PathBuf>, LogError> {
    let len = match fs::metadata(latest_log) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(None),
    };
    if len == 0 {
        let _ = fs::remove_file(latest_log);
        return Ok(None);
    }

    let stamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let archive_path = logs_dir.join(format!("log_{stamp}.zip"));

    let mut zip = zip::ZipWriter::new(File::create(&archive_path)?);
    zip.start_file(
        format!("{stamp}.log"),
        FileOptions::default().compression_method(CompressionMethod::Deflated),
    )?;
    io::copy(&mut File::open(latest_log)?, &mut zip)?;
    zip.finish()?;
    let _ = fs::remove_file(latest_log);

    info!(target: "startup", "日志已归档: {}", archive_path.display());
    Ok(Some(archive_path))
}
