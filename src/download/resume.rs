//! 断点续传缓存（`manga.json`）：作品标题 → 源地址 + 已打包章节号集合。
//!
//! 运行开始时读一次；运行中只在内存里合并；运行结束时整体原子重写一次。

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::models::ChapterNumber;

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("resume cache {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("encode resume cache failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeEntry {
    pub url: String,
    #[serde(default)]
    pub cached: BTreeSet<ChapterNumber>,
}

#[derive(Debug)]
pub struct ResumeStore {
    path: PathBuf,
    entries: BTreeMap<String, ResumeEntry>,
    dirty: bool,
}

impl ResumeStore {
    /// 文件不存在视为空缓存；存在但无法解析时报错，由调用方决定中止还是重建。
    pub fn load(path: &Path) -> Result<Self, ResumeError> {
        let entries = match fs::read(path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| ResumeError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(ResumeError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        debug!(target: "resume", path = %path.display(), "loaded resume cache");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 自上次保存以来是否有过合并。
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<String, ResumeEntry> {
        &self.entries
    }

    pub fn get(&self, series: &str) -> Option<&ResumeEntry> {
        self.entries.get(series)
    }

    pub fn cached(&self, series: &str) -> BTreeSet<ChapterNumber> {
        self.entries
            .get(series)
            .map(|e| e.cached.clone())
            .unwrap_or_default()
    }

    /// 并入新完成的章节号（自动去重），并把地址更新为最新值。
    pub fn merge<I>(&mut self, series: &str, url: &str, chapters: I)
    where
        I: IntoIterator<Item = ChapterNumber>,
    {
        let entry = self.entries.entry(series.to_string()).or_default();
        entry.url = url.to_string();
        entry.cached.extend(chapters);
        self.dirty = true;
    }

    /// 整体重写：先写同目录临时文件，再原子替换。
    pub fn save(&mut self) -> Result<(), ResumeError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.entries.serialize(&mut ser)?;
        buf.push(b'\n');

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |source| ResumeError::Io {
            path: self.path.clone(),
            source,
        };
        fs::create_dir_all(&dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&buf).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        self.dirty = false;
        info!(target: "resume", path = %self.path.display(), series = self.entries.len(), "缓存已保存");
        Ok(())
    }

    pub fn save_if_dirty(&mut self) -> Result<(), ResumeError> {
        if !self.dirty {
            return Ok(());
        }
        self.save()
    }
}

/// 一次运行内共享的缓存句柄：编排器每完成一章就并入内存，退出钩子与运行结束时各保存一次。
pub type SharedResume = Arc<Mutex<ResumeStore>>;

#[derive(Clone)]
pub struct ResumeTracker {
    store: SharedResume,
    series: String,
    url: String,
}

impl ResumeTracker {
    pub fn new(store: SharedResume, series: &str, url: &str) -> Self {
        Self {
            store,
            series: series.to_string(),
            url: url.to_string(),
        }
    }

    pub fn record(&self, chapter: ChapterNumber) {
        if let Ok(mut store) = self.store.lock() {
            store.merge(&self.series, &self.url, [chapter]);
        }
    }
}
