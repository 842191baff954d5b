//! 下载相关的数据模型定义。
//!
//! 包含作品元数据、章节、章节号、运行报告、进度快照等核心数据结构。

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 章节号：可能带小数（如 12.5），同时作为断点续传的身份键。
///
/// 整数章节渲染为 `12` 而不是 `12.0`。
#[derive(Debug, Clone, Copy)]
pub struct ChapterNumber(f64);

impl ChapterNumber {
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() {
            // 0.0 + (-0.0) == 0.0，统一掉负零
            Some(Self(value + 0.0))
        } else {
            None
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_integral(self) -> bool {
        self.0.fract() == 0.0 && self.0.abs() < i64::MAX as f64
    }
}

impl From<u32> for ChapterNumber {
    fn from(value: u32) -> Self {
        Self(f64::from(value))
    }
}

impl PartialEq for ChapterNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ChapterNumber {}

impl PartialOrd for ChapterNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChapterNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for ChapterNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_integral() {
            write!(f, "{}", self.0 as i64)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for ChapterNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| format!("无效章节号: {trimmed}"))
    }
}

impl Serialize for ChapterNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_integral() {
            serializer.serialize_i64(self.0 as i64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for ChapterNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Self::new(raw).ok_or_else(|| serde::de::Error::custom("chapter number must be finite"))
    }
}

/// 作品元数据，由 Source Adapter 在一次运行中产出一次，之后只读。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesInfo {
    pub title: String,
    pub writers: Vec<String>,
    pub pencillers: Vec<String>,
    pub genres: Vec<String>,
    pub summary: Option<String>,
    pub language_iso: Option<String>,
    pub scan_information: Option<String>,
}

/// 一个章节：页面 URL 的顺序即页序，必须保持。
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub number: ChapterNumber,
    pub title: String,
    pub pages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAsset {
    pub chapter: ChapterNumber,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedChapter {
    pub chapter: ChapterNumber,
    pub reason: String,
}

/// 一次运行的汇总：成功打包的章节、整章失败的章节、最终缺失的图片。
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub completed: BTreeSet<ChapterNumber>,
    pub archives: Vec<PathBuf>,
    pub failed_chapters: Vec<FailedChapter>,
    pub missing_assets: Vec<MissingAsset>,
    pub peak_active_chapters: usize,
    pub peak_active_assets: usize,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failed_chapters.is_empty() && self.missing_assets.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub chapters_done: usize,
    pub chapters_total: usize,
    pub assets_failed: usize,
}
