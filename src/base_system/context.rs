//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息，以及文件名清洗工具。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 路径配置
    #[serde(default)]
    pub save_path: String,
    #[serde(default = "default_cache_file")]
    pub cache_file: String,

    // 并发配置
    #[serde(default = "default_chapter_concurrency")]
    pub chapter_concurrency: usize,
    #[serde(default = "default_image_concurrency")]
    pub image_concurrency: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_dns_cache_ttl")]
    pub dns_cache_ttl: u64,

    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(skip)]
    data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_path: String::new(),
            cache_file: default_cache_file(),
            chapter_concurrency: default_chapter_concurrency(),
            image_concurrency: default_image_concurrency(),
            max_connections: default_max_connections(),
            dns_cache_ttl: default_dns_cache_ttl(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            data_dir: None,
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 9] = [
            FieldMeta {
                name: "save_path",
                description: "漫画保存路径（每部作品会在其下创建同名子目录）",
            },
            FieldMeta {
                name: "cache_file",
                description: "断点续传缓存文件名（相对数据目录）",
            },
            FieldMeta {
                name: "chapter_concurrency",
                description: "同时处理的最大章节数",
            },
            FieldMeta {
                name: "image_concurrency",
                description: "所有章节合计同时下载的最大图片数",
            },
            FieldMeta {
                name: "max_connections",
                description: "共享连接池的最大连接数",
            },
            FieldMeta {
                name: "dns_cache_ttl",
                description: "DNS 解析缓存时间（秒）",
            },
            FieldMeta {
                name: "request_timeout",
                description: "单次请求超时时间（秒）",
            },
            FieldMeta {
                name: "max_retries",
                description: "单张图片最大尝试次数",
            },
            FieldMeta {
                name: "retry_base_delay_ms",
                description: "重试退避基数（毫秒）, 第 n 次失败后等待 基数 * 2^n",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn default_save_dir(&self) -> Option<PathBuf> {
        let trimmed = self.save_path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }

    pub fn set_data_dir(&mut self, dir: &Path) {
        self.data_dir = Some(dir.to_path_buf());
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn cache_path(&self) -> PathBuf {
        let raw = Path::new(self.cache_file.trim());
        if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.data_dir().join(raw)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn dns_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dns_cache_ttl)
    }
}

const UNTITLED_SLUG: &str = "Untitled";

/// 作品目录/归档名使用的 slug：仅剔除 Windows 不允许的字符。
///
/// 结果为空或只剩 `.` 时会指向保存目录本身或其上级，改用占位名。
pub fn slugify(title: &str) -> String {
    let slug: String = title
        .chars()
        .filter(|ch| !matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();
    if slug.trim().trim_matches('.').is_empty() {
        return UNTITLED_SLUG.to_string();
    }
    slug
}

pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let fallback = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .chars()
        .map(|ch| match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => fallback,
            c if (c as u32) < 32 => fallback,
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let upper = cleaned.to_uppercase();
    if RESERVED.contains(&upper.as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符中间截断导致 panic
        let mut end = max_len;
        while !cleaned.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        cleaned.truncate(end);
        while cleaned.ends_with(' ') || cleaned.ends_with('.') {
            cleaned.pop();
        }
        if cleaned.is_empty() {
            cleaned.push_str("unnamed");
        }
    }

    cleaned
}

fn default_cache_file() -> String {
    "manga.json".to_string()
}

fn default_chapter_concurrency() -> usize {
    8
}

fn default_image_concurrency() -> usize {
    40
}

fn default_max_connections() -> usize {
    100
}

fn default_dns_cache_ttl() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_drops_forbidden_characters() {
        assert_eq!(slugify("Re:Zero? <Part/1>"), "ReZero Part1");
        assert_eq!(slugify("Solo Leveling"), "Solo Leveling");
    }

    #[test]
    fn slugify_never_escapes_the_save_dir() {
        for title in ["", "..", ".", " . ", "/?*", "../"] {
            assert_eq!(slugify(title), "Untitled", "title {title:?}");
        }
        assert_eq!(slugify("..hack"), "..hack");
    }

    #[test]
    fn safe_fs_name_replaces_and_trims() {
        assert_eq!(safe_fs_name("a/b:c. ", "_", 120), "a_b_c");
        assert_eq!(safe_fs_name("", "_", 120), "unnamed");
        assert_eq!(safe_fs_name("con", "_", 120), "_con");
    }

    #[test]
    fn safe_fs_name_truncates_on_char_boundary() {
        let name = "页".repeat(10);
        let out = safe_fs_name(&name, "_", 7);
        assert_eq!(out, "页页");
    }

    #[test]
    fn cache_path_is_relative_to_data_dir() {
        let mut cfg = Config::default();
        cfg.set_data_dir(Path::new("/tmp/data"));
        assert_eq!(cfg.cache_path(), PathBuf::from("/tmp/data/manga.json"));
        assert!(cfg.default_save_dir().is_none());
    }
}
