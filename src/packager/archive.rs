//! CBZ 归档：`<save_dir>/<slug>/<slug> Ch.<n>.cbz`，条目全部平铺在根目录。

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::download::models::ChapterNumber;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("file has no usable name: {0}")]
    InvalidEntry(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PackError + '_ {
    move |source| PackError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn archive_name(slug: &str, number: ChapterNumber) -> String {
    format!("{slug} Ch.{number}.cbz")
}

/// 把 `files` 写进 `<save_dir>/<slug>/<slug> Ch.<n>.cbz`，已存在的同名归档会被覆盖。
///
/// 先写到同目录的临时文件再替换，中途失败不会留下损坏的归档。
pub fn pack(
    slug: &str,
    number: ChapterNumber,
    files: &[PathBuf],
    save_dir: &Path,
) -> Result<PathBuf, PackError> {
    let series_dir = save_dir.join(slug);
    fs::create_dir_all(&series_dir).map_err(io_err(&series_dir))?;
    let target = series_dir.join(archive_name(slug, number));

    let tmp = tempfile::Builder::new()
        .prefix(".cbz-")
        .suffix(".part")
        .tempfile_in(&series_dir)
        .map_err(io_err(&series_dir))?;

    {
        let mut zip = ZipWriter::new(BufWriter::new(tmp.as_file()));
        // 固定时间戳与权限，相同输入得到相同字节
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        let mut seen = HashSet::new();
        for file in files {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| PackError::InvalidEntry(file.clone()))?;
            if !seen.insert(name.to_string()) {
                warn!(target: "packager", entry = name, "重复的文件名，已跳过");
                continue;
            }
            zip.start_file(name, options)?;
            let mut source = File::open(file).map_err(io_err(file))?;
            io::copy(&mut source, &mut zip).map_err(io_err(file))?;
        }
        let mut writer = zip.finish()?;
        io::Write::flush(&mut writer).map_err(io_err(&target))?;
    }

    tmp.persist(&target)
        .map_err(|e| PackError::Io {
            path: target.clone(),
            source: e.error,
        })?;
    debug!(target: "packager", archive = %target.display(), entries = files.len(), "归档完成");
    Ok(target)
}
