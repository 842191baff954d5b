//! 无 UI 交互：标准输入输出上的提问与选择。

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

mod select;

pub use select::{choose_chapters, uncached};

/// 作品来源：从缓存里挑，或手动输入地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesChoice {
    Cached,
    Urls(Vec<String>),
}

pub fn choose_series() -> Result<SeriesChoice> {
    if confirm("是否从已缓存的作品中选择？", true)? {
        return Ok(SeriesChoice::Cached);
    }
    Ok(SeriesChoice::Urls(input_urls()?))
}

fn input_urls() -> Result<Vec<String>> {
    let mut urls = Vec::new();
    loop {
        let input = read_line("请输入作品链接：")?;
        let url = input.trim();
        if url.is_empty() {
            continue;
        }
        urls.push(url.to_string());
        if !confirm("是否继续添加？", false)? {
            return Ok(urls);
        }
    }
}

/// 首次运行时询问默认保存目录，并确保目录存在。
pub fn ask_save_path() -> Result<PathBuf> {
    loop {
        let input = read_line("请输入漫画默认保存路径：")?;
        let p = input.trim().trim_end_matches(['/', '\\']);
        if p.is_empty() {
            continue;
        }
        fs::create_dir_all(p).with_context(|| format!("创建目录失败: {}", p))?;
        return Ok(PathBuf::from(p));
    }
}

pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        let input = read_line(&format!("{prompt} {hint} "))?;
        match input.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => println!("请输入 y 或 n"),
        }
    }
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let stdin = io::stdin();
    let mut line = String::new();
    if stdin.lock().read_line(&mut line)? == 0 {
        bail!("标准输入已关闭");
    }
    Ok(line)
}
