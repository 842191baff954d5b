//! 章节选择：列出章节并解析 `all` / 回车 / `1-5,7,10.5` 形式的输入。

use std::collections::BTreeSet;

use anyhow::Result;

use crate::download::models::{Chapter, ChapterNumber};

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// 回车：所有未下载过的章节
    Uncached,
    All,
    /// 闭区间列表，单个章节号记为 `(n, n)`
    Ranges(Vec<(ChapterNumber, ChapterNumber)>),
}

pub fn parse_selection(input: &str) -> Result<Selection, String> {
    let text = input.trim();
    if text.is_empty() {
        return Ok(Selection::Uncached);
    }
    if text.eq_ignore_ascii_case("all") {
        return Ok(Selection::All);
    }

    let mut ranges = Vec::new();
    for token in text.split([',', '，', ' ']).map(str::trim).filter(|t| !t.is_empty()) {
        let range = match token.split_once('-') {
            Some((a, b)) => {
                let start: ChapterNumber = a.parse()?;
                let end: ChapterNumber = b.parse()?;
                if start <= end { (start, end) } else { (end, start) }
            }
            None => {
                let n: ChapterNumber = token.parse()?;
                (n, n)
            }
        };
        ranges.push(range);
    }
    Ok(Selection::Ranges(ranges))
}

/// 过滤掉已在缓存里的章节，顺序不变。
pub fn uncached(chapters: Vec<Chapter>, cached: &BTreeSet<ChapterNumber>) -> Vec<Chapter> {
    chapters
        .into_iter()
        .filter(|c| !cached.contains(&c.number))
        .collect()
}

pub fn apply(
    selection: &Selection,
    chapters: Vec<Chapter>,
    cached: &BTreeSet<ChapterNumber>,
) -> Vec<Chapter> {
    match selection {
        Selection::Uncached => uncached(chapters, cached),
        Selection::All => chapters,
        Selection::Ranges(ranges) => chapters
            .into_iter()
            .filter(|c| ranges.iter().any(|(lo, hi)| *lo <= c.number && c.number <= *hi))
            .collect(),
    }
}

/// 打印章节列表并读取选择；输入无法解析时重新询问。
pub fn choose_chapters(
    chapters: Vec<Chapter>,
    cached: &BTreeSet<ChapterNumber>,
) -> Result<Vec<Chapter>> {
    if chapters.is_empty() {
        return Ok(chapters);
    }

    println!("\n===== 章节列表 =====");
    for c in &chapters {
        let mark = if cached.contains(&c.number) { "  [已下载]" } else { "" };
        println!("{:>7}: {}{}", c.number.to_string(), c.title, mark);
    }
    let pending = chapters.iter().filter(|c| !cached.contains(&c.number)).count();

    loop {
        let input = super::read_line(&format!(
            "选择要下载的章节（回车=未下载的 {pending} 章 / all=全部 / 例如 1-5,7,10.5）："
        ))?;
        match parse_selection(&input) {
            Ok(selection) => return Ok(apply(&selection, chapters, cached)),
            Err(err) => println!("输入无效: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> ChapterNumber {
        ChapterNumber::new(v).unwrap()
    }

    fn chapters(numbers: &[f64]) -> Vec<Chapter> {
        numbers
            .iter()
            .map(|&n| Chapter {
                number: num(n),
                title: format!("Chapter {n}"),
                pages: Vec::new(),
            })
            .collect()
    }

    fn numbers(chapters: &[Chapter]) -> Vec<String> {
        chapters.iter().map(|c| c.number.to_string()).collect()
    }

    #[test]
    fn parses_keywords_and_ranges() {
        assert_eq!(parse_selection("  ").unwrap(), Selection::Uncached);
        assert_eq!(parse_selection("ALL").unwrap(), Selection::All);
        assert_eq!(
            parse_selection("5-1, 7,10.5").unwrap(),
            Selection::Ranges(vec![(num(1.0), num(5.0)), (num(7.0), num(7.0)), (num(10.5), num(10.5))])
        );
        assert!(parse_selection("1-x").is_err());
    }

    #[test]
    fn ranges_select_by_chapter_number() {
        let all = chapters(&[1.0, 1.5, 2.0, 6.0, 7.0, 10.5, 11.0]);
        let picked = apply(&parse_selection("1-2,10.5").unwrap(), all, &BTreeSet::new());
        assert_eq!(numbers(&picked), vec!["1", "1.5", "2", "10.5"]);
    }

    #[test]
    fn enter_skips_cached_chapters() {
        let cached: BTreeSet<_> = [num(1.0), num(2.0)].into_iter().collect();
        let all = chapters(&[1.0, 2.0, 3.0]);
        assert_eq!(numbers(&apply(&Selection::Uncached, all.clone(), &cached)), vec!["3"]);
        assert_eq!(numbers(&apply(&Selection::All, all, &cached)), vec!["1", "2", "3"]);
    }
}
