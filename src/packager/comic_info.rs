//! ComicInfo.xml 生成。
//!
//! 字段顺序固定，相同输入产出逐字节相同的文件，保证归档可复现。

use std::io;
use std::path::{Path, PathBuf};

use crate::download::models::{Chapter, SeriesInfo};

pub const COMIC_INFO_FILE: &str = "ComicInfo.xml";

pub fn render_comic_info(series: &SeriesInfo, chapter: &Chapter) -> String {
    let number = chapter.number.to_string();
    // PageCount 记的是请求的页数，不是最终下载成功的页数
    let page_count = chapter.pages.len().to_string();
    let writers = series.writers.join(",");
    let pencillers = series.pencillers.join(",");
    let genres = series.genres.join(",");

    let fields: [(&str, Option<&str>); 10] = [
        ("Series", Some(series.title.as_str())),
        ("Writer", Some(writers.as_str())),
        ("Penciller", Some(pencillers.as_str())),
        ("Genre", Some(genres.as_str())),
        ("Summary", series.summary.as_deref()),
        ("Number", Some(number.as_str())),
        ("Title", Some(chapter.title.as_str())),
        ("LanguageISO", series.language_iso.as_deref()),
        ("PageCount", Some(page_count.as_str())),
        ("ScanInformation", series.scan_information.as_deref()),
    ];

    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<ComicInfo>\n");
    for (name, value) in fields {
        match value.filter(|v| !v.is_empty()) {
            Some(text) => {
                out.push_str(&format!("\t<{name}>{}</{name}>\n", escape_xml(text)));
            }
            None => out.push_str(&format!("\t<{name} />\n")),
        }
    }
    out.push_str("</ComicInfo>\n");
    out
}

/// 写入 `dir/ComicInfo.xml` 并返回路径。
pub fn write_comic_info(series: &SeriesInfo, chapter: &Chapter, dir: &Path) -> io::Result<PathBuf> {
    let path = dir.join(COMIC_INFO_FILE);
    std::fs::write(&path, render_comic_info(series, chapter))?;
    Ok(path)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::ChapterNumber;

    fn series() -> SeriesInfo {
        SeriesInfo {
            title: "Tom & Jerry".to_string(),
            writers: vec!["A".to_string(), "B".to_string()],
            pencillers: vec![],
            genres: vec!["Action".to_string(), "Comedy".to_string()],
            summary: Some("<b>bold</b> summary".to_string()),
            language_iso: Some("en".to_string()),
            scan_information: Some("MangaPill".to_string()),
        }
    }

    fn chapter() -> Chapter {
        Chapter {
            number: ChapterNumber::new(12.0).unwrap(),
            title: "The Start".to_string(),
            pages: vec!["u1".into(), "u2".into(), "u3".into()],
        }
    }

    #[test]
    fn renders_fields_in_fixed_order() {
        let xml = render_comic_info(&series(), &chapter());
        let expected = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<ComicInfo>\n\
\t<Series>Tom &amp; Jerry</Series>\n\
\t<Writer>A,B</Writer>\n\
\t<Penciller />\n\
\t<Genre>Action,Comedy</Genre>\n\
\t<Summary>&lt;b&gt;bold&lt;/b&gt; summary</Summary>\n\
\t<Number>12</Number>\n\
\t<Title>The Start</Title>\n\
\t<LanguageISO>en</LanguageISO>\n\
\t<PageCount>3</PageCount>\n\
\t<ScanInformation>MangaPill</ScanInformation>\n\
</ComicInfo>\n";
        assert_eq!(xml, expected);
    }

    #[test]
    fn identical_input_gives_identical_output() {
        assert_eq!(
            render_comic_info(&series(), &chapter()),
            render_comic_info(&series(), &chapter())
        );
    }

    #[test]
    fn writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_comic_info(&series(), &chapter(), dir.path()).unwrap();
        assert_eq!(path, dir.path().join(COMIC_INFO_FILE));
        assert!(std::fs::read_to_string(path).unwrap().contains("<PageCount>3</PageCount>"));
    }
}
