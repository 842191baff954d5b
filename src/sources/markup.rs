//! 页面文本处理工具：基于正则的轻量抽取，不引入 DOM 解析。

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

// 编译一次复用的正则缓存
fn re_next_data() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r#"(?is)<script\b[^>]*\bid\s*=\s*["']__NEXT_DATA__["'][^>]*>(.*?)</script>"#)
            .unwrap()
    })
}

fn re_all_tags() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?is)<[^>]+>").unwrap())
}

fn re_br() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").unwrap())
}

fn re_attr() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r#"(?is)([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .unwrap()
    })
}

// ── 元素抽取 ────────────────────────────────────────────────────

/// 一个成对元素：开始标签里的属性串 + 内部 HTML。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Element<'a> {
    pub(crate) attrs: &'a str,
    pub(crate) inner: &'a str,
}

impl Element<'_> {
    pub(crate) fn attr(&self, name: &str) -> Option<String> {
        attr_value(self.attrs, name)
    }

    pub(crate) fn has_classes(&self, classes: &[&str]) -> bool {
        has_classes(self.attrs, classes)
    }

    pub(crate) fn text(&self) -> String {
        inner_text(self.inner)
    }
}

/// 找出所有 `<tag ...>...</tag>`（不处理同名嵌套）。
pub(crate) fn elements<'a>(html: &'a str, tag: &str) -> Vec<Element<'a>> {
    let pattern = format!(r"(?is)<{tag}\b([^>]*)>(.*?)</{tag}\s*>");
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures_iter(html)
        .filter_map(|c| {
            Some(Element {
                attrs: c.get(1)?.as_str(),
                inner: c.get(2)?.as_str(),
            })
        })
        .collect()
}

/// 找出所有无需闭合的 `<tag ...>`（如 img），返回属性串。
pub(crate) fn void_tags<'a>(html: &'a str, tag: &str) -> Vec<&'a str> {
    let pattern = format!(r"(?is)<{tag}\b([^>]*?)/?>");
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

pub(crate) fn attr_value(attrs: &str, name: &str) -> Option<String> {
    re_attr().captures_iter(attrs).find_map(|c| {
        let key = c.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        let raw = c.get(2).or_else(|| c.get(3)).or_else(|| c.get(4))?.as_str();
        Some(unescape_basic_entities(raw).into_owned())
    })
}

pub(crate) fn has_classes(attrs: &str, classes: &[&str]) -> bool {
    let Some(class) = attr_value(attrs, "class") else {
        return false;
    };
    let tokens: Vec<&str> = class.split_whitespace().collect();
    classes.iter().all(|c| tokens.contains(c))
}

// ── 文本 ────────────────────────────────────────────────────────

/// 去标签、解实体、合并空白。
pub(crate) fn inner_text(html: &str) -> String {
    let stripped = re_all_tags().replace_all(html, " ");
    unescape_basic_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 保留换行的纯文本：`<br>` 与块级结束标签视为换行，每行去首尾空白，丢弃空行。
pub(crate) fn text_lines(html: &str) -> Vec<String> {
    let with_breaks = re_br().replace_all(html, "\n");
    let with_breaks = with_breaks
        .replace("</p>", "\n")
        .replace("</div>", "\n")
        .replace("</P>", "\n");
    let stripped = re_all_tags().replace_all(&with_breaks, "");
    unescape_basic_entities(&stripped)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn unescape_basic_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    Cow::Owned(
        s.replace("&nbsp;", " ")
            .replace("&quot;", "\"")
            .replace("&#34;", "\"")
            .replace("&#x22;", "\"")
            .replace("&#39;", "'")
            .replace("&#x27;", "'")
            .replace("&#039;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}

// ── Next.js 数据 ────────────────────────────────────────────────

/// 取 `<script id="__NEXT_DATA__">` 里的 `props.pageProps`。
pub(crate) fn next_page_props(html: &str) -> Option<Value> {
    let raw = re_next_data().captures(html)?.get(1)?.as_str();
    let mut data: Value = serde_json::from_str(raw.trim()).ok()?;
    Some(data.get_mut("props")?.get_mut("pageProps")?.take())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_elements_and_attributes() {
        let html = r#"<a href="/x?a=1&amp;b=2" class="btn big">One</a><a href='/y'>Two <b>bold</b></a>"#;
        let links = elements(html, "a");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].attr("href").as_deref(), Some("/x?a=1&b=2"));
        assert!(links[0].has_classes(&["big", "btn"]));
        assert!(!links[1].has_classes(&["btn"]));
        assert_eq!(links[1].text(), "Two bold");
    }

    #[test]
    fn void_tags_cover_self_closing() {
        let html = r#"<img class="js-page" data-src="a.jpg"><img src="b.jpg" />"#;
        let imgs = void_tags(html, "img");
        assert_eq!(attr_value(imgs[0], "data-src").as_deref(), Some("a.jpg"));
        assert_eq!(attr_value(imgs[1], "src").as_deref(), Some("b.jpg"));
    }

    #[test]
    fn text_lines_split_on_breaks() {
        let lines = text_lines("Intro<br><br> The story &amp; more <br/>\n  <i>end</i> ");
        assert_eq!(lines, vec!["Intro", "The story & more", "end"]);
    }

    #[test]
    fn reads_next_data_page_props() {
        let html = r#"<html><script id="__NEXT_DATA__" type="application/json">
            {"props": {"pageProps": {"series": {"title": "T"}}}}
        </script></html>"#;
        let props = next_page_props(html).unwrap();
        assert_eq!(props["series"]["title"], "T");
        assert!(next_page_props("<html></html>").is_none());
    }
}
