//! 进度上报与 CLI 进度条管理。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::models::ProgressSnapshot;

pub type ProgressCallback = Box<dyn FnMut(ProgressSnapshot) + Send>;

pub(crate) struct ProgressReporter {
    pub(crate) snapshot: ProgressSnapshot,
    cb: Option<ProgressCallback>, // optional UI callback
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub(crate) fn emit(&mut self) {
        if let Some(cb) = self.cb.as_mut() {
            cb(self.snapshot);
        }
    }

    pub(crate) fn inc_chapter(&mut self) {
        self.snapshot.chapters_done =
            (self.snapshot.chapters_done + 1).min(self.snapshot.chapters_total);
        if let Some(bar) = self.bar.as_ref() {
            bar.inc(1);
        }
        self.emit();
    }

    pub(crate) fn add_failed_assets(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.snapshot.assets_failed += count;
        if let Some(bar) = self.bar.as_ref() {
            bar.set_message(format!("缺页 {}", self.snapshot.assets_failed));
        }
        self.emit();
    }

    pub(crate) fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish();
    }
}

// ── 构造函数 ──────────────────────────────────────────────────

/// 有 UI 回调时只走回调；否则按 `show_bar` 决定是否在 stderr 画进度条。
pub(crate) fn make_reporter(
    label: &str,
    total: usize,
    progress: Option<ProgressCallback>,
    show_bar: bool,
) -> ProgressReporter {
    let bar = if progress.is_none() && show_bar && total > 0 {
        let style = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        bar.set_style(style);
        bar.set_prefix(label.to_string());
        Some(bar)
    } else {
        None
    };

    let mut reporter = ProgressReporter {
        snapshot: ProgressSnapshot {
            chapters_done: 0,
            chapters_total: total,
            assets_failed: 0,
        },
        cb: progress,
        bar,
    };
    reporter.emit();
    reporter
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn callback_sees_every_step() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut reporter = make_reporter(
            "Foo",
            2,
            Some(Box::new(move |s| sink.lock().unwrap().push(s))),
            true,
        );
        reporter.inc_chapter();
        reporter.add_failed_assets(0);
        reporter.add_failed_assets(3);
        reporter.inc_chapter();
        reporter.inc_chapter();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0].chapters_done, 0);
        assert_eq!(
            *seen.last().unwrap(),
            ProgressSnapshot {
                chapters_done: 2,
                chapters_total: 2,
                assets_failed: 3,
            }
        );
    }
}
