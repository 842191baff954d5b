//! 并发计数：记录当前活跃章节/图片数及峰值，用于核对两级并发上限。

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub(crate) struct ActivityGauge {
    chapters: Counter,
    assets: Counter,
}

impl ActivityGauge {
    pub(crate) fn enter_chapter(&self) -> GaugeGuard<'_> {
        self.chapters.enter()
    }

    pub(crate) fn enter_asset(&self) -> GaugeGuard<'_> {
        self.assets.enter()
    }

    pub(crate) fn peak_chapters(&self) -> usize {
        self.chapters.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn peak_assets(&self) -> usize {
        self.assets.peak.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Counter {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Counter {
    fn enter(&self) -> GaugeGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard { counter: self }
    }
}

pub(crate) struct GaugeGuard<'a> {
    counter: &'a Counter,
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.counter.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_peak_not_current() {
        let gauge = ActivityGauge::default();
        {
            let _a = gauge.enter_asset();
            let _b = gauge.enter_asset();
            let _c = gauge.enter_chapter();
        }
        let _d = gauge.enter_asset();
        assert_eq!(gauge.peak_assets(), 2);
        assert_eq!(gauge.peak_chapters(), 1);
    }
}
