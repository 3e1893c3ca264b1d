//! Progress reporting for deck conversions.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! per-page events and an overall percentage as the pipeline runs.
//!
//! Percentages follow a fixed scale:
//!
//! ```text
//!   0   accepted
//!   5   document opened, page count known
//!   5→95  one equal step per finished page
//!  98   deck packaged
//! 100   output written
//! ```
//!
//! and never move backwards: [`ProgressTracker`] drops any update lower than
//! the last one it reported.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2pptx::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicU8, Ordering}};
//!
//! struct LastPercent(AtomicU8);
//!
//! impl ConversionProgressCallback for LastPercent {
//!     fn on_progress(&self, percent: u8, _status: &str) {
//!         self.0.store(percent, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(LastPercent(AtomicU8::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Called by the conversion pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before any page is rendered.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page is sent for layout analysis.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — pages selected for conversion
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's slide has been written.
    ///
    /// # Arguments
    /// * `text_boxes` — text boxes placed on the slide
    /// * `pictures`   — graphic regions placed on the slide
    fn on_page_complete(
        &self,
        page_num: usize,
        total_pages: usize,
        text_boxes: usize,
        pictures: usize,
    ) {
        let _ = (page_num, total_pages, text_boxes, pictures);
    }

    /// Called when a page degraded (its slide is still written).
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called whenever the overall percentage advances.
    ///
    /// `status` is one of `processing`, `analyzing`, `generating`, `completed`.
    fn on_progress(&self, percent: u8, status: &str) {
        let _ = (percent, status);
    }

    /// Called once after all pages have been attempted.
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

// ── Percentage scale ─────────────────────────────────────────────────────

pub const PERCENT_OPENED: u8 = 5;
pub const PERCENT_PAGES_DONE: u8 = 95;
pub const PERCENT_PACKAGED: u8 = 98;
pub const PERCENT_COMPLETE: u8 = 100;

/// Monotonic percentage reporter over a fixed number of pages.
pub struct ProgressTracker {
    callback: ProgressCallback,
    total_pages: usize,
    last: AtomicU8,
}

impl ProgressTracker {
    pub fn new(callback: ProgressCallback, total_pages: usize) -> Self {
        Self {
            callback,
            total_pages,
            last: AtomicU8::new(0),
        }
    }

    /// Tracker that reports nowhere.
    pub fn noop(total_pages: usize) -> Self {
        Self::new(Arc::new(NoopProgressCallback), total_pages)
    }

    pub fn callback(&self) -> &dyn ConversionProgressCallback {
        self.callback.as_ref()
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Last percentage reported.
    pub fn percent(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }

    /// Report `percent` unless it would move progress backwards.
    pub fn report(&self, percent: u8, status: &str) {
        let percent = percent.min(PERCENT_COMPLETE);
        let prev = self.last.fetch_max(percent, Ordering::SeqCst);
        if percent > prev {
            self.callback.on_progress(percent, status);
        }
    }

    /// Percentage after `done` of the tracked pages have finished.
    pub fn page_percent(&self, done: usize) -> u8 {
        if self.total_pages == 0 {
            return PERCENT_PAGES_DONE;
        }
        let span = usize::from(PERCENT_PAGES_DONE - PERCENT_OPENED);
        let step = done.min(self.total_pages) * span / self.total_pages;
        PERCENT_OPENED + step as u8
    }

    pub fn opened(&self) {
        self.report(PERCENT_OPENED, "processing");
    }

    pub fn page_done(&self, done: usize) {
        self.report(self.page_percent(done), "analyzing");
    }

    pub fn packaged(&self) {
        self.report(PERCENT_PACKAGED, "generating");
    }

    pub fn completed(&self) {
        self.report(PERCENT_COMPLETE, "completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<(u8, String)>>,
    }

    impl ConversionProgressCallback for Recording {
        fn on_progress(&self, percent: u8, status: &str) {
            self.events.lock().push((percent, status.to_string()));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(5);
        cb.on_page_start(1, 5);
        cb.on_page_complete(1, 5, 3, 1);
        cb.on_page_error(2, 5, "some error");
        cb.on_progress(50, "analyzing");
        cb.on_conversion_complete(5, 4);
    }

    #[test]
    fn page_percent_spreads_evenly() {
        let t = ProgressTracker::noop(3);
        assert_eq!(t.page_percent(0), 5);
        assert_eq!(t.page_percent(1), 35);
        assert_eq!(t.page_percent(2), 65);
        assert_eq!(t.page_percent(3), 95);
        assert_eq!(t.page_percent(7), 95);
        assert_eq!(ProgressTracker::noop(0).page_percent(0), 95);
    }

    #[test]
    fn progress_never_goes_backwards() {
        let rec = Arc::new(Recording::default());
        let t = ProgressTracker::new(rec.clone(), 2);
        t.opened();
        t.page_done(2);
        t.page_done(1);
        t.opened();
        t.packaged();
        t.completed();
        t.completed();

        let events = rec.events.lock();
        let percents: Vec<u8> = events.iter().map(|(p, _)| *p).collect();
        assert_eq!(percents, vec![5, 95, 98, 100]);
        assert_eq!(events.last().map(|(_, s)| s.as_str()), Some("completed"));
        assert_eq!(t.percent(), 100);
    }
}
