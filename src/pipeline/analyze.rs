//! Layout analysis: one page raster in, one [`PageLayout`] out.
//!
//! Layouts come from the vision model ([`VisionAnalyzer`]) or from a file of
//! previously saved layouts ([`RecordedLayouts`]). Either way every page
//! gets a layout. When the model fails or answers with something that is not
//! a JSON object, the page gets a one-block placeholder that names the
//! problem on the slide itself, and the failure is recorded as a
//! [`PageError`].
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 from vision APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) with 500 ms base and 3 retries waits
//! 500 ms → 1 s → 2 s. Each attempt is bounded by `api_timeout_secs`.

use super::encode::encode_page;
use super::response::parse_layout_response;
use crate::config::{ConversionConfig, MAX_RETRIES};
use crate::error::{PageError, Pdf2PptxError};
use crate::layout::{PageLayout, RgbColor};
use crate::prompts::layout_prompt;
use crate::reconstruct::PageRaster;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

const PARSE_ERROR_COLOR: RgbColor = RgbColor::new(30, 30, 30);
const PARSE_ERROR_SIZE_PT: f32 = 32.0;
const ANALYSIS_ERROR_COLOR: RgbColor = RgbColor::new(200, 50, 50);
const ANALYSIS_ERROR_SIZE_PT: f32 = 24.0;
const ERROR_EXCERPT_CHARS: usize = 50;

/// Result of analysing one page.
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub page_num: usize,
    pub layout: PageLayout,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub retries: u8,
    pub duration_ms: u64,
    /// Set when `layout` is a placeholder.
    pub error: Option<PageError>,
}

impl PageAnalysis {
    fn new(page_num: usize, layout: PageLayout) -> Self {
        Self {
            page_num,
            layout,
            input_tokens: 0,
            output_tokens: 0,
            retries: 0,
            duration_ms: 0,
            error: None,
        }
    }
}

/// Placeholder for a page whose layout response was not a JSON object.
pub fn parse_error_layout(page_num: usize) -> PageLayout {
    PageLayout::placeholder(
        format!("[Page {page_num} - Parse error]"),
        PARSE_ERROR_COLOR,
        PARSE_ERROR_SIZE_PT,
    )
}

/// Placeholder for a page whose analysis call failed.
pub fn analysis_error_layout(page_num: usize, detail: &str) -> PageLayout {
    let excerpt: String = detail.chars().take(ERROR_EXCERPT_CHARS).collect();
    PageLayout::placeholder(
        format!("[Page {page_num} - Analysis error: {excerpt}]"),
        ANALYSIS_ERROR_COLOR,
        ANALYSIS_ERROR_SIZE_PT,
    )
}

/// Where layouts come from for this conversion.
pub enum Analyzer {
    Vision(VisionAnalyzer),
    Recorded(RecordedLayouts),
}

impl Analyzer {
    pub async fn analyze(&self, raster: &PageRaster) -> PageAnalysis {
        match self {
            Analyzer::Vision(v) => v.analyze(raster).await,
            Analyzer::Recorded(r) => r.layout_for(raster.page_num),
        }
    }

    /// Whether consecutive calls should be spaced out.
    pub fn is_remote(&self) -> bool {
        matches!(self, Analyzer::Vision(_))
    }
}

// ── Vision model ─────────────────────────────────────────────────────────

/// Asks a vision model for each page's layout.
pub struct VisionAnalyzer {
    provider: Arc<dyn LLMProvider>,
    system_prompt: Option<String>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout: Duration,
}

impl VisionAnalyzer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            system_prompt: config.system_prompt.clone(),
            options: build_options(config),
            max_retries: config.max_retries.min(MAX_RETRIES),
            retry_backoff_ms: config.retry_backoff_ms,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Analyse one page. Never fails; see the module docs.
    ///
    /// The request is a system message carrying the layout prompt and a user
    /// message carrying only the page PNG.
    pub async fn analyze(&self, raster: &PageRaster) -> PageAnalysis {
        let start = Instant::now();
        let page_num = raster.page_num;

        let image = match encode_page(&raster.image) {
            Ok(image) => image,
            Err(e) => {
                let detail = format!("image encoding failed: {e}");
                warn!("Page {}: {}", page_num, detail);
                let mut out = PageAnalysis::new(page_num, analysis_error_layout(page_num, &detail));
                out.error = Some(PageError::AnalysisFailed {
                    page: page_num,
                    retries: 0,
                    detail,
                });
                return out;
            }
        };

        let prompt = self
            .system_prompt
            .clone()
            .unwrap_or_else(|| layout_prompt(raster.size));
        let messages = vec![
            ChatMessage::system(prompt),
            ChatMessage::user_with_images("", vec![image]),
        ];

        let mut last_err = String::from("Unknown error");
        let mut all_timeouts = true;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Page {}: retry {}/{} after {}ms",
                    page_num, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.timeout, self.provider.chat(&messages, Some(&self.options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, {:?}",
                        page_num,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    let (layout, error) = match parse_layout_response(&response.content) {
                        Ok(layout) => (layout, None),
                        Err(e) => {
                            let excerpt: String = response.content.chars().take(200).collect();
                            warn!("Page {}: unusable layout response ({}): {}", page_num, e, excerpt);
                            (
                                parse_error_layout(page_num),
                                Some(PageError::MalformedLayout {
                                    page: page_num,
                                    detail: e.to_string(),
                                }),
                            )
                        }
                    };
                    return PageAnalysis {
                        page_num,
                        layout,
                        input_tokens: response.prompt_tokens,
                        output_tokens: response.completion_tokens,
                        retries: retry_count(attempt),
                        duration_ms: start.elapsed().as_millis() as u64,
                        error,
                    };
                }
                Ok(Err(e)) => {
                    all_timeouts = false;
                    last_err = e.to_string();
                    warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, last_err);
                }
                Err(_) => {
                    last_err = format!("timed out after {}s", self.timeout.as_secs());
                    warn!("Page {}: attempt {} {}", page_num, attempt + 1, last_err);
                }
            }
        }

        let error = if all_timeouts {
            PageError::Timeout {
                page: page_num,
                secs: self.timeout.as_secs(),
            }
        } else {
            PageError::AnalysisFailed {
                page: page_num,
                retries: retry_count(self.max_retries),
                detail: last_err.clone(),
            }
        };
        let mut out = PageAnalysis::new(page_num, analysis_error_layout(page_num, &last_err));
        out.retries = retry_count(self.max_retries);
        out.duration_ms = start.elapsed().as_millis() as u64;
        out.error = Some(error);
        out
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn retry_count(n: u32) -> u8 {
    u8::try_from(n).unwrap_or(u8::MAX)
}

fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Recorded layouts ─────────────────────────────────────────────────────

/// Layouts saved from an earlier run, keyed `page_1`, `page_2`, …
#[derive(Debug, Clone, Default)]
pub struct RecordedLayouts {
    pages: Map<String, Value>,
}

impl RecordedLayouts {
    /// Read a layout file written by [`LayoutRecorder::save`].
    pub fn load(path: &Path) -> Result<Self, Pdf2PptxError> {
        let invalid = |detail: String| Pdf2PptxError::LayoutFileInvalid {
            path: path.to_path_buf(),
            detail,
        };
        let text = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;
        Self::from_value(value).ok_or_else(|| invalid("top-level value is not an object".into()))
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(pages) => Some(Self { pages }),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// The recorded layout of `page_num`. A page with no entry is empty; an
    /// entry that is not a JSON object gets the parse-error placeholder.
    pub fn layout_for(&self, page_num: usize) -> PageAnalysis {
        let Some(value) = self.pages.get(&page_key(page_num)) else {
            debug!("Page {}: no recorded layout, leaving slide empty", page_num);
            return PageAnalysis::new(page_num, PageLayout::default());
        };
        match PageLayout::from_value(value) {
            Ok(layout) => PageAnalysis::new(page_num, layout),
            Err(e) => {
                warn!("Page {}: recorded layout unusable: {}", page_num, e);
                let mut out = PageAnalysis::new(page_num, parse_error_layout(page_num));
                out.error = Some(PageError::MalformedLayout {
                    page: page_num,
                    detail: e.to_string(),
                });
                out
            }
        }
    }
}

/// Collects every page's layout for [`ConversionConfig::save_layouts`].
#[derive(Debug, Default)]
pub struct LayoutRecorder {
    pages: Map<String, Value>,
}

impl LayoutRecorder {
    pub fn record(&mut self, page_num: usize, layout: &PageLayout) {
        self.pages.insert(page_key(page_num), layout.to_value());
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.pages)
    }

    /// Write the collected layouts as pretty JSON, via a temp file and rename.
    pub async fn save(self, path: &Path) -> Result<(), Pdf2PptxError> {
        let write_failed = |source: std::io::Error| Pdf2PptxError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_string_pretty(&self.into_value())
            .map_err(|e| Pdf2PptxError::Internal(format!("layout serialisation: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
        let tmp: PathBuf = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(write_failed)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_failed)?;
        debug!("Saved layouts to {}", path.display());
        Ok(())
    }
}

fn page_key(page_num: usize) -> String {
    format!("page_{page_num}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&ConversionConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(500, 200), u64::MAX);
        assert_eq!(backoff_ms(u64::MAX, 2), u64::MAX);
        assert_eq!(backoff_ms(0, 64), 0);
    }

    #[test]
    fn retry_count_does_not_wrap() {
        assert_eq!(retry_count(3), 3);
        assert_eq!(retry_count(256), u8::MAX);
        assert_eq!(retry_count(u32::MAX), u8::MAX);
    }

    #[test]
    fn parse_error_placeholder() {
        let layout = parse_error_layout(4);
        let block = &layout.blocks[0];
        assert_eq!(block.text, "[Page 4 - Parse error]");
        assert_eq!(block.font_size_pt, 32.0);
        assert_eq!(block.colors[0].rgb, RgbColor::new(30, 30, 30));
        assert_eq!(block.bbox.x, 50.0);
        assert_eq!(block.bbox.w, 900.0);
    }

    #[test]
    fn analysis_error_placeholder_truncates_detail() {
        let detail = "x".repeat(80);
        let layout = analysis_error_layout(2, &detail);
        let text = &layout.blocks[0].text;
        assert_eq!(text, &format!("[Page 2 - Analysis error: {}]", "x".repeat(50)));
        assert_eq!(layout.blocks[0].colors[0].rgb, RgbColor::new(200, 50, 50));
    }

    #[test]
    fn recorded_layouts_by_page_key() {
        let recorded = RecordedLayouts::from_value(json!({
            "page_1": {"blocks": [{"text": "One", "bbox_1000": [0, 0, 100, 50]}]},
            "page_2": "garbage"
        }))
        .unwrap();
        assert_eq!(recorded.len(), 2);

        let one = recorded.layout_for(1);
        assert_eq!(one.layout.blocks[0].text, "One");
        assert!(one.error.is_none());

        let two = recorded.layout_for(2);
        assert!(matches!(two.error, Some(PageError::MalformedLayout { page: 2, .. })));
        assert_eq!(two.layout.blocks[0].text, "[Page 2 - Parse error]");

        let three = recorded.layout_for(3);
        assert!(three.layout.blocks.is_empty());
        assert!(three.error.is_none());
    }

    #[test]
    fn recorded_layouts_reject_non_object() {
        assert!(RecordedLayouts::from_value(json!([1, 2])).is_none());
    }

    #[tokio::test]
    async fn recorder_output_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("layouts.json");

        let mut recorder = LayoutRecorder::default();
        recorder.record(1, &parse_error_layout(1));
        recorder.record(2, &PageLayout::default());
        recorder.save(&path).await.unwrap();

        let loaded = RecordedLayouts::load(&path).unwrap();
        assert_eq!(loaded.layout_for(1).layout, parse_error_layout(1));
        assert!(loaded.layout_for(2).layout.blocks.is_empty());
    }

    #[test]
    fn load_reports_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(
            RecordedLayouts::load(&path),
            Err(Pdf2PptxError::LayoutFileInvalid { .. })
        ));
        assert!(RecordedLayouts::load(&dir.path().join("missing.json")).is_err());
    }
}
