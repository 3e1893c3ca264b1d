//! Configuration types for PDF-to-deck conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The page reconstruction engine's
//! empirical constants live in [`ReconstructionParams`] so they can be tuned
//! per document style without touching the algorithm.

use crate::error::Pdf2PptxError;
use crate::layout::{RgbColor, DEFAULT_FONT_SIZE_PT};
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound on vision call retries per page.
pub const MAX_RETRIES: u32 = 10;

/// Configuration for a PDF-to-deck conversion.
///
/// # Example
/// ```rust
/// use edgequake_pdf2pptx::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .dpi(144)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 108.
    ///
    /// 108 DPI is a 1.5× page scale: sharp enough for the vision model to read
    /// small type and for graphic regions to survive, while a full page raster
    /// stays a few megabytes.
    pub dpi: u32,

    /// Cap on either raster dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 8192.
    ///
    /// A layout response repeats every line of the page plus its box and
    /// colour annotations, so it runs several times longer than a plain
    /// transcription of the same page.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed vision call. Default: 3, at most
    /// [`MAX_RETRIES`].
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Pause between consecutive page analyses in milliseconds. Default: 500.
    pub request_delay_ms: u64,

    /// Per-call timeout for the vision model in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom layout-analysis prompt. If None, uses the built-in prompt.
    pub system_prompt: Option<String>,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Where page layouts come from. Default: the vision model.
    pub layout_source: LayoutSource,

    /// Write every page's layout to this JSON file (keyed `page_N`).
    pub save_layouts: Option<PathBuf>,

    /// Reconstruction engine tunables.
    pub reconstruction: ReconstructionParams,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-page events and progress percentages.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 108,
            max_rendered_pixels: 2000,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 500,
            request_delay_ms: 500,
            api_timeout_secs: 120,
            password: None,
            system_prompt: None,
            pages: PageSelection::default(),
            layout_source: LayoutSource::default(),
            save_layouts: None,
            reconstruction: ReconstructionParams::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("pages", &self.pages)
            .field("layout_source", &self.layout_source)
            .field("save_layouts", &self.save_layouts)
            .field("reconstruction", &self.reconstruction)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Retries per page, capped at [`MAX_RETRIES`].
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn request_delay_ms(mut self, ms: u64) -> Self {
        self.config.request_delay_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn layout_source(mut self, source: LayoutSource) -> Self {
        self.config.layout_source = source;
        self
    }

    pub fn save_layouts(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.save_layouts = Some(path.into());
        self
    }

    pub fn reconstruction(mut self, params: ReconstructionParams) -> Self {
        self.config.reconstruction = params;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2PptxError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(Pdf2PptxError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2PptxError::InvalidConfig(
                "API timeout must be at least 1 second".into(),
            ));
        }
        c.reconstruction.validate()?;
        Ok(self.config)
    }
}

// ── Reconstruction tunables ──────────────────────────────────────────────

/// Empirical constants of the page reconstruction engine.
///
/// The defaults were tuned on slide-style documents (large type, flat
/// backgrounds). Scanned or photographic pages usually want a higher
/// `diff_threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionParams {
    /// Per-pixel intensity difference from the background (0–255) above which
    /// a pixel counts as foreground. Default: 25.
    pub diff_threshold: u8,

    /// Side of the square structuring element used to close the foreground
    /// mask. Default: 5. Values below 2 disable closing.
    pub closing_kernel: u8,

    /// Contours enclosing less than this many square pixels are noise. Default: 1000.
    pub min_region_area: f64,

    /// A region whose box is covered by a text box beyond this fraction is
    /// treated as text and not extracted. Default: 0.3.
    pub text_overlap_ratio: f64,

    /// Inward offset of the corner samples used for background estimation. Default: 10.
    pub corner_inset: u32,

    /// Text box sides shorter than this many points are replaced. Default: 10.
    pub min_box_pt: f32,

    /// Replacement width for a too-narrow text box. Default: 50.
    pub fallback_box_width_pt: f32,

    /// Replacement height for a too-short text box. Default: 30.
    pub fallback_box_height_pt: f32,

    /// Colour of text not covered by any colour range. Default: black.
    pub default_text_color: RgbColor,

    /// Font size of blocks that carry none. Default: 12.
    pub default_font_size_pt: f32,
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        Self {
            diff_threshold: 25,
            closing_kernel: 5,
            min_region_area: 1000.0,
            text_overlap_ratio: 0.3,
            corner_inset: 10,
            min_box_pt: 10.0,
            fallback_box_width_pt: 50.0,
            fallback_box_height_pt: 30.0,
            default_text_color: RgbColor::BLACK,
            default_font_size_pt: DEFAULT_FONT_SIZE_PT,
        }
    }
}

impl ReconstructionParams {
    fn validate(&self) -> Result<(), Pdf2PptxError> {
        if !(0.0..=1.0).contains(&self.text_overlap_ratio) {
            return Err(Pdf2PptxError::InvalidConfig(format!(
                "text overlap ratio must be within 0–1, got {}",
                self.text_overlap_ratio
            )));
        }
        if !self.min_region_area.is_finite() || self.min_region_area < 0.0 {
            return Err(Pdf2PptxError::InvalidConfig(format!(
                "minimum region area must be a non-negative number, got {}",
                self.min_region_area
            )));
        }
        if self.fallback_box_width_pt <= 0.0 || self.fallback_box_height_pt <= 0.0 {
            return Err(Pdf2PptxError::InvalidConfig(
                "fallback text box size must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where page layouts come from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum LayoutSource {
    /// Ask the configured vision model for every page (default).
    #[default]
    Vision,
    /// Replay layouts previously saved with `save_layouts`; no model is called.
    Recorded(PathBuf),
}

/// Specifies which pages of the PDF to convert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed pages.
    ///
    /// Slides always follow page order, whatever order the selection names them in.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let in_range = |p: &usize| (1..=total_pages).contains(p);
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => std::iter::once(*p)
                .filter(in_range)
                .map(|p| p - 1)
                .collect(),
            PageSelection::Range(start, end) => {
                ((*start).max(1) - 1..(*end).min(total_pages)).collect()
            }
            PageSelection::Set(pages) => pages.iter().copied().filter(in_range).map(|p| p - 1).collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
