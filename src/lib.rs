//! # edgequake-pdf2pptx
//!
//! Rebuild PDF pages as editable PowerPoint slides using Vision Language
//! Models (VLMs).
//!
//! ## Why this crate?
//!
//! Pasting a PDF page into a slide as a picture leaves nothing to edit. This
//! crate rasterises each page, asks a VLM where every line of text sits and
//! how it is styled, then rebuilds the page as a slide: a solid background,
//! the page's graphics cut out as transparent pictures, and real text boxes
//! with the right font, size, weight and per-character colour on top.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input        resolve local file, URL, or in-memory bytes
//!  ├─ 2. Render       rasterise one page via pdfium (spawn_blocking)
//!  ├─ 3. Analyze      page PNG → VLM → text layout (or replay a saved one)
//!  ├─ 4. Reconstruct  background colour, graphic regions, styled text runs
//!  └─ 5. Package      stream each slide into a .pptx, finish the package
//! ```
//!
//! Pages run strictly in order and only one page raster is alive at a time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2pptx::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ConversionConfig::default();
//!     let output = convert("document.pdf", "document.pptx", &config).await?;
//!     eprintln!("{} slides, {} text boxes, {} pictures",
//!         output.stats.slides,
//!         output.stats.text_boxes,
//!         output.stats.pictures);
//!     Ok(())
//! }
//! ```
//!
//! ## Replaying layouts
//!
//! Every page's analysis can be saved with
//! [`ConversionConfigBuilder::save_layouts`] and fed back with
//! [`LayoutSource::Recorded`]; the second run makes no model calls, which
//! makes tuning [`ReconstructionParams`] cheap.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2pptx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2pptx = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod deck;
pub mod error;
pub mod geometry;
pub mod jobs;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reconstruct;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, LayoutSource, PageSelection, ReconstructionParams,
};
pub use convert::{convert, convert_from_bytes, convert_sync, convert_to_writer, inspect};
pub use error::{PageError, Pdf2PptxError};
pub use jobs::{JobHandle, JobId, JobSnapshot, JobStatus, JobStore};
pub use layout::{ColorRange, FontFamily, NormBox, PageLayout, RgbColor, TextBlock};
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata, PageReport};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use reconstruct::{reconstruct_slide, PageRaster, SlideAssembler};
