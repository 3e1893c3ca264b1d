//! Conversion entry points.
//!
//! Every entry point funnels into one sequential loop:
//!
//! ```text
//! for each selected page, in order:
//!     render ─▶ analyze ─▶ reconstruct + write slide ─▶ drop raster
//! ```
//!
//! Pages are never processed concurrently. Slides must land in page order,
//! and only one page raster is alive at any moment.

use crate::config::{ConversionConfig, LayoutSource, PageSelection};
use crate::deck::pptx::DeckProperties;
use crate::error::Pdf2PptxError;
use crate::geometry::PageSize;
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata, PageReport};
use crate::pipeline::analyze::{Analyzer, LayoutRecorder, RecordedLayouts, VisionAnalyzer};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::render;
use crate::progress::{NoopProgressCallback, ProgressCallback, ProgressTracker};
use crate::reconstruct::SlideAssembler;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Convert a PDF file or URL into a `.pptx` deck at `output_path`.
///
/// This is the primary entry point for the library. The deck is written to a
/// temporary file next to `output_path` and renamed into place, so a failed
/// conversion never leaves a truncated deck behind.
///
/// # Errors
/// Returns `Err(Pdf2PptxError)` only for fatal errors (unreadable input, no
/// provider, output not writable). Pages whose analysis failed still get a
/// slide; see [`PageReport::error`].
pub async fn convert(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2PptxError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    convert_resolved_to_file(&resolved, output_path.as_ref(), config).await
}

/// Convert PDF bytes held in memory into a deck at `output_path`.
pub async fn convert_from_bytes(
    bytes: &[u8],
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2PptxError> {
    let resolved = input::resolve_bytes(bytes)?;
    convert_resolved_to_file(&resolved, output_path.as_ref(), config).await
}

/// Convert a PDF and stream the deck into `writer`.
///
/// Returns the writer once the package is complete.
pub async fn convert_to_writer<W>(
    input_str: impl AsRef<str>,
    writer: W,
    config: &ConversionConfig,
) -> Result<(W, ConversionOutput), Pdf2PptxError>
where
    W: Write + Seek + Send + 'static,
{
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let (writer, output, tracker) = run(&resolved, writer, config).await?;
    tracker.completed();
    Ok((writer, output))
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2PptxError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2PptxError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, output_path, config))
}

/// Extract PDF metadata without converting content.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(
    input_str: impl AsRef<str>,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2PptxError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    render::extract_metadata(resolved.path(), password).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn convert_resolved_to_file(
    resolved: &ResolvedInput,
    path: &Path,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2PptxError> {
    let write_failed = |source: std::io::Error| Pdf2PptxError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("pptx.tmp");
    let file = File::create(&tmp_path).map_err(write_failed)?;

    let (file, mut output, tracker) = match run(resolved, BufWriter::new(file), config).await {
        Ok(done) => done,
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
    };

    let file = file.into_inner().map_err(|e| write_failed(e.into_error()))?;
    file.sync_all().map_err(write_failed)?;
    drop(file);
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;

    output.output_path = Some(path.to_path_buf());
    tracker.completed();
    info!("Wrote {}", path.display());
    Ok(output)
}

/// The conversion loop. Leaves the final 100% report to the caller, which
/// knows when the output has actually landed.
async fn run<W>(
    resolved: &ResolvedInput,
    writer: W,
    config: &ConversionConfig,
) -> Result<(W, ConversionOutput, Arc<ProgressTracker>), Pdf2PptxError>
where
    W: Write + Seek + Send + 'static,
{
    let total_start = Instant::now();
    let pdf_path = resolved.path();

    // ── Step 1: Layout source ────────────────────────────────────────────
    let analyzer = build_analyzer(config).await?;

    // ── Step 2: Metadata and page selection ──────────────────────────────
    let metadata = render::extract_metadata(pdf_path, config.password.as_deref()).await?;
    let total_pages = metadata.page_count;

    let page_indices = config.pages.to_indices(total_pages);
    if page_indices.is_empty() {
        return Err(Pdf2PptxError::PageOutOfRange {
            page: first_requested_page(&config.pages),
            total: total_pages,
        });
    }
    let selected = page_indices.len();
    debug!("Selected {} of {} pages", selected, total_pages);

    let callback: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));
    callback.on_conversion_start(selected);
    let tracker = Arc::new(ProgressTracker::new(Arc::clone(&callback), selected));
    tracker.opened();

    // ── Step 3: Deck ─────────────────────────────────────────────────────
    let slide_size = metadata.page_size.unwrap_or_else(|| {
        warn!("First page reports no size, using US Letter");
        PageSize::LETTER
    });
    let mut assembler = SlideAssembler::new(
        writer,
        slide_size,
        config.reconstruction.clone(),
        Arc::clone(&tracker),
    )?;
    assembler.set_properties(DeckProperties {
        title: metadata.title.clone(),
        author: metadata.author.clone(),
        subject: metadata.subject.clone(),
    });

    // ── Step 4: Pages, strictly in order ─────────────────────────────────
    let mut recorder = config.save_layouts.as_ref().map(|_| LayoutRecorder::default());
    let mut reports = Vec::with_capacity(selected);
    let mut render_ms = 0u64;
    let mut analysis_ms = 0u64;

    for (i, &idx) in page_indices.iter().enumerate() {
        let page_num = idx + 1;
        if i > 0 && analyzer.is_remote() && config.request_delay_ms > 0 {
            sleep(Duration::from_millis(config.request_delay_ms)).await;
        }
        callback.on_page_start(page_num, selected);

        let render_start = Instant::now();
        let raster = render::render_page(
            pdf_path,
            config.password.as_deref(),
            idx,
            config.dpi,
            config.max_rendered_pixels,
        )
        .await?;
        render_ms += render_start.elapsed().as_millis() as u64;

        let analysis_start = Instant::now();
        let analysis = analyzer.analyze(&raster).await;
        analysis_ms += analysis_start.elapsed().as_millis() as u64;
        if let Some(recorder) = recorder.as_mut() {
            recorder.record(page_num, &analysis.layout);
        }

        // Reconstruction is CPU-bound; the raster is moved in and dropped there.
        let layout = analysis.layout;
        let (returned, summary) = tokio::task::spawn_blocking(move || {
            let summary = assembler.add_page(raster, &layout);
            (assembler, summary)
        })
        .await
        .map_err(|e| Pdf2PptxError::Internal(format!("Reconstruction task panicked: {}", e)))?;
        assembler = returned;
        let summary = summary?;

        let report = PageReport {
            page_num,
            text_boxes: summary.text_boxes,
            pictures: summary.pictures,
            input_tokens: analysis.input_tokens,
            output_tokens: analysis.output_tokens,
            retries: analysis.retries,
            duration_ms: analysis.duration_ms,
            error: analysis.error,
            skipped_pictures: summary.errors,
        };
        if let Some(e) = &report.error {
            callback.on_page_error(page_num, selected, &e.to_string());
        }
        for e in &report.skipped_pictures {
            callback.on_page_error(page_num, selected, &e.to_string());
        }
        callback.on_page_complete(page_num, selected, report.text_boxes, report.pictures);
        reports.push(report);
    }

    // ── Step 5: Package ──────────────────────────────────────────────────
    let writer = assembler.finish()?;

    if let (Some(recorder), Some(path)) = (recorder, config.save_layouts.as_ref()) {
        recorder.save(path).await?;
    }

    let mut stats = ConversionStats::from_reports(total_pages, &reports);
    stats.render_duration_ms = render_ms;
    stats.analysis_duration_ms = analysis_ms;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    let clean = reports.iter().filter(|r| r.error.is_none()).count();
    callback.on_conversion_complete(selected, clean);
    info!(
        "Conversion complete: {} slides ({} placeholders), {}ms total",
        stats.slides, stats.placeholder_pages, stats.total_duration_ms
    );

    Ok((
        writer,
        ConversionOutput {
            pages: reports,
            metadata,
            stats,
            output_path: None,
        },
        tracker,
    ))
}

fn first_requested_page(selection: &PageSelection) -> usize {
    match selection {
        PageSelection::All => 0,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.first().copied().unwrap_or(0),
    }
}

async fn build_analyzer(config: &ConversionConfig) -> Result<Analyzer, Pdf2PptxError> {
    match &config.layout_source {
        LayoutSource::Recorded(path) => {
            let recorded = RecordedLayouts::load(path)?;
            info!("Using {} recorded layouts from {}", recorded.len(), path.display());
            Ok(Analyzer::Recorded(recorded))
        }
        LayoutSource::Vision => {
            let provider = resolve_provider(config).await?;
            info!(
                "Using vision provider {}",
                config.provider_name.as_deref().unwrap_or("auto")
            );
            Ok(Analyzer::Vision(VisionAnalyzer::new(provider, config)))
        }
    }
}

const DEFAULT_MODEL: &str = "gpt-4.1-mini";

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2PptxError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2PptxError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured even when several API keys are present.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
async fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2PptxError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2PptxError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY or GEMINI_API_KEY, \
                or replay saved layouts with --layout.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
