//! CLI binary for edgequake-pdf2pptx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2pptx::{
    convert, inspect, ConversionConfig, ConversionOutput, ConversionProgressCallback,
    LayoutSource, PageSelection, ProgressCallback, ReconstructionParams,
};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a percentage bar plus one log line per slide.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Pages that degraded (placeholder text or skipped pictures).
    degraded: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            degraded: AtomicUsize::new(0),
        })
    }

    fn page_elapsed(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .get(&page_num)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.bar.set_prefix("Converting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rebuilding {total_pages} pages as slides…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, total: usize) {
        self.start_times.lock().insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}/{total}"));
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.degraded.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            yellow("!"),
            page_num,
            total,
            yellow(&msg),
        ));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_boxes: usize, pictures: usize) {
        let elapsed = self.page_elapsed(page_num);
        self.start_times.lock().remove(&page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<22}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_boxes:>3} text, {pictures:>2} pictures")),
            dim(&format!("{elapsed:.1}s")),
        ));
    }

    fn on_progress(&self, percent: u8, status: &str) {
        self.bar.set_position(u64::from(percent));
        if status == "generating" {
            self.bar.set_prefix("Packaging");
        }
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let degraded = self.degraded.load(Ordering::SeqCst);
        if success_count == total_pages && degraded == 0 {
            eprintln!("{} {} slides rebuilt", green("✔"), bold(&total_pages.to_string()));
        } else {
            eprintln!(
                "{} {} slides rebuilt  ({} with placeholders, {} warnings)",
                cyan("⚠"),
                bold(&total_pages.to_string()),
                red(&(total_pages - success_count).to_string()),
                degraded,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (writes document.pptx next to the current directory)
  pdf2pptx document.pdf

  # Explicit output, selected pages
  pdf2pptx --pages 1-5 deck.pdf -o deck.pptx

  # Use a specific model
  pdf2pptx --model gpt-4.1 --provider openai document.pdf

  # Convert from URL
  pdf2pptx https://example.com/slides.pdf -o slides.pptx

  # Save the layouts, then re-tune reconstruction without model calls
  pdf2pptx deck.pdf --save-layout deck.layout.json
  pdf2pptx deck.pdf --layout deck.layout.json --diff-threshold 40 -o deck2.pptx

  # Inspect PDF metadata (no API key needed)
  pdf2pptx --inspect-only document.pdf

  # JSON report with per-page details
  pdf2pptx --json document.pdf > report.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Convert:         pdf2pptx document.pdf -o document.pptx
"#;

/// Rebuild PDF pages as editable PowerPoint slides using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2pptx",
    version,
    about = "Rebuild PDF pages as editable PowerPoint slides using Vision LLMs",
    long_about = "Convert PDF documents (local files or URLs) into .pptx decks whose text is \
real, editable text boxes. Each page's background colour and graphics are recovered from the \
rendered page; text position, font, size, weight and colour come from a Vision Language Model \
(OpenAI, Anthropic, Google Gemini, Ollama, or any OpenAI-compatible endpoint).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output .pptx path. Default: input name with a .pptx extension.
    #[arg(short, long, env = "PDF2PPTX_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2PPTX_DPI", default_value_t = 108,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2PPTX_PAGES", default_value = "all")]
    pages: String,

    /// Replay layouts from a JSON file instead of calling a model.
    #[arg(long, env = "PDF2PPTX_LAYOUT")]
    layout: Option<PathBuf>,

    /// Save every page's layout to this JSON file.
    #[arg(long, env = "PDF2PPTX_SAVE_LAYOUT")]
    save_layout: Option<PathBuf>,

    /// Foreground threshold: intensity difference from the background (0–255).
    #[arg(long, env = "PDF2PPTX_DIFF_THRESHOLD", default_value_t = 25)]
    diff_threshold: u8,

    /// Smallest graphic region kept, in square pixels.
    #[arg(long, env = "PDF2PPTX_MIN_AREA", default_value_t = 1000.0)]
    min_area: f64,

    /// Text-box overlap (0–1) above which a region is treated as text.
    #[arg(long, env = "PDF2PPTX_OVERLAP_RATIO", default_value_t = 0.3)]
    overlap_ratio: f64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2PPTX_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom layout prompt.
    #[arg(long, env = "PDF2PPTX_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PDF2PPTX_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2PPTX_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on LLM failure (0–10).
    #[arg(long, env = "PDF2PPTX_MAX_RETRIES", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    max_retries: u32,

    /// Pause between page analyses, in milliseconds.
    #[arg(long, env = "PDF2PPTX_REQUEST_DELAY", default_value_t = 500)]
    request_delay: u64,

    /// Output a JSON report (ConversionOutput) on stdout.
    #[arg(long, env = "PDF2PPTX_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2PPTX_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2PPTX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2PPTX_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2PPTX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "PDF2PPTX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(size) = meta.page_size {
                println!("Page size:    {:.0} × {:.0} pt", size.width_pt, size.height_pt);
            }
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    let output = convert(&cli.input, &output_path, &config)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, &output_path, show_progress);
    }

    Ok(())
}

fn print_summary(output: &ConversionOutput, output_path: &Path, show_progress: bool) {
    let stats = &output.stats;
    if !show_progress {
        for page in output.pages.iter().filter(|p| !p.is_clean()) {
            if let Some(ref e) = page.error {
                eprintln!("  page {}: {}", page.page_num, e);
            }
            for e in &page.skipped_pictures {
                eprintln!("  page {}: {}", page.page_num, e);
            }
        }
    }
    eprintln!(
        "{}  {} slides  {} text boxes  {} pictures  {}ms  →  {}",
        if stats.placeholder_pages == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.slides,
        stats.text_boxes,
        stats.pictures,
        stats.total_duration_ms,
        bold(&output_path.display().to_string()),
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );
}

/// `report.pdf` or `https://…/report.pdf?x=1` → `report.pptx`.
fn default_output_path(input: &str) -> PathBuf {
    let trimmed = input.split(['?', '#']).next().unwrap_or(input);
    let stem = Path::new(trimmed)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    PathBuf::from(format!("{stem}.pptx"))
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let pages = parse_pages(&cli.pages)?;

    let reconstruction = ReconstructionParams {
        diff_threshold: cli.diff_threshold,
        min_region_area: cli.min_area,
        text_overlap_ratio: cli.overlap_ratio,
        ..Default::default()
    };

    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .pages(pages)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .request_delay_ms(cli.request_delay)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .reconstruction(reconstruction);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(ref path) = cli.layout {
        builder = builder.layout_source(LayoutSource::Recorded(path.clone()));
    }
    if let Some(ref path) = cli.save_layout {
        builder = builder.save_layouts(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}
