//! PDF rasterisation via pdfium, one page at a time.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole render. `spawn_blocking` keeps that off
//! the Tokio worker threads.
//!
//! ## Why one page per call?
//!
//! A full-document batch at 1.5× scale holds every page raster at once,
//! which is what blows up memory on long decks. Rendering exactly the page
//! being reconstructed means one raster is alive at a time; reopening the
//! document per page is cheap next to the vision call that follows.

use crate::error::Pdf2PptxError;
use crate::geometry::PageSize;
use crate::output::DocumentMetadata;
use crate::reconstruct::PageRaster;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bind to a pdfium library.
///
/// Looks, in order, at `PDFIUM_LIB_PATH` (a file or a directory), the
/// working directory, and the system library path.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2PptxError> {
    let mut tried = Vec::new();

    if let Some(custom) = std::env::var_os("PDFIUM_LIB_PATH") {
        let custom = PathBuf::from(custom);
        let lib = if custom.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&custom)
        } else {
            custom
        };
        match Pdfium::bind_to_library(&lib) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", lib.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => tried.push(format!("{}: {:?}", lib.display(), e)),
        }
    }

    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&local) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(e) => tried.push(format!("{}: {:?}", local.display(), e)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(e) => {
            tried.push(format!("system library: {:?}", e));
            Err(Pdf2PptxError::PdfiumBindingFailed(tried.join("; ")))
        }
    }
}

/// Render one page (0-indexed) to an RGB raster.
///
/// `dpi / 72` is the page scale; the longer side is capped at `max_pixels`.
pub async fn render_page(
    pdf_path: &Path,
    password: Option<&str>,
    page_index: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<PageRaster, Pdf2PptxError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        render_page_blocking(&path, password.as_deref(), page_index, dpi, max_pixels)
    })
    .await
    .map_err(|e| Pdf2PptxError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_page_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    page_index: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<PageRaster, Pdf2PptxError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;
    let pages = document.pages();
    let total = pages.len() as usize;

    let page_num = page_index + 1;
    if page_index >= total {
        return Err(Pdf2PptxError::PageOutOfRange {
            page: page_num,
            total,
        });
    }
    let page = pages
        .get(page_index as PdfPageIndex)
        .map_err(|e| Pdf2PptxError::RasterisationFailed {
            page: page_num,
            detail: format!("{:?}", e),
        })?;
    let size = PageSize::new(page.width().value, page.height().value);

    let max = max_pixels.min(i32::MAX as u32) as i32;
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max)
        .set_maximum_height(max);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| Pdf2PptxError::RasterisationFailed {
            page: page_num,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image().to_rgb8();
    debug!(
        "Rendered page {} → {}x{} px ({:.0}×{:.0} pt)",
        page_num,
        image.width(),
        image.height(),
        size.width_pt,
        size.height_pt
    );

    Ok(PageRaster::new(page_num, image, size))
}

/// Extract document metadata without rendering pages.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2PptxError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| Pdf2PptxError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn extract_metadata_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2PptxError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let metadata = document.metadata();
    let pages = document.pages();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    let page_size = pages
        .get(0)
        .ok()
        .map(|p| PageSize::new(p.width().value, p.height().value));

    let meta = DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: pages.len() as usize,
        pdf_version: format!("{:?}", document.version()),
        page_size,
    };
    info!(
        "PDF loaded: {} pages, version {}",
        meta.page_count, meta.pdf_version
    );
    Ok(meta)
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pdf2PptxError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                Pdf2PptxError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Pdf2PptxError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Pdf2PptxError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}
