//! Conversion results: per-page reports, document metadata, and totals.

use crate::error::PageError;
use crate::geometry::PageSize;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one page.
///
/// A report exists for every selected page: a slide is always written, and
/// `error` records whatever degraded along the way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageReport {
    /// 1-indexed page number.
    pub page_num: usize,
    pub text_boxes: usize,
    pub pictures: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Vision call retries used.
    pub retries: u8,
    pub duration_ms: u64,
    /// Layout failure (placeholder used), if any.
    pub error: Option<PageError>,
    /// Pictures that could not be placed.
    pub skipped_pictures: Vec<PageError>,
}

impl PageReport {
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.skipped_pictures.is_empty()
    }
}

/// Document-level information read from the PDF.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    /// Size of the first page; the deck's slide size.
    pub page_size: Option<PageSize>,
}

/// Totals across the conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Slides written.
    pub slides: usize,
    /// Slides whose layout fell back to a placeholder.
    pub placeholder_pages: usize,
    pub text_boxes: usize,
    pub pictures: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub analysis_duration_ms: u64,
}

impl ConversionStats {
    /// Aggregate the per-page reports.
    pub fn from_reports(total_pages: usize, pages: &[PageReport]) -> Self {
        Self {
            total_pages,
            slides: pages.len(),
            placeholder_pages: pages.iter().filter(|p| p.error.is_some()).count(),
            text_boxes: pages.iter().map(|p| p.text_boxes).sum(),
            pictures: pages.iter().map(|p| p.pictures).sum(),
            total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
            total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
            ..Default::default()
        }
    }
}

/// Everything a conversion produced besides the deck bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub pages: Vec<PageReport>,
    pub metadata: DocumentMetadata,
    pub stats: ConversionStats,
    /// Where the deck was written, when written to a file.
    pub output_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_aggregate_reports() {
        let pages = vec![
            PageReport {
                page_num: 1,
                text_boxes: 3,
                pictures: 1,
                input_tokens: 100,
                output_tokens: 40,
                ..Default::default()
            },
            PageReport {
                page_num: 2,
                text_boxes: 1,
                error: Some(PageError::Timeout { page: 2, secs: 5 }),
                ..Default::default()
            },
        ];
        let stats = ConversionStats::from_reports(10, &pages);
        assert_eq!(stats.total_pages, 10);
        assert_eq!(stats.slides, 2);
        assert_eq!(stats.placeholder_pages, 1);
        assert_eq!(stats.text_boxes, 4);
        assert_eq!(stats.pictures, 1);
        assert_eq!(stats.total_input_tokens, 100);
        assert!(pages[0].is_clean());
        assert!(!pages[1].is_clean());
    }

    #[test]
    fn output_serialises_to_json() {
        let out = ConversionOutput::default();
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"pages\":[]"));
    }
}
