//! Slide deck model and the PresentationML writer.
//!
//! A [`Slide`] is built once per page by the reconstruction engine and is
//! immutable afterwards; [`PptxWriter`] serialises it straight into the
//! output package.

pub mod pptx;

pub use pptx::PptxWriter;

use crate::geometry::PointBox;
use crate::layout::{FontFamily, RgbColor};

/// A span of text with uniform styling.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledRun {
    pub text: String,
    pub font: FontFamily,
    pub size_pt: f32,
    pub bold: bool,
    pub color: RgbColor,
}

/// A positioned, non-wrapping text frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    pub frame: PointBox,
    pub runs: Vec<StyledRun>,
}

impl TextBox {
    /// Concatenated text of all runs.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// A PNG placed on the slide.
#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub frame: PointBox,
    pub png: Vec<u8>,
}

/// One reconstructed page.
///
/// Pictures are drawn first, text boxes on top of them, each in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    pub background: RgbColor,
    pub pictures: Vec<Picture>,
    pub text_boxes: Vec<TextBox>,
}

impl Slide {
    pub fn new(background: RgbColor) -> Self {
        Self {
            background,
            pictures: Vec::new(),
            text_boxes: Vec::new(),
        }
    }
}
