//! Page-to-slide reconstruction engine.
//!
//! Turns one rasterised page plus its layout description into a [`Slide`]:
//!
//! ```text
//!  PageRaster ──▶ background ──▶ graphics ──┐
//!      │                                     ├──▶ assemble ──▶ Slide
//!  PageLayout ─────────────────▶ runs ──────┘
//! ```
//!
//! 1. [`background`] — dominant colour from the page corners
//! 2. [`graphics`]   — non-text regions cut out by background subtraction
//! 3. [`runs`]       — per-colour runs covering each block's text
//! 4. [`assemble`]   — places everything on a slide and streams it to the deck
//!
//! The engine is synchronous and processes one page at a time. A page's
//! raster is moved into [`assemble::SlideAssembler::add_page`] and dropped
//! when the slide has been written.
//!
//! [`Slide`]: crate::deck::Slide

pub mod assemble;
pub mod background;
pub mod graphics;
pub mod runs;

pub use assemble::{reconstruct_slide, SlideAssembler, SlideSummary};
pub use background::estimate_background;
pub use graphics::{extract_regions, extract_regions_from_encoded, GraphicRegion};
pub use runs::{compose_runs, ColoredRun};

use crate::geometry::PageSize;
use image::RgbImage;

/// A rasterised page, alpha already discarded.
#[derive(Debug, Clone)]
pub struct PageRaster {
    /// 1-indexed page number.
    pub page_num: usize,
    pub image: RgbImage,
    /// The page's size in points.
    pub size: PageSize,
}

impl PageRaster {
    pub fn new(page_num: usize, image: RgbImage, size: PageSize) -> Self {
        Self {
            page_num,
            image,
            size,
        }
    }
}
