//! Graphic region extraction by background subtraction.
//!
//! ```text
//!  raster ─absdiff(bg)─▶ luma ─threshold─▶ mask ─close─▶ contours
//!                                                          │
//!                     outer, area ≥ floor, not text-owned ◀┘
//!                                   │
//!                        RGBA crop, mask as alpha
//! ```
//!
//! Everything here works in raster pixels. Text boxes arrive already mapped
//! to pixels; the caller maps regions back to points.

use crate::config::ReconstructionParams;
use crate::geometry::PixelBox;
use crate::layout::RgbColor;
use image::{GrayImage, Luma, Rgba, RgbImage, RgbaImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;
use tracing::{debug, warn};

/// A non-text element cut out of the page raster.
#[derive(Debug, Clone)]
pub struct GraphicRegion {
    /// Bounding box in raster pixels.
    pub bbox: PixelBox,
    /// Area enclosed by the region's outer contour, in square pixels.
    pub area: f64,
    /// The region's pixels; background pixels are fully transparent.
    pub image: RgbaImage,
}

/// Binary foreground mask: 255 where a pixel differs from `background` by more
/// than `threshold` in luma, 0 elsewhere.
pub fn foreground_mask(image: &RgbImage, background: RgbColor, threshold: u8) -> GrayImage {
    let bg = [background.r, background.g, background.b];
    let threshold = u32::from(threshold);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        let d = |c: usize| u32::from(p[c].abs_diff(bg[c]));
        // ITU-R BT.601 luma, rounded.
        let luma = (299 * d(0) + 587 * d(1) + 114 * d(2) + 500) / 1000;
        Luma([if luma > threshold { 255 } else { 0 }])
    })
}

/// Extract graphic regions from a page raster.
///
/// `text_boxes` are the page's text blocks in pixel space. A candidate whose
/// bounding box is covered by any of them beyond
/// [`ReconstructionParams::text_overlap_ratio`] belongs to the text and is
/// dropped. Regions are returned in contour discovery order (top-to-bottom,
/// then left-to-right by their first pixel).
pub fn extract_regions(
    image: &RgbImage,
    background: RgbColor,
    text_boxes: &[PixelBox],
    params: &ReconstructionParams,
) -> Vec<GraphicRegion> {
    if image.width() == 0 || image.height() == 0 {
        return Vec::new();
    }

    let mut mask = foreground_mask(image, background, params.diff_threshold);
    let radius = params.closing_kernel / 2;
    if radius > 0 {
        mask = close(&mask, Norm::LInf, radius);
    }

    let contours: Vec<Contour<u32>> = find_contours(&mask);
    let mut regions = Vec::new();
    for contour in contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
    {
        let area = polygon_area(&contour.points);
        if area < params.min_region_area {
            continue;
        }
        let Some(bbox) = bounding_box(&contour.points) else {
            continue;
        };
        if let Some(text) = text_boxes
            .iter()
            .find(|t| bbox.overlap_fraction(t) > params.text_overlap_ratio)
        {
            debug!(
                "Region {:?} is text-owned ({:.0}% covered by {:?})",
                bbox,
                bbox.overlap_fraction(text) * 100.0,
                text
            );
            continue;
        }
        regions.push(GraphicRegion {
            bbox,
            area,
            image: crop_with_alpha(image, &mask, bbox),
        });
    }

    debug!(
        "Graphic extraction: {} contours → {} regions",
        contours.len(),
        regions.len()
    );
    regions
}

/// Like [`extract_regions`] but starting from an encoded raster.
///
/// A raster that cannot be decoded yields no regions.
pub fn extract_regions_from_encoded(
    bytes: &[u8],
    background: RgbColor,
    text_boxes: &[PixelBox],
    params: &ReconstructionParams,
) -> Vec<GraphicRegion> {
    match image::load_from_memory(bytes) {
        Ok(img) => extract_regions(&img.to_rgb8(), background, text_boxes, params),
        Err(e) => {
            warn!("Cannot decode page raster, skipping graphics: {}", e);
            Vec::new()
        }
    }
}

/// Copy `bbox` out of `image`, using the matching part of `mask` as alpha.
fn crop_with_alpha(image: &RgbImage, mask: &GrayImage, bbox: PixelBox) -> RgbaImage {
    RgbaImage::from_fn(bbox.w, bbox.h, |x, y| {
        let (sx, sy) = (bbox.x + x, bbox.y + y);
        let p = image.get_pixel(sx, sy);
        Rgba([p[0], p[1], p[2], mask.get_pixel(sx, sy)[0]])
    })
}

/// Inclusive pixel bounds of a contour.
fn bounding_box(points: &[imageproc::point::Point<u32>]) -> Option<PixelBox> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    Some(PixelBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Shoelace area of the polygon traced by the contour's pixel centres.
fn polygon_area(points: &[imageproc::point::Point<u32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice += i64::from(p.x) * i64::from(q.y) - i64::from(q.x) * i64::from(p.y);
    }
    twice.unsigned_abs() as f64 / 2.0
}
