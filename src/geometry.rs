//! Coordinate mapping between the three spaces a page lives in.
//!
//! ```text
//!  normalized (0–1000)  ──norm_to_pixels──▶  raster pixels
//!          │                                      │
//!   norm_to_points                         pixels_to_points
//!          ▼                                      ▼
//!               page units (PDF points, 1/72 in)
//! ```
//!
//! Every conversion is a single linear step; none is derived from another so
//! no rounding error accumulates. The deck's native unit is the EMU, at a
//! fixed 12 700 EMU per point.

use crate::layout::{NormBox, NORMALIZED_EXTENT};
use serde::{Deserialize, Serialize};

/// English Metric Units per PDF point.
pub const EMU_PER_POINT: f64 = 12_700.0;

/// Convert points to EMU, rounding to the nearest unit.
pub fn points_to_emu(pt: f32) -> i64 {
    (f64::from(pt) * EMU_PER_POINT).round() as i64
}

/// An axis-aligned box in raster pixels (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PixelBox {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.w) * u64::from(self.h)
    }

    /// Area shared with `other`, zero when they only touch.
    pub fn intersection_area(&self, other: &PixelBox) -> u64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);
        if x2 > x1 && y2 > y1 {
            u64::from(x2 - x1) * u64::from(y2 - y1)
        } else {
            0
        }
    }

    /// Share of this box covered by `other`, in `[0, 1]`.
    pub fn overlap_fraction(&self, other: &PixelBox) -> f64 {
        let area = self.area();
        if area == 0 {
            return 0.0;
        }
        self.intersection_area(other) as f64 / area as f64
    }
}

/// An axis-aligned box in page units (points).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl PointBox {
    /// Replace a width or height under `floor` by the fallback size so that a
    /// degenerate text box stays visible.
    pub fn with_min_size(self, floor: f32, fallback_w: f32, fallback_h: f32) -> Self {
        Self {
            w: if self.w < floor { fallback_w } else { self.w },
            h: if self.h < floor { fallback_h } else { self.h },
            ..self
        }
    }
}

/// Page size in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// US Letter, used when a document reports no usable size.
    pub const LETTER: PageSize = PageSize {
        width_pt: 612.0,
        height_pt: 792.0,
    };

    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self {
            width_pt,
            height_pt,
        }
    }
}

/// Dimensions needed to map a single page: its raster and its page size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub image_width: u32,
    pub image_height: u32,
    pub page: PageSize,
}

impl PageGeometry {
    pub fn new(image_width: u32, image_height: u32, page: PageSize) -> Self {
        Self {
            image_width,
            image_height,
            page,
        }
    }

    /// Normalized → pixels: `round(n / 1000 * image_extent)`.
    pub fn norm_to_pixels(&self, b: &NormBox) -> PixelBox {
        let sx = |v: f32| scale_round(v, self.image_width);
        let sy = |v: f32| scale_round(v, self.image_height);
        PixelBox {
            x: sx(b.x),
            y: sy(b.y),
            w: sx(b.w),
            h: sy(b.h),
        }
    }

    /// Normalized → points: `n / 1000 * page_extent`.
    pub fn norm_to_points(&self, b: &NormBox) -> PointBox {
        let kx = self.page.width_pt / NORMALIZED_EXTENT;
        let ky = self.page.height_pt / NORMALIZED_EXTENT;
        PointBox {
            x: b.x * kx,
            y: b.y * ky,
            w: b.w * kx,
            h: b.h * ky,
        }
    }

    /// Pixels → points: `px / image_extent * page_extent`.
    pub fn pixels_to_points(&self, b: &PixelBox) -> PointBox {
        let kx = if self.image_width == 0 {
            0.0
        } else {
            self.page.width_pt / self.image_width as f32
        };
        let ky = if self.image_height == 0 {
            0.0
        } else {
            self.page.height_pt / self.image_height as f32
        };
        PointBox {
            x: b.x as f32 * kx,
            y: b.y as f32 * ky,
            w: b.w as f32 * kx,
            h: b.h as f32 * ky,
        }
    }
}

fn scale_round(v: f32, extent: u32) -> u32 {
    (f64::from(v) / f64::from(NORMALIZED_EXTENT) * f64::from(extent))
        .round()
        .max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn geometry() -> PageGeometry {
        PageGeometry::new(918, 1188, PageSize::LETTER)
    }

    #[test]
    fn norm_to_pixels_rounds() {
        let g = PageGeometry::new(1001, 500, PageSize::LETTER);
        let nb = NormBox {
            x: 500.0,
            y: 500.0,
            w: 1000.0,
            h: 2.0,
        };
        // 500.5 rounds away from zero
        assert_eq!(g.norm_to_pixels(&nb), PixelBox::new(501, 250, 1001, 1));
    }

    #[test]
    fn norm_to_points_is_linear() {
        let pt = geometry().norm_to_points(&NormBox::clamped(0.0, 0.0, 500.0, 100.0));
        assert_eq!(pt.x, 0.0);
        assert!((pt.w - 306.0).abs() < 1e-3);
        assert!((pt.h - 79.2).abs() < 1e-3);
    }

    #[test]
    fn pixels_to_points_handles_empty_raster() {
        let g = PageGeometry::new(0, 0, PageSize::LETTER);
        let pt = g.pixels_to_points(&PixelBox::new(3, 4, 5, 6));
        assert_eq!(pt, PointBox::default());
    }

    #[test]
    fn min_size_replaces_each_axis_independently() {
        let b = PointBox {
            x: 1.0,
            y: 2.0,
            w: 4.0,
            h: 40.0,
        };
        let fixed = b.with_min_size(10.0, 50.0, 30.0);
        assert_eq!(fixed.w, 50.0);
        assert_eq!(fixed.h, 40.0);
        assert_eq!((fixed.x, fixed.y), (1.0, 2.0));
    }

    #[test]
    fn overlap_fraction_is_relative_to_self() {
        let a = PixelBox::new(0, 0, 10, 10);
        let b = PixelBox::new(5, 0, 100, 100);
        assert!((a.overlap_fraction(&b) - 0.5).abs() < f64::EPSILON);
        assert_eq!(a.overlap_fraction(&PixelBox::new(10, 0, 5, 5)), 0.0);
        assert_eq!(PixelBox::default().overlap_fraction(&b), 0.0);
    }

    #[test]
    fn emu_conversion() {
        assert_eq!(points_to_emu(1.0), 12_700);
        assert_eq!(points_to_emu(612.0), 7_772_400);
    }

    proptest! {
        #[test]
        fn pixel_route_matches_direct_route(
            x in 0f32..1000.0, y in 0f32..1000.0,
            w in 0f32..1000.0, h in 0f32..1000.0,
            iw in 50u32..4000, ih in 50u32..4000,
        ) {
            let g = PageGeometry::new(iw, ih, PageSize::new(842.0, 595.0));
            let nb = NormBox::clamped(x, y, w, h);
            let direct = g.norm_to_points(&nb);
            let via = g.pixels_to_points(&g.norm_to_pixels(&nb));
            // One pixel of rounding, expressed in points.
            let tol_x = 842.0 / iw as f32 * 0.5 + 1e-3;
            let tol_y = 595.0 / ih as f32 * 0.5 + 1e-3;
            prop_assert!((direct.x - via.x).abs() <= tol_x);
            prop_assert!((direct.w - via.w).abs() <= tol_x);
            prop_assert!((direct.y - via.y).abs() <= tol_y);
            prop_assert!((direct.h - via.h).abs() <= tol_y);
        }
    }
}
