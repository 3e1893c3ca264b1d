//! Slide assembly: background, pictures, then text.

use super::background::estimate_background;
use super::graphics::{extract_regions, GraphicRegion};
use super::runs::compose_runs;
use super::PageRaster;
use crate::config::ReconstructionParams;
use crate::deck::pptx::DeckProperties;
use crate::deck::{Picture, PptxWriter, Slide, StyledRun, TextBox};
use crate::error::{PageError, Pdf2PptxError};
use crate::geometry::{PageGeometry, PageSize, PixelBox, EMU_PER_POINT};
use crate::layout::{PageLayout, RgbColor};
use crate::progress::ProgressTracker;
use image::ImageFormat;
use std::io::{Cursor, Seek, Write};
use std::sync::Arc;
use tracing::{debug, warn};

/// What went onto one slide.
#[derive(Debug, Clone, Default)]
pub struct SlideSummary {
    pub page_num: usize,
    pub text_boxes: usize,
    pub pictures: usize,
    /// Pictures that could not be placed.
    pub errors: Vec<PageError>,
}

/// Reconstruct one page as a slide measuring `slide_size`.
///
/// The page is stretched onto the slide whatever its own size, so every
/// slide of a deck shares one coordinate space. Never fails: a graphic that
/// cannot be placed is reported and left out, and every block of `layout`
/// with text becomes a text box.
pub fn reconstruct_slide(
    raster: &PageRaster,
    layout: &PageLayout,
    slide_size: PageSize,
    params: &ReconstructionParams,
) -> (Slide, Vec<PageError>) {
    let page_num = raster.page_num;
    let image = &raster.image;
    if raster.size != slide_size {
        debug!(
            "Page {}: {}x{} pt page mapped onto {}x{} pt slide",
            page_num,
            raster.size.width_pt,
            raster.size.height_pt,
            slide_size.width_pt,
            slide_size.height_pt
        );
    }
    let geometry = PageGeometry::new(image.width(), image.height(), slide_size);
    let background = estimate_background(image, params.corner_inset);

    // Every block's box masks text, including blocks with no text.
    let text_px: Vec<PixelBox> = layout
        .blocks
        .iter()
        .map(|b| geometry.norm_to_pixels(&b.bbox))
        .collect();
    let regions = extract_regions(image, background, &text_px, params);

    build_slide(&geometry, page_num, background, regions, layout, params)
}

/// Place already-extracted `regions` and the layout's text on a fresh slide.
fn build_slide(
    geometry: &PageGeometry,
    page_num: usize,
    background: RgbColor,
    regions: Vec<GraphicRegion>,
    layout: &PageLayout,
    params: &ReconstructionParams,
) -> (Slide, Vec<PageError>) {
    let mut slide = Slide::new(background);
    let mut errors = Vec::new();

    place_pictures(geometry, page_num, regions, &mut slide, &mut errors);

    for block in &layout.blocks {
        if block.text.is_empty() {
            continue;
        }
        let frame = geometry.norm_to_points(&block.bbox).with_min_size(
            params.min_box_pt,
            params.fallback_box_width_pt,
            params.fallback_box_height_pt,
        );
        let size_pt = if block.font_size_pt.is_finite() && block.font_size_pt > 0.0 {
            block.font_size_pt
        } else {
            params.default_font_size_pt
        };
        let runs = compose_runs(&block.text, &block.colors, params.default_text_color)
            .into_iter()
            .map(|run| StyledRun {
                text: run.text,
                font: block.font_family,
                size_pt,
                bold: block.is_bold,
                color: run.color,
            })
            .collect();
        slide.text_boxes.push(TextBox { frame, runs });
    }

    debug!(
        "Page {}: background #{}, {} pictures, {} text boxes",
        page_num,
        background.to_hex(),
        slide.pictures.len(),
        slide.text_boxes.len()
    );
    (slide, errors)
}

/// Add each region to `slide` as a picture; a region that cannot be encoded
/// is skipped and recorded in `errors`.
fn place_pictures(
    geometry: &PageGeometry,
    page_num: usize,
    regions: Vec<GraphicRegion>,
    slide: &mut Slide,
    errors: &mut Vec<PageError>,
) {
    for region in regions {
        match place_picture(geometry, &region) {
            Ok(picture) => slide.pictures.push(picture),
            Err(detail) => {
                warn!(
                    "Page {}: skipping picture at ({},{}): {}",
                    page_num, region.bbox.x, region.bbox.y, detail
                );
                errors.push(PageError::PictureSkipped {
                    page: page_num,
                    x: region.bbox.x,
                    y: region.bbox.y,
                    detail,
                });
            }
        }
    }
}

fn place_picture(geometry: &PageGeometry, region: &GraphicRegion) -> Result<Picture, String> {
    let (w, h) = region.image.dimensions();
    if w == 0 || h == 0 {
        return Err("zero-size image".into());
    }
    let mut png = Vec::new();
    region
        .image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(Picture {
        frame: geometry.pixels_to_points(&region.bbox),
        png,
    })
}

/// Builds the deck page by page, in order.
///
/// Owns the output package for the whole conversion; nothing else writes to
/// it. Each call to [`add_page`](Self::add_page) consumes the page raster, so
/// at most one raster is alive at a time.
pub struct SlideAssembler<W: Write + Seek> {
    writer: PptxWriter<W>,
    slide_size: PageSize,
    params: ReconstructionParams,
    progress: Arc<ProgressTracker>,
    pages_done: usize,
}

impl<W: Write + Seek> SlideAssembler<W> {
    /// Start a deck whose slides are `slide_size`.
    ///
    /// Every page is mapped onto the slide size the writer settles on, after
    /// clamping, so nothing lands off a slide.
    pub fn new(
        out: W,
        slide_size: PageSize,
        params: ReconstructionParams,
        progress: Arc<ProgressTracker>,
    ) -> Result<Self, Pdf2PptxError> {
        let writer = PptxWriter::new(out, slide_size)?;
        let (cx, cy) = writer.slide_extent();
        let slide_size = PageSize::new(
            (cx as f64 / EMU_PER_POINT) as f32,
            (cy as f64 / EMU_PER_POINT) as f32,
        );
        Ok(Self {
            writer,
            slide_size,
            params,
            progress,
            pages_done: 0,
        })
    }

    /// Reconstruct `raster` with `layout` and append it as the next slide.
    pub fn add_page(
        &mut self,
        raster: PageRaster,
        layout: &PageLayout,
    ) -> Result<SlideSummary, Pdf2PptxError> {
        let page_num = raster.page_num;
        let (slide, errors) = reconstruct_slide(&raster, layout, self.slide_size, &self.params);
        drop(raster);

        self.writer.add_slide(&slide)?;
        self.pages_done += 1;
        self.progress.page_done(self.pages_done);

        Ok(SlideSummary {
            page_num,
            text_boxes: slide.text_boxes.len(),
            pictures: slide.pictures.len(),
            errors,
        })
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn set_properties(&mut self, properties: DeckProperties) {
        self.writer.set_properties(properties);
    }

    /// Slide size in points every page is mapped onto.
    pub fn slide_size(&self) -> PageSize {
        self.slide_size
    }

    pub fn pages_done(&self) -> usize {
        self.pages_done
    }

    /// Write the package's shared parts and return the underlying writer.
    pub fn finish(self) -> Result<W, Pdf2PptxError> {
        let out = self.writer.finish()?;
        self.progress.packaged();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ColorRange, NormBox, TextBlock};
    use image::{Rgb, RgbImage, RgbaImage};

    const SLIDE: PageSize = PageSize {
        width_pt: 720.0,
        height_pt: 540.0,
    };

    fn raster(image: RgbImage) -> PageRaster {
        PageRaster::new(1, image, SLIDE)
    }

    #[test]
    fn empty_layout_on_blank_page() {
        let r = raster(RgbImage::from_pixel(200, 150, Rgb([30, 60, 90])));
        let (slide, errors) = reconstruct_slide(&r, &PageLayout::default(), SLIDE, &Default::default());
        assert_eq!(slide.background, RgbColor::new(30, 60, 90));
        assert!(slide.pictures.is_empty());
        assert!(slide.text_boxes.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn text_box_is_mapped_to_points() {
        let r = raster(RgbImage::from_pixel(200, 150, Rgb([255, 255, 255])));
        let mut block = TextBlock::new("Hello", NormBox::clamped(100.0, 200.0, 500.0, 100.0));
        block.font_size_pt = 28.0;
        block.is_bold = true;
        let layout = PageLayout {
            replace_all: true,
            blocks: vec![block],
        };
        let (slide, _) = reconstruct_slide(&r, &layout, SLIDE, &Default::default());
        let tb = &slide.text_boxes[0];
        assert!((tb.frame.x - 72.0).abs() < 1e-3);
        assert!((tb.frame.y - 108.0).abs() < 1e-3);
        assert!((tb.frame.w - 360.0).abs() < 1e-3);
        assert!((tb.frame.h - 54.0).abs() < 1e-3);
        assert_eq!(tb.runs.len(), 1);
        assert!(tb.runs[0].bold);
        assert_eq!(tb.runs[0].size_pt, 28.0);
    }

    #[test]
    fn degenerate_box_gets_fallback_size() {
        let r = raster(RgbImage::from_pixel(200, 150, Rgb([255, 255, 255])));
        let layout = PageLayout {
            replace_all: true,
            blocks: vec![TextBlock::new("x", NormBox::clamped(10.0, 10.0, 0.0, 0.0))],
        };
        let (slide, _) = reconstruct_slide(&r, &layout, SLIDE, &Default::default());
        let frame = slide.text_boxes[0].frame;
        assert_eq!((frame.w, frame.h), (50.0, 30.0));
    }

    #[test]
    fn unusable_font_size_falls_back() {
        let r = raster(RgbImage::from_pixel(100, 100, Rgb([255, 255, 255])));
        let mut block = TextBlock::new("x", NormBox::clamped(0.0, 0.0, 500.0, 100.0));
        block.font_size_pt = f32::NAN;
        let layout = PageLayout {
            replace_all: true,
            blocks: vec![block],
        };
        let params = ReconstructionParams {
            default_font_size_pt: 18.0,
            ..Default::default()
        };
        let (slide, _) = reconstruct_slide(&r, &layout, SLIDE, &params);
        assert_eq!(slide.text_boxes[0].runs[0].size_pt, 18.0);
    }

    #[test]
    fn runs_inherit_block_style() {
        let r = raster(RgbImage::from_pixel(100, 100, Rgb([255, 255, 255])));
        let mut block = TextBlock::new("AB", NormBox::clamped(0.0, 0.0, 500.0, 100.0));
        block.font_family = crate::layout::FontFamily::Montserrat;
        block.colors = vec![ColorRange {
            start: 0,
            end: 1,
            rgb: RgbColor::new(255, 0, 0),
        }];
        let layout = PageLayout {
            replace_all: true,
            blocks: vec![block],
        };
        let (slide, _) = reconstruct_slide(&r, &layout, SLIDE, &Default::default());
        let runs = &slide.text_boxes[0].runs;
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].color, RgbColor::new(255, 0, 0));
        assert_eq!(runs[1].color, RgbColor::BLACK);
        assert!(runs
            .iter()
            .all(|r| r.font == crate::layout::FontFamily::Montserrat));
    }

    #[test]
    fn picture_is_placed_in_points() {
        let mut img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
        for y in 100..200 {
            for x in 200..300 {
                img.put_pixel(x, y, Rgb([0, 0, 255]));
            }
        }
        // 400 px ↔ 720 pt: 1.8 pt per pixel.
        let (slide, errors) = reconstruct_slide(&raster(img), &PageLayout::default(), SLIDE, &Default::default());
        assert!(errors.is_empty());
        assert_eq!(slide.pictures.len(), 1);
        let frame = slide.pictures[0].frame;
        assert!((frame.x - 360.0).abs() < 1e-3);
        assert!((frame.y - 180.0).abs() < 1e-3);
        assert!((frame.w - 180.0).abs() < 1e-3);
        assert!(slide.pictures[0].png.starts_with(b"\x89PNG"));
    }

    #[test]
    fn assembler_advances_progress_per_page() {
        let mut asm = SlideAssembler::new(
            Cursor::new(Vec::new()),
            PageSize::new(720.0, 540.0),
            ReconstructionParams::default(),
            Arc::new(ProgressTracker::noop(2)),
        )
        .unwrap();
        let blank = || RgbImage::from_pixel(50, 50, Rgb([255, 255, 255]));
        asm.add_page(PageRaster::new(1, blank(), PageSize::new(720.0, 540.0)), &PageLayout::default())
            .unwrap();
        assert_eq!(asm.progress().percent(), 50);
        let summary = asm
            .add_page(PageRaster::new(2, blank(), PageSize::new(720.0, 540.0)), &PageLayout::default())
            .unwrap();
        assert_eq!(summary.page_num, 2);
        assert_eq!(asm.pages_done(), 2);
        assert_eq!(asm.progress().percent(), 95);
        let out = asm.finish().unwrap();
        assert!(!out.into_inner().is_empty());
    }

    #[test]
    fn landscape_page_is_mapped_onto_portrait_slide() {
        let portrait = PageSize::LETTER;
        let landscape = PageRaster::new(
            2,
            RgbImage::from_pixel(792, 612, Rgb([255, 255, 255])),
            PageSize::new(792.0, 612.0),
        );
        let layout = PageLayout {
            replace_all: true,
            blocks: vec![TextBlock::new("Edge", NormBox::clamped(900.0, 0.0, 100.0, 100.0))],
        };
        let (slide, _) = reconstruct_slide(&landscape, &layout, portrait, &Default::default());
        let frame = slide.text_boxes[0].frame;
        assert!((frame.x - 550.8).abs() < 1e-3);
        assert!((frame.w - 61.2).abs() < 1e-3);
        assert!(frame.x + frame.w <= portrait.width_pt + 1e-3);
        assert!(frame.y + frame.h <= portrait.height_pt + 1e-3);
    }

    #[test]
    fn assembler_maps_every_page_to_the_first_page_size() {
        let mut asm = SlideAssembler::new(
            Cursor::new(Vec::new()),
            PageSize::LETTER,
            ReconstructionParams::default(),
            Arc::new(ProgressTracker::noop(1)),
        )
        .unwrap();
        assert_eq!(asm.slide_size(), PageSize::LETTER);

        let mut img = RgbImage::from_pixel(792, 612, Rgb([255, 255, 255]));
        for y in 500..560 {
            for x in 700..760 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let raster = PageRaster::new(1, img, PageSize::new(792.0, 612.0));
        let geometry = PageGeometry::new(792, 612, asm.slide_size());
        let (slide, _) = reconstruct_slide(
            &raster,
            &PageLayout::default(),
            asm.slide_size(),
            &Default::default(),
        );
        let pic = slide.pictures[0].frame;
        assert!(pic.x + pic.w <= 612.0 + 1e-3);
        assert!(pic.y + pic.h <= 792.0 + 1e-3);
        assert_eq!(pic, geometry.pixels_to_points(&PixelBox::new(700, 500, 60, 60)));

        asm.add_page(raster, &PageLayout::default()).unwrap();
        assert_eq!(asm.pages_done(), 1);
    }

    #[test]
    fn out_of_range_slide_size_is_mapped_after_clamping() {
        let asm = SlideAssembler::new(
            Cursor::new(Vec::new()),
            PageSize::new(10.0, 540.0),
            ReconstructionParams::default(),
            Arc::new(ProgressTracker::noop(1)),
        )
        .unwrap();
        // One inch is the narrowest slide.
        assert_eq!(asm.slide_size(), PageSize::new(72.0, 540.0));
    }

    #[test]
    fn empty_text_block_still_masks_its_area() {
        let mut img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
        for y in 100..150 {
            for x in 100..150 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let layout =
            PageLayout::from_json_str(r#"{"blocks": [{"text": "", "bbox_1000": [250, 333, 125, 167]}]}"#)
                .unwrap();
        assert_eq!(layout.blocks.len(), 1);

        let (slide, errors) = reconstruct_slide(&raster(img), &layout, SLIDE, &Default::default());
        assert!(slide.pictures.is_empty());
        assert!(slide.text_boxes.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn unplaceable_picture_is_skipped_and_text_kept() {
        let geometry = PageGeometry::new(200, 150, SLIDE);
        let regions = vec![
            GraphicRegion {
                bbox: PixelBox::new(5, 6, 0, 0),
                area: 0.0,
                image: RgbaImage::new(0, 0),
            },
            GraphicRegion {
                bbox: PixelBox::new(100, 50, 20, 10),
                area: 200.0,
                image: RgbaImage::from_pixel(20, 10, image::Rgba([0, 0, 255, 255])),
            },
        ];
        let layout = PageLayout {
            replace_all: true,
            blocks: vec![TextBlock::new("Still here", NormBox::clamped(0.0, 0.0, 500.0, 100.0))],
        };

        let (slide, errors) = build_slide(
            &geometry,
            3,
            RgbColor::WHITE,
            regions,
            &layout,
            &Default::default(),
        );
        assert_eq!(slide.pictures.len(), 1);
        assert_eq!(slide.text_boxes.len(), 1);
        assert_eq!(slide.text_boxes[0].text(), "Still here");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            PageError::PictureSkipped { page: 3, x: 5, y: 6, .. }
        ));
    }
}
