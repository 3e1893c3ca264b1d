//! Hermetic reconstruction tests.
//!
//! Synthetic page rasters go through the slide assembler into an in-memory
//! deck, which is then read back with `zip`. No pdfium library and no
//! network access are needed.
//!
//! Run with:
//!   cargo test --test reconstruction

use edgequake_pdf2pptx::geometry::{PageSize, PixelBox};
use edgequake_pdf2pptx::pipeline::analyze::{Analyzer, LayoutRecorder, RecordedLayouts};
use edgequake_pdf2pptx::progress::ProgressTracker;
use edgequake_pdf2pptx::reconstruct::extract_regions;
use edgequake_pdf2pptx::{
    ConversionProgressCallback, PageLayout, PageRaster, ReconstructionParams, RgbColor,
    SlideAssembler,
};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::io::{Cursor, Read};
use std::sync::Arc;
use zip::ZipArchive;

// ── Test helpers ─────────────────────────────────────────────────────────────

const PAGE: PageSize = PageSize {
    width_pt: 720.0,
    height_pt: 540.0,
};

fn blank_page(page_num: usize, rgb: [u8; 3]) -> PageRaster {
    PageRaster::new(page_num, RgbImage::from_pixel(1000, 750, Rgb(rgb)), PAGE)
}

fn layout(json: &str) -> PageLayout {
    PageLayout::from_json_str(json).expect("layout JSON")
}

/// Assemble one slide per `(raster, layout)` and return the package bytes.
fn build_deck(pages: Vec<(PageRaster, PageLayout)>) -> Vec<u8> {
    let tracker = Arc::new(ProgressTracker::noop(pages.len()));
    let mut asm = SlideAssembler::new(
        Cursor::new(Vec::new()),
        PAGE,
        ReconstructionParams::default(),
        tracker,
    )
    .expect("assembler");
    for (raster, layout) in pages {
        asm.add_page(raster, &layout).expect("add page");
    }
    asm.finish().expect("finish").into_inner()
}

fn read_part(deck: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(deck)).expect("zip");
    let mut part = archive.by_name(name).unwrap_or_else(|_| panic!("missing {name}"));
    let mut xml = String::new();
    part.read_to_string(&mut xml).expect("utf-8 part");
    xml
}

fn part_names(deck: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(deck)).expect("zip");
    archive.file_names().map(str::to_string).collect()
}

// ── End-to-end scenarios ─────────────────────────────────────────────────────

#[test]
fn single_block_becomes_one_black_run() {
    let page = layout(
        r#"{"replace_all": true, "blocks": [
            {"text": "Hello", "bbox_1000": [0, 0, 500, 100], "font_family": "Roboto", "colors": []}
        ]}"#,
    );
    let deck = build_deck(vec![(blank_page(1, [255, 255, 255]), page)]);
    let slide = read_part(&deck, "ppt/slides/slide1.xml");

    assert_eq!(slide.matches(r#"txBox="1""#).count(), 1);
    assert_eq!(slide.matches("<a:r>").count(), 1);
    assert!(slide.contains("<a:t>Hello</a:t>"));
    assert!(slide.contains(r#"<a:srgbClr val="000000"/>"#));
    assert!(slide.contains(r#"<a:latin typeface="Roboto"/>"#));
    assert!(slide.contains(r#"wrap="none" lIns="0" tIns="0" rIns="0" bIns="0""#));
    // 500/1000 of 720 pt, 100/1000 of 540 pt.
    assert!(slide.contains(r#"<a:ext cx="4572000" cy="685800"/>"#), "{slide}");
    assert!(!slide.contains("<p:pic>"));
}

#[test]
fn partial_colour_range_is_completed_in_black() {
    let page = layout(
        r#"{"blocks": [
            {"text": "AB", "bbox_1000": [100, 100, 300, 100],
             "colors": [{"range": [0, 1], "rgb": [255, 0, 0]}]}
        ]}"#,
    );
    let deck = build_deck(vec![(blank_page(1, [255, 255, 255]), page)]);
    let slide = read_part(&deck, "ppt/slides/slide1.xml");

    assert_eq!(slide.matches("<a:r>").count(), 2);
    let red = slide.find(r#"<a:srgbClr val="FF0000"/>"#).expect("red run");
    let a = slide.find("<a:t>A</a:t>").expect("run A");
    let black = slide.find(r#"<a:srgbClr val="000000"/>"#).expect("black run");
    let b = slide.find("<a:t>B</a:t>").expect("run B");
    assert!(red < a && a < black && black < b);
}

#[test]
fn lone_red_square_becomes_one_picture() {
    let mut img = RgbImage::from_pixel(1000, 750, Rgb([255, 255, 255]));
    for y in 600..640 {
        for x in 800..840 {
            img.put_pixel(x, y, Rgb([255, 0, 0]));
        }
    }
    let page = layout(r#"{"blocks": [{"text": "Title", "bbox_1000": [0, 0, 500, 100]}]}"#);

    let regions = extract_regions(
        &img,
        RgbColor::WHITE,
        &[PixelBox::new(0, 0, 500, 75)],
        &ReconstructionParams::default(),
    );
    assert_eq!(regions.len(), 1);
    let bbox = regions[0].bbox;
    assert_eq!((bbox.x, bbox.y, bbox.w, bbox.h), (800, 600, 40, 40));

    let deck = build_deck(vec![(PageRaster::new(1, img, PAGE), page)]);
    let slide = read_part(&deck, "ppt/slides/slide1.xml");
    assert_eq!(slide.matches("<p:pic>").count(), 1);
    // 800 px → 576 pt, 600 px → 432 pt, 40 px → 28.8 pt.
    assert!(
        slide.contains(r#"<a:off x="7315200" y="5486400"/><a:ext cx="365760" cy="365760"/>"#),
        "{slide}"
    );
    assert!(part_names(&deck).contains(&"ppt/media/image1.png".to_string()));

    let rels = read_part(&deck, "ppt/slides/_rels/slide1.xml.rels");
    assert!(rels.contains(r#"Id="rId2""#));
    assert!(rels.contains("../media/image1.png"));
}

// ── Deck-level properties ────────────────────────────────────────────────────

#[test]
fn slides_follow_page_order_and_size() {
    let pages = ["one", "two", "three"]
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let json = format!(r#"{{"blocks": [{{"text": "{text}", "bbox_1000": [10, 10, 200, 50]}}]}}"#);
            (blank_page(i + 1, [240, 240, 240]), layout(&json))
        })
        .collect();
    let deck = build_deck(pages);

    for (i, text) in ["one", "two", "three"].iter().enumerate() {
        let slide = read_part(&deck, &format!("ppt/slides/slide{}.xml", i + 1));
        assert!(slide.contains(&format!("<a:t>{text}</a:t>")));
        assert!(slide.contains(r#"<a:srgbClr val="F0F0F0"/>"#));
    }

    let presentation = read_part(&deck, "ppt/presentation.xml");
    // 720 × 540 pt at 12700 EMU/pt.
    assert!(presentation.contains(r#"<p:sldSz cx="9144000" cy="6858000"/>"#));
    assert_eq!(presentation.matches("<p:sldId ").count(), 3);

    let content_types = read_part(&deck, "[Content_Types].xml");
    assert!(content_types.contains("/ppt/slides/slide3.xml"));
}

#[test]
fn malformed_layout_still_yields_all_text() {
    let page = layout(
        r#"{"blocks": [
            {"text": "", "bbox_1000": [0, 0, 10, 10]},
            {"text": "no box"},
            {"text": "héllo wörld", "bbox_1000": [-50, 900, 2000, 500], "font_family": "Comic Sans",
             "font_size_pt": "big",
             "colors": [{"range": [8, 3], "rgb": [1, 2, 3]},
                        {"range": [6, 99], "rgb": [0, 0, 255]},
                        {"range": [0, 2], "rgb": [300, -1, 0]}]}
        ]}"#,
    );
    // The empty block keeps its box; only the box-less one is dropped.
    assert_eq!(page.blocks.len(), 2);

    let deck = build_deck(vec![(blank_page(1, [255, 255, 255]), page)]);
    let slide = read_part(&deck, "ppt/slides/slide1.xml");
    assert_eq!(slide.matches(r#"txBox="1""#).count(), 1);

    let text: String = slide
        .split("<a:t>")
        .skip(1)
        .filter_map(|s| s.split("</a:t>").next())
        .collect();
    assert_eq!(text, "héllo wörld");
}

#[test]
fn progress_is_monotonic_across_pages() {
    #[derive(Default)]
    struct Recording(Mutex<Vec<(u8, String)>>);

    impl ConversionProgressCallback for Recording {
        fn on_progress(&self, percent: u8, status: &str) {
            self.0.lock().push((percent, status.to_string()));
        }
    }

    let rec = Arc::new(Recording::default());
    let tracker = Arc::new(ProgressTracker::new(rec.clone(), 4));
    tracker.opened();
    let mut asm = SlideAssembler::new(
        Cursor::new(Vec::new()),
        PAGE,
        ReconstructionParams::default(),
        Arc::clone(&tracker),
    )
    .unwrap();
    for n in 1..=4 {
        asm.add_page(blank_page(n, [255, 255, 255]), &PageLayout::default())
            .unwrap();
    }
    asm.finish().unwrap();
    tracker.completed();

    let events = rec.0.lock();
    let percents: Vec<u8> = events.iter().map(|(p, _)| *p).collect();
    assert_eq!(percents, vec![5, 27, 50, 72, 95, 98, 100]);
    assert!(percents.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(events[0].1, "processing");
    assert_eq!(events[5].1, "generating");
    assert_eq!(events[6].1, "completed");
}

// ── Recorded layouts ─────────────────────────────────────────────────────────

#[test]
fn saved_layouts_replay_without_a_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layouts.json");

    let original = layout(
        r#"{"blocks": [{"text": "Quarterly results", "bbox_1000": [100, 80, 800, 120],
            "font_family": "Montserrat", "is_bold": true, "font_size_pt": 40,
            "colors": [{"range": [0, 9], "rgb": [20, 40, 160]}]}]}"#,
    );
    let mut recorder = LayoutRecorder::default();
    recorder.record(1, &original);
    tokio_test::block_on(recorder.save(&path)).unwrap();

    let analyzer = Analyzer::Recorded(RecordedLayouts::load(&path).unwrap());
    assert!(!analyzer.is_remote());

    let first = tokio_test::block_on(analyzer.analyze(&blank_page(1, [255, 255, 255])));
    assert!(first.error.is_none());
    assert_eq!(first.layout, original);

    let second = tokio_test::block_on(analyzer.analyze(&blank_page(2, [255, 255, 255])));
    assert!(second.error.is_none());
    assert!(second.layout.blocks.is_empty());

    let deck = build_deck(vec![
        (blank_page(1, [255, 255, 255]), first.layout),
        (blank_page(2, [255, 255, 255]), second.layout),
    ]);
    let slide1 = read_part(&deck, "ppt/slides/slide1.xml");
    assert!(slide1.contains(r#"sz="4000" b="1""#));
    assert!(slide1.contains(r#"<a:latin typeface="Montserrat"/>"#));
    assert!(slide1.contains(r#"<a:srgbClr val="1428A0"/>"#));
    let slide2 = read_part(&deck, "ppt/slides/slide2.xml");
    assert!(!slide2.contains("txBox"));
}

#[test]
fn recorded_entry_that_is_not_an_object_gets_placeholder() {
    let recorded =
        RecordedLayouts::from_value(serde_json::json!({ "page_1": "garbage" })).unwrap();
    let analysis = recorded.layout_for(1);
    assert!(analysis.error.is_some());
    assert_eq!(analysis.layout.blocks.len(), 1);
    assert!(analysis.layout.blocks[0].text.contains("Page 1"));
}
