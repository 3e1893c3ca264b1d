//! Streaming PresentationML (.pptx) writer.
//!
//! A .pptx file is an OPC package: a ZIP of XML parts tied together by
//! relationship parts. Slides are written the moment they are added, their
//! pictures alongside them, so a long document never holds more than one
//! slide's worth of media in memory. The parts that enumerate slides
//! (presentation, content types, app properties) are written by
//! [`PptxWriter::finish`].
//!
//! ```text
//! [Content_Types].xml
//! _rels/.rels
//! docProps/{core,app}.xml
//! ppt/presentation.xml            + _rels
//! ppt/slideMasters/slideMaster1.xml + _rels
//! ppt/slideLayouts/slideLayout1.xml + _rels   (blank)
//! ppt/theme/theme1.xml
//! ppt/slides/slideN.xml           + _rels
//! ppt/media/imageK.png
//! ```

use super::{Picture, Slide, StyledRun, TextBox};
use crate::error::Pdf2PptxError;
use crate::geometry::{points_to_emu, PageSize, PointBox};
use std::fmt::Write as _;
use std::io::{Seek, Write};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Smallest slide side PowerPoint accepts (1 inch).
pub const MIN_SLIDE_EMU: i64 = 914_400;
/// Largest slide side PowerPoint accepts (56 inches).
pub const MAX_SLIDE_EMU: i64 = 51_206_400;

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Document properties written to `docProps/core.xml`.
#[derive(Debug, Clone, Default)]
pub struct DeckProperties {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
}

/// Writes a deck slide by slide into any `Write + Seek` sink.
pub struct PptxWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    slide_cx: i64,
    slide_cy: i64,
    slides: usize,
    media: usize,
    properties: DeckProperties,
}

impl<W: Write + Seek> PptxWriter<W> {
    /// Start a package whose slides measure `size`.
    ///
    /// Sizes outside PowerPoint's 1–56 inch range are clamped.
    pub fn new(out: W, size: PageSize) -> Result<Self, Pdf2PptxError> {
        let (slide_cx, slide_cy) = slide_extent(size);
        debug!("Deck slide size: {} × {} EMU", slide_cx, slide_cy);
        Ok(Self {
            zip: ZipWriter::new(out),
            slide_cx,
            slide_cy,
            slides: 0,
            media: 0,
            properties: DeckProperties::default(),
        })
    }

    pub fn set_properties(&mut self, properties: DeckProperties) {
        self.properties = properties;
    }

    /// Slides written so far.
    pub fn slide_count(&self) -> usize {
        self.slides
    }

    /// Slide size in EMU, after clamping.
    pub fn slide_extent(&self) -> (i64, i64) {
        (self.slide_cx, self.slide_cy)
    }

    /// Append `slide`; returns its 1-indexed position.
    pub fn add_slide(&mut self, slide: &Slide) -> Result<usize, Pdf2PptxError> {
        let index = self.slides + 1;

        // rId1 is the layout; pictures follow in order.
        let mut rels = Vec::with_capacity(slide.pictures.len());
        for picture in &slide.pictures {
            self.media += 1;
            let name = format!("image{}.png", self.media);
            self.put(&format!("ppt/media/{name}"), &picture.png, stored())?;
            rels.push(name);
        }

        let xml = slide_xml(slide);
        self.put(&format!("ppt/slides/slide{index}.xml"), xml.as_bytes(), deflated())?;

        let mut rel_xml = relationships_open();
        push_rel(&mut rel_xml, 1, "slideLayout", "../slideLayouts/slideLayout1.xml");
        for (i, name) in rels.iter().enumerate() {
            push_rel(&mut rel_xml, i + 2, "image", &format!("../media/{name}"));
        }
        rel_xml.push_str("</Relationships>");
        self.put(
            &format!("ppt/slides/_rels/slide{index}.xml.rels"),
            rel_xml.as_bytes(),
            deflated(),
        )?;

        self.slides = index;
        debug!(
            "Wrote slide {} ({} pictures, {} text boxes)",
            index,
            slide.pictures.len(),
            slide.text_boxes.len()
        );
        Ok(index)
    }

    /// Write the shared parts and close the package.
    pub fn finish(mut self) -> Result<W, Pdf2PptxError> {
        let parts: [(&str, String); 11] = [
            ("[Content_Types].xml", content_types_xml(self.slides)),
            ("_rels/.rels", ROOT_RELS.to_string()),
            ("docProps/core.xml", core_xml(&self.properties)),
            ("docProps/app.xml", app_xml(self.slides)),
            (
                "ppt/presentation.xml",
                presentation_xml(self.slides, self.slide_cx, self.slide_cy),
            ),
            ("ppt/_rels/presentation.xml.rels", presentation_rels(self.slides)),
            ("ppt/slideMasters/slideMaster1.xml", slide_master_xml()),
            ("ppt/slideMasters/_rels/slideMaster1.xml.rels", MASTER_RELS.to_string()),
            ("ppt/slideLayouts/slideLayout1.xml", slide_layout_xml()),
            ("ppt/slideLayouts/_rels/slideLayout1.xml.rels", LAYOUT_RELS.to_string()),
            ("ppt/theme/theme1.xml", THEME_XML.to_string()),
        ];
        for (name, xml) in &parts {
            self.put(name, xml.as_bytes(), deflated())?;
        }
        let out = self.zip.finish()?;
        debug!("Deck packaged: {} slides, {} media", self.slides, self.media);
        Ok(out)
    }

    fn put(&mut self, name: &str, bytes: &[u8], options: SimpleFileOptions) -> Result<(), Pdf2PptxError> {
        self.zip.start_file(name, options)?;
        self.zip
            .write_all(bytes)
            .map_err(|e| Pdf2PptxError::DeckWriteFailed(format!("{name}: {e}")))
    }
}

fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

// PNG is already compressed.
fn stored() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
}

fn slide_extent(size: PageSize) -> (i64, i64) {
    let clamp = |pt: f32, axis: &str| {
        let emu = if pt.is_finite() { points_to_emu(pt) } else { 0 };
        let clamped = emu.clamp(MIN_SLIDE_EMU, MAX_SLIDE_EMU);
        if clamped != emu {
            warn!(
                "Slide {} {} EMU outside PowerPoint's range, using {}",
                axis, emu, clamped
            );
        }
        clamped
    };
    (clamp(size.width_pt, "width"), clamp(size.height_pt, "height"))
}

// ── Slide parts ──────────────────────────────────────────────────────────

fn slide_xml(slide: &Slide) -> String {
    let mut xml = String::with_capacity(4096);
    let _ = write!(
        xml,
        r#"{XML_DECL}<p:sld xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:cSld>"#
    );
    let _ = write!(
        xml,
        r#"<p:bg><p:bgPr><a:solidFill><a:srgbClr val="{}"/></a:solidFill><a:effectLst/></p:bgPr></p:bg>"#,
        slide.background.to_hex()
    );
    xml.push_str("<p:spTree>");
    push_group_header(&mut xml);

    // id 1 is the tree itself.
    let mut shape_id = 2;
    for (i, picture) in slide.pictures.iter().enumerate() {
        push_picture(&mut xml, shape_id, i + 2, picture);
        shape_id += 1;
    }
    for text_box in &slide.text_boxes {
        push_text_box(&mut xml, shape_id, text_box);
        shape_id += 1;
    }

    xml.push_str("</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>");
    xml
}

fn push_group_header(xml: &mut String) {
    xml.push_str(
        r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#,
    );
}

fn push_xfrm(xml: &mut String, frame: &PointBox) {
    let _ = write!(
        xml,
        r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
        points_to_emu(frame.x),
        points_to_emu(frame.y),
        points_to_emu(frame.w).max(0),
        points_to_emu(frame.h).max(0)
    );
}

fn push_picture(xml: &mut String, id: usize, rel: usize, picture: &Picture) {
    let _ = write!(
        xml,
        r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="Picture {id}"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId{rel}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>"#
    );
    push_xfrm(xml, &picture.frame);
    xml.push_str(r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#);
}

fn push_text_box(xml: &mut String, id: usize, text_box: &TextBox) {
    let _ = write!(
        xml,
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr>"#
    );
    push_xfrm(xml, &text_box.frame);
    xml.push_str(
        r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr><p:txBody><a:bodyPr wrap="none" lIns="0" tIns="0" rIns="0" bIns="0" rtlCol="0" anchor="t"><a:noAutofit/></a:bodyPr><a:lstStyle/><a:p>"#,
    );
    for run in &text_box.runs {
        push_run(xml, run);
    }
    if let Some(last) = text_box.runs.last() {
        xml.push_str("<a:endParaRPr");
        push_run_attrs(xml, last);
        xml.push_str("/>");
    }
    xml.push_str("</a:p></p:txBody></p:sp>");
}

/// A run; each line break inside it becomes `<a:br/>`.
fn push_run(xml: &mut String, run: &StyledRun) {
    let text = run.text.replace("\r\n", "\n");
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            xml.push_str("<a:br>");
            push_run_props(xml, run);
            xml.push_str("</a:br>");
        }
        if line.is_empty() {
            continue;
        }
        xml.push_str("<a:r>");
        push_run_props(xml, run);
        let _ = write!(xml, "<a:t>{}</a:t></a:r>", escape_xml(line));
    }
}

fn push_run_attrs(xml: &mut String, run: &StyledRun) {
    let sz = (run.size_pt.clamp(1.0, 4000.0) * 100.0).round() as u32;
    let _ = write!(
        xml,
        r#" lang="en-US" sz="{}" b="{}" dirty="0""#,
        sz,
        u8::from(run.bold)
    );
}

fn push_run_props(xml: &mut String, run: &StyledRun) {
    xml.push_str("<a:rPr");
    push_run_attrs(xml, run);
    let face = escape_xml(run.font.typeface());
    let _ = write!(
        xml,
        r#"><a:solidFill><a:srgbClr val="{}"/></a:solidFill><a:latin typeface="{face}"/><a:ea typeface="{face}"/></a:rPr>"#,
        run.color.to_hex()
    );
}

/// Escape XML special characters and drop characters XML 1.0 cannot carry.
fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if c < '\u{20}' || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
    out
}

// ── Relationships ────────────────────────────────────────────────────────

fn relationships_open() -> String {
    format!(r#"{XML_DECL}<Relationships xmlns="{NS_REL}">"#)
}

fn push_rel(xml: &mut String, id: usize, kind: &str, target: &str) {
    let _ = write!(
        xml,
        r#"<Relationship Id="rId{id}" Type="{REL_BASE}/{kind}" Target="{target}"/>"#
    );
}

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/></Relationships>"#;

const MASTER_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme" Target="../theme/theme1.xml"/></Relationships>"#;

const LAYOUT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="../slideMasters/slideMaster1.xml"/></Relationships>"#;

/// rId1 master, rId2 theme, rId3.. slides.
fn presentation_rels(slides: usize) -> String {
    let mut xml = relationships_open();
    push_rel(&mut xml, 1, "slideMaster", "slideMasters/slideMaster1.xml");
    push_rel(&mut xml, 2, "theme", "theme/theme1.xml");
    for i in 1..=slides {
        push_rel(&mut xml, i + 2, "slide", &format!("slides/slide{i}.xml"));
    }
    xml.push_str("</Relationships>");
    xml
}

// ── Package parts ────────────────────────────────────────────────────────

fn content_types_xml(slides: usize) -> String {
    const CT: &str = "application/vnd.openxmlformats-officedocument";
    let mut xml = format!(
        r#"{XML_DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/>"#
    );
    let mut over = |part: &str, ty: String| {
        let _ = write!(xml, r#"<Override PartName="{part}" ContentType="{ty}"/>"#);
    };
    over("/ppt/presentation.xml", format!("{CT}.presentationml.presentation.main+xml"));
    over("/ppt/slideMasters/slideMaster1.xml", format!("{CT}.presentationml.slideMaster+xml"));
    over("/ppt/slideLayouts/slideLayout1.xml", format!("{CT}.presentationml.slideLayout+xml"));
    over("/ppt/theme/theme1.xml", format!("{CT}.theme+xml"));
    for i in 1..=slides {
        over(&format!("/ppt/slides/slide{i}.xml"), format!("{CT}.presentationml.slide+xml"));
    }
    over(
        "/docProps/core.xml",
        "application/vnd.openxmlformats-package.core-properties+xml".to_string(),
    );
    over("/docProps/app.xml", format!("{CT}.extended-properties+xml"));
    xml.push_str("</Types>");
    xml
}

fn presentation_xml(slides: usize, cx: i64, cy: i64) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<p:presentation xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}" saveSubsetFonts="1"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#
    );
    if slides > 0 {
        xml.push_str("<p:sldIdLst>");
        for i in 1..=slides {
            let _ = write!(xml, r#"<p:sldId id="{}" r:id="rId{}"/>"#, 255 + i, i + 2);
        }
        xml.push_str("</p:sldIdLst>");
    }
    let _ = write!(
        xml,
        r#"<p:sldSz cx="{cx}" cy="{cy}"/><p:notesSz cx="6858000" cy="9144000"/><p:defaultTextStyle/></p:presentation>"#
    );
    xml
}

fn slide_master_xml() -> String {
    let mut xml = format!(
        r#"{XML_DECL}<p:sldMaster xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg><p:spTree>"#
    );
    push_group_header(&mut xml);
    xml.push_str(
        r#"</p:spTree></p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst><p:txStyles><p:titleStyle/><p:bodyStyle/><p:otherStyle/></p:txStyles></p:sldMaster>"#,
    );
    xml
}

fn slide_layout_xml() -> String {
    let mut xml = format!(
        r#"{XML_DECL}<p:sldLayout xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}" type="blank" preserve="1"><p:cSld name="Blank"><p:spTree>"#
    );
    push_group_header(&mut xml);
    xml.push_str(r#"</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#);
    xml
}

fn core_xml(props: &DeckProperties) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#
    );
    if let Some(title) = &props.title {
        let _ = write!(xml, "<dc:title>{}</dc:title>", escape_xml(title));
    }
    if let Some(subject) = &props.subject {
        let _ = write!(xml, "<dc:subject>{}</dc:subject>", escape_xml(subject));
    }
    if let Some(author) = &props.author {
        let _ = write!(xml, "<dc:creator>{}</dc:creator>", escape_xml(author));
    }
    xml.push_str("</cp:coreProperties>");
    xml
}

fn app_xml(slides: usize) -> String {
    format!(
        r#"{XML_DECL}<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><Application>{}</Application><Slides>{slides}</Slides><AppVersion>{}</AppVersion></Properties>"#,
        env!("CARGO_PKG_NAME"),
        app_version()
    )
}

/// `AppVersion` must look like `XX.YYYY`.
fn app_version() -> String {
    let major: u32 = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
    let minor: u32 = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);
    format!("{major:02}.{minor:04}")
}

const THEME_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements><a:clrScheme name="Office"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="44546A"/></a:dk2><a:lt2><a:srgbClr val="E7E6E6"/></a:lt2><a:accent1><a:srgbClr val="4472C4"/></a:accent1><a:accent2><a:srgbClr val="ED7D31"/></a:accent2><a:accent3><a:srgbClr val="A5A5A5"/></a:accent3><a:accent4><a:srgbClr val="FFC000"/></a:accent4><a:accent5><a:srgbClr val="5B9BD5"/></a:accent5><a:accent6><a:srgbClr val="70AD47"/></a:accent6><a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink></a:clrScheme><a:fontScheme name="Office"><a:majorFont><a:latin typeface="Roboto"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Roboto"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="Office"><a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst><a:lnStyleLst><a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst><a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst><a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#;
