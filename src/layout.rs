//! Page layout model returned by the vision service.
//!
//! The service is asked for JSON of the shape
//!
//! ```json
//! { "replace_all": true,
//!   "blocks": [ { "text": "…", "bbox_1000": [x, y, w, h],
//!                 "font_family": "Roboto", "is_bold": false,
//!                 "font_size_pt": 18,
//!                 "colors": [ { "range": [0, 5], "rgb": [255, 0, 0] } ] } ] }
//! ```
//!
//! but nothing about the response is trusted. Parsing walks a
//! [`serde_json::Value`] field by field, clamps what is out of range, defaults
//! what is missing, and drops only the blocks that cannot be placed at all
//! (no usable bbox). A block with a box but no text is kept: it draws
//! nothing, yet its box still masks text out of the page's graphics. A
//! malformed block never fails its page.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, warn};

/// Side of the normalized coordinate space.
pub const NORMALIZED_EXTENT: f32 = 1000.0;

/// Font size used when a block carries none (or an unusable one).
pub const DEFAULT_FONT_SIZE_PT: f32 = 12.0;

/// An sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const BLACK: RgbColor = RgbColor { r: 0, g: 0, b: 0 };
    pub const WHITE: RgbColor = RgbColor {
        r: 255,
        g: 255,
        b: 255,
    };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Upper-case `RRGGBB`, the form DrawingML expects.
    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl From<image::Rgb<u8>> for RgbColor {
    fn from(p: image::Rgb<u8>) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

impl From<RgbColor> for image::Rgb<u8> {
    fn from(c: RgbColor) -> Self {
        image::Rgb([c.r, c.g, c.b])
    }
}

/// The fixed font palette the vision service chooses from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FontFamily {
    NotoSansJp,
    NotoSerifJp,
    Yomogi,
    KosugiMaru,
    #[default]
    Roboto,
    Merriweather,
    RobotoMono,
    Montserrat,
}

impl FontFamily {
    pub const ALL: [FontFamily; 8] = [
        FontFamily::NotoSansJp,
        FontFamily::NotoSerifJp,
        FontFamily::Yomogi,
        FontFamily::KosugiMaru,
        FontFamily::Roboto,
        FontFamily::Merriweather,
        FontFamily::RobotoMono,
        FontFamily::Montserrat,
    ];

    /// Typeface name written into the deck.
    pub fn typeface(self) -> &'static str {
        match self {
            FontFamily::NotoSansJp => "Noto Sans JP",
            FontFamily::NotoSerifJp => "Noto Serif JP",
            FontFamily::Yomogi => "Yomogi",
            FontFamily::KosugiMaru => "Kosugi Maru",
            FontFamily::Roboto => "Roboto",
            FontFamily::Merriweather => "Merriweather",
            FontFamily::RobotoMono => "Roboto Mono",
            FontFamily::Montserrat => "Montserrat",
        }
    }

    /// Match a typeface name, ignoring case, spaces, hyphens and underscores.
    /// Unknown names fall back to [`FontFamily::Roboto`].
    pub fn from_name(name: &str) -> Self {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|f| {
                f.typeface()
                    .chars()
                    .filter(|c| *c != ' ')
                    .flat_map(char::to_lowercase)
                    .eq(key.chars())
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for FontFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.typeface())
    }
}

/// A box in the 0–1000 normalized page space: origin top-left, `(x, y, w, h)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl NormBox {
    /// Build a box, clamping every value into the normalized space and the
    /// extent so the box does not run off the page.
    pub fn clamped(x: f32, y: f32, w: f32, h: f32) -> Self {
        let x = x.clamp(0.0, NORMALIZED_EXTENT);
        let y = y.clamp(0.0, NORMALIZED_EXTENT);
        Self {
            x,
            y,
            w: w.clamp(0.0, NORMALIZED_EXTENT - x),
            h: h.clamp(0.0, NORMALIZED_EXTENT - y),
        }
    }
}

/// A character range of a block's text drawn in one colour.
///
/// Offsets count Unicode scalar values, end-exclusive. They are kept exactly
/// as received (possibly negative, reversed, or past the end); the run
/// composer is responsible for making sense of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub start: i64,
    pub end: i64,
    pub rgb: RgbColor,
}

/// One line of text positioned on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub bbox: NormBox,
    pub font_family: FontFamily,
    pub is_bold: bool,
    pub font_size_pt: f32,
    pub colors: Vec<ColorRange>,
}

impl TextBlock {
    /// A block with default styling and no colour annotations.
    pub fn new(text: impl Into<String>, bbox: NormBox) -> Self {
        Self {
            text: text.into(),
            bbox,
            font_family: FontFamily::default(),
            is_bold: false,
            font_size_pt: DEFAULT_FONT_SIZE_PT,
            colors: Vec::new(),
        }
    }

    /// Length of the text in characters (the unit of [`ColorRange`] offsets).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Layout description of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    /// Always honoured as "the slide starts empty".
    pub replace_all: bool,
    pub blocks: Vec<TextBlock>,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            replace_all: true,
            blocks: Vec::new(),
        }
    }
}

/// Why a layout response could not be used at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutParseError {
    /// Not JSON.
    Syntax(String),
    /// JSON, but not an object.
    NotAnObject,
}

impl fmt::Display for LayoutParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutParseError::Syntax(e) => write!(f, "invalid JSON: {e}"),
            LayoutParseError::NotAnObject => f.write_str("top-level value is not an object"),
        }
    }
}

impl std::error::Error for LayoutParseError {}

impl PageLayout {
    /// Parse a layout from JSON text.
    ///
    /// Fails only when the text is not a JSON object; every other defect is
    /// repaired or the offending block dropped.
    pub fn from_json_str(raw: &str) -> Result<Self, LayoutParseError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| LayoutParseError::Syntax(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Parse a layout from an already-decoded JSON value.
    pub fn from_value(value: &Value) -> Result<Self, LayoutParseError> {
        let obj = value.as_object().ok_or(LayoutParseError::NotAnObject)?;

        let replace_all = obj
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let raw_blocks = obj
            .get("blocks")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut blocks = Vec::with_capacity(raw_blocks.len());
        for (i, raw) in raw_blocks.iter().enumerate() {
            match parse_block(raw) {
                Some(block) => blocks.push(block),
                None => debug!("Dropping layout block {} (no usable bbox)", i),
            }
        }
        if blocks.len() < raw_blocks.len() {
            warn!(
                "Layout: kept {}/{} blocks",
                blocks.len(),
                raw_blocks.len()
            );
        }

        Ok(Self {
            replace_all,
            blocks,
        })
    }

    /// The layout in the wire format [`from_value`](Self::from_value) reads.
    pub fn to_value(&self) -> Value {
        let blocks: Vec<Value> = self
            .blocks
            .iter()
            .map(|b| {
                let colors: Vec<Value> = b
                    .colors
                    .iter()
                    .map(|c| json!({ "range": [c.start, c.end], "rgb": [c.rgb.r, c.rgb.g, c.rgb.b] }))
                    .collect();
                json!({
                    "text": b.text,
                    "bbox_1000": [b.bbox.x, b.bbox.y, b.bbox.w, b.bbox.h],
                    "font_family": b.font_family.typeface(),
                    "is_bold": b.is_bold,
                    "font_size_pt": b.font_size_pt,
                    "colors": colors,
                })
            })
            .collect();
        json!({ "replace_all": self.replace_all, "blocks": blocks })
    }

    /// A one-block layout that puts a diagnostic message on the slide.
    pub fn placeholder(message: impl Into<String>, rgb: RgbColor, font_size_pt: f32) -> Self {
        let text: String = message.into();
        let len = text.chars().count() as i64;
        Self {
            replace_all: true,
            blocks: vec![TextBlock {
                text,
                bbox: NormBox::clamped(50.0, 50.0, 900.0, 100.0),
                font_family: FontFamily::Roboto,
                is_bold: true,
                font_size_pt,
                colors: vec![ColorRange {
                    start: 0,
                    end: len,
                    rgb,
                }],
            }],
        }
    }
}

fn parse_block(raw: &Value) -> Option<TextBlock> {
    let obj = raw.as_object()?;

    let text = obj.get("text").and_then(Value::as_str).unwrap_or_default();
    let bbox = parse_bbox(obj.get("bbox_1000")?)?;

    let font_family = obj
        .get("font_family")
        .and_then(Value::as_str)
        .map(FontFamily::from_name)
        .unwrap_or_default();

    let is_bold = match obj.get("is_bold") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    };

    let font_size_pt = obj
        .get("font_size_pt")
        .and_then(as_f32)
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| s.clamp(1.0, 400.0))
        .unwrap_or(DEFAULT_FONT_SIZE_PT);

    let text_len = text.chars().count() as i64;
    let colors = obj
        .get("colors")
        .and_then(Value::as_array)
        .map(|ranges| {
            ranges
                .iter()
                .filter_map(|r| parse_color_range(r, text_len))
                .collect()
        })
        .unwrap_or_default();

    Some(TextBlock {
        text: text.to_string(),
        bbox,
        font_family,
        is_bold,
        font_size_pt,
        colors,
    })
}

fn parse_bbox(raw: &Value) -> Option<NormBox> {
    let values = raw.as_array()?;
    if values.len() < 4 {
        return None;
    }
    let mut nums = [0f32; 4];
    for (slot, v) in nums.iter_mut().zip(values) {
        *slot = as_f32(v).filter(|n| n.is_finite())?;
    }
    Some(NormBox::clamped(nums[0], nums[1], nums[2], nums[3]))
}

fn parse_color_range(raw: &Value, text_len: i64) -> Option<ColorRange> {
    let obj = raw.as_object()?;

    let (start, end) = match obj.get("range").and_then(Value::as_array) {
        Some(r) if r.len() >= 2 => (as_i64(&r[0])?, as_i64(&r[1])?),
        // A range-less colour applies to the whole text.
        _ => (0, text_len),
    };

    let rgb = obj
        .get("rgb")
        .and_then(Value::as_array)
        .filter(|c| c.len() >= 3)
        .map(|c| {
            let channel = |v: &Value| as_f32(v).map_or(0, |n| n.clamp(0.0, 255.0).round() as u8);
            RgbColor::new(channel(&c[0]), channel(&c[1]), channel(&c[2]))
        })
        .unwrap_or(RgbColor::BLACK);

    Some(ColorRange { start, end, rgb })
}

fn as_f32(v: &Value) -> Option<f32> {
    match v {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
