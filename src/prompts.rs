//! Prompts for VLM-based page layout analysis.
//!
//! Centralising the prompt here keeps the wording in one place and lets unit
//! tests inspect it without a live model. Callers can override it via
//! [`crate::config::ConversionConfig::system_prompt`]; an override is sent
//! verbatim.

use crate::geometry::PageSize;
use crate::layout::FontFamily;

/// Layout analysis prompt. `{fonts}`, `{page_w}` and `{page_h}` are filled in
/// by [`layout_prompt`].
pub const DEFAULT_LAYOUT_PROMPT: &str = r#"You extract the text layout of a PDF page image. Analyse the image and answer with JSON in exactly this shape:

{
  "replace_all": true,
  "blocks": [
    {
      "text": "text content",
      "bbox_1000": [x, y, width, height],
      "font_family": "font name",
      "is_bold": false,
      "font_size_pt": 18,
      "colors": [
        {"range": [start_char, end_char], "rgb": [R, G, B]}
      ]
    }
  ]
}

RULES

1. COORDINATES (bbox_1000)
   - Treat the image as a 1000 x 1000 grid, origin top-left
   - [x, y, width, height]: x from the left edge, y from the top edge
   - The box must tightly enclose the visible glyphs

2. FONT FAMILY (font_family)
   Choose exactly one of: {fonts}
   - Noto Sans JP: Japanese gothic; Noto Serif JP: Japanese mincho
   - Yomogi: handwritten; Kosugi Maru: rounded
   - Roboto: standard sans-serif; Merriweather: serif
   - Roboto Mono: monospace; Montserrat: heavy headings

3. FONT SIZE (font_size_pt)
   - The page is {page_w} pt wide and {page_h} pt tall
   - font_size_pt = (text height / image height) x {page_h}

4. GROUPING
   - Text on different lines (different y) is always a separate block
   - Text on the same line belongs to one block when the gap is small
   - Never put a line break inside "text"; split into blocks instead

5. COLOURS (colors)
   - One entry per differently coloured span
   - range is [start, end) in characters of "text"; together the ranges
     should cover the whole text

6. OUTPUT FORMAT
   - Output ONLY the JSON object
   - No commentary, no explanations"#;

/// The layout prompt for a page of the given size.
pub fn layout_prompt(page: PageSize) -> String {
    let fonts = FontFamily::ALL
        .iter()
        .map(|f| f.typeface())
        .collect::<Vec<_>>()
        .join(", ");
    DEFAULT_LAYOUT_PROMPT
        .replace("{fonts}", &fonts)
        .replace("{page_w}", &format!("{:.0}", page.width_pt))
        .replace("{page_h}", &format!("{:.0}", page.height_pt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_font() {
        let p = layout_prompt(PageSize::LETTER);
        for f in FontFamily::ALL {
            assert!(p.contains(f.typeface()), "missing {f}");
        }
    }

    #[test]
    fn prompt_carries_page_size() {
        let p = layout_prompt(PageSize::new(960.0, 540.0));
        assert!(p.contains("960 pt wide and 540 pt tall"));
        assert!(p.contains("x 540"));
        assert!(!p.contains("{page_h}"));
    }

    #[test]
    fn prompt_asks_for_json_only() {
        assert!(DEFAULT_LAYOUT_PROMPT.contains("bbox_1000"));
        assert!(DEFAULT_LAYOUT_PROMPT.contains("Output ONLY the JSON object"));
    }
}
