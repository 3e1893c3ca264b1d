//! Splitting a text block into uniformly coloured runs.

use crate::layout::{ColorRange, RgbColor};

/// A slice of a block's text drawn in a single colour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColoredRun {
    pub text: String,
    pub color: RgbColor,
}

/// Split `text` into runs according to `ranges`.
///
/// Ranges are applied in order over character offsets. Each range is clamped
/// to the text and starts no earlier than where the previous one ended, so
/// overlapping ranges lose their overlap to the earlier range. Characters no
/// range covers take `default_color`. Adjacent runs of the same colour are
/// merged.
///
/// The concatenation of the returned runs is always exactly `text`, and no
/// run is empty.
pub fn compose_runs(text: &str, ranges: &[ColorRange], default_color: RgbColor) -> Vec<ColoredRun> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let clamp = |v: i64| v.clamp(0, len as i64) as usize;

    let mut spans: Vec<(usize, usize, RgbColor)> = Vec::with_capacity(ranges.len() * 2 + 1);
    let mut cursor = 0usize;
    for range in ranges {
        let start = clamp(range.start).max(cursor);
        let end = clamp(range.end);
        if end <= start {
            continue;
        }
        if start > cursor {
            spans.push((cursor, start, default_color));
        }
        spans.push((start, end, range.rgb));
        cursor = end;
    }
    if cursor < len {
        spans.push((cursor, len, default_color));
    }

    let mut runs: Vec<ColoredRun> = Vec::with_capacity(spans.len());
    for (start, end, color) in spans {
        let piece: String = chars[start..end].iter().collect();
        match runs.last_mut() {
            Some(last) if last.color == color => last.text.push_str(&piece),
            _ => runs.push(ColoredRun { text: piece, color }),
        }
    }
    runs
}
