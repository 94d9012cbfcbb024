//! Glyph advance widths for fonts referenced by a page
//!
//! Only widths are needed: the scrubber replaces glyphs with kerning of the
//! same advance, so surrounding text stays where it was.

use crate::document::{inherited, number, resolve};
use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;

/// Width used when a simple font declares no `/Widths` (glyph space units)
const FALLBACK_WIDTH: f64 = 500.0;
/// `/DW` default for CID fonts
const DEFAULT_CID_WIDTH: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FontMetrics {
    /// Type0 fonts are read as two-byte codes
    two_byte: bool,
    first_char: u32,
    widths: Vec<f64>,
    cid_widths: HashMap<u32, f64>,
    default_width: f64,
    /// Glyph space to text space; 1/1000 except for Type3 fonts
    scale: f64,
    /// False when widths had to be approximated
    known: bool,
}

impl FontMetrics {
    pub(crate) fn fallback() -> Self {
        Self {
            two_byte: false,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: FALLBACK_WIDTH,
            scale: 0.001,
            known: false,
        }
    }

    pub(crate) fn is_known(&self) -> bool {
        self.known
    }

    pub(crate) fn is_two_byte(&self) -> bool {
        self.two_byte
    }

    /// Split a shown string into character codes
    pub(crate) fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| match pair {
                    [hi, lo] => ((*hi as u32) << 8) | *lo as u32,
                    [single] => *single as u32,
                    _ => 0,
                })
                .collect()
        } else {
            bytes.iter().map(|b| *b as u32).collect()
        }
    }

    /// Horizontal advance of a code in text space, before font size
    pub(crate) fn advance(&self, code: u32) -> f64 {
        let glyph_width = if self.two_byte {
            self.cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.default_width)
        } else {
            code.checked_sub(self.first_char)
                .and_then(|i| self.widths.get(i as usize))
                .copied()
                .unwrap_or(self.default_width)
        };
        glyph_width * self.scale
    }

    pub(crate) fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let subtype = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .unwrap_or_default();
        match subtype {
            b"Type0" => Self::from_type0(doc, font),
            _ => Self::from_simple(doc, font, subtype == b"Type3"),
        }
    }

    fn from_simple(doc: &Document, font: &Dictionary, type3: bool) -> Self {
        let mut metrics = Self::fallback();

        if type3 {
            if let Ok(Object::Array(matrix)) = font.get(b"FontMatrix").map(|o| resolve(doc, o)) {
                if let Some(sx) = matrix.first().and_then(number) {
                    metrics.scale = sx;
                }
            }
        }

        if let Some(first) = font
            .get(b"FirstChar")
            .ok()
            .and_then(|o| resolve(doc, o).as_i64().ok())
        {
            metrics.first_char = first.max(0) as u32;
        }

        if let Ok(Object::Array(widths)) = font.get(b"Widths").map(|o| resolve(doc, o)) {
            metrics.widths = widths
                .iter()
                .map(|w| number(resolve(doc, w)).unwrap_or(0.0))
                .collect();
            metrics.known = true;
        }

        let missing_width = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok())
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(|o| number(resolve(doc, o)));

        metrics.default_width = match missing_width {
            Some(w) if metrics.known => w,
            _ if metrics.known => 0.0,
            _ => standard_font_width(font),
        };
        metrics
    }

    fn from_type0(doc: &Document, font: &Dictionary) -> Self {
        let mut metrics = Self {
            two_byte: true,
            default_width: DEFAULT_CID_WIDTH,
            ..Self::fallback()
        };

        let descendant = font
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|o| resolve(doc, o).as_dict().ok());
        let Some(descendant) = descendant else {
            return metrics;
        };

        if let Some(dw) = descendant
            .get(b"DW")
            .ok()
            .and_then(|o| number(resolve(doc, o)))
        {
            metrics.default_width = dw;
        }
        if let Ok(Object::Array(w)) = descendant.get(b"W").map(|o| resolve(doc, o)) {
            metrics.cid_widths = parse_cid_widths(doc, w);
        }
        metrics.known = true;
        metrics
    }
}

/// Approximate width for unembedded standard fonts without `/Widths`
fn standard_font_width(font: &Dictionary) -> f64 {
    let base = font
        .get(b"BaseFont")
        .and_then(Object::as_name)
        .unwrap_or_default();
    if base.starts_with(b"Courier") {
        600.0
    } else {
        FALLBACK_WIDTH
    }
}

/// Parse a CID `/W` array: `c [w1 w2 ...]` and `c_first c_last w` entries
fn parse_cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < w.len() {
        let Some(first) = number(resolve(doc, &w[i])) else {
            break;
        };
        let first = first.max(0.0) as u32;
        match w.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(run)) => {
                for (offset, width) in run.iter().enumerate() {
                    if let Some(width) = number(resolve(doc, width)) {
                        widths.insert(first + offset as u32, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) = (
                    number(last),
                    w.get(i + 2).and_then(|o| number(resolve(doc, o))),
                ) else {
                    break;
                };
                // CIDs are 16-bit; clamp hostile ranges
                let last = (last.max(0.0) as u32).clamp(first, first.saturating_add(0xFFFF));
                for code in first..=last {
                    widths.insert(code, width);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

/// Metrics for every font in the page's (possibly inherited) resources
pub(crate) fn page_fonts(doc: &Document, page: &Dictionary) -> HashMap<Vec<u8>, FontMetrics> {
    let mut fonts = HashMap::new();

    let font_dict = inherited(doc, page, b"Resources")
        .and_then(|o| resolve(doc, o).as_dict().ok())
        .and_then(|res| res.get(b"Font").ok())
        .and_then(|o| resolve(doc, o).as_dict().ok());
    let Some(font_dict) = font_dict else {
        return fonts;
    };

    for (name, obj) in font_dict.iter() {
        let metrics = match resolve(doc, obj).as_dict() {
            Ok(font) => FontMetrics::from_dict(doc, font),
            Err(_) => FontMetrics::fallback(),
        };
        if !metrics.is_known() {
            tracing::warn!(
                font = %String::from_utf8_lossy(name),
                "glyph widths unavailable; approximating advances"
            );
        }
        fonts.insert(name.clone(), metrics);
    }
    fonts
}
