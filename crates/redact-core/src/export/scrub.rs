//! Text scrubbing for page content streams
//!
//! Text-showing operators are walked with a tracked CTM and text state. A
//! glyph whose box meets a redaction rect is swapped for a `TJ` adjustment of
//! the same advance: its code leaves the stream and the rest of the line
//! keeps its position.

use super::fonts::FontMetrics;
use crate::document::number;
use crate::geometry::PdfRect;
use lopdf::content::Operation;
use lopdf::{Object, StringFormat};
use std::collections::HashMap;

/// Glyph descent below the baseline as a fraction of font size
const DESCENT: f64 = 0.25;

/// Affine transform `[a b c d e f]` in PDF row-vector convention
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    pub(crate) const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translate(tx: f64, ty: f64) -> Matrix {
        Matrix {
            e: tx,
            f: ty,
            ..Matrix::IDENTITY
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() < 6 {
            return None;
        }
        Some(Matrix {
            a: number(&operands[0])?,
            b: number(&operands[1])?,
            c: number(&operands[2])?,
            d: number(&operands[3])?,
            e: number(&operands[4])?,
            f: number(&operands[5])?,
        })
    }

    /// `self` applied first, then `other`
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }
}

/// The parts of the graphics state that `q`/`Q` save and restore
#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    font: Option<Vec<u8>>,
    font_size: f64,
    rise: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            font: None,
            font_size: 0.0,
            rise: 0.0,
        }
    }
}

/// Accumulates a rewritten `TJ` array, merging adjacent adjustments
struct TjBuilder {
    items: Vec<Object>,
    run: Vec<u8>,
    format: StringFormat,
    adjust: f64,
}

impl TjBuilder {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            run: Vec::new(),
            format: StringFormat::Literal,
            adjust: 0.0,
        }
    }

    fn push_bytes(&mut self, bytes: &[u8], format: StringFormat) {
        self.flush_adjust();
        self.format = format;
        self.run.extend_from_slice(bytes);
    }

    fn push_adjust(&mut self, amount: f64) {
        self.flush_run();
        self.adjust += amount;
    }

    fn flush_run(&mut self) {
        if !self.run.is_empty() {
            let run = std::mem::take(&mut self.run);
            self.items.push(Object::String(run, self.format));
        }
    }

    fn flush_adjust(&mut self) {
        if self.adjust != 0.0 {
            self.items.push(Object::Real(self.adjust as f32));
            self.adjust = 0.0;
        }
    }

    fn finish(mut self) -> Vec<Object> {
        self.flush_run();
        self.flush_adjust();
        self.items
    }
}

pub(crate) struct TextScrubber<'a> {
    rects: &'a [PdfRect],
    fonts: &'a HashMap<Vec<u8>, FontMetrics>,
    fallback: FontMetrics,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    scrubbed: usize,
}

impl<'a> TextScrubber<'a> {
    /// `rects` are in the page's default user space
    pub(crate) fn new(rects: &'a [PdfRect], fonts: &'a HashMap<Vec<u8>, FontMetrics>) -> Self {
        Self {
            rects,
            fonts,
            fallback: FontMetrics::fallback(),
            state: GraphicsState::default(),
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            scrubbed: 0,
        }
    }

    /// Number of glyphs removed so far
    pub(crate) fn scrubbed(&self) -> usize {
        self.scrubbed
    }

    pub(crate) fn rewrite(&mut self, operations: Vec<Operation>) -> Vec<Operation> {
        let mut out = Vec::with_capacity(operations.len());
        for op in operations {
            self.step(op, &mut out);
        }
        out
    }

    fn step(&mut self, op: Operation, out: &mut Vec<Operation>) {
        let operand = |i: usize| op.operands.get(i).and_then(number);

        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.state = saved;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(&op.operands) {
                    self.state.ctm = m.then(&self.state.ctm);
                }
            }
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "Tc" => self.state.char_spacing = operand(0).unwrap_or(0.0),
            "Tw" => self.state.word_spacing = operand(0).unwrap_or(0.0),
            "Tz" => self.state.horizontal_scale = operand(0).unwrap_or(100.0) / 100.0,
            "TL" => self.state.leading = operand(0).unwrap_or(0.0),
            "Ts" => self.state.rise = operand(0).unwrap_or(0.0),
            "Tf" => {
                self.state.font = op
                    .operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .map(|name| name.to_vec());
                self.state.font_size = operand(1).unwrap_or(0.0);
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (operand(0), operand(1)) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (operand(0), operand(1)) {
                    self.state.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(&op.operands) {
                    self.tm = m;
                    self.tlm = m;
                }
            }
            "T*" => self.next_line(0.0, -self.state.leading),
            "Tj" => {
                if let Some(array) = self.show(&op.operands[..op.operands.len().min(1)]) {
                    out.push(Operation::new("TJ", vec![Object::Array(array)]));
                    return;
                }
            }
            "TJ" => {
                if let Some(Object::Array(elements)) = op.operands.first() {
                    if let Some(array) = self.show(elements) {
                        out.push(Operation::new("TJ", vec![Object::Array(array)]));
                        return;
                    }
                }
            }
            "'" => {
                self.next_line(0.0, -self.state.leading);
                if let Some(array) = self.show(&op.operands[..op.operands.len().min(1)]) {
                    out.push(Operation::new("T*", vec![]));
                    out.push(Operation::new("TJ", vec![Object::Array(array)]));
                    return;
                }
            }
            "\"" => {
                let (aw, ac) = (operand(0).unwrap_or(0.0), operand(1).unwrap_or(0.0));
                self.state.word_spacing = aw;
                self.state.char_spacing = ac;
                self.next_line(0.0, -self.state.leading);
                if let Some(array) = self.show(op.operands.get(2..).unwrap_or(&[])) {
                    out.push(Operation::new("Tw", vec![Object::Real(aw as f32)]));
                    out.push(Operation::new("Tc", vec![Object::Real(ac as f32)]));
                    out.push(Operation::new("T*", vec![]));
                    out.push(Operation::new("TJ", vec![Object::Array(array)]));
                    return;
                }
            }
            _ => {}
        }
        out.push(op);
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    /// Advance the text matrix over `elements`. Returns a replacement `TJ`
    /// array when at least one glyph was scrubbed.
    fn show(&mut self, elements: &[Object]) -> Option<Vec<Object>> {
        let state = &self.state;
        let font = state
            .font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&self.fallback);
        let size = state.font_size;
        let th = state.horizontal_scale;
        let to_user = self.tm.then(&state.ctm);
        let bytes_per_code = if font.is_two_byte() { 2 } else { 1 };

        let mut builder = TjBuilder::new();
        let mut cursor = 0.0;
        let mut scrubbed = 0usize;

        for element in elements {
            match element {
                Object::String(bytes, format) => {
                    for (i, code) in font.codes(bytes).into_iter().enumerate() {
                        let glyph = font.advance(code) * size;
                        let mut advance = glyph + state.char_spacing;
                        if !font.is_two_byte() && code == 32 {
                            advance += state.word_spacing;
                        }
                        advance *= th;

                        let hit = self.hits(
                            &to_user,
                            (cursor, cursor + glyph * th),
                            (state.rise - DESCENT * size, state.rise + size),
                        );
                        if hit {
                            if size * th != 0.0 {
                                builder.push_adjust(-advance * 1000.0 / (size * th));
                            }
                            scrubbed += 1;
                        } else {
                            let start = i * bytes_per_code;
                            let end = (start + bytes_per_code).min(bytes.len());
                            builder.push_bytes(&bytes[start..end], *format);
                        }
                        cursor += advance;
                    }
                    builder.flush_run();
                }
                other => {
                    if let Some(n) = number(other) {
                        cursor -= n / 1000.0 * size * th;
                        builder.push_adjust(n);
                    }
                }
            }
        }

        self.tm = Matrix::translate(cursor, 0.0).then(&self.tm);
        if scrubbed == 0 {
            return None;
        }
        self.scrubbed += scrubbed;
        Some(builder.finish())
    }

    /// Whether a text-space box meets any redaction rect once in user space
    fn hits(&self, to_user: &Matrix, (x0, x1): (f64, f64), (y0, y1): (f64, f64)) -> bool {
        let corners = [
            to_user.apply(x0, y0),
            to_user.apply(x1, y0),
            to_user.apply(x0, y1),
            to_user.apply(x1, y1),
        ];
        let min_x = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        let glyph_box = PdfRect::new(min_x, min_y, max_x - min_x, max_y - min_y);

        self.rects.iter().any(|rect| rect.intersects(&glyph_box))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document};
    use pretty_assertions::assert_eq;

    fn op(operator: &str, operands: Vec<Object>) -> Operation {
        Operation::new(operator, operands)
    }

    fn text(s: &str) -> Object {
        Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
    }

    /// 12pt text with the 500-unit fallback width: every glyph advances 6pt
    fn line(x: i64, y: i64, shown: Vec<Operation>) -> Vec<Operation> {
        let mut ops = vec![
            op("BT", vec![]),
            op("Tf", vec![Object::Name(b"F1".to_vec()), 12.into()]),
            op("Td", vec![x.into(), y.into()]),
        ];
        ops.extend(shown);
        ops.push(op("ET", vec![]));
        ops
    }

    fn rewrite(ops: Vec<Operation>, rects: &[PdfRect]) -> (Vec<Operation>, usize) {
        let fonts = HashMap::new();
        let mut scrubber = TextScrubber::new(rects, &fonts);
        let out = scrubber.rewrite(ops);
        (out, scrubber.scrubbed())
    }

    #[derive(Debug, PartialEq)]
    enum Item {
        Text(Vec<u8>),
        Adjust(f64),
    }

    /// Contents of the first `TJ` operation, in a comparable form
    fn tj_items(ops: &[Operation]) -> Vec<Item> {
        let tj = ops.iter().find(|o| o.operator == "TJ").unwrap();
        let Some(Object::Array(items)) = tj.operands.first() else {
            panic!("TJ without an array operand");
        };
        items
            .iter()
            .map(|item| match item {
                Object::String(s, _) => Item::Text(s.clone()),
                other => Item::Adjust(number(other).unwrap()),
            })
            .collect()
    }

    fn operators(ops: &[Operation]) -> Vec<&str> {
        ops.iter().map(|o| o.operator.as_str()).collect()
    }

    fn shown_bytes(ops: &[Operation]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for op in ops {
            for operand in &op.operands {
                match operand {
                    Object::String(s, _) => bytes.extend_from_slice(s),
                    Object::Array(items) => {
                        for item in items {
                            if let Object::String(s, _) = item {
                                bytes.extend_from_slice(s);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        bytes
    }

    #[test]
    fn test_matrix_composition() {
        let scale = Matrix {
            a: 2.0,
            d: 2.0,
            ..Matrix::IDENTITY
        };
        let m = Matrix::translate(10.0, 5.0).then(&scale);
        assert_eq!(m.apply(0.0, 0.0), (20.0, 10.0));
        assert_eq!(m.apply(1.0, 1.0), (22.0, 12.0));
    }

    #[test]
    fn test_covered_string_fully_scrubbed() {
        let ops = line(100, 700, vec![op("Tj", vec![text("Secret")])]);
        let (out, scrubbed) = rewrite(ops, &[PdfRect::new(90.0, 690.0, 110.0, 30.0)]);

        assert_eq!(scrubbed, 6);
        assert!(shown_bytes(&out).is_empty());
        assert_eq!(tj_items(&out), vec![Item::Adjust(-3000.0)]);
    }

    #[test]
    fn test_partial_cover_keeps_outside_glyphs() {
        // Glyph boxes: S 100-106, e 106-112, c 112-118, r 118-124 ...
        let ops = line(100, 700, vec![op("Tj", vec![text("Secret")])]);
        let (out, scrubbed) = rewrite(ops, &[PdfRect::new(99.0, 690.0, 18.0, 30.0)]);

        assert_eq!(scrubbed, 3);
        assert_eq!(shown_bytes(&out), b"ret".to_vec());
        assert_eq!(
            tj_items(&out),
            vec![Item::Adjust(-1500.0), Item::Text(b"ret".to_vec())]
        );
    }

    #[test]
    fn test_text_outside_rects_untouched() {
        let ops = line(100, 700, vec![op("Tj", vec![text("Public")])]);
        let (out, scrubbed) = rewrite(ops, &[PdfRect::new(0.0, 0.0, 50.0, 50.0)]);
        assert_eq!(scrubbed, 0);
        assert_eq!(operators(&out), vec!["BT", "Tf", "Td", "Tj", "ET"]);
        assert_eq!(shown_bytes(&out), b"Public".to_vec());
    }

    #[test]
    fn test_tj_array_kerning_merged() {
        let ops = vec![
            op("BT", vec![]),
            op("Tf", vec![Object::Name(b"F1".to_vec()), 10.into()]),
            // A 0-5, B 5-10, kern +2, C 12-17, D 17-22
            op(
                "TJ",
                vec![Object::Array(vec![text("AB"), (-200).into(), text("CD")])],
            ),
            op("ET", vec![]),
        ];
        let (out, scrubbed) = rewrite(ops, &[PdfRect::new(11.5, -5.0, 20.0, 20.0)]);

        assert_eq!(scrubbed, 2);
        assert_eq!(
            tj_items(&out),
            vec![Item::Text(b"AB".to_vec()), Item::Adjust(-1200.0)]
        );
    }

    #[test]
    fn test_two_byte_codes_stay_paired() {
        let mut doc = Document::with_version("1.7");
        let descendant = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "DW" => 1000,
            "W" => vec![1.into(), Object::Array(vec![500.into(), 250.into()])],
        });
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "DescendantFonts" => vec![Object::Reference(descendant)],
        };
        let mut fonts = HashMap::new();
        fonts.insert(b"F2".to_vec(), FontMetrics::from_dict(&doc, &font));

        let ops = vec![
            op("BT", vec![]),
            op("Tf", vec![Object::Name(b"F2".to_vec()), 10.into()]),
            // CID 1 0-5, CID 2 5-7.5, CID 3 7.5-17.5
            op(
                "Tj",
                vec![Object::String(
                    vec![0x00, 0x01, 0x00, 0x02, 0x00, 0x03],
                    StringFormat::Hexadecimal,
                )],
            ),
            op("ET", vec![]),
        ];
        let rects = [PdfRect::new(5.5, -5.0, 1.5, 20.0)];
        let mut scrubber = TextScrubber::new(&rects, &fonts);
        let out = scrubber.rewrite(ops);

        assert_eq!(scrubber.scrubbed(), 1);
        assert_eq!(
            tj_items(&out),
            vec![
                Item::Text(vec![0x00, 0x01]),
                Item::Adjust(-250.0),
                Item::Text(vec![0x00, 0x03]),
            ]
        );
        let tj = out.iter().find(|o| o.operator == "TJ").unwrap();
        let Some(Object::Array(items)) = tj.operands.first() else {
            panic!("TJ without an array operand");
        };
        assert!(items
            .iter()
            .filter(|item| matches!(item, Object::String(..)))
            .all(|item| matches!(item, Object::String(_, StringFormat::Hexadecimal))));
    }

    #[test]
    fn test_later_text_keeps_position_after_scrub() {
        // "Secret" spans 100-136; "X" starts at 136
        let ops = line(
            100,
            700,
            vec![op("Tj", vec![text("Secret")]), op("Tj", vec![text("X")])],
        );
        let (out, scrubbed) = rewrite(ops, &[PdfRect::new(137.0, 690.0, 4.0, 30.0)]);

        assert_eq!(scrubbed, 1);
        assert_eq!(shown_bytes(&out), b"Secret".to_vec());
    }

    #[test]
    fn test_ctm_scaling_applied() {
        let scaled = || {
            let mut ops = vec![op(
                "cm",
                vec![2.into(), 0.into(), 0.into(), 2.into(), 0.into(), 0.into()],
            )];
            ops.extend(line(100, 100, vec![op("Tj", vec![text("A")])]));
            ops
        };

        // Text lands at 200,200 in user space, not 100,100
        let (_, missed) = rewrite(scaled(), &[PdfRect::new(95.0, 95.0, 20.0, 20.0)]);
        assert_eq!(missed, 0);
        let (_, hit) = rewrite(scaled(), &[PdfRect::new(195.0, 195.0, 20.0, 20.0)]);
        assert_eq!(hit, 1);
    }

    #[test]
    fn test_restore_discards_ctm() {
        let mut ops = vec![
            op("q", vec![]),
            op(
                "cm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), 500.into(), 500.into()],
            ),
            op("Q", vec![]),
        ];
        ops.extend(line(100, 700, vec![op("Tj", vec![text("A")])]));

        let (_, scrubbed) = rewrite(ops, &[PdfRect::new(95.0, 690.0, 20.0, 30.0)]);
        assert_eq!(scrubbed, 1);
    }

    #[test]
    fn test_next_line_quote_operator() {
        let ops = vec![
            op("BT", vec![]),
            op("Tf", vec![Object::Name(b"F1".to_vec()), 12.into()]),
            op("TL", vec![14.into()]),
            op("Td", vec![100.into(), 700.into()]),
            op("'", vec![text("Hidden")]),
            op("ET", vec![]),
        ];
        // Quote moves to the next line first: baseline 686
        let (out, scrubbed) = rewrite(ops, &[PdfRect::new(90.0, 680.0, 100.0, 12.0)]);

        assert_eq!(scrubbed, 6);
        assert!(shown_bytes(&out).is_empty());
        assert_eq!(
            operators(&out),
            vec!["BT", "Tf", "TL", "Td", "T*", "TJ", "ET"]
        );
    }
}
