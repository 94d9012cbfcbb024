//! Burn committed redactions into a copy of the source document
//!
//! Each page that carries redactions gets a rewritten content stream: the
//! original operators (with covered glyphs scrubbed) wrapped in `q … Q`,
//! followed by opaque filled rectangles. Covered annotations are dropped
//! and unreferenced objects pruned before serialization.

mod fonts;
mod scrub;
mod segments;

use crate::config::{RedactConfig, Rgb};
use crate::document::{parse_box_array, resolve, DocumentHandle, PdfDocument};
use crate::error::RedactError;
use crate::geometry::{map_to_page, unrotate_rect, PdfRect};
use crate::store::{RedactionId, RedactionStore};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use scrub::TextScrubber;
use segments::{split_inline_images, Segment};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

/// A redaction left out of the export because its page does not exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSkipped {
    pub redaction_id: RedactionId,
    pub page_index: usize,
    pub page_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    /// Redactions burned in, in store order
    pub applied: Vec<RedactionId>,
    pub skipped: Vec<ExportSkipped>,
    pub scrubbed_glyphs: usize,
    pub removed_annotations: usize,
}

#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub bytes: Vec<u8>,
    pub report: ExportReport,
}

#[derive(Debug, Clone)]
pub struct ExportEngine {
    fill: Rgb,
    scrub_text: bool,
    remove_covered_annotations: bool,
    compress_content: bool,
}

impl ExportEngine {
    pub fn new(config: &RedactConfig) -> Result<Self, RedactError> {
        config.validate()?;
        Ok(Self {
            fill: config.fill_rgb()?,
            scrub_text: config.scrub_text,
            remove_covered_annotations: config.remove_covered_annotations,
            compress_content: config.compress_content,
        })
    }

    /// Produce redacted document bytes from `source`.
    ///
    /// Fails with [`RedactError::NothingToRedact`] on an empty store. A
    /// redaction addressing a missing page is reported in
    /// [`ExportReport::skipped`] and does not abort the export; any
    /// encoding or serialization failure does, and no bytes are returned.
    pub fn export(
        &self,
        source: &[u8],
        store: &RedactionStore,
    ) -> Result<ExportOutput, RedactError> {
        if store.is_empty() {
            return Err(RedactError::NothingToRedact);
        }

        let mut document = PdfDocument::load(source)?;
        let mut report = ExportReport::default();
        let mut per_page: BTreeMap<usize, Vec<PdfRect>> = BTreeMap::new();

        for redaction in store.redactions() {
            let Some(page) = document.page(redaction.page_index) else {
                tracing::warn!(
                    redaction_id = redaction.id,
                    page_index = redaction.page_index,
                    page_count = document.page_count(),
                    "redaction references a page outside the document; skipped"
                );
                report.skipped.push(ExportSkipped {
                    redaction_id: redaction.id,
                    page_index: redaction.page_index,
                    page_count: document.page_count(),
                });
                continue;
            };

            let displayed = map_to_page(&redaction.rect, redaction.capture_raster, page.size());
            let rect = unrotate_rect(&displayed, page.size(), page.rotation)
                .translate(page.crop_box[0], page.crop_box[1]);
            tracing::debug!(
                id = redaction.id,
                page_index = redaction.page_index,
                ?rect,
                "redaction mapped to page space"
            );

            per_page.entry(redaction.page_index).or_default().push(rect);
            report.applied.push(redaction.id);
        }

        for (page_index, rects) in &per_page {
            let page_id = document
                .page_id(*page_index)
                .ok_or(RedactError::UnknownPage(*page_index))?;
            self.redact_page(document.inner_mut(), page_id, rects, &mut report)?;
        }

        document.inner_mut().prune_objects();
        let bytes = document.save()?;

        tracing::info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            scrubbed_glyphs = report.scrubbed_glyphs,
            removed_annotations = report.removed_annotations,
            output_bytes = bytes.len(),
            "export complete"
        );
        Ok(ExportOutput { bytes, report })
    }

    fn redact_page(
        &self,
        doc: &mut Document,
        page_id: ObjectId,
        rects: &[PdfRect],
        report: &mut ExportReport,
    ) -> Result<(), RedactError> {
        let original = page_content(doc, page_id)?;

        let content = if self.scrub_text {
            let page = doc
                .get_object(page_id)
                .and_then(Object::as_dict)
                .map_err(|e| RedactError::ExportFailure(e.to_string()))?;
            let fonts = fonts::page_fonts(doc, page);
            let mut scrubber = TextScrubber::new(rects, &fonts);

            let mut content = b"q\n".to_vec();
            for segment in split_inline_images(&original)? {
                match segment {
                    Segment::Operators(bytes) => {
                        let decoded = Content::decode(bytes).map_err(|e| {
                            RedactError::ExportFailure(format!("Content stream: {}", e))
                        })?;
                        if decoded.operations.iter().any(|op| op.operator == "BI") {
                            return Err(RedactError::ExportFailure(
                                "Inline image not isolated from content".to_string(),
                            ));
                        }
                        let operations = scrubber.rewrite(decoded.operations);
                        let encoded = Content { operations }
                            .encode()
                            .map_err(|e| RedactError::ExportFailure(e.to_string()))?;
                        content.extend_from_slice(&encoded);
                    }
                    // Painted over like any other content; data kept as is
                    Segment::InlineImage(bytes) => content.extend_from_slice(bytes),
                }
                content.push(b'\n');
            }
            content.extend_from_slice(b"Q\n");
            content.extend_from_slice(&self.encoded_fill(rects)?);
            report.scrubbed_glyphs += scrubber.scrubbed();
            content
        } else {
            let fill = self.encoded_fill(rects)?;
            let mut content = Vec::with_capacity(original.len() + fill.len() + 8);
            content.extend_from_slice(b"q\n");
            content.extend_from_slice(&original);
            content.extend_from_slice(b"\nQ\n");
            content.extend_from_slice(&fill);
            content
        };

        let stream = if self.compress_content {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&content)
                .map_err(|e| RedactError::ExportFailure(e.to_string()))?;
            let compressed = encoder
                .finish()
                .map_err(|e| RedactError::ExportFailure(e.to_string()))?;
            Stream::new(dictionary! { "Filter" => "FlateDecode" }, compressed)
        } else {
            Stream::new(Dictionary::new(), content)
        };
        let content_id = doc.add_object(stream);

        if self.remove_covered_annotations {
            report.removed_annotations += remove_covered_annotations(doc, page_id, rects)?;
        }

        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| RedactError::ExportFailure(e.to_string()))?;
        page.set("Contents", Object::Reference(content_id));
        Ok(())
    }

    fn encoded_fill(&self, rects: &[PdfRect]) -> Result<Vec<u8>, RedactError> {
        Content {
            operations: self.fill_operations(rects),
        }
        .encode()
        .map_err(|e| RedactError::ExportFailure(e.to_string()))
    }

    /// Opaque fill over every rect; alpha is never applied here
    fn fill_operations(&self, rects: &[PdfRect]) -> Vec<Operation> {
        let mut ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "rg",
                vec![
                    Object::Real(self.fill.r),
                    Object::Real(self.fill.g),
                    Object::Real(self.fill.b),
                ],
            ),
        ];
        for rect in rects {
            ops.push(Operation::new(
                "re",
                vec![
                    Object::Real(rect.x as f32),
                    Object::Real(rect.y as f32),
                    Object::Real(rect.width as f32),
                    Object::Real(rect.height as f32),
                ],
            ));
        }
        ops.push(Operation::new("f", vec![]));
        ops.push(Operation::new("Q", vec![]));
        ops
    }
}

/// Decoded page content, concatenating every stream in `/Contents`
fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, RedactError> {
    let mut content = Vec::new();
    for stream_id in doc.get_page_contents(page_id) {
        let stream = doc
            .get_object(stream_id)
            .and_then(Object::as_stream)
            .map_err(|e| RedactError::ExportFailure(e.to_string()))?;
        if stream.dict.has(b"Filter") {
            let data = stream.decompressed_content().map_err(|e| {
                RedactError::ExportFailure(format!("Cannot decode content {:?}: {}", stream_id, e))
            })?;
            content.extend_from_slice(&data);
        } else {
            content.extend_from_slice(&stream.content);
        }
        // Streams may split tokens only at whitespace
        content.push(b'\n');
    }
    Ok(content)
}

/// Drop annotations whose `/Rect` meets any rect; returns how many went
fn remove_covered_annotations(
    doc: &mut Document,
    page_id: ObjectId,
    rects: &[PdfRect],
) -> Result<usize, RedactError> {
    let page = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| RedactError::ExportFailure(e.to_string()))?;
    let annots = match page.get(b"Annots").map(|o| resolve(doc, o)) {
        Ok(Object::Array(annots)) => annots,
        _ => return Ok(0),
    };

    let (kept, removed): (Vec<Object>, Vec<Object>) = annots
        .iter()
        .cloned()
        .partition(|annot| match annotation_rect(doc, annot) {
            Some(bounds) => !rects.iter().any(|r| r.intersects(&bounds)),
            None => true,
        });
    if removed.is_empty() {
        return Ok(0);
    }

    // A popup links back to its parent through /Parent, so leaving it on the
    // page would keep the removed annotation and its /Contents in the file
    let removed_ids: Vec<ObjectId> = removed
        .iter()
        .filter_map(|annot| annot.as_reference().ok())
        .collect();
    let popup_ids: Vec<ObjectId> = removed
        .iter()
        .filter_map(|annot| {
            let dict = resolve(doc, annot).as_dict().ok()?;
            dict.get(b"Popup").ok()?.as_reference().ok()
        })
        .collect();
    let (kept, orphaned): (Vec<Object>, Vec<Object>) = kept
        .into_iter()
        .partition(|annot| !is_popup_of(doc, annot, &removed_ids, &popup_ids));
    let removed_count = removed.len() + orphaned.len();

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| RedactError::ExportFailure(e.to_string()))?;
    if kept.is_empty() {
        page.remove(b"Annots");
    } else {
        page.set("Annots", Object::Array(kept));
    }
    tracing::debug!(count = removed_count, ?page_id, "covered annotations removed");
    Ok(removed_count)
}

fn is_popup_of(
    doc: &Document,
    annot: &Object,
    removed_ids: &[ObjectId],
    popup_ids: &[ObjectId],
) -> bool {
    if let Ok(id) = annot.as_reference() {
        if popup_ids.contains(&id) {
            return true;
        }
    }
    resolve(doc, annot)
        .as_dict()
        .and_then(|dict| dict.get(b"Parent"))
        .and_then(Object::as_reference)
        .map_or(false, |parent| removed_ids.contains(&parent))
}

fn annotation_rect(doc: &Document, annot: &Object) -> Option<PdfRect> {
    let dict = resolve(doc, annot).as_dict().ok()?;
    let array = resolve(doc, dict.get(b"Rect").ok()?).as_array().ok()?;
    let [x0, y0, x1, y1] = parse_box_array(array).ok()?;
    Some(PdfRect::from_points(x0, y0, x1, y1))
}
