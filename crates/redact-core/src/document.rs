//! Source document loading and page geometry
//!
//! Pages are addressed by zero-based index. lopdf numbers pages from one;
//! that mapping never leaves this module.

use crate::error::RedactError;
use crate::geometry::{displayed_size, normalize_rotation, PageSize, RasterSize};
use lopdf::{Dictionary, Document, Object, ObjectId};

/// A page of the loaded document
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Zero-based page index
    pub index: usize,
    /// Intrinsic width in points as displayed (after `/Rotate`)
    pub width: f64,
    /// Intrinsic height in points as displayed (after `/Rotate`)
    pub height: f64,
    /// `[x1, y1, x2, y2]` in unrotated user space
    pub media_box: [f64; 4],
    /// Visible region: the CropBox clipped to the MediaBox. Renderers
    /// rasterize this, so it defines the page's size and origin.
    pub crop_box: [f64; 4],
    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    pub rotation: i32,
}

impl Page {
    pub fn size(&self) -> PageSize {
        PageSize::new(self.width, self.height)
    }
}

/// Result of rasterizing a page for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedPage {
    /// Opaque handle understood only by the renderer's host
    pub raster_handle: u64,
    pub size: RasterSize,
}

/// Page rasterizer supplied by the host (e.g. pdf.js or pdfium)
pub trait PageRenderer {
    fn render_page(&mut self, page_index: usize) -> Result<RenderedPage, RedactError>;

    fn page_intrinsic_size(&self, page_index: usize) -> Option<PageSize>;
}

/// Read-only view of a loaded document's pages
pub trait DocumentHandle {
    fn page_count(&self) -> usize;

    fn page(&self, index: usize) -> Option<&Page>;
}

/// A parsed PDF with page geometry resolved up front
#[derive(Debug)]
pub struct PdfDocument {
    document: Document,
    pages: Vec<Page>,
    page_ids: Vec<ObjectId>,
}

impl PdfDocument {
    /// Parse PDF bytes.
    ///
    /// Non-PDF input fails before any state is built.
    pub fn load(bytes: &[u8]) -> Result<Self, RedactError> {
        check_header(bytes)?;

        let document =
            Document::load_mem(bytes).map_err(|e| RedactError::ParseError(e.to_string()))?;
        if document.is_encrypted() {
            return Err(RedactError::InvalidInput(
                "Encrypted documents cannot be redacted".to_string(),
            ));
        }

        let mut pages = Vec::new();
        let mut page_ids = Vec::new();
        for (index, (page_num, page_id)) in document.get_pages().into_iter().enumerate() {
            let page = read_page(&document, index, page_id)
                .map_err(|e| RedactError::ParseError(format!("Page {}: {}", page_num, e)))?;
            pages.push(page);
            page_ids.push(page_id);
        }

        tracing::debug!(page_count = pages.len(), "document loaded");
        Ok(Self {
            document,
            pages,
            page_ids,
        })
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub(crate) fn page_id(&self, index: usize) -> Option<ObjectId> {
        self.page_ids.get(index).copied()
    }

    pub(crate) fn inner_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Serialize the (possibly mutated) document
    pub fn save(&mut self) -> Result<Vec<u8>, RedactError> {
        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|e| RedactError::ExportFailure(e.to_string()))?;
        Ok(output)
    }
}

impl DocumentHandle for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }
}

fn check_header(bytes: &[u8]) -> Result<(), RedactError> {
    if bytes.len() < 8 {
        return Err(RedactError::InvalidInput(
            "File too small to be a valid PDF".to_string(),
        ));
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(RedactError::InvalidInput(
            "Not a valid PDF file (missing %PDF- header)".to_string(),
        ));
    }
    Ok(())
}

fn read_page(doc: &Document, index: usize, page_id: ObjectId) -> Result<Page, String> {
    let page_dict = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| e.to_string())?;

    let media_box = match inherited(doc, page_dict, b"MediaBox") {
        Some(obj) => normalize_box(parse_box_array(
            resolve(doc, obj).as_array().map_err(|e| e.to_string())?,
        )?),
        // US Letter when nothing in the tree declares a MediaBox
        None => [0.0, 0.0, 612.0, 792.0],
    };
    // A malformed or disjoint CropBox falls back to the MediaBox
    let crop_box = inherited(doc, page_dict, b"CropBox")
        .and_then(|obj| resolve(doc, obj).as_array().ok())
        .and_then(|array| parse_box_array(array).ok())
        .and_then(|crop| clip_box(normalize_box(crop), media_box))
        .unwrap_or(media_box);
    let rotation = inherited(doc, page_dict, b"Rotate")
        .and_then(|obj| resolve(doc, obj).as_i64().ok())
        .map(|angle| normalize_rotation(angle as i32))
        .unwrap_or(0);

    let unrotated = PageSize::new(crop_box[2] - crop_box[0], crop_box[3] - crop_box[1]);
    let size = displayed_size(unrotated, rotation);

    Ok(Page {
        index,
        width: size.width,
        height: size.height,
        media_box,
        crop_box,
        rotation,
    })
}

/// Reorder corners so the box reads `[left, bottom, right, top]`
fn normalize_box(b: [f64; 4]) -> [f64; 4] {
    [b[0].min(b[2]), b[1].min(b[3]), b[0].max(b[2]), b[1].max(b[3])]
}

/// Intersection of two normalized boxes; `None` when it has no area
fn clip_box(inner: [f64; 4], outer: [f64; 4]) -> Option<[f64; 4]> {
    let clipped = [
        inner[0].max(outer[0]),
        inner[1].max(outer[1]),
        inner[2].min(outer[2]),
        inner[3].min(outer[3]),
    ];
    (clipped[2] > clipped[0] && clipped[3] > clipped[1]).then_some(clipped)
}

/// Follow a reference to its target, or return the object itself
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Look up an inheritable page attribute, walking up the `/Parent` chain
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut dict = page_dict;
    // Bounded walk guards against cyclic /Parent links
    for _ in 0..32 {
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        let parent_id = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        dict = doc.get_object(parent_id).and_then(Object::as_dict).ok()?;
    }
    None
}

/// Read a number, integer or real
pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(n) => Some(*n as f64),
        Object::Real(n) => Some(*n as f64),
        _ => None,
    }
}

/// Parse a box array [x1, y1, x2, y2]
pub(crate) fn parse_box_array(array: &[Object]) -> Result<[f64; 4], String> {
    if array.len() != 4 {
        return Err("Box must have 4 elements".to_string());
    }

    let mut result = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        result[i] = number(obj).ok_or_else(|| format!("Box element {} is not a number", i))?;
    }

    Ok(result)
}
