//! Fixture PDFs and inspection helpers shared by the integration tests

#![allow(dead_code)]

use lopdf::content::Content;
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub struct PageSpec {
    pub media_box: [i64; 4],
    pub crop_box: Option<[i64; 4]>,
    pub rotate: Option<i64>,
    pub content: String,
    /// Annotation rects as `[x1, y1, x2, y2]`
    pub annots: Vec<[i64; 4]>,
    /// Text annotations as `(rect, contents)`, each with a popup placed
    /// away from the page's text
    pub notes: Vec<([i64; 4], String)>,
}

impl PageSpec {
    pub fn letter(content: &str) -> Self {
        Self {
            media_box: [0, 0, 612, 792],
            crop_box: None,
            rotate: None,
            content: content.to_string(),
            annots: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn rotated(mut self, degrees: i64) -> Self {
        self.rotate = Some(degrees);
        self
    }

    pub fn with_media_box(mut self, media_box: [i64; 4]) -> Self {
        self.media_box = media_box;
        self
    }

    pub fn with_crop_box(mut self, crop_box: [i64; 4]) -> Self {
        self.crop_box = Some(crop_box);
        self
    }

    pub fn with_note(mut self, rect: [i64; 4], contents: &str) -> Self {
        self.notes.push((rect, contents.to_string()));
        self
    }

    pub fn with_annot(mut self, rect: [i64; 4]) -> Self {
        self.annots.push(rect);
        self
    }
}

/// Text page: a secret line at (72, 700) and a public line at (72, 500),
/// both 12pt in a font where every glyph is 600 units wide.
pub const SECRET_PAGE: &str = "BT /F1 12 Tf 72 700 Td (SECRET-1234) Tj ET\n\
                               BT /F1 12 Tf 72 500 Td (Public line) Tj ET";

/// Build a PDF whose pages share one font resource `/F1`
pub fn build_pdf(pages: &[PageSpec]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "FirstChar" => 32,
        "LastChar" => 126,
        "Widths" => (32..=126).map(|_| Object::Integer(600)).collect::<Vec<_>>(),
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => Object::Reference(font_id) },
    });

    let mut kids = Vec::new();
    for spec in pages {
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            spec.content.as_bytes().to_vec(),
        ));

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => spec.media_box.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
            "Resources" => Object::Reference(resources_id),
            "Contents" => Object::Reference(content_id),
        };
        if let Some(rotate) = spec.rotate {
            page.set("Rotate", rotate);
        }
        if let Some(crop_box) = spec.crop_box {
            page.set(
                "CropBox",
                crop_box.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
            );
        }
        let page_id = doc.new_object_id();
        let mut annots: Vec<Object> = spec
            .annots
            .iter()
            .map(|rect| {
                Object::Reference(doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Square",
                    "Rect" => rect.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
                }))
            })
            .collect();
        for (rect, contents) in &spec.notes {
            let note_id = doc.new_object_id();
            let popup_id = doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Popup",
                "Rect" => [400, 100, 580, 200].iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
                "Parent" => Object::Reference(note_id),
                "P" => Object::Reference(page_id),
            });
            doc.objects.insert(
                note_id,
                Object::Dictionary(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Text",
                    "Rect" => rect.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
                    "Contents" => Object::string_literal(contents.as_str()),
                    "Popup" => Object::Reference(popup_id),
                    "P" => Object::Reference(page_id),
                }),
            );
            annots.push(Object::Reference(note_id));
            annots.push(Object::Reference(popup_id));
        }
        if !annots.is_empty() {
            page.set("Annots", annots);
        }
        doc.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

fn page_id(doc: &Document, page_index: usize) -> lopdf::ObjectId {
    *doc.get_pages()
        .get(&(page_index as u32 + 1))
        .expect("page exists")
}

/// Decoded content of a page (zero-based index)
pub fn page_content(bytes: &[u8], page_index: usize) -> Vec<u8> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_page_content(page_id(&doc, page_index)).unwrap()
}

pub fn page_count(bytes: &[u8]) -> usize {
    Document::load_mem(bytes).unwrap().get_pages().len()
}

pub fn annotation_count(bytes: &[u8], page_index: usize) -> usize {
    let doc = Document::load_mem(bytes).unwrap();
    let page = doc
        .get_object(page_id(&doc, page_index))
        .and_then(Object::as_dict)
        .unwrap();
    match page.get(b"Annots") {
        Ok(Object::Array(annots)) => annots.len(),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(Object::as_array)
            .map(|a| a.len())
            .unwrap_or(0),
        _ => 0,
    }
}

/// Operands of every `re` operator on the page
pub fn filled_rects(bytes: &[u8], page_index: usize) -> Vec<[f64; 4]> {
    let content = Content::decode(&page_content(bytes, page_index)).unwrap();
    content
        .operations
        .iter()
        .filter(|op| op.operator == "re")
        .map(|op| {
            let mut rect = [0.0; 4];
            for (slot, operand) in rect.iter_mut().zip(&op.operands) {
                *slot = match operand {
                    Object::Integer(n) => *n as f64,
                    Object::Real(n) => *n as f64,
                    other => panic!("non-numeric re operand {:?}", other),
                };
            }
            rect
        })
        .collect()
}

pub fn approx_rect(actual: [f64; 4], expected: [f64; 4]) -> bool {
    actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| (a - e).abs() < 1e-3)
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
