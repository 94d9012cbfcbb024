//! Rectangle redaction for PDF documents
//!
//! A host renders pages to rasters and forwards pointer events. Drags on a
//! page become redactions in display space; export maps them onto page space
//! and burns opaque fills into the document using lopdf.
//!
//! - [`session::RedactionSession`] ties the pieces together for one document
//! - [`geometry`] converts between display pixels and page points
//! - [`export::ExportEngine`] produces the redacted bytes

pub mod compositor;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod geometry;
pub mod session;
pub mod store;
pub mod surface;

pub use compositor::{OverlayRaster, RedactionCompositor};
pub use config::{RedactConfig, Rgb};
pub use document::{DocumentHandle, Page, PageRenderer, PdfDocument, RenderedPage};
pub use error::RedactError;
pub use export::{ExportEngine, ExportOutput, ExportReport, ExportSkipped};
pub use geometry::{map_to_display, map_to_page, DisplayRect, PageSize, PdfRect, RasterSize};
pub use session::RedactionSession;
pub use store::{Redaction, RedactionId, RedactionStore};
pub use surface::{ActiveSurface, AnnotationSurface, PointerEvent, PointerKind, SurfaceOutcome};
