//! Redaction session for a single document
//!
//! Owns everything a host UI needs between load and export: one surface and
//! one overlay per page, the shared active-surface token, and the store.

use crate::compositor::{OverlayRaster, RedactionCompositor};
use crate::config::RedactConfig;
use crate::document::{DocumentHandle, PageRenderer, PdfDocument, RenderedPage};
use crate::error::RedactError;
use crate::export::{ExportEngine, ExportOutput};
use crate::geometry::RasterSize;
use crate::store::{Redaction, RedactionId, RedactionStore};
use crate::surface::{ActiveSurface, AnnotationSurface, PointerEvent, SurfaceOutcome};

/// Intrinsic sizes closer than this (points) are treated as equal
const SIZE_TOLERANCE: f64 = 0.5;

pub struct RedactionSession {
    source: Vec<u8>,
    document: PdfDocument,
    config: RedactConfig,
    store: RedactionStore,
    active: ActiveSurface,
    surfaces: Vec<AnnotationSurface>,
    overlays: Vec<OverlayRaster>,
    compositor: RedactionCompositor,
    engine: ExportEngine,
}

impl RedactionSession {
    /// Load a document. Invalid bytes or config fail before any state exists.
    pub fn open(bytes: &[u8], config: RedactConfig) -> Result<Self, RedactError> {
        let compositor = RedactionCompositor::new(&config)?;
        let engine = ExportEngine::new(&config)?;
        let document = PdfDocument::load(bytes)?;

        let page_count = document.page_count();
        Ok(Self {
            source: bytes.to_vec(),
            document,
            config,
            store: RedactionStore::new(),
            active: ActiveSurface::new(),
            surfaces: (0..page_count).map(AnnotationSurface::new).collect(),
            overlays: (0..page_count)
                .map(|_| OverlayRaster::new(RasterSize::default()))
                .collect(),
            compositor,
            engine,
        })
    }

    pub fn document(&self) -> &PdfDocument {
        &self.document
    }

    pub fn page_count(&self) -> usize {
        self.document.page_count()
    }

    pub fn config(&self) -> &RedactConfig {
        &self.config
    }

    pub fn store(&self) -> &RedactionStore {
        &self.store
    }

    /// Page currently owning a drag, if any
    pub fn active_page(&self) -> Option<usize> {
        self.active.holder()
    }

    pub fn surface(&self, page_index: usize) -> Option<&AnnotationSurface> {
        self.surfaces.get(page_index)
    }

    pub fn overlay(&self, page_index: usize) -> Option<&OverlayRaster> {
        self.overlays.get(page_index)
    }

    /// Rasterize a page through the host renderer and size its overlay to match
    pub fn render_page(
        &mut self,
        renderer: &mut dyn PageRenderer,
        page_index: usize,
    ) -> Result<RenderedPage, RedactError> {
        let page = self
            .document
            .page(page_index)
            .ok_or(RedactError::UnknownPage(page_index))?;

        if let Some(reported) = renderer.page_intrinsic_size(page_index) {
            let expected = page.size();
            if (reported.width - expected.width).abs() > SIZE_TOLERANCE
                || (reported.height - expected.height).abs() > SIZE_TOLERANCE
            {
                tracing::warn!(
                    page_index,
                    ?reported,
                    ?expected,
                    "renderer disagrees on page size; export uses the document's"
                );
            }
        }

        let rendered = renderer.render_page(page_index)?;
        self.resize_raster(page_index, rendered.size)?;
        Ok(rendered)
    }

    /// The page's raster changed size without a new render
    pub fn resize_raster(&mut self, page_index: usize, size: RasterSize) -> Result<(), RedactError> {
        let (Some(surface), Some(overlay)) = (
            self.surfaces.get_mut(page_index),
            self.overlays.get_mut(page_index),
        ) else {
            return Err(RedactError::UnknownPage(page_index));
        };

        surface.set_raster(size);
        overlay.resize(size);
        tracing::debug!(page_index, ?size, "page raster resized");
        self.repaint(page_index);
        Ok(())
    }

    /// Dispatch a pointer event to a page's surface.
    ///
    /// Events for pages the document does not have are ignored.
    pub fn pointer(&mut self, page_index: usize, event: PointerEvent) -> SurfaceOutcome {
        let Some(surface) = self.surfaces.get_mut(page_index) else {
            return SurfaceOutcome::Ignored;
        };

        let outcome = surface.handle(event, &mut self.active, &mut self.store);
        if outcome.needs_repaint() {
            self.repaint(page_index);
        }
        outcome
    }

    /// Undo a committed redaction
    pub fn remove_redaction(&mut self, id: RedactionId) -> Option<Redaction> {
        let removed = self.store.remove(id)?;
        self.repaint(removed.page_index);
        Some(removed)
    }

    pub fn export(&self) -> Result<ExportOutput, RedactError> {
        self.engine.export(&self.source, &self.store)
    }

    pub fn overlay_png(&self, page_index: usize) -> Result<Vec<u8>, RedactError> {
        self.overlays
            .get(page_index)
            .ok_or(RedactError::UnknownPage(page_index))?
            .encode_png()
    }

    fn repaint(&mut self, page_index: usize) {
        let (Some(surface), Some(overlay)) = (
            self.surfaces.get(page_index),
            self.overlays.get_mut(page_index),
        ) else {
            return;
        };
        self.compositor
            .repaint(overlay, page_index, &self.store, surface.draft());
    }
}
