//! Overlay raster and the compositor that repaints it
//!
//! The overlay holds no vector state, so every repaint clears it and fills
//! every redaction on the page again, followed by the draft if one exists.

use crate::config::RedactConfig;
use crate::error::RedactError;
use crate::geometry::{DisplayRect, RasterSize};
use crate::store::RedactionStore;

/// RGBA8 overlay drawn over a rendered page
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRaster {
    size: RasterSize,
    pixels: Vec<u8>,
}

impl OverlayRaster {
    pub fn new(size: RasterSize) -> Self {
        Self {
            size,
            pixels: vec![0; Self::byte_len(size)],
        }
    }

    fn byte_len(size: RasterSize) -> usize {
        size.pixel_width as usize * size.pixel_height as usize * 4
    }

    pub fn size(&self) -> RasterSize {
        self.size
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Resize and clear
    pub fn resize(&mut self, size: RasterSize) {
        self.size = size;
        self.pixels.clear();
        self.pixels.resize(Self::byte_len(size), 0);
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.pixel_width || y >= self.size.pixel_height {
            return None;
        }
        let i = (y as usize * self.size.pixel_width as usize + x as usize) * 4;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[i..i + 4]);
        Some(px)
    }

    /// Fill every pixel the rect touches, clipped to the raster
    pub fn fill_rect(&mut self, rect: &DisplayRect, rgba: [u8; 4]) {
        let width = self.size.pixel_width as f64;
        let height = self.size.pixel_height as f64;

        let x0 = rect.x.floor().clamp(0.0, width) as usize;
        let y0 = rect.y.floor().clamp(0.0, height) as usize;
        let x1 = (rect.x + rect.width).ceil().clamp(0.0, width) as usize;
        let y1 = (rect.y + rect.height).ceil().clamp(0.0, height) as usize;
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let stride = self.size.pixel_width as usize * 4;
        for row in y0..y1 {
            let start = row * stride + x0 * 4;
            let end = row * stride + x1 * 4;
            for px in self.pixels[start..end].chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
    }

    /// Snapshot the overlay as a PNG image
    pub fn encode_png(&self) -> Result<Vec<u8>, RedactError> {
        let mut out = Vec::new();
        {
            let mut encoder =
                png::Encoder::new(&mut out, self.size.pixel_width, self.size.pixel_height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder
                .write_header()
                .map_err(|e| RedactError::ExportFailure(format!("PNG header: {}", e)))?;
            writer
                .write_image_data(&self.pixels)
                .map_err(|e| RedactError::ExportFailure(format!("PNG data: {}", e)))?;
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct RedactionCompositor {
    fill: [u8; 4],
    draft: [u8; 4],
}

impl RedactionCompositor {
    pub fn new(config: &RedactConfig) -> Result<Self, RedactError> {
        config.validate()?;
        Ok(Self {
            fill: config.fill_rgb()?.to_rgba8(config.preview_opacity),
            draft: config.draft_rgb()?.to_rgba8(config.preview_opacity),
        })
    }

    /// Redraw a page's overlay from the store plus the in-progress draft.
    ///
    /// Stored rects are re-derived proportionally for the overlay's current
    /// size, so a resized raster keeps redactions aligned with the page.
    pub fn repaint(
        &self,
        overlay: &mut OverlayRaster,
        page_index: usize,
        store: &RedactionStore,
        draft: Option<DisplayRect>,
    ) {
        overlay.clear();
        let raster = overlay.size();

        let mut painted = 0usize;
        for redaction in store.for_page(page_index) {
            overlay.fill_rect(&redaction.rect_on(raster), self.fill);
            painted += 1;
        }
        if let Some(draft) = draft {
            overlay.fill_rect(&draft, self.draft);
        }

        tracing::trace!(page_index, painted, has_draft = draft.is_some(), "overlay repainted");
    }
}
