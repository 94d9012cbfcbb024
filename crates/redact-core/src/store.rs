//! Redaction log for tracking committed redaction rectangles
//!
//! Redactions are kept in commit order and keyed by a monotonic id. Ids are
//! never reused, even after removal.

use crate::geometry::{DisplayRect, RasterSize};
use serde::de::Error as _;
use serde::{Deserialize, Serialize};

pub type RedactionId = u64;

/// A committed redaction, in display space plus the raster it was drawn on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Redaction {
    pub id: RedactionId,
    /// Zero-based page index
    pub page_index: usize,
    pub rect: DisplayRect,
    /// Raster size active when the rect was drawn. Export maps with this,
    /// never with whatever the raster happens to be later.
    pub capture_raster: RasterSize,
}

impl Redaction {
    /// Rect as a fraction of the capture raster
    pub fn page_fraction(&self) -> DisplayRect {
        self.rect.to_fraction(self.capture_raster)
    }

    /// Rect re-derived for a raster of a different size
    pub fn rect_on(&self, raster: RasterSize) -> DisplayRect {
        self.rect.rescale(self.capture_raster, raster)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactionStore {
    next_id: RedactionId,
    redactions: Vec<Redaction>,
}

impl RedactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a redaction and return its id.
    ///
    /// Returns `None` for a degenerate rect or an empty capture raster;
    /// zero-area redactions never enter the store.
    pub fn add(
        &mut self,
        page_index: usize,
        rect: DisplayRect,
        capture_raster: RasterSize,
    ) -> Option<RedactionId> {
        if rect.is_degenerate() || capture_raster.is_empty() {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;

        self.redactions.push(Redaction {
            id,
            page_index,
            rect,
            capture_raster,
        });
        tracing::debug!(id, page_index, ?rect, "redaction committed");
        Some(id)
    }

    pub fn remove(&mut self, id: RedactionId) -> Option<Redaction> {
        let pos = self.redactions.iter().position(|r| r.id == id)?;
        let removed = self.redactions.remove(pos);
        tracing::debug!(id, page_index = removed.page_index, "redaction removed");
        Some(removed)
    }

    pub fn get(&self, id: RedactionId) -> Option<&Redaction> {
        self.redactions.iter().find(|r| r.id == id)
    }

    pub fn redactions(&self) -> &[Redaction] {
        &self.redactions
    }

    pub fn for_page(&self, page_index: usize) -> impl Iterator<Item = &Redaction> {
        self.redactions
            .iter()
            .filter(move |r| r.page_index == page_index)
    }

    pub fn len(&self) -> usize {
        self.redactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.redactions.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Restore a saved store. Ids must be unique, and the counter is raised
    /// past the largest one so later adds never collide.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut store: Self = serde_json::from_str(json)?;

        let mut ids: Vec<RedactionId> = store.redactions.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(serde_json::Error::custom(format!(
                "duplicate redaction id {}",
                pair[0]
            )));
        }
        if let Some(max) = ids.last() {
            store.next_id = store.next_id.max(max.saturating_add(1));
        }
        Ok(store)
    }
}
