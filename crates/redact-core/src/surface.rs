//! Per-page pointer state machine producing committed redactions
//!
//! Every page gets its own [`AnnotationSurface`]. All surfaces share one
//! [`ActiveSurface`] token, owned by the session, so a drag that starts on
//! one page can never be finished by another page's handlers.

use crate::geometry::{DisplayRect, RasterSize};
use crate::store::{RedactionId, RedactionStore};

/// Permit naming the page that currently owns an in-progress drag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSurface {
    holder: Option<usize>,
}

impl ActiveSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self) -> Option<usize> {
        self.holder
    }

    pub fn is_held_by(&self, page_index: usize) -> bool {
        self.holder == Some(page_index)
    }

    /// Claim the token; fails if another page holds it
    fn claim(&mut self, page_index: usize) -> bool {
        match self.holder {
            Some(holder) if holder != page_index => false,
            _ => {
                self.holder = Some(page_index);
                true
            }
        }
    }

    fn release(&mut self, page_index: usize) {
        if self.is_held_by(page_index) {
            self.holder = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
    Leave,
}

/// A pointer event in the surface's display coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub x: f64,
    pub y: f64,
}

impl PointerEvent {
    pub fn down(x: f64, y: f64) -> Self {
        Self {
            kind: PointerKind::Down,
            x,
            y,
        }
    }

    pub fn moved(x: f64, y: f64) -> Self {
        Self {
            kind: PointerKind::Move,
            x,
            y,
        }
    }

    pub fn up(x: f64, y: f64) -> Self {
        Self {
            kind: PointerKind::Up,
            x,
            y,
        }
    }

    pub fn leave(x: f64, y: f64) -> Self {
        Self {
            kind: PointerKind::Leave,
            x,
            y,
        }
    }
}

/// In-progress drag; never persisted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DraftRect {
    pub page_index: usize,
    pub start_x: f64,
    pub start_y: f64,
    pub current_x: f64,
    pub current_y: f64,
}

impl DraftRect {
    pub fn rect(&self) -> DisplayRect {
        DisplayRect::from_corners(self.start_x, self.start_y, self.current_x, self.current_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceState {
    Idle,
    Drawing(DraftRect),
}

/// What a dispatched event did. Anything but `Ignored` needs a repaint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceOutcome {
    Ignored,
    Started,
    DraftChanged,
    Committed(RedactionId),
    /// Drag ended with zero area; nothing stored
    Discarded,
}

impl SurfaceOutcome {
    pub fn needs_repaint(&self) -> bool {
        !matches!(self, SurfaceOutcome::Ignored)
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationSurface {
    page_index: usize,
    raster: RasterSize,
    state: SurfaceState,
}

impl AnnotationSurface {
    pub fn new(page_index: usize) -> Self {
        Self {
            page_index,
            raster: RasterSize::default(),
            state: SurfaceState::Idle,
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn raster(&self) -> RasterSize {
        self.raster
    }

    /// Record the raster currently shown for this page
    pub fn set_raster(&mut self, raster: RasterSize) {
        self.raster = raster;
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, SurfaceState::Drawing(_))
    }

    pub fn draft(&self) -> Option<DisplayRect> {
        match self.state {
            SurfaceState::Drawing(draft) => Some(draft.rect()),
            SurfaceState::Idle => None,
        }
    }

    pub fn handle(
        &mut self,
        event: PointerEvent,
        token: &mut ActiveSurface,
        store: &mut RedactionStore,
    ) -> SurfaceOutcome {
        match event.kind {
            PointerKind::Down => self.pointer_down(event.x, event.y, token),
            PointerKind::Move => self.pointer_move(event.x, event.y, token),
            PointerKind::Up | PointerKind::Leave => {
                self.finish(event.x, event.y, token, store)
            }
        }
    }

    fn pointer_down(&mut self, x: f64, y: f64, token: &mut ActiveSurface) -> SurfaceOutcome {
        if self.is_drawing() || !self.raster.contains(x, y) {
            return SurfaceOutcome::Ignored;
        }
        if !token.claim(self.page_index) {
            return SurfaceOutcome::Ignored;
        }

        self.state = SurfaceState::Drawing(DraftRect {
            page_index: self.page_index,
            start_x: x,
            start_y: y,
            current_x: x,
            current_y: y,
        });
        SurfaceOutcome::Started
    }

    fn pointer_move(&mut self, x: f64, y: f64, token: &ActiveSurface) -> SurfaceOutcome {
        if !token.is_held_by(self.page_index) {
            return SurfaceOutcome::Ignored;
        }
        match &mut self.state {
            SurfaceState::Drawing(draft) => {
                draft.current_x = x;
                draft.current_y = y;
                SurfaceOutcome::DraftChanged
            }
            SurfaceState::Idle => SurfaceOutcome::Ignored,
        }
    }

    /// Pointer up and pointer leave both commit whatever rect exists at that instant
    fn finish(
        &mut self,
        x: f64,
        y: f64,
        token: &mut ActiveSurface,
        store: &mut RedactionStore,
    ) -> SurfaceOutcome {
        if !token.is_held_by(self.page_index) {
            return SurfaceOutcome::Ignored;
        }
        let SurfaceState::Drawing(mut draft) = self.state else {
            return SurfaceOutcome::Ignored;
        };

        draft.current_x = x;
        draft.current_y = y;
        self.state = SurfaceState::Idle;
        token.release(self.page_index);

        match store.add(self.page_index, draft.rect(), self.raster) {
            Some(id) => SurfaceOutcome::Committed(id),
            None => SurfaceOutcome::Discarded,
        }
    }
}
