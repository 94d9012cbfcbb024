//! Coordinate transformation between display (raster) and page coordinate systems
//!
//! Display space: pixels, origin top-left, Y grows downward.
//! Page space: points, origin bottom-left, Y grows upward.
//!
//! X and Y scale factors are computed independently. Nothing here clamps to
//! page bounds; a rect hanging off the page clips when drawn.

use serde::{Deserialize, Serialize};

/// Dimensions of the on-screen raster for a page at a given moment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RasterSize {
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl RasterSize {
    pub fn new(pixel_width: u32, pixel_height: u32) -> Self {
        Self {
            pixel_width,
            pixel_height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_width == 0 || self.pixel_height == 0
    }

    /// Whether a display-space point lies on this raster
    pub fn contains(&self, x: f64, y: f64) -> bool {
        !self.is_empty()
            && x >= 0.0
            && y >= 0.0
            && x <= self.pixel_width as f64
            && y <= self.pixel_height as f64
    }
}

/// Intrinsic page size in points
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Rectangle in display pixels, top-left anchored
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a normalized rect from two drag endpoints in any order
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Rescale a rect captured on one raster onto another raster of the same page
    pub fn rescale(&self, from: RasterSize, to: RasterSize) -> DisplayRect {
        if from == to || from.is_empty() {
            return *self;
        }
        let sx = to.pixel_width as f64 / from.pixel_width as f64;
        let sy = to.pixel_height as f64 / from.pixel_height as f64;
        DisplayRect {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }

    /// The rect as fractions of the raster it was drawn on, each in `[0, 1]` when on-page
    pub fn to_fraction(&self, raster: RasterSize) -> DisplayRect {
        let w = raster.pixel_width as f64;
        let h = raster.pixel_height as f64;
        DisplayRect {
            x: self.x / w,
            y: self.y / h,
            width: self.width / w,
            height: self.height / h,
        }
    }
}

/// Rectangle in page space, bottom-left anchored
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rect containing both corner points
    pub fn from_points(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    pub fn translate(&self, dx: f64, dy: f64) -> PdfRect {
        PdfRect {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Open-interval overlap test; rects that merely touch do not intersect
    pub fn intersects(&self, other: &PdfRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.top()
            && other.y < self.top()
    }
}

/// Map a normalized display rect onto page space.
///
/// `display` must already be normalized (non-negative width and height).
pub fn map_to_page(display: &DisplayRect, raster: RasterSize, page: PageSize) -> PdfRect {
    let scale_x = page.width / raster.pixel_width as f64;
    let scale_y = page.height / raster.pixel_height as f64;

    PdfRect {
        x: display.x * scale_x,
        y: page.height - (display.y + display.height) * scale_y,
        width: display.width * scale_x,
        height: display.height * scale_y,
    }
}

/// Inverse of [`map_to_page`]
pub fn map_to_display(rect: &PdfRect, raster: RasterSize, page: PageSize) -> DisplayRect {
    let scale_x = raster.pixel_width as f64 / page.width;
    let scale_y = raster.pixel_height as f64 / page.height;

    DisplayRect {
        x: rect.x * scale_x,
        y: (page.height - rect.y - rect.height) * scale_y,
        width: rect.width * scale_x,
        height: rect.height * scale_y,
    }
}

/// Normalize a `/Rotate` value to 0, 90, 180 or 270
pub fn normalize_rotation(angle: i32) -> i32 {
    let normalized = angle % 360;
    if normalized < 0 {
        normalized + 360
    } else {
        normalized
    }
}

/// Size of the page as it appears on screen after `/Rotate`
pub fn displayed_size(unrotated: PageSize, rotation: i32) -> PageSize {
    match normalize_rotation(rotation) {
        90 | 270 => PageSize::new(unrotated.height, unrotated.width),
        _ => unrotated,
    }
}

/// Convert a rect in displayed (rotated) page space back to the page's
/// unrotated user space. `displayed` is the rotated page size.
pub fn unrotate_rect(rect: &PdfRect, displayed: PageSize, rotation: i32) -> PdfRect {
    let rotation = normalize_rotation(rotation);
    if rotation == 0 {
        return *rect;
    }

    // Unrotated page dimensions
    let (w, h) = match rotation {
        90 | 270 => (displayed.height, displayed.width),
        _ => (displayed.width, displayed.height),
    };

    let unrotate_point = |u: f64, v: f64| -> (f64, f64) {
        match rotation {
            90 => (w - v, u),
            180 => (w - u, h - v),
            270 => (v, h - u),
            _ => (u, v),
        }
    };

    let (x0, y0) = unrotate_point(rect.x, rect.y);
    let (x1, y1) = unrotate_point(rect.right(), rect.top());
    PdfRect::from_points(x0, y0, x1, y1)
}
