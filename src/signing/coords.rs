//! Viewer-space to page-space conversion.
//!
//! Protocol contract with the viewing client: click coordinates are
//! expressed on a logical canvas exactly [`VIEWER_WIDTH`] units wide with the
//! origin at the top-left. A client rendering at any other width must
//! rescale before sending. PDF page space has its origin at the bottom-left
//! and is measured in points.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Logical width of the viewer canvas.
pub const VIEWER_WIDTH: f64 = 800.0;

/// Subtracted after the y flip so the mark's baseline, not its top edge,
/// lands where the user clicked.
pub const MARK_HEIGHT_OFFSET: f64 = 60.0;

/// Image mark size on the viewer canvas; scaled like everything else.
pub const IMAGE_MARK_WIDTH: f64 = 150.0;
pub const IMAGE_MARK_HEIGHT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewerPoint {
    pub x: f64,
    pub y: f64,
}

impl ViewerPoint {
    pub fn new(x: f64, y: f64) -> Result<Self, AppError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(AppError::BadInput(format!(
                "placement coordinates must be finite, got ({x}, {y})"
            )));
        }
        Ok(ViewerPoint { x, y })
    }
}

/// Native size of a page in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Where and how large to draw a mark on the page, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkPlacement {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub image_width: f64,
    pub image_height: f64,
}

/// Map a viewer click onto a page.
///
/// `x = vx * W / 800`, `y = H - vy * W / 800 - 60`. Products are formed
/// before the division so that exact inputs stay exact.
pub fn map_to_page(point: ViewerPoint, page: PageSize) -> MarkPlacement {
    let scale = page.width / VIEWER_WIDTH;
    MarkPlacement {
        x: point.x * page.width / VIEWER_WIDTH,
        y: page.height - point.y * page.width / VIEWER_WIDTH - MARK_HEIGHT_OFFSET,
        scale,
        image_width: IMAGE_MARK_WIDTH * page.width / VIEWER_WIDTH,
        image_height: IMAGE_MARK_HEIGHT * page.width / VIEWER_WIDTH,
    }
}
