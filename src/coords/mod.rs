//! # Coordinate Transforms
//!
//! Three spaces, related by per-page metadata and the zoom scale:
//!
//! | Space | Unit | Origin |
//! |-------|------|--------|
//! | document | PDF points, unrotated page | top-left of the page |
//! | raster | pixels of the rendered page image, rotation applied | top-left of the image |
//! | display | raster pixels × zoom scale | top-left of the viewport |
//!
//! ```text
//! document ──clamp, scale, rotate──► raster ──× scale──► display
//! document ◄──unrotate, unscale, clamp── raster ◄──÷ scale── display
//! ```
//!
//! All persisted boxes live in document space. `PageMeta` is the only source
//! of scale factors; nothing here assumes a resolution.

pub mod zoom;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::model::Rect;
use crate::{Error, Result};

pub use zoom::{ZoomMode, ZoomState};

/// Slack allowed outside the page when clamping document boxes.
pub const PAGE_CLAMP_SLACK: f64 = 0.5;

/// Minimum fit-scale change that is recorded.
pub const FIT_SCALE_EPSILON: f64 = 0.0005;

// ============================================================================
// Rotation
// ============================================================================

/// Clockwise page rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(&self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    /// True when the rotated image swaps width and height.
    pub fn is_quarter_turn(&self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }
}

impl TryFrom<i32> for Rotation {
    type Error = Error;

    fn try_from(degrees: i32) -> Result<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Cw90),
            180 => Ok(Rotation::Cw180),
            270 => Ok(Rotation::Cw270),
            _ => Err(Error::Geometry(format!("unsupported rotation {degrees}"))),
        }
    }
}

impl From<Rotation> for i32 {
    fn from(r: Rotation) -> i32 {
        r.degrees()
    }
}

// ============================================================================
// PageMeta
// ============================================================================

/// Render metadata for one page, produced by the rasterizer.
///
/// Raster dimensions are those of the unrotated image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page_width_pts: f64,
    pub page_height_pts: f64,
    pub raster_width_px: f64,
    pub raster_height_px: f64,
    #[serde(default)]
    pub rotation: Rotation,
}

impl PageMeta {
    pub fn new(
        page_width_pts: f64,
        page_height_pts: f64,
        raster_width_px: f64,
        raster_height_px: f64,
        rotation: Rotation,
    ) -> Result<Self> {
        let meta = Self { page_width_pts, page_height_pts, raster_width_px, raster_height_px, rotation };
        meta.validate()?;
        Ok(meta)
    }

    /// All four dimensions must be positive and finite.
    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("page_width_pts", self.page_width_pts),
            ("page_height_pts", self.page_height_pts),
            ("raster_width_px", self.raster_width_px),
            ("raster_height_px", self.raster_height_px),
        ];
        for (name, v) in dims {
            if !v.is_finite() || v <= 0.0 {
                return Err(Error::Geometry(format!("{name} must be positive, got {v}")));
            }
        }
        Ok(())
    }

    /// Pixels per point along x and y.
    pub fn scale_factors(&self) -> (f64, f64) {
        (
            self.raster_width_px / self.page_width_pts,
            self.raster_height_px / self.page_height_pts,
        )
    }

    /// Width and height of the raster after rotation.
    pub fn rotated_raster_size(&self) -> (f64, f64) {
        if self.rotation.is_quarter_turn() {
            (self.raster_height_px, self.raster_width_px)
        } else {
            (self.raster_width_px, self.raster_height_px)
        }
    }

    fn rotate(&self, x: f64, y: f64) -> (f64, f64) {
        let (rw, rh) = (self.raster_width_px, self.raster_height_px);
        match self.rotation {
            Rotation::None => (x, y),
            Rotation::Cw90 => (rh - y, x),
            Rotation::Cw180 => (rw - x, rh - y),
            Rotation::Cw270 => (y, rw - x),
        }
    }

    fn unrotate(&self, x: f64, y: f64) -> (f64, f64) {
        let (rw, rh) = (self.raster_width_px, self.raster_height_px);
        match self.rotation {
            Rotation::None => (x, y),
            Rotation::Cw90 => (y, rh - x),
            Rotation::Cw180 => (rw - x, rh - y),
            Rotation::Cw270 => (rw - y, x),
        }
    }
}

// ============================================================================
// Transforms
// ============================================================================

/// Clamp a document box to the page, allowing `PAGE_CLAMP_SLACK` points of
/// overhang on every side.
pub fn clamp_to_page(rect: &Rect, meta: &PageMeta) -> Rect {
    let s = PAGE_CLAMP_SLACK;
    let cx = |v: f64| v.clamp(-s, meta.page_width_pts + s);
    let cy = |v: f64| v.clamp(-s, meta.page_height_pts + s);
    Rect::normalized(cx(rect.x1), cy(rect.y1), cx(rect.x2), cy(rect.y2))
}

pub fn document_to_raster(rect: &Rect, meta: &PageMeta) -> Rect {
    let r = clamp_to_page(rect, meta);
    let (sx, sy) = meta.scale_factors();
    let (ax, ay) = meta.rotate(r.x1 * sx, r.y1 * sy);
    let (bx, by) = meta.rotate(r.x2 * sx, r.y2 * sy);
    Rect::normalized(ax, ay, bx, by)
}

pub fn raster_to_document(rect: &Rect, meta: &PageMeta) -> Rect {
    let (x1, y1) = raster_point_to_document(rect.x1, rect.y1, meta);
    let (x2, y2) = raster_point_to_document(rect.x2, rect.y2, meta);
    clamp_to_page(&Rect::normalized(x1, y1, x2, y2), meta)
}

/// Map a single raster point back to unclamped document coordinates.
pub fn raster_point_to_document(x: f64, y: f64, meta: &PageMeta) -> (f64, f64) {
    let (sx, sy) = meta.scale_factors();
    let (ux, uy) = meta.unrotate(x, y);
    (ux / sx, uy / sy)
}

pub fn raster_to_display(rect: &Rect, scale: f64) -> Result<Rect> {
    check_scale(scale)?;
    Ok(rect.scaled(scale))
}

pub fn display_to_raster(rect: &Rect, scale: f64) -> Result<Rect> {
    check_scale(scale)?;
    Ok(rect.scaled(1.0 / scale))
}

fn check_scale(scale: f64) -> Result<()> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(Error::Geometry(format!("display scale must be positive, got {scale}")))
    }
}

// ============================================================================
// PageRegistry
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct PageEntry {
    meta: PageMeta,
    fit_scale: f64,
}

/// Page metadata by 1-based sheet number, plus each page's fit-to-view scale.
///
/// Every sheet-keyed transform fails with `Error::Geometry` when the sheet
/// has no metadata.
#[derive(Debug, Clone, Default)]
pub struct PageRegistry {
    pages: HashMap<u32, PageEntry>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a sheet's metadata. A replaced sheet keeps its
    /// fit scale.
    pub fn insert(&mut self, sheet: u32, meta: PageMeta) -> Result<()> {
        if sheet == 0 {
            return Err(Error::Geometry("sheet numbers start at 1".into()));
        }
        meta.validate()?;
        let fit_scale = self.pages.get(&sheet).map_or(1.0, |e| e.fit_scale);
        self.pages.insert(sheet, PageEntry { meta, fit_scale });
        Ok(())
    }

    pub fn remove(&mut self, sheet: u32) -> Option<PageMeta> {
        self.pages.remove(&sheet).map(|e| e.meta)
    }

    pub fn get(&self, sheet: u32) -> Result<&PageMeta> {
        self.pages
            .get(&sheet)
            .map(|e| &e.meta)
            .ok_or_else(|| Error::Geometry(format!("no page metadata for sheet {sheet}")))
    }

    pub fn contains(&self, sheet: u32) -> bool {
        self.pages.contains_key(&sheet)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn fit_scale(&self, sheet: u32) -> Option<f64> {
        self.pages.get(&sheet).map(|e| e.fit_scale)
    }

    /// Record a new fit scale. Returns false when the sheet is unknown or the
    /// change is below `FIT_SCALE_EPSILON`.
    pub fn update_fit_scale(&mut self, sheet: u32, fit: f64) -> Result<bool> {
        check_scale(fit)?;
        let Some(entry) = self.pages.get_mut(&sheet) else {
            return Ok(false);
        };
        if (entry.fit_scale - fit).abs() < FIT_SCALE_EPSILON {
            return Ok(false);
        }
        entry.fit_scale = fit;
        Ok(true)
    }

    pub fn document_to_raster(&self, sheet: u32, rect: &Rect) -> Result<Rect> {
        Ok(document_to_raster(rect, self.get(sheet)?))
    }

    pub fn raster_to_document(&self, sheet: u32, rect: &Rect) -> Result<Rect> {
        Ok(raster_to_document(rect, self.get(sheet)?))
    }
}
