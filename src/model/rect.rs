//! Axis-aligned rectangle shared by the spatial index and the transform
//! pipeline.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A normalized axis-aligned rectangle: `x1 <= x2` and `y1 <= y2` always hold.
///
/// Deserialization goes through [`Rect::new`], so a payload with swapped
/// corners arrives normalized and one with NaN is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RectRepr")]
pub struct Rect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Wire shape of [`Rect`] before validation.
#[derive(Deserialize)]
struct RectRepr {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl TryFrom<RectRepr> for Rect {
    type Error = Error;

    fn try_from(r: RectRepr) -> Result<Self> {
        Rect::new(r.x1, r.y1, r.x2, r.y2)
    }
}

impl Rect {
    /// Build a rectangle from two corners in any order.
    ///
    /// Fails with `Error::Geometry` if any coordinate is NaN.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        if x1.is_nan() || y1.is_nan() || x2.is_nan() || y2.is_nan() {
            return Err(Error::Geometry(format!(
                "rectangle contains NaN: [{x1}, {y1}, {x2}, {y2}]"
            )));
        }
        Ok(Self::normalized(x1, y1, x2, y2))
    }

    /// Build from `[x1, y1, x2, y2]`.
    pub fn from_array(a: [f64; 4]) -> Result<Self> {
        Self::new(a[0], a[1], a[2], a[3])
    }

    /// Corner-order normalization without the NaN check. Only for values
    /// derived from an already valid rectangle.
    pub(crate) fn normalized(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Strict intersection: rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.x2 <= other.x1
            || self.x1 >= other.x2
            || self.y2 <= other.y1
            || self.y1 >= other.y2)
    }

    /// Multiply every coordinate by `factor`.
    pub fn scaled(&self, factor: f64) -> Rect {
        Rect::normalized(
            self.x1 * factor,
            self.y1 * factor,
            self.x2 * factor,
            self.y2 * factor,
        )
    }

    /// Component-wise comparison with a tolerance relative to the larger magnitude.
    pub fn approx_eq(&self, other: &Rect, rel_tol: f64) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| (a - b).abs() <= rel_tol * a.abs().max(b.abs()).max(1.0))
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x1, self.y1, self.x2, self.y2)
    }
}
