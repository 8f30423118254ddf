//! # Spatial Index
//!
//! Uniform grid over the rectangles of one sheet, answering strict
//! intersection queries.
//!
//! | Operation | Cost |
//! |-----------|------|
//! | `build` | O(items × cells per item), at most `MAX_ITEM_CELLS` per item |
//! | `query_rect` | O(covered cells + candidates + oversized items) |
//! | `query_point` | `query_rect` on a 1e-4 square |
//!
//! Items covering more than `MAX_ITEM_CELLS` cells are not bucketed. They
//! sit in a side list that every query scans.
//!
//! The index is never patched. Whenever the entity set or any box changes,
//! build a new one.

use std::hash::Hash;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::model::Rect;
use crate::{Error, Result};

/// Side length of the square used by `query_point`.
pub const POINT_EPSILON: f64 = 1e-4;

/// Largest number of grid cells a single item is registered under.
pub const MAX_ITEM_CELLS: i128 = 4096;

type Cell = (i64, i64);

/// Grid bucketing of `K`-keyed rectangles.
#[derive(Debug, Clone)]
pub struct SpatialIndex<K> {
    cell_size: f64,
    cells: HashMap<Cell, SmallVec<[K; 4]>>,
    rects: HashMap<K, Rect>,
    /// Items too large to bucket, checked by every query.
    oversized: Vec<K>,
    /// Inclusive cell range occupied by bucketed items; `None` when there are none.
    bounds: Option<(Cell, Cell)>,
}

impl<K: Clone + Eq + Hash> SpatialIndex<K> {
    /// Register every item under each cell its rectangle overlaps.
    ///
    /// Fails with `Error::Geometry` for a non-positive or non-finite cell
    /// size, or for an item with an infinite coordinate. A key that appears
    /// twice keeps its last rectangle.
    pub fn build<I>(items: I, cell_size: f64) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Rect)>,
    {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(Error::Geometry(format!("invalid cell size {cell_size}")));
        }

        let mut rects: HashMap<K, Rect> = HashMap::new();
        for (key, rect) in items {
            if !rect.to_array().iter().all(|v| v.is_finite()) {
                return Err(Error::Geometry(format!("non-finite rectangle {rect}")));
            }
            rects.insert(key, rect);
        }

        let mut index = Self { cell_size, ..Self::default() };
        for (key, rect) in &rects {
            let (lo, hi) = index.cell_range(rect);
            let span = (i128::from(hi.0) - i128::from(lo.0) + 1) * (i128::from(hi.1) - i128::from(lo.1) + 1);
            if span > MAX_ITEM_CELLS {
                index.oversized.push(key.clone());
                continue;
            }
            for cy in lo.1..=hi.1 {
                for cx in lo.0..=hi.0 {
                    index.cells.entry((cx, cy)).or_default().push(key.clone());
                }
            }
            index.bounds = Some(match index.bounds {
                None => (lo, hi),
                Some((blo, bhi)) => ((blo.0.min(lo.0), blo.1.min(lo.1)), (bhi.0.max(hi.0), bhi.1.max(hi.1))),
            });
        }
        index.rects = rects;
        Ok(index)
    }

    /// Keys whose rectangle strictly intersects `rect`, each reported once.
    pub fn query_rect(&self, rect: &Rect) -> Vec<K> {
        let mut out: Vec<K> = self
            .oversized
            .iter()
            .filter(|key| self.rects.get(*key).is_some_and(|r| r.intersects(rect)))
            .cloned()
            .collect();

        let Some((blo, bhi)) = self.bounds else {
            return out;
        };
        let (lo, hi) = self.cell_range(rect);
        // nothing bucketed lives outside the occupied range
        let (x0, x1) = (lo.0.max(blo.0), hi.0.min(bhi.0));
        let (y0, y1) = (lo.1.max(blo.1), hi.1.min(bhi.1));

        let mut seen: HashSet<&K> = HashSet::new();
        for cy in y0..=y1 {
            for cx in x0..=x1 {
                let Some(bucket) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                for key in bucket {
                    if !seen.insert(key) {
                        continue;
                    }
                    if self.rects.get(key).is_some_and(|r| r.intersects(rect)) {
                        out.push(key.clone());
                    }
                }
            }
        }
        out
    }

    /// Keys whose rectangle contains the point `(x, y)`.
    pub fn query_point(&self, x: f64, y: f64) -> Vec<K> {
        let square = Rect::normalized(x, y, x + POINT_EPSILON, y + POINT_EPSILON);
        self.query_rect(&square)
    }

    pub fn rect(&self, key: &K) -> Option<&Rect> {
        self.rects.get(key)
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    fn cell_range(&self, rect: &Rect) -> (Cell, Cell) {
        let cell = |v: f64| (v / self.cell_size).floor() as i64;
        ((cell(rect.x1), cell(rect.y1)), (cell(rect.x2), cell(rect.y2)))
    }
}

impl<K> Default for SpatialIndex<K> {
    /// Empty index with a 64-unit grid.
    fn default() -> Self {
        Self {
            cell_size: 64.0,
            cells: HashMap::new(),
            rects: HashMap::new(),
            oversized: Vec::new(),
            bounds: None,
        }
    }
}
