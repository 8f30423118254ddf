//! Zoom mode and manual scale.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const MIN_SCALE: f64 = 0.05;
pub const MAX_SCALE: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoomMode {
    /// Follow the page's fit-to-view scale.
    #[default]
    Fit,
    Manual,
}

/// Display zoom. In fit mode the page's fit scale applies; in manual mode
/// the user's scale does, and it survives a round trip through fit mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomState {
    pub mode: ZoomMode,
    pub manual_scale: f64,
    pub last_manual_scale: f64,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self { mode: ZoomMode::Fit, manual_scale: 1.0, last_manual_scale: 1.0 }
    }
}

impl ZoomState {
    /// Switch mode. Entering manual mode restores the remembered scale.
    pub fn set_mode(&mut self, mode: ZoomMode) {
        self.mode = mode;
        if mode == ZoomMode::Manual {
            self.manual_scale = self.last_manual_scale;
        }
    }

    /// Set a manual scale, rounded to 4 decimals and clamped to
    /// `[MIN_SCALE, MAX_SCALE]`. Switches to manual mode and returns the
    /// scale actually applied.
    pub fn set_manual_scale(&mut self, scale: f64) -> Result<f64> {
        if scale.is_nan() {
            return Err(Error::Geometry("zoom scale is NaN".into()));
        }
        let rounded = (scale * 1e4).round() / 1e4;
        let clamped = rounded.clamp(MIN_SCALE, MAX_SCALE);
        self.mode = ZoomMode::Manual;
        self.manual_scale = clamped;
        self.last_manual_scale = clamped;
        Ok(clamped)
    }

    /// The scale to draw with, given the current page's fit scale.
    pub fn effective_scale(&self, fit_scale: f64) -> f64 {
        match self.mode {
            ZoomMode::Fit => fit_scale,
            ZoomMode::Manual => self.manual_scale,
        }
    }
}
