//! Per-frame tunables and the control/processing handoff.
//!
//! [`FrameParameters`] is a plain `Copy` value. The control side mutates it
//! through a [`ControlSurface`]; the processing side copies the whole value
//! once per frame with [`SharedParameters::snapshot`]. Both go through the
//! same short mutex critical section, so a snapshot never mixes old and new
//! fields and an in-flight frame keeps the copy it started with.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use serde::Deserialize;

use crate::antialias::AntialiasingMode;
use crate::error::ParameterError;
use crate::warp::WarpVariant;

/// Upscale factors offered by the stock control surface. Any finite value
/// in `MIN_UPSCALE_FACTOR..=MAX_UPSCALE_FACTOR` is accepted.
pub const UPSCALE_PRESETS: [f32; 4] = [1.0, 1.5, 2.0, 3.0];

pub const MIN_UPSCALE_FACTOR: f32 = 1.0;
/// Output area grows with the square of the factor; 8x is 64 times the
/// source pixel count.
pub const MAX_UPSCALE_FACTOR: f32 = 8.0;
pub const MIN_ZOOM_LEVEL: f32 = 1.0;

/// A point in `[0, 1] x [0, 1]`, relative to the output extent.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelativePoint {
    pub x: f32,
    pub y: f32,
}

impl RelativePoint {
    pub const MIDPOINT: RelativePoint = RelativePoint { x: 0.5, y: 0.5 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Default for RelativePoint {
    fn default() -> Self {
        Self::MIDPOINT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FrameParameters {
    pub upscale_factor: f32,
    pub center: RelativePoint,
    pub warp_variant: WarpVariant,
    pub aberration_enabled: bool,
    pub antialiasing: AntialiasingMode,
    pub zoom_level: f32,
}

impl Default for FrameParameters {
    fn default() -> Self {
        Self {
            upscale_factor: 1.0,
            center: RelativePoint::MIDPOINT,
            warp_variant: WarpVariant::Square,
            aberration_enabled: false,
            antialiasing: AntialiasingMode::Adaptive,
            zoom_level: 1.0,
        }
    }
}

impl FrameParameters {
    /// Clamp every field into its valid range. Non-finite numbers cannot be
    /// clamped meaningfully and are rejected.
    pub fn sanitized(self) -> Result<Self, ParameterError> {
        Ok(Self {
            upscale_factor: clamp_upscale(self.upscale_factor)?,
            center: RelativePoint {
                x: clamp_unit("center.x", self.center.x)?,
                y: clamp_unit("center.y", self.center.y)?,
            },
            zoom_level: clamp_min("zoom_level", self.zoom_level, MIN_ZOOM_LEVEL)?,
            ..self
        })
    }

    /// Warped image extent for a source of `source` pixels, before any crop.
    pub fn output_extent(&self, (width, height): (u32, u32)) -> (u32, u32) {
        let scale = |len: u32| -> u32 {
            if len == 0 {
                return 0;
            }
            ((len as f32 * self.upscale_factor).round() as u32).max(1)
        };
        (scale(width), scale(height))
    }

    /// Fraction of width/height trimmed from each side, or `None` when the
    /// zoom level does not crop.
    pub fn crop_inset(&self) -> Option<f32> {
        if self.zoom_level > 1.0 {
            Some((self.zoom_level - 1.0) / self.zoom_level / 2.0)
        } else {
            None
        }
    }
}

fn clamp_min(field: &'static str, value: f32, min: f32) -> Result<f32, ParameterError> {
    if !value.is_finite() {
        return Err(ParameterError::NotFinite { field, value });
    }
    Ok(value.max(min))
}

fn clamp_upscale(value: f32) -> Result<f32, ParameterError> {
    clamp_min("upscale_factor", value, MIN_UPSCALE_FACTOR).map(|value| value.min(MAX_UPSCALE_FACTOR))
}

fn clamp_unit(field: &'static str, value: f32) -> Result<f32, ParameterError> {
    if !value.is_finite() {
        return Err(ParameterError::NotFinite { field, value });
    }
    Ok(value.clamp(0.0, 1.0))
}

/// Single-writer/single-reader snapshot cell.
#[derive(Debug, Clone, Default)]
pub struct SharedParameters {
    inner: Arc<Mutex<FrameParameters>>,
}

impl SharedParameters {
    /// Start from `initial`; out-of-range fields are clamped.
    pub fn new(initial: FrameParameters) -> Result<Self, ParameterError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(initial.sanitized()?)),
        })
    }

    /// One consistent copy of every field.
    pub fn snapshot(&self) -> FrameParameters {
        *self.lock()
    }

    pub fn controls(&self) -> ControlSurface {
        ControlSurface {
            shared: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrameParameters> {
        // The guarded value is Copy and every write is a whole-field store,
        // so a poisoned lock still holds a valid value.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, apply: impl FnOnce(&mut FrameParameters)) {
        apply(&mut self.lock());
    }
}

/// Control-side handle. Each setter is applied in full before any later
/// snapshot can observe it. Cloning is cheap and every clone drives the
/// same parameters.
#[derive(Debug, Clone)]
pub struct ControlSurface {
    shared: SharedParameters,
}

impl ControlSurface {
    /// Returns the factor actually applied after clamping.
    pub fn set_upscale_factor(&self, factor: f32) -> Result<f32, ParameterError> {
        let factor = clamp_upscale(factor)
            .inspect_err(|error| debug!("rejected parameter: {error}"))?;
        self.shared.update(|params| params.upscale_factor = factor);
        Ok(factor)
    }

    pub fn set_center(&self, x: f32, y: f32) -> Result<RelativePoint, ParameterError> {
        let center = clamp_unit("center.x", x)
            .and_then(|x| Ok(RelativePoint::new(x, clamp_unit("center.y", y)?)))
            .inspect_err(|error| debug!("rejected parameter: {error}"))?;
        self.shared.update(|params| params.center = center);
        Ok(center)
    }

    pub fn set_warp_variant(&self, variant: WarpVariant) {
        self.shared.update(|params| params.warp_variant = variant);
    }

    pub fn set_antialiasing(&self, mode: AntialiasingMode) {
        self.shared.update(|params| params.antialiasing = mode);
    }

    pub fn set_zoom_level(&self, zoom: f32) -> Result<f32, ParameterError> {
        let zoom = clamp_min("zoom_level", zoom, MIN_ZOOM_LEVEL)
            .inspect_err(|error| debug!("rejected parameter: {error}"))?;
        self.shared.update(|params| params.zoom_level = zoom);
        Ok(zoom)
    }

    pub fn set_aberration_enabled(&self, enabled: bool) {
        self.shared.update(|params| params.aberration_enabled = enabled);
    }

    /// Swap in a whole parameter set at once.
    pub fn replace(&self, params: FrameParameters) -> Result<FrameParameters, ParameterError> {
        let params = params.sanitized()?;
        self.shared.update(|current| *current = params);
        Ok(params)
    }

    pub fn current(&self) -> FrameParameters {
        self.shared.snapshot()
    }
}
