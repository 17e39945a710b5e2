//! Pixel space <-> normalized complex plane.
//!
//! The unit of the normalized plane is half of the shorter image dimension,
//! which keeps the warp free of aspect-ratio stretch. Output positions are
//! normalized around a configurable center; warped coordinates are mapped
//! back into the *source* frame around the source midpoint.

use num_complex::Complex32;

use crate::warp::WarpVariant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    center: (f32, f32),
    output_unit: f32,
    source_center: (f32, f32),
    source_unit: f32,
}

impl CoordinateMapper {
    /// `center` is in output pixel space.
    pub fn new(output: (u32, u32), center: (f32, f32), source: (u32, u32)) -> Self {
        Self {
            center,
            output_unit: half_min_extent(output),
            source_center: (source.0 as f32 / 2.0, source.1 as f32 / 2.0),
            source_unit: half_min_extent(source),
        }
    }

    /// `center` is a fraction of the output extent, so `(0.5, 0.5)` is the
    /// output midpoint regardless of the output size.
    pub fn with_relative_center(output: (u32, u32), center: (f32, f32), source: (u32, u32)) -> Self {
        let pixel_center = (center.0 * output.0 as f32, center.1 * output.1 as f32);
        Self::new(output, pixel_center, source)
    }

    pub fn center(&self) -> (f32, f32) {
        self.center
    }

    /// `(p - center) / (min(w, h) / 2)`.
    #[inline]
    pub fn to_normalized(&self, x: f32, y: f32) -> Complex32 {
        Complex32::new(
            (x - self.center.0) / self.output_unit,
            (y - self.center.1) / self.output_unit,
        )
    }

    /// `z * (min(srcW, srcH) / 2) + sourceCenter`.
    #[inline]
    pub fn to_source(&self, z: Complex32) -> (f32, f32) {
        (
            z.re * self.source_unit + self.source_center.0,
            z.im * self.source_unit + self.source_center.1,
        )
    }

    /// Backward map of one output position through `variant`.
    #[inline]
    pub fn source_position(&self, x: f32, y: f32, variant: WarpVariant) -> (f32, f32) {
        self.to_source(variant.apply(self.to_normalized(x, y)))
    }
}

fn half_min_extent((width, height): (u32, u32)) -> f32 {
    width.min(height) as f32 / 2.0
}
