//! Per-pixel supersampling policy.
//!
//! A pixel's position is its integer coordinate; sub-pixel offsets are added
//! to it before the backward map. Samples are averaged with a plain
//! arithmetic mean per channel, alpha included.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::frame::{to_byte, Frame};
use crate::mapper::CoordinateMapper;
use crate::warp::WarpVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntialiasingMode {
    /// One sample at the pixel position.
    Off,
    /// Fixed 2x2 pattern at (+-0.25, +-0.25).
    FixedGrid,
    /// 16, 4 or 1 samples depending on distance from the warp center.
    #[default]
    Adaptive,
}

impl AntialiasingMode {
    pub const ALL: [AntialiasingMode; 3] = [
        AntialiasingMode::Off,
        AntialiasingMode::FixedGrid,
        AntialiasingMode::Adaptive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::FixedGrid => "fixed_grid",
            Self::Adaptive => "adaptive",
        }
    }

    pub fn kernel_index(self) -> u32 {
        match self {
            Self::Off => 0,
            Self::FixedGrid => 1,
            Self::Adaptive => 2,
        }
    }
}

impl fmt::Display for AntialiasingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AntialiasingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "fixed_grid" | "fixed" | "grid" => Ok(Self::FixedGrid),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(format!(
                "unknown antialiasing mode '{other}'. Valid: off, fixed_grid, adaptive"
            )),
        }
    }
}

/// Distance thresholds (normalized units) for [`AntialiasingMode::Adaptive`].
///
/// Both bounds are exclusive: `dist < inner_radius` takes the 4x4 grid,
/// `dist < outer_radius` the 2x2 grid, anything else a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AdaptivePolicy {
    pub inner_radius: f32,
    pub outer_radius: f32,
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self {
            inner_radius: 0.3,
            outer_radius: 0.7,
        }
    }
}

pub const SINGLE_SAMPLE: [(f32, f32); 1] = [(0.0, 0.0)];

pub const GRID_2X2: [(f32, f32); 4] = [(-0.25, -0.25), (0.25, -0.25), (-0.25, 0.25), (0.25, 0.25)];

/// `(sx - 1.5, sy - 1.5) * 0.25` for `sx, sy` in `0..4`, row-major.
pub const GRID_4X4: [(f32, f32); 16] = [
    (-0.375, -0.375),
    (-0.125, -0.375),
    (0.125, -0.375),
    (0.375, -0.375),
    (-0.375, -0.125),
    (-0.125, -0.125),
    (0.125, -0.125),
    (0.375, -0.125),
    (-0.375, 0.125),
    (-0.125, 0.125),
    (0.125, 0.125),
    (0.375, 0.125),
    (-0.375, 0.375),
    (-0.125, 0.375),
    (0.125, 0.375),
    (0.375, 0.375),
];

/// Sub-pixel offsets for a pixel at normalized distance `dist` from the center.
#[inline]
pub fn sample_offsets(
    mode: AntialiasingMode,
    dist: f32,
    policy: &AdaptivePolicy,
) -> &'static [(f32, f32)] {
    match mode {
        AntialiasingMode::Off => &SINGLE_SAMPLE,
        AntialiasingMode::FixedGrid => &GRID_2X2,
        AntialiasingMode::Adaptive => {
            if dist < policy.inner_radius {
                &GRID_4X4
            } else if dist < policy.outer_radius {
                &GRID_2X2
            } else {
                &SINGLE_SAMPLE
            }
        }
    }
}

/// Resolves output pixels to averaged source colors for one frame.
#[derive(Debug, Clone, Copy)]
pub struct AntialiasingSampler<'a> {
    source: &'a Frame,
    mapper: CoordinateMapper,
    variant: WarpVariant,
    mode: AntialiasingMode,
    policy: AdaptivePolicy,
}

impl<'a> AntialiasingSampler<'a> {
    pub fn new(
        source: &'a Frame,
        mapper: CoordinateMapper,
        variant: WarpVariant,
        mode: AntialiasingMode,
        policy: AdaptivePolicy,
    ) -> Self {
        Self {
            source,
            mapper,
            variant,
            mode,
            policy,
        }
    }

    pub fn offsets(&self, x: u32, y: u32) -> &'static [(f32, f32)] {
        let dist = self.mapper.to_normalized(x as f32, y as f32).norm();
        sample_offsets(self.mode, dist, &self.policy)
    }

    /// Number of warp evaluations spent on the pixel at `(x, y)`.
    pub fn sample_count(&self, x: u32, y: u32) -> usize {
        self.offsets(x, y).len()
    }

    /// Averaged RGBA color for the output pixel at `(x, y)`.
    pub fn color(&self, x: u32, y: u32) -> [u8; 4] {
        let offsets = self.offsets(x, y);
        let (px, py) = (x as f32, y as f32);

        let mut acc = [0.0_f32; 4];
        for &(dx, dy) in offsets {
            let (sx, sy) = self.mapper.source_position(px + dx, py + dy, self.variant);
            let texel = self.source.sample(sx, sy);
            for (sum, channel) in acc.iter_mut().zip(texel) {
                *sum += channel;
            }
        }

        let n = offsets.len() as f32;
        acc.map(|sum| to_byte(sum / n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler_for(frame: &Frame, mode: AntialiasingMode) -> AntialiasingSampler<'_> {
        let extent = frame.extent();
        AntialiasingSampler::new(
            frame,
            CoordinateMapper::with_relative_center(extent, (0.5, 0.5), extent),
            WarpVariant::Square,
            mode,
            AdaptivePolicy::default(),
        )
    }

    #[test]
    fn fixed_counts_ignore_position() {
        let frame = Frame::filled(100, 100, [0, 0, 0, 255]);
        let off = sampler_for(&frame, AntialiasingMode::Off);
        let grid = sampler_for(&frame, AntialiasingMode::FixedGrid);
        for (x, y) in [(50, 50), (0, 0), (99, 20)] {
            assert_eq!(off.sample_count(x, y), 1);
            assert_eq!(grid.sample_count(x, y), 4);
        }
    }

    #[test]
    fn adaptive_counts_follow_distance_buckets() {
        let frame = Frame::filled(100, 100, [0, 0, 0, 255]);
        let adaptive = sampler_for(&frame, AntialiasingMode::Adaptive);
        assert_eq!(adaptive.sample_count(50, 50), 16);
        assert_eq!(adaptive.sample_count(64, 50), 16);
        assert_eq!(adaptive.sample_count(84, 50), 4);
        assert_eq!(adaptive.sample_count(99, 99), 1);
    }

    #[test]
    fn adaptive_thresholds_are_exclusive() {
        let policy = AdaptivePolicy::default();
        assert_eq!(sample_offsets(AntialiasingMode::Adaptive, 0.3, &policy).len(), 4);
        assert_eq!(sample_offsets(AntialiasingMode::Adaptive, 0.7, &policy).len(), 1);
        assert_eq!(
            sample_offsets(AntialiasingMode::Adaptive, 0.299_999, &policy).len(),
            16
        );
        assert_eq!(
            sample_offsets(AntialiasingMode::Adaptive, 0.699_999, &policy).len(),
            4
        );

        // 15 px and 35 px from the center of a 100 px frame sit exactly on
        // the thresholds.
        let frame = Frame::filled(100, 100, [0, 0, 0, 255]);
        let adaptive = sampler_for(&frame, AntialiasingMode::Adaptive);
        assert_eq!(adaptive.sample_count(65, 50), 4);
        assert_eq!(adaptive.sample_count(85, 50), 1);
    }

    #[test]
    fn tuned_policy_moves_the_buckets() {
        let policy = AdaptivePolicy {
            inner_radius: 0.0,
            outer_radius: 10.0,
        };
        assert_eq!(sample_offsets(AntialiasingMode::Adaptive, 0.0, &policy).len(), 4);
    }

    #[test]
    fn grid_4x4_matches_formula() {
        for sy in 0..4 {
            for sx in 0..4 {
                let expected = ((sx as f32 - 1.5) * 0.25, (sy as f32 - 1.5) * 0.25);
                assert_eq!(GRID_4X4[sy * 4 + sx], expected);
            }
        }
    }

    #[test]
    fn grids_are_centered_on_the_pixel() {
        for grid in [&GRID_2X2[..], &GRID_4X4[..]] {
            let (sx, sy) = grid
                .iter()
                .fold((0.0_f32, 0.0_f32), |(ax, ay), (x, y)| (ax + x, ay + y));
            assert_eq!((sx, sy), (0.0, 0.0));
        }
    }

    #[test]
    fn uniform_source_averages_to_same_color() {
        let frame = Frame::filled(40, 40, [200, 10, 30, 255]);
        for mode in AntialiasingMode::ALL {
            let sampler = sampler_for(&frame, mode);
            assert_eq!(sampler.color(20, 20), [200, 10, 30, 255], "{mode}");
        }
    }

    #[test]
    fn parse_accepts_names() {
        assert_eq!("off".parse::<AntialiasingMode>(), Ok(AntialiasingMode::Off));
        assert_eq!("fixed".parse::<AntialiasingMode>(), Ok(AntialiasingMode::FixedGrid));
        assert_eq!("Adaptive".parse::<AntialiasingMode>(), Ok(AntialiasingMode::Adaptive));
        assert!("msaa".parse::<AntialiasingMode>().is_err());
    }
}
