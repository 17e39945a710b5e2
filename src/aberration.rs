//! Radial chromatic aberration.
//!
//! Red is fetched outward and blue inward along the ray from the image
//! midpoint; green and alpha stay where they are. The displacement grows
//! linearly with distance and reaches `strength` pixels at the corners.

use std::fmt;
use std::sync::Arc;

use log::{info, warn};
use rayon::prelude::*;

use crate::error::{FrameError, StageError};
use crate::frame::{to_byte, Frame};
use crate::kernel::{AberrationKernel, CpuPool, KernelProvider, CHROMATIC_ABERRATION};

/// Corner displacement in pixels used when nothing else is configured.
pub const DEFAULT_ABERRATION_STRENGTH: f32 = 8.0;

/// Same-extent copy of `image` with red and blue split apart.
///
/// `strength == 0` returns an exact copy.
pub fn aberrate(image: &Frame, strength: f32) -> Result<Frame, FrameError> {
    if strength == 0.0 || image.is_empty() {
        return Ok(image.clone());
    }

    let (width, height) = image.extent();
    let center = (width as f32 / 2.0, height as f32 / 2.0);
    let scale = strength / center.0.hypot(center.1);
    let row_bytes = width as usize * 4;

    let mut rgba = image.as_rgba().to_vec();
    rgba.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let py = y as f32;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let px_x = x as f32;
                let dx = (px_x - center.0) * scale;
                let dy = (py - center.1) * scale;
                px[0] = to_byte(image.sample(px_x + dx, py + dy)[0]);
                px[2] = to_byte(image.sample(px_x - dx, py - dy)[2]);
            }
        });

    Frame::new(width, height, rgba)
}

#[derive(Debug, Clone, Default)]
pub struct CpuAberrationKernel {
    pool: CpuPool,
}

impl CpuAberrationKernel {
    pub fn new(pool: CpuPool) -> Self {
        Self { pool }
    }
}

impl AberrationKernel for CpuAberrationKernel {
    fn backend(&self) -> &'static str {
        "cpu"
    }

    fn aberrate(&self, image: &Frame, strength: f32) -> Result<Frame, StageError> {
        self.pool
            .install(|| aberrate(image, strength))
            .map_err(|error| StageError::kernel(CHROMATIC_ABERRATION, error.to_string()))
    }
}

#[derive(Clone, Default)]
pub struct ChromaticAberrationStage {
    kernel: Option<Arc<dyn AberrationKernel>>,
}

impl ChromaticAberrationStage {
    pub fn new(kernel: Option<Arc<dyn AberrationKernel>>) -> Self {
        Self { kernel }
    }

    pub fn load<P>(provider: &P) -> Self
    where
        P: KernelProvider + ?Sized,
    {
        let kernel = provider.aberration_kernel(CHROMATIC_ABERRATION);
        match &kernel {
            Some(kernel) => info!("aberration stage using {} kernel", kernel.backend()),
            None => warn!(
                "kernel '{CHROMATIC_ABERRATION}' not found; aberration will be skipped"
            ),
        }
        Self::new(kernel)
    }

    pub fn is_available(&self) -> bool {
        self.kernel.is_some()
    }

    /// Negative or non-finite strengths are treated as zero.
    pub fn process(&self, image: &Frame, strength: f32) -> Result<Frame, StageError> {
        let kernel = self.kernel.as_ref().ok_or(StageError::Unavailable {
            kernel: CHROMATIC_ABERRATION,
        })?;
        let strength = if strength.is_finite() {
            strength.max(0.0)
        } else {
            0.0
        };
        if strength == 0.0 {
            return Ok(image.clone());
        }
        kernel.aberrate(image, strength)
    }
}

impl fmt::Debug for ChromaticAberrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromaticAberrationStage")
            .field("kernel", &self.kernel.as_ref().map(|k| k.backend()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelLibrary;

    fn pattern(width: u32, height: u32) -> Frame {
        let mut frame = Frame::filled(width, height, [0, 0, 0, 0]);
        for y in 0..height {
            for x in 0..width {
                let on = (x / 4 + y / 4) % 2 == 0;
                let v = if on { 255 } else { 0 };
                frame.put_pixel(x, y, [v, (x * 3) as u8, 255 - v, (100 + y) as u8]);
            }
        }
        frame
    }

    #[test]
    fn zero_strength_is_identity() {
        let image = pattern(32, 24);
        assert_eq!(aberrate(&image, 0.0).expect("valid frame"), image);

        let stage = ChromaticAberrationStage::load(&KernelLibrary::cpu());
        assert_eq!(stage.process(&image, 0.0).expect("available"), image);
        assert_eq!(stage.process(&image, -3.0).expect("available"), image);
    }

    #[test]
    fn green_and_alpha_are_untouched() {
        let image = pattern(32, 24);
        let out = aberrate(&image, 6.0).expect("valid frame");
        assert_eq!(out.extent(), image.extent());
        for y in 0..24 {
            for x in 0..32 {
                let (a, b) = (image.pixel(x, y), out.pixel(x, y));
                assert_eq!(a[1], b[1]);
                assert_eq!(a[3], b[3]);
            }
        }
    }

    #[test]
    fn midpoint_is_not_displaced() {
        let image = pattern(32, 24);
        let out = aberrate(&image, 8.0).expect("valid frame");
        assert_eq!(out.pixel(16, 12), image.pixel(16, 12));
    }

    #[test]
    fn red_and_blue_shift_near_the_edges() {
        let image = pattern(32, 24);
        let out = aberrate(&image, 8.0).expect("valid frame");
        let differs = (0..32).any(|x| {
            let (a, b) = (image.pixel(x, 0), out.pixel(x, 0));
            a[0] != b[0] || a[2] != b[2]
        });
        assert!(differs);
    }

    #[test]
    fn missing_kernel_is_unavailable() {
        let stage = ChromaticAberrationStage::load(&KernelLibrary::empty());
        assert!(!stage.is_available());
        assert_eq!(
            stage.process(&pattern(4, 4), 8.0),
            Err(StageError::Unavailable {
                kernel: CHROMATIC_ABERRATION
            })
        );
    }
}
