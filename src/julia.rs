//! The Julia warp stage and its CPU kernel.
//!
//! The stage turns a [`FrameParameters`] snapshot into a [`WarpJob`], hands
//! it to whichever [`WarpKernel`] the provider supplied and then applies the
//! zoom crop. The crop is an exact rectangle copy, never a resample.

use std::fmt;
use std::sync::Arc;

use log::{info, warn};
use rayon::prelude::*;

use crate::antialias::{AdaptivePolicy, AntialiasingSampler};
use crate::error::{FrameError, StageError};
use crate::frame::{Frame, Rect};
use crate::kernel::{CpuPool, KernelProvider, WarpJob, WarpKernel, JULIA_WARP};
use crate::params::FrameParameters;

/// Largest output buffer the CPU kernel will allocate (1 GiB).
pub const MAX_OUTPUT_BYTES: usize = 1 << 30;

/// Backward-map every output pixel of `job` into `source`.
///
/// Rows are filled in parallel; every pixel is computed independently, so
/// the result does not depend on how rows are scheduled. Outputs larger
/// than [`MAX_OUTPUT_BYTES`] are refused with [`FrameError::TooLarge`].
pub fn warp_frame(source: &Frame, job: &WarpJob) -> Result<Frame, FrameError> {
    let (width, height) = (job.output_width, job.output_height);
    let row_bytes = (width as usize)
        .checked_mul(4)
        .ok_or(FrameError::DimensionsOverflow)?;
    let len = row_bytes
        .checked_mul(height as usize)
        .ok_or(FrameError::DimensionsOverflow)?;
    if len == 0 {
        return Frame::new(width, height, Vec::new());
    }
    if len > MAX_OUTPUT_BYTES {
        return Err(FrameError::TooLarge {
            bytes: len,
            limit: MAX_OUTPUT_BYTES,
        });
    }

    let sampler = AntialiasingSampler::new(
        source,
        job.mapper(source.extent()),
        job.variant,
        job.antialiasing,
        job.policy,
    );

    let mut rgba = vec![0_u8; len];
    rgba.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                px.copy_from_slice(&sampler.color(x as u32, y as u32));
            }
        });

    Frame::new(width, height, rgba)
}

/// [`warp_frame`] on a rayon pool.
#[derive(Debug, Clone, Default)]
pub struct CpuWarpKernel {
    pool: CpuPool,
}

impl CpuWarpKernel {
    pub fn new(pool: CpuPool) -> Self {
        Self { pool }
    }
}

impl WarpKernel for CpuWarpKernel {
    fn backend(&self) -> &'static str {
        "cpu"
    }

    fn warp(&self, source: &Frame, job: &WarpJob) -> Result<Frame, StageError> {
        self.pool
            .install(|| warp_frame(source, job))
            .map_err(|error| StageError::kernel(JULIA_WARP, error.to_string()))
    }
}

#[derive(Clone, Default)]
pub struct JuliaWarpStage {
    kernel: Option<Arc<dyn WarpKernel>>,
    policy: AdaptivePolicy,
}

impl JuliaWarpStage {
    pub fn new(kernel: Option<Arc<dyn WarpKernel>>, policy: AdaptivePolicy) -> Self {
        Self { kernel, policy }
    }

    /// Ask `provider` for the warp kernel. A missing kernel is logged once
    /// here; afterwards every call to [`Self::process`] reports it as
    /// [`StageError::Unavailable`].
    pub fn load<P>(provider: &P, policy: AdaptivePolicy) -> Self
    where
        P: KernelProvider + ?Sized,
    {
        let kernel = provider.warp_kernel(JULIA_WARP);
        match &kernel {
            Some(kernel) => info!("warp stage using {} kernel", kernel.backend()),
            None => warn!("kernel '{JULIA_WARP}' not found; frames will pass through unwarped"),
        }
        Self::new(kernel, policy)
    }

    pub fn is_available(&self) -> bool {
        self.kernel.is_some()
    }

    pub fn policy(&self) -> AdaptivePolicy {
        self.policy
    }

    pub fn process(&self, source: &Frame, params: &FrameParameters) -> Result<Frame, StageError> {
        let kernel = self
            .kernel
            .as_ref()
            .ok_or(StageError::Unavailable { kernel: JULIA_WARP })?;
        let params = params.sanitized()?;

        let (output_width, output_height) = params.output_extent(source.extent());
        let job = WarpJob {
            output_width,
            output_height,
            center: (params.center.x, params.center.y),
            variant: params.warp_variant,
            antialiasing: params.antialiasing,
            policy: self.policy,
        };

        let warped = kernel.warp(source, &job)?;
        if warped.extent() != (output_width, output_height) {
            return Err(StageError::kernel(
                JULIA_WARP,
                format!(
                    "{} kernel returned {}x{}, expected {output_width}x{output_height}",
                    kernel.backend(),
                    warped.width(),
                    warped.height()
                ),
            ));
        }

        Ok(match params.crop_inset() {
            Some(inset) => warped.crop(Rect::centered_inset(output_width, output_height, inset)),
            None => warped,
        })
    }
}

impl fmt::Debug for JuliaWarpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JuliaWarpStage")
            .field("kernel", &self.kernel.as_ref().map(|k| k.backend()))
            .field("policy", &self.policy)
            .finish()
    }
}
