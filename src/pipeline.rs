//! Per-frame orchestration: snapshot, warp, optional aberration, handoff.
//!
//! Nothing in here fails. A stage that is missing or errors hands its input
//! through unchanged, and an empty frame produces no output at all.

use std::time::Instant;

use log::{debug, info, trace, warn};

use crate::aberration::{ChromaticAberrationStage, DEFAULT_ABERRATION_STRENGTH};
use crate::antialias::AdaptivePolicy;
use crate::error::{ParameterError, StageError};
use crate::frame::Frame;
use crate::julia::JuliaWarpStage;
use crate::kernel::KernelProvider;
use crate::params::{ControlSurface, FrameParameters, SharedParameters};

/// Pipeline tunables that are fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    pub adaptive: AdaptivePolicy,
    pub aberration_strength: f32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            adaptive: AdaptivePolicy::default(),
            aberration_strength: DEFAULT_ABERRATION_STRENGTH,
        }
    }
}

#[derive(Debug)]
pub struct FramePipeline {
    parameters: SharedParameters,
    warp: JuliaWarpStage,
    aberration: ChromaticAberrationStage,
    aberration_strength: f32,
}

impl FramePipeline {
    pub fn new<P>(provider: &P, initial: FrameParameters) -> Result<Self, ParameterError>
    where
        P: KernelProvider + ?Sized,
    {
        Self::with_options(provider, initial, PipelineOptions::default())
    }

    /// Acquire both kernels from `provider`. Missing kernels are tolerated.
    pub fn with_options<P>(
        provider: &P,
        initial: FrameParameters,
        options: PipelineOptions,
    ) -> Result<Self, ParameterError>
    where
        P: KernelProvider + ?Sized,
    {
        let parameters = SharedParameters::new(initial)?;
        let warp = JuliaWarpStage::load(provider, options.adaptive);
        let aberration = ChromaticAberrationStage::load(provider);
        info!(
            "frame pipeline ready (warp: {}, aberration: {}, strength {})",
            availability(warp.is_available()),
            availability(aberration.is_available()),
            options.aberration_strength
        );
        Ok(Self {
            parameters,
            warp,
            aberration,
            aberration_strength: options.aberration_strength,
        })
    }

    /// Handle for the control role. It may be moved to another thread.
    pub fn controls(&self) -> ControlSurface {
        self.parameters.controls()
    }

    pub fn parameters(&self) -> &SharedParameters {
        &self.parameters
    }

    pub fn aberration_strength(&self) -> f32 {
        self.aberration_strength
    }

    /// Process one captured frame with a fresh parameter snapshot.
    ///
    /// Returns `None` for zero-extent input; otherwise always a frame.
    pub fn handle_frame(&self, raw: &Frame) -> Option<Frame> {
        let snapshot = self.parameters.snapshot();
        self.process(raw, &snapshot)
    }

    /// Process `raw` with an explicit snapshot. Exposed so callers can pin
    /// parameters across several frames. `params` is sanitized first; values
    /// that cannot be sanitized pass the frame through untouched.
    pub fn process(&self, raw: &Frame, params: &FrameParameters) -> Option<Frame> {
        if raw.is_empty() {
            debug!(
                "skipping empty {}x{} frame",
                raw.width(),
                raw.height()
            );
            return None;
        }
        let params = match params.sanitized() {
            Ok(params) => params,
            Err(error) => {
                warn!("{}; passing frame through", StageError::from(error));
                return Some(raw.clone());
            }
        };

        let started = Instant::now();
        let warped = self.warp.process(raw, &params);
        let warped = passthrough_on_error(warped, raw);

        let output = if params.aberration_enabled {
            let aberrated = self.aberration.process(&warped, self.aberration_strength);
            passthrough_on_error(aberrated, &warped)
        } else {
            warped
        };

        trace!(
            "frame {}x{} -> {}x{} in {:?} ({}, {})",
            raw.width(),
            raw.height(),
            output.width(),
            output.height(),
            started.elapsed(),
            params.warp_variant,
            params.antialiasing
        );
        Some(output)
    }
}

fn passthrough_on_error(result: Result<Frame, StageError>, input: &Frame) -> Frame {
    match result {
        Ok(frame) => frame,
        Err(error @ StageError::Unavailable { .. }) => {
            trace!("{error}; passing frame through");
            input.clone()
        }
        Err(error) => {
            warn!("{error}; passing frame through");
            input.clone()
        }
    }
}

fn availability(available: bool) -> &'static str {
    if available {
        "loaded"
    } else {
        "pass-through"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::kernel::{KernelLibrary, WarpJob, WarpKernel, JULIA_WARP};

    struct FailingWarp;

    impl WarpKernel for FailingWarp {
        fn backend(&self) -> &'static str {
            "failing"
        }

        fn warp(&self, _source: &Frame, _job: &WarpJob) -> Result<Frame, StageError> {
            Err(StageError::kernel(JULIA_WARP, "device lost"))
        }
    }

    fn checker(width: u32, height: u32) -> Frame {
        let mut frame = Frame::filled(width, height, [0, 0, 0, 255]);
        for y in 0..height {
            for x in 0..width {
                if (x / 5 + y / 5) % 2 == 0 {
                    frame.put_pixel(x, y, [255, 255, 255, 255]);
                }
            }
        }
        frame
    }

    #[test]
    fn empty_frames_produce_nothing() {
        let pipeline =
            FramePipeline::new(&KernelLibrary::cpu(), FrameParameters::default()).expect("valid");
        let empty = Frame::new(0, 0, Vec::new()).expect("empty frame");
        assert_eq!(pipeline.handle_frame(&empty), None);
    }

    #[test]
    fn failing_kernel_passes_frame_through() {
        let library = KernelLibrary::cpu().with_warp(JULIA_WARP, Arc::new(FailingWarp));
        let pipeline = FramePipeline::new(&library, FrameParameters::default()).expect("valid");
        let input = checker(20, 20);
        assert_eq!(pipeline.handle_frame(&input), Some(input));
    }

    #[test]
    fn aberration_runs_only_when_enabled() {
        let pipeline =
            FramePipeline::new(&KernelLibrary::cpu(), FrameParameters::default()).expect("valid");
        let input = checker(40, 40);
        let plain = pipeline.handle_frame(&input).expect("frame");

        pipeline.controls().set_aberration_enabled(true);
        let split = pipeline.handle_frame(&input).expect("frame");
        assert_eq!(plain.extent(), split.extent());
        assert_ne!(plain, split);
    }

    #[test]
    fn missing_aberration_keeps_the_warped_frame() {
        let library = KernelLibrary::cpu().without(crate::kernel::CHROMATIC_ABERRATION);
        let params = FrameParameters {
            aberration_enabled: true,
            ..FrameParameters::default()
        };
        let with_split = FramePipeline::new(&library, params).expect("valid");
        let without_split =
            FramePipeline::new(&KernelLibrary::cpu(), FrameParameters::default()).expect("valid");

        let input = checker(30, 30);
        assert_eq!(
            with_split.handle_frame(&input),
            without_split.handle_frame(&input)
        );
    }

    #[test]
    fn explicit_parameters_are_sanitized() {
        let pipeline =
            FramePipeline::new(&KernelLibrary::cpu(), FrameParameters::default()).expect("valid");
        let input = checker(24, 16);

        let zero_upscale = FrameParameters {
            upscale_factor: 0.0,
            ..FrameParameters::default()
        };
        let out = pipeline.process(&input, &zero_upscale).expect("frame");
        assert_eq!(out.extent(), (24, 16));

        let nan_upscale = FrameParameters {
            upscale_factor: f32::NAN,
            ..FrameParameters::default()
        };
        assert_eq!(pipeline.process(&input, &nan_upscale), Some(input));
    }

    #[test]
    fn oversized_upscale_passes_frame_through() {
        let pipeline =
            FramePipeline::new(&KernelLibrary::cpu(), FrameParameters::default()).expect("valid");
        pipeline
            .controls()
            .set_upscale_factor(1.0e5)
            .expect("finite factors are clamped");
        // 4100x1024 at the 8x cap needs more than the CPU kernel's byte budget.
        let input = Frame::filled(4100, 1024, [10, 20, 30, 255]);
        assert_eq!(pipeline.handle_frame(&input), Some(input));
    }

    #[test]
    fn invalid_initial_parameters_are_rejected() {
        let params = FrameParameters {
            zoom_level: f32::NAN,
            ..FrameParameters::default()
        };
        assert!(FramePipeline::new(&KernelLibrary::cpu(), params).is_err());
    }
}
