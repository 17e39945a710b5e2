//! Real-time video-feedback fractal warp.
//!
//! Every captured frame is backward-mapped through a complex function
//! (z^2, z^3, z^4 or sin z) with adaptive supersampling, optionally given a
//! radial chromatic aberration and handed to the display. Kernels come from
//! a [`kernel::KernelProvider`]; a missing kernel degrades to pass-through.

pub mod aberration;
pub mod antialias;
pub mod capture;
pub mod config;
pub mod error;
pub mod feedback;
pub mod frame;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod julia;
pub mod kernel;
pub mod mapper;
pub mod params;
pub mod pipeline;
pub mod warp;

pub use error::{FrameError, ParameterError, StageError};
pub use frame::Frame;
pub use params::{ControlSurface, FrameParameters, SharedParameters};
pub use pipeline::FramePipeline;
