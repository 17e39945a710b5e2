//! Kernel acquisition.
//!
//! Stages never construct their compute kernels directly. They ask a
//! [`KernelProvider`] for a kernel by logical name and must cope with
//! `None`: a stage without a kernel reports [`StageError::Unavailable`] and
//! the pipeline passes the frame through.
//!
//! [`KernelLibrary`] is the stock provider. It can be populated with the CPU
//! kernels, the GPU kernels (feature `gpu`) or nothing at all.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;

use crate::aberration::CpuAberrationKernel;
use crate::antialias::{AdaptivePolicy, AntialiasingMode};
use crate::error::StageError;
use crate::frame::Frame;
use crate::julia::CpuWarpKernel;
use crate::mapper::CoordinateMapper;
use crate::warp::WarpVariant;

/// Logical name of the full-frame warp kernel.
pub const JULIA_WARP: &str = "julia_warp";
/// Logical name of the chromatic aberration kernel.
pub const CHROMATIC_ABERRATION: &str = "chromatic_aberration";

pub const JULIA_WARP_WGSL: &str = include_str!("../shaders/wgsl/julia_warp.wgsl");
pub const CHROMATIC_ABERRATION_WGSL: &str =
    include_str!("../shaders/wgsl/chromatic_aberration.wgsl");

/// Everything a warp kernel needs besides the source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpJob {
    pub output_width: u32,
    pub output_height: u32,
    /// Warp origin as a fraction of the output extent.
    pub center: (f32, f32),
    pub variant: WarpVariant,
    pub antialiasing: AntialiasingMode,
    pub policy: AdaptivePolicy,
}

impl WarpJob {
    pub fn mapper(&self, source: (u32, u32)) -> CoordinateMapper {
        CoordinateMapper::with_relative_center(
            (self.output_width, self.output_height),
            self.center,
            source,
        )
    }
}

pub trait WarpKernel: Send + Sync {
    /// Short backend label for logs ("cpu", "gpu").
    fn backend(&self) -> &'static str;

    /// Produce a `job.output_width` x `job.output_height` frame by backward
    /// mapping every output pixel into `source`.
    fn warp(&self, source: &Frame, job: &WarpJob) -> Result<Frame, StageError>;
}

pub trait AberrationKernel: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Same-extent frame with red and blue fetched radially apart.
    fn aberrate(&self, image: &Frame, strength: f32) -> Result<Frame, StageError>;
}

/// Resource-loading collaborator: hands out kernels by logical name.
pub trait KernelProvider {
    fn warp_kernel(&self, name: &str) -> Option<Arc<dyn WarpKernel>>;
    fn aberration_kernel(&self, name: &str) -> Option<Arc<dyn AberrationKernel>>;
}

/// Which execution backend to populate a [`KernelLibrary`] from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelBackend {
    #[default]
    Cpu,
    /// GPU only; no adapter means no kernels.
    Gpu,
    /// GPU when an adapter exists, CPU otherwise.
    Auto,
}

impl std::str::FromStr for KernelBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown backend '{other}'. Valid: cpu, gpu, auto")),
        }
    }
}

/// Worker pool for the CPU kernels. `None` uses rayon's global pool.
#[derive(Clone, Default)]
pub struct CpuPool(Option<Arc<rayon::ThreadPool>>);

impl CpuPool {
    pub fn global() -> Self {
        Self(None)
    }

    pub fn with_threads(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("juliacam-cpu-{index}"))
            .build()
            .with_context(|| format!("failed to build CPU kernel pool with {threads} threads"))?;
        Ok(Self(Some(Arc::new(pool))))
    }

    pub fn install<R, F>(&self, work: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.0 {
            Some(pool) => pool.install(work),
            None => work(),
        }
    }
}

impl fmt::Debug for CpuPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(pool) => write!(f, "CpuPool({} threads)", pool.current_num_threads()),
            None => f.write_str("CpuPool(global)"),
        }
    }
}

#[derive(Clone, Default)]
pub struct KernelLibrary {
    warp: BTreeMap<String, Arc<dyn WarpKernel>>,
    aberration: BTreeMap<String, Arc<dyn AberrationKernel>>,
}

impl KernelLibrary {
    /// No kernels at all: every stage passes frames through.
    pub fn empty() -> Self {
        Self::default()
    }

    /// CPU kernels on rayon's global pool.
    pub fn cpu() -> Self {
        Self::cpu_on(CpuPool::global())
    }

    pub fn cpu_on(pool: CpuPool) -> Self {
        Self::empty()
            .with_warp(JULIA_WARP, Arc::new(CpuWarpKernel::new(pool.clone())))
            .with_aberration(CHROMATIC_ABERRATION, Arc::new(CpuAberrationKernel::new(pool)))
    }

    /// Populate from `backend`. Failing to find a GPU is not an error; it is
    /// logged and answered with the CPU kernels (`Auto`) or none (`Gpu`).
    pub fn load(backend: KernelBackend, threads: Option<usize>) -> Result<Self> {
        let cpu_pool = || match threads {
            Some(threads) => CpuPool::with_threads(threads),
            None => Ok(CpuPool::global()),
        };

        let library = match backend {
            KernelBackend::Cpu => Self::cpu_on(cpu_pool()?),
            KernelBackend::Gpu => Self::gpu().unwrap_or_else(|error| {
                warn!("GPU kernels not found ({error:#}); frames will pass through unwarped");
                Self::empty()
            }),
            KernelBackend::Auto => match Self::gpu() {
                Ok(library) => library,
                Err(error) => {
                    info!("GPU kernels not found ({error:#}); using CPU kernels");
                    Self::cpu_on(cpu_pool()?)
                }
            },
        };
        info!("kernel library loaded: {library:?}");
        Ok(library)
    }

    #[cfg(feature = "gpu")]
    fn gpu() -> Result<Self> {
        let context = Arc::new(crate::gpu::GpuContext::new()?);
        let warp = crate::gpu::GpuWarpKernel::new(context.clone())?;
        let aberration = crate::gpu::GpuAberrationKernel::new(context)?;
        Ok(Self::empty()
            .with_warp(JULIA_WARP, Arc::new(warp))
            .with_aberration(CHROMATIC_ABERRATION, Arc::new(aberration)))
    }

    #[cfg(not(feature = "gpu"))]
    fn gpu() -> Result<Self> {
        anyhow::bail!("juliacam was built without the `gpu` feature")
    }

    pub fn with_warp(mut self, name: &str, kernel: Arc<dyn WarpKernel>) -> Self {
        self.warp.insert(name.to_owned(), kernel);
        self
    }

    pub fn with_aberration(mut self, name: &str, kernel: Arc<dyn AberrationKernel>) -> Self {
        self.aberration.insert(name.to_owned(), kernel);
        self
    }

    /// Drop every kernel registered under `name`.
    pub fn without(mut self, name: &str) -> Self {
        self.warp.remove(name);
        self.aberration.remove(name);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.warp.is_empty() && self.aberration.is_empty()
    }
}

impl KernelProvider for KernelLibrary {
    fn warp_kernel(&self, name: &str) -> Option<Arc<dyn WarpKernel>> {
        self.warp.get(name).cloned()
    }

    fn aberration_kernel(&self, name: &str) -> Option<Arc<dyn AberrationKernel>> {
        self.aberration.get(name).cloned()
    }
}

impl fmt::Debug for KernelLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for (name, kernel) in &self.warp {
            list.entry(name, &kernel.backend());
        }
        for (name, kernel) in &self.aberration {
            list.entry(name, &kernel.backend());
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_library_provides_both_kernels() {
        let library = KernelLibrary::cpu();
        assert_eq!(
            library.warp_kernel(JULIA_WARP).map(|k| k.backend()),
            Some("cpu")
        );
        assert_eq!(
            library
                .aberration_kernel(CHROMATIC_ABERRATION)
                .map(|k| k.backend()),
            Some("cpu")
        );
    }

    #[test]
    fn unknown_names_are_not_found() {
        let library = KernelLibrary::cpu();
        assert!(library.warp_kernel("mandelbrot").is_none());
        assert!(library.aberration_kernel(JULIA_WARP).is_none());
    }

    #[test]
    fn without_removes_a_kernel() {
        let library = KernelLibrary::cpu().without(JULIA_WARP);
        assert!(library.warp_kernel(JULIA_WARP).is_none());
        assert!(library.aberration_kernel(CHROMATIC_ABERRATION).is_some());
        assert!(!library.is_empty());
        assert!(KernelLibrary::empty().is_empty());
    }

    #[test]
    fn debug_lists_names_and_backends() {
        let rendered = format!("{:?}", KernelLibrary::cpu());
        assert!(rendered.contains("julia_warp"));
        assert!(rendered.contains("chromatic_aberration"));
        assert!(rendered.contains("cpu"));
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn gpu_backend_without_feature_loads_nothing() {
        let library = KernelLibrary::load(KernelBackend::Gpu, None).expect("never fatal");
        assert!(library.is_empty());

        let auto = KernelLibrary::load(KernelBackend::Auto, None).expect("falls back to cpu");
        assert!(auto.warp_kernel(JULIA_WARP).is_some());
    }

    #[test]
    fn dedicated_pool_reports_thread_count() {
        let pool = CpuPool::with_threads(2).expect("pool should build");
        assert_eq!(format!("{pool:?}"), "CpuPool(2 threads)");
        assert_eq!(pool.install(|| 40 + 2), 42);
    }

    #[test]
    fn wgsl_sources_declare_compute_entry_points() {
        for source in [JULIA_WARP_WGSL, CHROMATIC_ABERRATION_WGSL] {
            assert!(source.contains("@compute"));
            assert!(source.contains("fn main"));
            assert!(source.contains("fn fetch"));
        }
    }

    #[test]
    fn julia_wgsl_covers_every_variant_and_threshold() {
        assert!(JULIA_WARP_WGSL.contains("struct WarpParams"));
        assert!(JULIA_WARP_WGSL.contains("sinh"));
        assert!(JULIA_WARP_WGSL.contains("cosh"));
        assert!(JULIA_WARP_WGSL.contains("inner_radius"));
        assert!(JULIA_WARP_WGSL.contains("outer_radius"));
    }

    #[test]
    fn aberration_wgsl_declares_params() {
        assert!(CHROMATIC_ABERRATION_WGSL.contains("struct AberrationParams"));
        assert!(CHROMATIC_ABERRATION_WGSL.contains("strength: f32"));
    }

    #[test]
    fn backend_parses_from_text() {
        assert_eq!("GPU".parse::<KernelBackend>(), Ok(KernelBackend::Gpu));
        assert!("metal".parse::<KernelBackend>().is_err());
    }
}
