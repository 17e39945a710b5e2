use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::aberration::DEFAULT_ABERRATION_STRENGTH;
use crate::antialias::AdaptivePolicy;
use crate::kernel::{KernelBackend, KernelLibrary};
use crate::params::FrameParameters;
use crate::pipeline::{FramePipeline, PipelineOptions};

/// Everything needed to build a [`FramePipeline`]. Every field has a
/// default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AppConfig {
    pub parameters: FrameParameters,
    pub aberration_strength: f32,
    pub adaptive: AdaptivePolicy,
    pub backend: KernelBackend,
    /// Worker threads for the CPU kernels; rayon's global pool when unset.
    pub threads: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            parameters: FrameParameters::default(),
            aberration_strength: DEFAULT_ABERRATION_STRENGTH,
            adaptive: AdaptivePolicy::default(),
            backend: KernelBackend::default(),
            threads: None,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.parameters
            .sanitized()
            .context("invalid initial parameters")?;

        if !self.aberration_strength.is_finite() || self.aberration_strength < 0.0 {
            bail!(
                "aberration_strength must be a finite number >= 0, got {}",
                self.aberration_strength
            );
        }

        let AdaptivePolicy {
            inner_radius,
            outer_radius,
        } = self.adaptive;
        if !inner_radius.is_finite() || !outer_radius.is_finite() {
            bail!("adaptive radii must be finite numbers");
        }
        if inner_radius < 0.0 || inner_radius > outer_radius {
            bail!(
                "adaptive radii must satisfy 0 <= inner_radius <= outer_radius, got {inner_radius} and {outer_radius}"
            );
        }

        if self.threads == Some(0) {
            bail!("threads must be at least 1 when set");
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            adaptive: self.adaptive,
            aberration_strength: self.aberration_strength,
        }
    }

    /// Load kernels for the configured backend and build a pipeline.
    pub fn build_pipeline(&self) -> Result<FramePipeline> {
        let library = KernelLibrary::load(self.backend, self.threads)?;
        FramePipeline::with_options(&library, self.parameters, self.pipeline_options())
            .context("failed to build frame pipeline")
    }
}

pub fn parse_config(contents: &str, origin: &Path) -> Result<AppConfig> {
    let config: AppConfig = serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            origin.display(),
            location,
            error
        )
    })?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", origin.display()))?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&contents, path)
}
