//! wgpu compute realisation of the warp and aberration kernels.
//!
//! Frames travel as packed RGBA8 storage buffers; each kernel is one
//! dispatch of 8x8 workgroups followed by a blocking readback. The per-pixel
//! math mirrors the CPU kernels, but float rounding on the device may differ
//! by a unit in the last byte.

use std::borrow::Cow;
use std::sync::{mpsc, Arc};

use anyhow::{anyhow, bail, Context, Result};
use bytemuck::{Pod, Zeroable};
use log::info;
use wgpu::util::DeviceExt;

use crate::error::StageError;
use crate::frame::Frame;
use crate::kernel::{
    AberrationKernel, WarpJob, WarpKernel, CHROMATIC_ABERRATION, CHROMATIC_ABERRATION_WGSL,
    JULIA_WARP, JULIA_WARP_WGSL,
};

const WORKGROUP_SIZE: u32 = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct WarpUniforms {
    src_size: [u32; 2],
    dst_size: [u32; 2],
    center: [f32; 2],
    variant: u32,
    antialiasing: u32,
    inner_radius: f32,
    outer_radius: f32,
    _pad: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct AberrationUniforms {
    size: [u32; 2],
    strength: f32,
    _pad: f32,
}

pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
}

impl GpuContext {
    /// Blocking adapter and device request.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| anyhow!("no suitable GPU adapter found"))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("juliacam-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to request wgpu device")?;

        info!("using GPU adapter '{adapter_name}'");
        Ok(Self {
            device,
            queue,
            adapter_name,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn compute_pipeline(&self, label: &str, source: &'static str) -> wgpu::ComputePipeline {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            });
        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&format!("{label}-pipeline")),
                layout: None,
                module: &module,
                entry_point: "main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            })
    }

    /// One dispatch over `extent`: `input` is bound at 0, the output at 1 and
    /// `uniforms` at 2. Returns the output buffer contents.
    fn dispatch(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        input: &[u8],
        uniforms: &[u8],
        extent: (u32, u32),
    ) -> Result<Vec<u8>> {
        let output_len = u64::from(extent.0) * u64::from(extent.1) * 4;
        let limit = u64::from(self.device.limits().max_storage_buffer_binding_size);
        if output_len > limit || input.len() as u64 > limit {
            bail!("{label}: frame exceeds the device storage buffer limit of {limit} bytes");
        }

        let src = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-src")),
                contents: input,
                usage: wgpu::BufferUsages::STORAGE,
            });
        let dst = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}-dst")),
            size: output_len,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let params = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-params")),
                contents: uniforms,
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}-readback")),
            size: output_len,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-bg")),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: src.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: dst.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&format!("{label}-encoder")),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&format!("{label}-pass")),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                extent.0.div_ceil(WORKGROUP_SIZE),
                extent.1.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(&dst, 0, &readback, 0, output_len);
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| anyhow!("failed receiving GPU map callback"))?
            .context("GPU buffer mapping failed")?;

        let mapped = buffer_slice.get_mapped_range();
        let bytes = mapped.to_vec();
        drop(mapped);
        readback.unmap();
        Ok(bytes)
    }
}

pub struct GpuWarpKernel {
    context: Arc<GpuContext>,
    pipeline: wgpu::ComputePipeline,
}

impl GpuWarpKernel {
    pub fn new(context: Arc<GpuContext>) -> Result<Self> {
        let pipeline = context.compute_pipeline(JULIA_WARP, JULIA_WARP_WGSL);
        Ok(Self { context, pipeline })
    }
}

impl WarpKernel for GpuWarpKernel {
    fn backend(&self) -> &'static str {
        "gpu"
    }

    fn warp(&self, source: &Frame, job: &WarpJob) -> Result<Frame, StageError> {
        let extent = (job.output_width, job.output_height);
        if source.is_empty() || extent.0 == 0 || extent.1 == 0 {
            return Frame::new(extent.0, extent.1, vec![0; extent.0 as usize * extent.1 as usize * 4])
                .map_err(|error| StageError::kernel(JULIA_WARP, error.to_string()));
        }

        let center = job.mapper(source.extent()).center();
        let uniforms = WarpUniforms {
            src_size: [source.width(), source.height()],
            dst_size: [extent.0, extent.1],
            center: [center.0, center.1],
            variant: job.variant.kernel_index(),
            antialiasing: job.antialiasing.kernel_index(),
            inner_radius: job.policy.inner_radius,
            outer_radius: job.policy.outer_radius,
            _pad: [0; 2],
        };

        let rgba = self
            .context
            .dispatch(
                JULIA_WARP,
                &self.pipeline,
                source.as_rgba(),
                bytemuck::bytes_of(&uniforms),
                extent,
            )
            .map_err(|error| StageError::kernel(JULIA_WARP, format!("{error:#}")))?;
        Frame::new(extent.0, extent.1, rgba)
            .map_err(|error| StageError::kernel(JULIA_WARP, error.to_string()))
    }
}

pub struct GpuAberrationKernel {
    context: Arc<GpuContext>,
    pipeline: wgpu::ComputePipeline,
}

impl GpuAberrationKernel {
    pub fn new(context: Arc<GpuContext>) -> Result<Self> {
        let pipeline = context.compute_pipeline(CHROMATIC_ABERRATION, CHROMATIC_ABERRATION_WGSL);
        Ok(Self { context, pipeline })
    }
}

impl AberrationKernel for GpuAberrationKernel {
    fn backend(&self) -> &'static str {
        "gpu"
    }

    fn aberrate(&self, image: &Frame, strength: f32) -> Result<Frame, StageError> {
        if image.is_empty() || strength == 0.0 {
            return Ok(image.clone());
        }

        let uniforms = AberrationUniforms {
            size: [image.width(), image.height()],
            strength,
            _pad: 0.0,
        };
        let rgba = self
            .context
            .dispatch(
                CHROMATIC_ABERRATION,
                &self.pipeline,
                image.as_rgba(),
                bytemuck::bytes_of(&uniforms),
                image.extent(),
            )
            .map_err(|error| StageError::kernel(CHROMATIC_ABERRATION, format!("{error:#}")))?;
        Frame::new(image.width(), image.height(), rgba)
            .map_err(|error| StageError::kernel(CHROMATIC_ABERRATION, error.to_string()))
    }
}
