use crate::coefficients::{BufferLifecycle, BufferState};
use crate::direction::RowOrigin;
use crate::kernel::FaceDispatch;
use crate::probe::ShAccumulator;
use crate::sh::{ShCoefficients, SH_BUFFER_WORDS};
use anyhow::{anyhow, bail, Context, Result};
use std::sync::mpsc;
use wgpu::util::DeviceExt;

const SH_BUFFER_SIZE: u64 = (SH_BUFFER_WORDS * std::mem::size_of::<u32>()) as u64;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct DispatchParamsUniform {
    inv_view_proj: [[f32; 4]; 4],
    image_size: [u32; 2],
    flip_rows: u32,
    _pad: u32,
}

/// Headless device and queue used for SH accumulation.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    pub async fn new_headless() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request headless adapter")?;
        let adapter_info = adapter.get_info();
        log::info!("[sh] using adapter {} ({:?})", adapter_info.name, adapter_info.backend);
        let required_limits = adapter.limits();
        if required_limits.max_compute_invocations_per_workgroup < 256 {
            bail!(
                "Adapter '{}' supports {} invocations per workgroup; the SH kernel needs 256",
                adapter_info.name,
                required_limits.max_compute_invocations_per_workgroup
            );
        }
        let device_desc = wgpu::DeviceDescriptor {
            label: Some("SH Accumulation Device"),
            required_features: wgpu::Features::empty(),
            required_limits,
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        };
        let (device, queue) =
            adapter.request_device(&device_desc).await.context("Failed to request headless device")?;
        Ok(Self { device, queue, adapter_info })
    }

    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new_headless())
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_info.name
    }
}

/// Storage buffer of 36 words mirroring [`crate::coefficients::ShCoefficientBuffer`].
pub struct GpuShBuffer {
    buffer: wgpu::Buffer,
    lifecycle: BufferLifecycle,
}

impl GpuShBuffer {
    pub fn allocate(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SH Coefficient Buffer"),
            size: SH_BUFFER_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer, lifecycle: BufferLifecycle::new() }
    }

    pub fn state(&self) -> BufferState {
        self.lifecycle.state()
    }
}

/// Compute pipeline for `sh_accumulate.wgsl`.
pub struct GpuShKernel {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    row_origin: RowOrigin,
}

impl GpuShKernel {
    pub fn new(context: &GpuContext, row_origin: RowOrigin) -> Result<Self> {
        let device = context.device().clone();
        let queue = context.queue().clone();
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("SH Accumulate Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../assets/shaders/sh_accumulate.wgsl").into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SH Accumulate Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(SH_BUFFER_SIZE),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<DispatchParamsUniform>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("SH Accumulate Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("SH Accumulate Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            bail!("SH accumulate pipeline failed validation: {err}");
        }
        log::debug!("[sh] compute pipeline ready (row origin {})", row_origin.label());
        Ok(Self { device, queue, layout, pipeline, row_origin })
    }

    pub fn allocate_buffer(&self) -> GpuShBuffer {
        GpuShBuffer::allocate(&self.device)
    }

    pub fn reset(&self, buffer: &mut GpuShBuffer) {
        let mut encoder =
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("SH Reset Encoder") });
        encoder.clear_buffer(&buffer.buffer, 0, None);
        self.queue.submit(std::iter::once(encoder.finish()));
        buffer.lifecycle.mark_reset();
    }

    pub fn dispatch(&self, dispatch: &FaceDispatch<'_>, buffer: &mut GpuShBuffer) -> Result<()> {
        let max_dim = self.device.limits().max_texture_dimension_2d;
        if dispatch.width > max_dim || dispatch.height > max_dim {
            bail!(
                "Face {}x{} exceeds the device texture limit of {max_dim}",
                dispatch.width,
                dispatch.height
            );
        }
        buffer.lifecycle.begin_dispatch()?;
        let texture = self.upload_face(dispatch);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let params = DispatchParamsUniform {
            inv_view_proj: dispatch.inv_view_proj.to_cols_array_2d(),
            image_size: [dispatch.width, dispatch.height],
            flip_rows: u32::from(self.row_origin.flip_rows()),
            _pad: 0,
        };
        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SH Dispatch Params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SH Accumulate Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
                wgpu::BindGroupEntry { binding: 1, resource: buffer.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: params_buffer.as_entire_binding() },
            ],
        });
        let groups = dispatch.groups();
        let mut encoder =
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("SH Dispatch Encoder") });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("SH Accumulate Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups.x, groups.y, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        log::debug!(
            "[sh] gpu dispatch {}x{} groups for a {}x{} face",
            groups.x,
            groups.y,
            dispatch.width,
            dispatch.height
        );
        Ok(())
    }

    pub fn read(&self, buffer: &GpuShBuffer) -> Result<ShCoefficients> {
        buffer.lifecycle.ensure_readable()?;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SH Readback"),
            size: SH_BUFFER_SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder =
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("SH Readback Encoder") });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, SH_BUFFER_SIZE);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|err| anyhow!("Failed to wait for SH readback: {err}"))?;
        receiver
            .recv()
            .context("SH readback callback was dropped")?
            .map_err(|err| anyhow!("Failed to map SH readback buffer: {err}"))?;

        let mut words = [0u32; SH_BUFFER_WORDS];
        {
            let data = slice.get_mapped_range();
            words.copy_from_slice(bytemuck::cast_slice(&data));
        }
        staging.unmap();
        Ok(ShCoefficients::from_padded_words(&words))
    }

    fn upload_face(&self, dispatch: &FaceDispatch<'_>) -> wgpu::Texture {
        let face = dispatch.texture;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("SH Face Texture"),
            size: wgpu::Extent3d { width: face.width(), height: face.height(), depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let texels = face.to_rgba_f32();
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(face.width() * 16),
                rows_per_image: Some(face.height()),
            },
            wgpu::Extent3d { width: face.width(), height: face.height(), depth_or_array_layers: 1 },
        );
        texture
    }
}

/// GPU backend: one pipeline plus the buffer it accumulates into.
pub struct GpuShBackend {
    kernel: GpuShKernel,
    buffer: GpuShBuffer,
}

impl GpuShBackend {
    pub fn new(context: &GpuContext, row_origin: RowOrigin) -> Result<Self> {
        let kernel = GpuShKernel::new(context, row_origin)?;
        let buffer = kernel.allocate_buffer();
        Ok(Self { kernel, buffer })
    }
}

impl ShAccumulator for GpuShBackend {
    fn label(&self) -> &'static str {
        "gpu"
    }

    fn state(&self) -> BufferState {
        self.buffer.state()
    }

    fn reset(&mut self) -> Result<()> {
        self.kernel.reset(&mut self.buffer);
        Ok(())
    }

    fn dispatch(&mut self, dispatch: &FaceDispatch<'_>) -> Result<()> {
        self.kernel.dispatch(dispatch, &mut self.buffer)
    }

    fn read(&self) -> Result<ShCoefficients> {
        self.kernel.read(&self.buffer)
    }
}
