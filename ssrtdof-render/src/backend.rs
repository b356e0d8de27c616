//! wgpu executor: records the render graph into one command encoder per frame.

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbaImage;
use ssrtdof_gpu_shared::shaders::BLIT_SHADER;
use ssrtdof_gpu_shared::uniforms::{DepthObjectUniforms, DofUniforms};
use wgpu::util::DeviceExt;

use crate::drawable::Drawable;
use crate::executor::{resolve_program, Executor, ExecutorSetup, FrameBindings, TargetSizes};
use crate::graph::{RenderGraph, RenderNode, ShaderPass, TargetId};
use crate::passes::linear_depth::LinearDepthClear;
use crate::passes::{self, to_color};
use crate::pipeline;
use crate::readback;
use crate::reference::DepthImage;
use crate::render_targets::{self, RenderTarget, DISPLAY_USAGE, RAY_MARCH_FORMAT};
use crate::{Error, Result};

/// Device and queue shared with the host.
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }

    /// Open a device without a surface.
    pub fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(Error::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("SSRT DOF Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))?;

        device.on_uncaptured_error(Box::new(|err: wgpu::Error| log::error!("Uncaptured wgpu error: {err}")));

        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    /// Display texture for the executor, initialized from `image`.
    pub fn create_display(&self, image: &RgbaImage) -> wgpu::Texture {
        render_targets::create_display_texture(&self.device, &self.queue, image)
    }

    /// Read an `Rgba8` color texture back into an image.
    pub fn read_rgba(&self, texture: &wgpu::Texture) -> Result<RgbaImage> {
        let format = texture.format();
        if format.block_copy_size(None) != Some(4) || format.components() != 4 {
            return Err(Error::UnsupportedFormat(format));
        }
        let bytes = readback::read_texture(&self.device, &self.queue, texture)?;
        let wgpu::Extent3d { width, height, .. } = texture.size();
        RgbaImage::from_raw(width, height, bytes).ok_or(Error::UnsupportedFormat(format))
    }
}

/// Vertex and index buffers of one drawable.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, drawable: &Drawable) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Position Buffer"),
            contents: bytemuck::cast_slice(&drawable.mesh.positions),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // Keep only whole, in-range triangles so the GPU never reads past the vertex buffer.
        let vertex_count = drawable.mesh.positions.len() as u32;
        let indices: Vec<u32> = drawable
            .mesh
            .indices
            .chunks_exact(3)
            .filter(|tri| tri.iter().all(|&i| i < vertex_count))
            .flatten()
            .copied()
            .collect();

        // Zero-sized buffers are invalid; pad with one unused index.
        let contents: &[u32] = if indices.is_empty() { &[0] } else { &indices };
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(contents),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }
}

/// Per-drawable object uniforms in one buffer, addressed by dynamic offset.
struct ObjectUniformArena {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    stride: u32,
    transforms: Vec<glam::Mat4>,
}

impl ObjectUniformArena {
    fn new(device: &wgpu::Device, bgl: &wgpu::BindGroupLayout, drawables: &[Drawable]) -> Self {
        let align = device.limits().min_uniform_buffer_offset_alignment;
        let size = std::mem::size_of::<DepthObjectUniforms>() as u32;
        let stride = size.div_ceil(align) * align;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Object Uniforms"),
            size: stride as u64 * drawables.len().max(1) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Object Uniforms BG"),
            layout: bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(size as u64),
                }),
            }],
        });

        Self {
            buffer,
            bind_group,
            stride,
            transforms: drawables.iter().map(|d| d.transform).collect(),
        }
    }

    /// Stage this frame's model-view/projection for every drawable in one write.
    fn upload(&self, queue: &wgpu::Queue, bindings: &FrameBindings<'_>) {
        if self.transforms.is_empty() {
            return;
        }
        let mut bytes = vec![0u8; self.stride as usize * self.transforms.len()];
        for (slot, transform) in bytes.chunks_exact_mut(self.stride as usize).zip(&self.transforms) {
            let uniforms = bindings.object_uniforms(*transform);
            let raw = bytemuck::bytes_of(&uniforms);
            slot[..raw.len()].copy_from_slice(raw);
        }
        queue.write_buffer(&self.buffer, 0, &bytes);
    }
}

struct Prepared {
    program: &'static str,
    meshes: Vec<GpuMesh>,
    objects: ObjectUniformArena,
    linear_depth_pipeline: wgpu::RenderPipeline,
    ray_march_pipeline: wgpu::RenderPipeline,
    ray_march_bgl: wgpu::BindGroupLayout,
    blit_module: wgpu::ShaderModule,
    blit_bgl: wgpu::BindGroupLayout,
    blit_pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    uniform_buffer: wgpu::Buffer,
    _rotation_texture: wgpu::Texture,
    rotation_view: wgpu::TextureView,
    color_sampler: wgpu::Sampler,
    linear_depth: RenderTarget,
    ray_march: RenderTarget,
}

impl Prepared {
    /// Blit pipelines are built lazily, one per destination format.
    fn ensure_blit_pipeline(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<()> {
        if !self.blit_pipelines.contains_key(&format) {
            let created = pipeline::create_fullscreen_pipeline(
                device,
                &format!("Blit Pipeline {format:?}"),
                &self.blit_module,
                &self.blit_bgl,
                format,
            )?;
            self.blit_pipelines.insert(format, created);
        }
        Ok(())
    }
}

/// Executes the render graph with wgpu. The display is a host texture with
/// [`DISPLAY_USAGE`].
pub struct WgpuExecutor {
    context: GpuContext,
    prepared: Option<Prepared>,
}

impl WgpuExecutor {
    pub fn new(context: GpuContext) -> Self {
        Self { context, prepared: None }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    fn prepared(&self) -> Result<&Prepared> {
        self.prepared.as_ref().ok_or(Error::NotPrepared)
    }

    /// The uniform block as last uploaded by a `BindResources` node.
    pub fn read_uniforms(&self) -> Result<DofUniforms> {
        let prepared = self.prepared()?;
        let size = std::mem::size_of::<DofUniforms>() as u64;
        let bytes = readback::read_buffer_copy(&self.context.device, &self.context.queue, &prepared.uniform_buffer, size)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    /// Linear depth as of the last submitted frame.
    pub fn read_linear_depth(&self) -> Result<DepthImage> {
        let target = &self.prepared()?.linear_depth;
        let bytes = readback::read_texture(&self.context.device, &self.context.queue, &target.color_texture)?;
        let values: Vec<f32> = bytes.chunks_exact(4).map(bytemuck::pod_read_unaligned::<f32>).collect();
        DepthImage::from_raw(target.width, target.height, values).ok_or(Error::UnsupportedFormat(target.format()))
    }

    /// Ray-march output as of the last submitted frame.
    pub fn read_ray_march(&self) -> Result<RgbaImage> {
        self.context.read_rgba(&self.prepared()?.ray_march.color_texture)
    }
}

fn check_display(display: &wgpu::Texture) -> Result<()> {
    if display.usage().contains(DISPLAY_USAGE) {
        Ok(())
    } else {
        Err(Error::DisplayMismatch {
            found: format!("{:?}", display.usage()),
            expected: "TEXTURE_BINDING | RENDER_ATTACHMENT",
        })
    }
}

impl Executor for WgpuExecutor {
    type Display = wgpu::Texture;

    fn prepare(&mut self, setup: &ExecutorSetup<'_>) -> Result<()> {
        let program = resolve_program(setup.program)?;
        let device = &self.context.device;
        let queue = &self.context.queue;

        let depth_module = pipeline::create_shader_module(
            device,
            &format!("{} pass {}", program.name, ShaderPass::LinearDepth.index()),
            program.passes[ShaderPass::LinearDepth.index()],
        )?;
        let ray_march_module = pipeline::create_shader_module(
            device,
            &format!("{} pass {}", program.name, ShaderPass::RayMarch.index()),
            program.passes[ShaderPass::RayMarch.index()],
        )?;
        let blit_module = pipeline::create_shader_module(device, "Blit", BLIT_SHADER)?;

        let depth_bgl = pipeline::create_linear_depth_bgl(device);
        let linear_depth_pipeline = pipeline::create_linear_depth_pipeline(device, &depth_module, &depth_bgl)?;
        let ray_march_bgl = pipeline::create_ray_march_bgl(device);
        let ray_march_pipeline = pipeline::create_fullscreen_pipeline(
            device,
            "Ray March Pipeline",
            &ray_march_module,
            &ray_march_bgl,
            RAY_MARCH_FORMAT,
        )?;
        let blit_bgl = pipeline::create_blit_bgl(device);

        let meshes = setup.drawables.iter().map(|d| GpuMesh::upload(device, d)).collect();
        let objects = ObjectUniformArena::new(device, &depth_bgl, setup.drawables);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("DOF Uniforms"),
            size: std::mem::size_of::<DofUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let (rotation_texture, rotation_view) = render_targets::upload_rotation_texture(device, queue, setup.rotations);
        let color_sampler = render_targets::create_color_sampler(device);

        let sizes = setup.sizes;
        let linear_depth =
            render_targets::create_linear_depth_target(device, sizes.linear_depth.width, sizes.linear_depth.height);
        let ray_march = render_targets::create_ray_march_target(device, sizes.ray_march.width, sizes.ray_march.height);

        log::info!(
            "wgpu executor prepared `{}`: {} meshes, object stride {}",
            program.name,
            setup.drawables.len(),
            objects.stride
        );

        self.prepared = Some(Prepared {
            program: program.name,
            meshes,
            objects,
            linear_depth_pipeline,
            ray_march_pipeline,
            ray_march_bgl,
            blit_module,
            blit_bgl,
            blit_pipelines: HashMap::new(),
            uniform_buffer,
            _rotation_texture: rotation_texture,
            rotation_view,
            color_sampler,
            linear_depth,
            ray_march,
        });
        Ok(())
    }

    fn resize(&mut self, sizes: TargetSizes) -> Result<()> {
        let device = &self.context.device;
        let prepared = self.prepared.as_mut().ok_or(Error::NotPrepared)?;
        prepared.linear_depth =
            render_targets::create_linear_depth_target(device, sizes.linear_depth.width, sizes.linear_depth.height);
        prepared.ray_march = render_targets::create_ray_march_target(device, sizes.ray_march.width, sizes.ray_march.height);
        log::debug!("`{}` targets reallocated", prepared.program);
        Ok(())
    }

    fn execute(&mut self, graph: &RenderGraph, bindings: &FrameBindings<'_>, display: &mut wgpu::Texture) -> Result<()> {
        check_display(display)?;
        let device = &self.context.device;
        let queue = &self.context.queue;
        let prepared = self.prepared.as_mut().ok_or(Error::NotPrepared)?;

        prepared.objects.upload(queue, bindings);
        let display_view = display.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("SSRT DOF Encoder"),
        });
        let mut bound = false;

        for node in graph.nodes() {
            match *node {
                RenderNode::Clear {
                    target: TargetId::LinearDepth,
                    color,
                    depth,
                } => passes::linear_depth::render_linear_depth(
                    &mut encoder,
                    &prepared.linear_depth,
                    &prepared.linear_depth_pipeline,
                    &prepared.objects.bind_group,
                    prepared.objects.stride,
                    &[],
                    LinearDepthClear {
                        color: Some(to_color(color)),
                        depth,
                    },
                ),
                RenderNode::Clear { target, color, .. } => {
                    let view = match target {
                        TargetId::RayMarch => &prepared.ray_march.color_view,
                        _ => &display_view,
                    };
                    drop(passes::begin_color_pass(&mut encoder, "Clear Pass", view, Some(to_color(color))));
                }
                RenderNode::DrawList {
                    target: TargetId::LinearDepth,
                    pass: ShaderPass::LinearDepth,
                } => passes::linear_depth::render_linear_depth(
                    &mut encoder,
                    &prepared.linear_depth,
                    &prepared.linear_depth_pipeline,
                    &prepared.objects.bind_group,
                    prepared.objects.stride,
                    &prepared.meshes,
                    LinearDepthClear::LOAD,
                ),
                RenderNode::DrawList { target, pass } => {
                    return Err(Error::Graph(format!("{pass:?} draws into {target:?} are not supported")));
                }
                RenderNode::BindResources => {
                    queue.write_buffer(&prepared.uniform_buffer, 0, bytemuck::bytes_of(bindings.uniforms));
                    bound = true;
                }
                RenderNode::Blit {
                    source: TargetId::Display,
                    destination: TargetId::RayMarch,
                    pass: Some(ShaderPass::RayMarch),
                } => {
                    if !bound {
                        return Err(Error::Graph("ray march before resources are bound".into()));
                    }
                    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("Ray March BG"),
                        layout: &prepared.ray_march_bgl,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: prepared.uniform_buffer.as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::TextureView(&display_view),
                            },
                            wgpu::BindGroupEntry {
                                binding: 2,
                                resource: wgpu::BindingResource::TextureView(&prepared.linear_depth.color_view),
                            },
                            wgpu::BindGroupEntry {
                                binding: 3,
                                resource: wgpu::BindingResource::TextureView(&prepared.rotation_view),
                            },
                            wgpu::BindGroupEntry {
                                binding: 4,
                                resource: wgpu::BindingResource::Sampler(&prepared.color_sampler),
                            },
                        ],
                    });
                    passes::ray_march::render_ray_march(
                        &mut encoder,
                        &prepared.ray_march,
                        &prepared.ray_march_pipeline,
                        &bind_group,
                    );
                }
                RenderNode::Blit {
                    source,
                    destination,
                    pass: None,
                } => {
                    let format = match destination {
                        TargetId::Display => display.format(),
                        _ => prepared.ray_march.format(),
                    };
                    prepared.ensure_blit_pipeline(device, format)?;

                    let (source_view, destination_view) = match (source, destination) {
                        (TargetId::RayMarch, TargetId::Display) => (&prepared.ray_march.color_view, &display_view),
                        (TargetId::Display, TargetId::RayMarch) => (&display_view, &prepared.ray_march.color_view),
                        _ => return Err(Error::Graph(format!("blit {source:?} -> {destination:?} is not supported"))),
                    };
                    let blit = prepared
                        .blit_pipelines
                        .get(&format)
                        .ok_or_else(|| Error::Graph(format!("no blit pipeline for {format:?}")))?;
                    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("Blit BG"),
                        layout: &prepared.blit_bgl,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::TextureView(source_view),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::Sampler(&prepared.color_sampler),
                            },
                        ],
                    });
                    passes::blit::render_blit(&mut encoder, destination_view, blit, &bind_group);
                }
                RenderNode::Blit { source, destination, pass } => {
                    return Err(Error::Graph(format!(
                        "blit {source:?} -> {destination:?} through {pass:?} is not supported"
                    )));
                }
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
