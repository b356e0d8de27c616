//! CPU executor running the same recipe as the WGSL program.
//!
//! Slow, but needs no adapter; tests and the `cpu` CLI backend use it.

use glam::{Mat4, Vec2, Vec3, Vec3Swizzles, Vec4, Vec4Swizzles};
use image::{ImageBuffer, Luma, Rgba, Rgba32FImage};
use ssrtdof_gpu_shared::shaders::ProgramSource;
use ssrtdof_gpu_shared::uniforms::{DofUniforms, CIRCLE_SAMPLE_COUNT, MAX_MARCH_STEPS};

use crate::camera::Viewport;
use crate::drawable::Drawable;
use crate::executor::{resolve_program, Executor, ExecutorSetup, FrameBindings, TargetSizes};
use crate::frustum::FrustumCorners;
use crate::graph::{RenderGraph, RenderNode, ShaderPass, TargetId, CLEAR_DEPTH, SENTINEL_DEPTH};
use crate::samples::RotationTexture;
use crate::{Error, Result};

/// Single-channel f32 image holding view-space z.
pub type DepthImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Clip-space w at or below which a point counts as behind the camera.
const MIN_CLIP_W: f32 = 1e-5;

struct Targets {
    linear_depth: DepthImage,
    depth_buffer: Vec<f32>,
    ray_march: Rgba32FImage,
}

impl Targets {
    fn allocate(sizes: TargetSizes) -> Self {
        let depth = sizes.linear_depth;
        let ray_march = sizes.ray_march;
        Self {
            linear_depth: DepthImage::from_pixel(depth.width, depth.height, Luma([SENTINEL_DEPTH])),
            depth_buffer: vec![CLEAR_DEPTH; depth.width as usize * depth.height as usize],
            ray_march: Rgba32FImage::new(ray_march.width, ray_march.height),
        }
    }
}

#[derive(Default)]
pub struct ReferenceExecutor {
    program: Option<&'static ProgramSource>,
    drawables: Vec<Drawable>,
    rotations: Option<RotationTexture>,
    targets: Option<Targets>,
    bound: Option<DofUniforms>,
}

impl ReferenceExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(&self) -> Option<&'static ProgramSource> {
        self.program
    }

    /// Linear depth as of the last execution.
    pub fn linear_depth(&self) -> Option<&DepthImage> {
        self.targets.as_ref().map(|t| &t.linear_depth)
    }

    /// Reduced-resolution ray-march output as of the last execution.
    pub fn ray_march_target(&self) -> Option<&Rgba32FImage> {
        self.targets.as_ref().map(|t| &t.ray_march)
    }

    /// The uniform block bound during the last execution.
    pub fn bound_uniforms(&self) -> Option<&DofUniforms> {
        self.bound.as_ref()
    }

    fn clear(&mut self, target: TargetId, color: [f32; 4], depth: Option<f32>, display: &mut Rgba32FImage) -> Result<()> {
        let targets = self.targets.as_mut().ok_or(Error::NotPrepared)?;
        match target {
            TargetId::LinearDepth => {
                for pixel in targets.linear_depth.pixels_mut() {
                    *pixel = Luma([color[0]]);
                }
                if let Some(depth) = depth {
                    targets.depth_buffer.fill(depth);
                }
            }
            TargetId::RayMarch => {
                for pixel in targets.ray_march.pixels_mut() {
                    *pixel = Rgba(color);
                }
            }
            TargetId::Display => {
                for pixel in display.pixels_mut() {
                    *pixel = Rgba(color);
                }
            }
        }
        Ok(())
    }

    fn draw_list(&mut self, target: TargetId, pass: ShaderPass, bindings: &FrameBindings<'_>) -> Result<()> {
        if target != TargetId::LinearDepth || pass != ShaderPass::LinearDepth {
            return Err(Error::Graph(format!("{pass:?} draws are only supported into the linear depth target")));
        }
        let targets = self.targets.as_mut().ok_or(Error::NotPrepared)?;
        for drawable in &self.drawables {
            rasterize_linear_depth(targets, drawable, bindings.view * drawable.transform, bindings.projection);
        }
        Ok(())
    }

    fn blit(
        &mut self,
        source: TargetId,
        destination: TargetId,
        pass: Option<ShaderPass>,
        display: &mut Rgba32FImage,
    ) -> Result<()> {
        let targets = self.targets.as_mut().ok_or(Error::NotPrepared)?;
        let size = match destination {
            TargetId::Display => Viewport::new(display.width(), display.height()),
            TargetId::RayMarch => Viewport::new(targets.ray_march.width(), targets.ray_march.height()),
            TargetId::LinearDepth => return Err(Error::Graph("blit into the linear depth target".into())),
        };

        let output = {
            let color: &Rgba32FImage = match source {
                TargetId::Display => &*display,
                TargetId::RayMarch => &targets.ray_march,
                TargetId::LinearDepth => return Err(Error::Graph("blit from the linear depth target".into())),
            };
            match pass {
                None => resample(color, size),
                Some(ShaderPass::RayMarch) => {
                    let uniforms = self
                        .bound
                        .as_ref()
                        .ok_or_else(|| Error::Graph("ray march before resources are bound".into()))?;
                    let rotations = self.rotations.as_ref().ok_or(Error::NotPrepared)?;
                    ray_march(color, &targets.linear_depth, rotations, uniforms, size)
                }
                Some(ShaderPass::LinearDepth) => {
                    return Err(Error::Graph("the linear depth pass cannot be used as a blit".into()))
                }
            }
        };

        match destination {
            TargetId::Display => *display = output,
            _ => targets.ray_march = output,
        }
        Ok(())
    }
}

impl Executor for ReferenceExecutor {
    type Display = Rgba32FImage;

    fn prepare(&mut self, setup: &ExecutorSetup<'_>) -> Result<()> {
        let program = resolve_program(setup.program)?;
        self.program = Some(program);
        self.drawables = setup.drawables.to_vec();
        self.rotations = Some(setup.rotations.clone());
        self.targets = Some(Targets::allocate(setup.sizes));
        log::info!(
            "Reference executor prepared `{}` with {} drawables",
            program.name,
            self.drawables.len()
        );
        Ok(())
    }

    fn resize(&mut self, sizes: TargetSizes) -> Result<()> {
        if self.program.is_none() {
            return Err(Error::NotPrepared);
        }
        self.targets = Some(Targets::allocate(sizes));
        Ok(())
    }

    fn execute(&mut self, graph: &RenderGraph, bindings: &FrameBindings<'_>, display: &mut Rgba32FImage) -> Result<()> {
        if self.program.is_none() {
            return Err(Error::NotPrepared);
        }
        self.bound = None;
        for node in graph.nodes() {
            match *node {
                RenderNode::Clear { target, color, depth } => self.clear(target, color, depth, display)?,
                RenderNode::DrawList { target, pass } => self.draw_list(target, pass, bindings)?,
                RenderNode::BindResources => self.bound = Some(*bindings.uniforms),
                RenderNode::Blit { source, destination, pass } => self.blit(source, destination, pass, display)?,
            }
        }
        Ok(())
    }
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b - a).perp_dot(p - a)
}

/// Rasterize one drawable at pixel centers with a `Less` depth test, writing
/// perspective-correct view-space z.
fn rasterize_linear_depth(targets: &mut Targets, drawable: &Drawable, model_view: Mat4, projection: Mat4) {
    let (width, height) = targets.linear_depth.dimensions();
    let size = Vec2::new(width as f32, height as f32);

    for triangle in drawable.mesh.triangles() {
        let view = triangle.map(|p| model_view.transform_point3(p));
        let clip = view.map(|v| projection * v.extend(1.0));
        // No near-plane clipping: triangles crossing the camera plane are dropped.
        if clip.iter().any(|c| c.w <= MIN_CLIP_W) {
            continue;
        }
        let screen = clip.map(|c| {
            let ndc = c.xyz() / c.w;
            Vec3::new((ndc.x * 0.5 + 0.5) * size.x, (0.5 - ndc.y * 0.5) * size.y, ndc.z)
        });
        let [s0, s1, s2] = screen.map(|s| s.xy());
        let area = edge(s0, s1, s2);
        if area.abs() <= f32::EPSILON {
            continue;
        }

        let min = s0.min(s1).min(s2).floor().max(Vec2::ZERO);
        let max = s0.max(s1).max(s2).ceil().min(size);
        let inv_w = clip.map(|c| 1.0 / c.w);

        for y in min.y as u32..max.y as u32 {
            for x in min.x as u32..max.x as u32 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let b = [edge(s1, s2, p) / area, edge(s2, s0, p) / area, edge(s0, s1, p) / area];
                if b.iter().any(|&w| w < 0.0) {
                    continue;
                }

                let depth = b[0] * screen[0].z + b[1] * screen[1].z + b[2] * screen[2].z;
                if !(-1.0..=1.0).contains(&depth) {
                    continue;
                }
                let index = (y * width + x) as usize;
                if depth >= targets.depth_buffer[index] {
                    continue;
                }

                let weight = b[0] * inv_w[0] + b[1] * inv_w[1] + b[2] * inv_w[2];
                let view_z = (b[0] * view[0].z * inv_w[0] + b[1] * view[1].z * inv_w[1] + b[2] * view[2].z * inv_w[2])
                    / weight;
                targets.depth_buffer[index] = depth;
                targets.linear_depth.put_pixel(x, y, Luma([view_z]));
            }
        }
    }
}

/// Bilinear lookup with clamp-to-edge addressing.
pub fn sample_bilinear(image: &Rgba32FImage, uv: Vec2) -> Vec4 {
    let (width, height) = image.dimensions();
    let coord = uv * Vec2::new(width as f32, height as f32) - 0.5;
    let base = coord.floor();
    let frac = coord - base;

    let fetch = |dx: i64, dy: i64| {
        let x = (base.x as i64 + dx).clamp(0, width as i64 - 1) as u32;
        let y = (base.y as i64 + dy).clamp(0, height as i64 - 1) as u32;
        Vec4::from_array(image.get_pixel(x, y).0)
    };

    let top = fetch(0, 0).lerp(fetch(1, 0), frac.x);
    let bottom = fetch(0, 1).lerp(fetch(1, 1), frac.x);
    top.lerp(bottom, frac.y)
}

/// Nearest-texel depth lookup, clamped to the image.
pub fn fetch_depth(depth: &DepthImage, uv: Vec2) -> f32 {
    let (width, height) = depth.dimensions();
    let x = ((uv.x * width as f32).floor() as i64).clamp(0, width as i64 - 1) as u32;
    let y = ((uv.y * height as f32).floor() as i64).clamp(0, height as i64 - 1) as u32;
    depth.get_pixel(x, y).0[0]
}

fn resample(source: &Rgba32FImage, size: Viewport) -> Rgba32FImage {
    Rgba32FImage::from_fn(size.width, size.height, |x, y| {
        let uv = pixel_center(x, y, size);
        Rgba(sample_bilinear(source, uv).to_array())
    })
}

fn pixel_center(x: u32, y: u32, size: Viewport) -> Vec2 {
    Vec2::new((x as f32 + 0.5) / size.width as f32, (y as f32 + 0.5) / size.height as f32)
}

fn ray_march(
    color: &Rgba32FImage,
    depth: &DepthImage,
    rotations: &RotationTexture,
    uniforms: &DofUniforms,
    size: Viewport,
) -> Rgba32FImage {
    let frustum = FrustumCorners::from_rows(&uniforms.frustum_corners);
    let projection = Mat4::from_cols_array_2d(&uniforms.projection);
    Rgba32FImage::from_fn(size.width, size.height, |x, y| {
        let uv = pixel_center(x, y, size);
        let rgb = ray_march_pixel(color, depth, rotations, uniforms, &frustum, projection, uv);
        Rgba([rgb.x, rgb.y, rgb.z, 1.0])
    })
}

/// Mean color over the rotated lens samples for one output pixel.
pub fn ray_march_pixel(
    color: &Rgba32FImage,
    depth: &DepthImage,
    rotations: &RotationTexture,
    uniforms: &DofUniforms,
    frustum: &FrustumCorners,
    projection: Mat4,
    uv: Vec2,
) -> Vec3 {
    let focus = frustum.ray_at(uv) * uniforms.focal_distance;

    let screen = Vec2::new(uniforms.screen_width, uniforms.screen_height);
    let pixel = (uv * screen).floor();
    let (sin, cos) = rotations.texel(pixel.x as i64, pixel.y as i64).sin_cos();

    let step = uniforms.marching_step;
    let steps = ((uniforms.max_march_distance / step).ceil() as u32).min(MAX_MARCH_STEPS);

    let mut accum = Vec3::ZERO;
    for i in 0..CIRCLE_SAMPLE_COUNT {
        let [dx, dy] = uniforms.circle_sample(i);
        let lens = Vec2::new(dx * cos - dy * sin, dx * sin + dy * cos) * uniforms.aperture;
        let origin = lens.extend(0.0);
        let dir = (focus - origin).normalize();

        let mut last_uv = uv;
        for k in 1..=steps {
            let p = origin + dir * (step * k as f32);
            let clip = projection * p.extend(1.0);
            if clip.w <= MIN_CLIP_W {
                continue;
            }
            let ndc = clip.xy() / clip.w;
            let p_uv = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
            if p_uv.cmplt(Vec2::ZERO).any() || p_uv.cmpgt(Vec2::ONE).any() {
                continue;
            }
            last_uv = p_uv;
            if fetch_depth(depth, p_uv) >= p.z {
                break;
            }
        }
        accum += sample_bilinear(color, last_uv).xyz();
    }
    accum / CIRCLE_SAMPLE_COUNT as f32
}
