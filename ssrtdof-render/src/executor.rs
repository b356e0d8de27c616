//! The seam between the effect and whatever runs its render graph.

use glam::Mat4;
use ssrtdof_gpu_shared::shaders::{find_program, ProgramSource};
use ssrtdof_gpu_shared::uniforms::{DepthObjectUniforms, DofUniforms};

use crate::camera::Viewport;
use crate::drawable::Drawable;
use crate::graph::{RenderGraph, ShaderPass};
use crate::samples::RotationTexture;
use crate::{Error, Result};

/// Sizes of the effect-owned targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetSizes {
    pub linear_depth: Viewport,
    pub ray_march: Viewport,
}

impl TargetSizes {
    pub fn for_viewport(viewport: Viewport, resolution_scale: f32) -> Self {
        Self {
            linear_depth: viewport,
            ray_march: viewport.scaled(resolution_scale),
        }
    }
}

/// Everything an executor needs once, before the first frame.
pub struct ExecutorSetup<'a> {
    pub program: &'a str,
    pub drawables: &'a [Drawable],
    pub rotations: &'a RotationTexture,
    pub sizes: TargetSizes,
}

/// Uniform values for one execution of the graph.
#[derive(Clone, Copy, Debug)]
pub struct FrameBindings<'a> {
    pub uniforms: &'a DofUniforms,
    /// World-to-view transform for this frame.
    pub view: Mat4,
    /// Projection in the executor's clip convention.
    pub projection: Mat4,
}

impl FrameBindings<'_> {
    pub fn object_uniforms(&self, transform: Mat4) -> DepthObjectUniforms {
        DepthObjectUniforms {
            model_view: (self.view * transform).to_cols_array_2d(),
            projection: self.projection.to_cols_array_2d(),
        }
    }
}

pub trait Executor {
    /// The host-owned color target the graph reads and overwrites.
    type Display;

    /// Compile the program, allocate targets and upload static data.
    fn prepare(&mut self, setup: &ExecutorSetup<'_>) -> Result<()>;

    /// Reallocate the effect-owned targets.
    fn resize(&mut self, sizes: TargetSizes) -> Result<()>;

    /// Run every node of `graph` in order.
    fn execute(&mut self, graph: &RenderGraph, bindings: &FrameBindings<'_>, display: &mut Self::Display) -> Result<()>;
}

/// Resolve `name` and check it exposes both passes the graph uses.
pub fn resolve_program(name: &str) -> Result<&'static ProgramSource> {
    let program = find_program(name).ok_or_else(|| Error::ProgramNotFound(name.to_string()))?;
    let expected = ShaderPass::RayMarch.index() + 1;
    if program.passes.len() < expected {
        return Err(Error::MissingPass {
            name: name.to_string(),
            found: program.passes.len(),
            expected,
        });
    }
    Ok(program)
}
