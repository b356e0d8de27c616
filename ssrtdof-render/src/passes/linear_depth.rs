//! Depth prepass: view-space z of every drawable into the linear depth target.

use crate::backend::GpuMesh;
use crate::render_targets::RenderTarget;

/// Clear color and depth before any geometry is drawn. `None` loads.
#[derive(Clone, Copy, Debug)]
pub struct LinearDepthClear {
    pub color: Option<wgpu::Color>,
    pub depth: Option<f32>,
}

impl LinearDepthClear {
    pub const LOAD: Self = Self { color: None, depth: None };
}

/// Draw `meshes` into `target`. Mesh `i` reads its object uniforms at
/// dynamic offset `i * object_stride`.
pub fn render_linear_depth(
    encoder: &mut wgpu::CommandEncoder,
    target: &RenderTarget,
    pipeline: &wgpu::RenderPipeline,
    object_bind_group: &wgpu::BindGroup,
    object_stride: u32,
    meshes: &[GpuMesh],
    clear: LinearDepthClear,
) {
    let depth_stencil_attachment = target.depth_view.as_ref().map(|view| wgpu::RenderPassDepthStencilAttachment {
        view,
        depth_ops: Some(wgpu::Operations {
            load: clear.depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
            store: wgpu::StoreOp::Store,
        }),
        stencil_ops: Some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(0),
            store: wgpu::StoreOp::Discard,
        }),
    });

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Linear Depth Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &target.color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: clear.color.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment,
        ..Default::default()
    });

    if meshes.is_empty() {
        return;
    }

    pass.set_pipeline(pipeline);
    for (i, mesh) in meshes.iter().enumerate() {
        if mesh.index_count == 0 {
            continue;
        }
        pass.set_bind_group(0, object_bind_group, &[i as u32 * object_stride]);
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count, 0, 0..1);
    }
}
