//! Pass 1: screen-space ray march into the reduced-resolution target.

use crate::render_targets::RenderTarget;

pub fn render_ray_march(
    encoder: &mut wgpu::CommandEncoder,
    target: &RenderTarget,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
) {
    let mut pass = super::begin_color_pass(encoder, "Ray March Pass", &target.color_view, Some(wgpu::Color::BLACK));
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.draw(0..3, 0..1);
}
