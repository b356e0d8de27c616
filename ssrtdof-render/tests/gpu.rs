//! wgpu executor tests. Each test returns early when no adapter is available.

use glam::Mat4;
use image::{Rgba, RgbaImage};
use ssrtdof_render::graph::SENTINEL_DEPTH;
use ssrtdof_render::{
    Camera, DofEffect, DofEffectBuilder, Drawable, Error, FrameInput, GpuContext, Viewport, WgpuExecutor,
    SSRT_DOF_PROGRAM_NAME,
};

fn context() -> Option<GpuContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    match GpuContext::headless() {
        Ok(context) => Some(context),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

fn effect(context: &GpuContext, viewport: Viewport, drawables: &[Drawable]) -> DofEffect<WgpuExecutor> {
    DofEffectBuilder::new()
        .with_seed(11)
        .initialize(
            Camera::for_viewport(60.0, viewport),
            viewport,
            drawables,
            SSRT_DOF_PROGRAM_NAME,
            WgpuExecutor::new(context.clone()),
        )
        .unwrap()
}

fn frame(viewport: Viewport) -> FrameInput {
    FrameInput {
        view: Mat4::IDENTITY,
        viewport,
    }
}

#[test]
fn empty_scene_depth_is_sentinel() {
    let Some(context) = context() else { return };
    let viewport = Viewport::new(32, 16);
    let mut effect = effect(&context, viewport, &[]);
    let mut display = context.create_display(&RgbaImage::from_pixel(32, 16, Rgba([40, 80, 120, 255])));

    effect.on_frame(&frame(viewport), &mut display).unwrap();

    let depth = effect.executor().read_linear_depth().unwrap();
    assert_eq!(depth.dimensions(), (32, 16));
    assert!(depth.pixels().all(|p| p.0[0] == SENTINEL_DEPTH));
}

#[test]
fn uniform_readback_matches_frame_parameters() {
    let Some(context) = context() else { return };
    let viewport = Viewport::new(1920, 1080);
    // Short marches keep a software adapter fast at this size.
    let mut effect = DofEffectBuilder::new()
        .with_seed(11)
        .with_max_march_distance(1.0)
        .initialize(
            Camera::for_viewport(60.0, viewport),
            viewport,
            &[],
            SSRT_DOF_PROGRAM_NAME,
            WgpuExecutor::new(context.clone()),
        )
        .unwrap();
    let mut display = context.create_display(&RgbaImage::new(1920, 1080));

    effect.on_frame(&frame(viewport), &mut display).unwrap();

    let uniforms = effect.executor().read_uniforms().unwrap();
    assert_eq!(uniforms.focal_distance, 5.0);
    assert_eq!(uniforms.aperture, 0.001);
    assert_eq!(uniforms.marching_step, 0.2);
    assert_eq!(uniforms.screen_width, 1920.0);
    assert_eq!(uniforms.screen_height, 1080.0);
    assert_eq!(&uniforms, effect.uniforms());
}

#[test]
fn plane_depth_is_captured() {
    let Some(context) = context() else { return };
    let viewport = Viewport::new(24, 24);
    let camera = Camera::for_viewport(60.0, viewport);
    let plane = Drawable::screen_plane(&camera, Mat4::IDENTITY, 4.0);
    let mut effect = effect(&context, viewport, &[plane]);
    let mut display = context.create_display(&RgbaImage::new(24, 24));

    effect.on_frame(&frame(viewport), &mut display).unwrap();

    let depth = effect.executor().read_linear_depth().unwrap();
    assert!(depth.pixels().all(|p| (p.0[0] + 4.0).abs() < 1e-3));
}

#[test]
fn uniform_color_survives_the_round_trip() {
    let Some(context) = context() else { return };
    let viewport = Viewport::new(32, 32);
    let camera = Camera::for_viewport(60.0, viewport);
    let plane = Drawable::screen_plane(&camera, Mat4::IDENTITY, 5.0);
    let mut effect = effect(&context, viewport, &[plane]);
    let mut display = context.create_display(&RgbaImage::from_pixel(32, 32, Rgba([200, 100, 50, 255])));

    effect.on_frame(&frame(viewport), &mut display).unwrap();

    assert_eq!(effect.executor().read_ray_march().unwrap().dimensions(), (16, 16));
    let output = context.read_rgba(&display).unwrap();
    for pixel in output.pixels() {
        for (got, want) in pixel.0.iter().zip([200u8, 100, 50, 255]) {
            assert!(got.abs_diff(want) <= 2, "got {:?}", pixel.0);
        }
    }
}

#[test]
fn display_without_render_usage_is_rejected() {
    let Some(context) = context() else { return };
    let viewport = Viewport::new(4, 4);
    let mut effect = effect(&context, viewport, &[]);
    let mut display = context.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Sample-only display"),
        size: wgpu::Extent3d {
            width: 4,
            height: 4,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });

    let result = effect.on_frame(&frame(viewport), &mut display);
    assert!(matches!(result, Err(Error::DisplayMismatch { .. })));
}
