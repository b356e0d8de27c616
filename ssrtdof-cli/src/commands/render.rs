use std::time::Instant;

use anyhow::Context;
use glam::Mat4;
use image::DynamicImage;
use ssrtdof_render::{
    Camera, DofEffectBuilder, Drawable, EffectConfig, EffectParameters, Executor, FrameInput, GpuContext,
    ReferenceExecutor, Viewport, WgpuExecutor, SSRT_DOF_PROGRAM_NAME,
};

use crate::cli::{Backend, RenderArgs};

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let input = image::open(&args.input).with_context(|| format!("Failed to read {}", args.input.display()))?;
    let viewport = Viewport::new(input.width(), input.height());
    let camera = Camera::for_viewport(args.fov, viewport);
    let view = Mat4::IDENTITY;

    let mut drawables = vec![Drawable::screen_plane(&camera, view, args.depth)];
    drawables.extend(
        args.strips
            .iter()
            .map(|s| Drawable::screen_strip(&camera, view, s.depth, s.x0, s.x1)),
    );

    let builder = DofEffectBuilder::from_config(effect_config(&args));

    let frame = FrameInput { view, viewport };
    let started = Instant::now();

    let output = match args.backend {
        Backend::Cpu => {
            let mut display = input.to_rgba32f();
            let mut effect = initialize(builder, camera, viewport, &drawables, ReferenceExecutor::new())?;
            effect.on_frame(&frame, &mut display).context("Reference render failed")?;
            DynamicImage::ImageRgba32F(display).to_rgba8()
        }
        Backend::Gpu => {
            let context = GpuContext::headless().context("Failed to open a GPU device")?;
            let mut display = context.create_display(&input.to_rgba8());
            let mut effect = initialize(builder, camera, viewport, &drawables, WgpuExecutor::new(context.clone()))?;
            effect.on_frame(&frame, &mut display).context("GPU render failed")?;
            context.read_rgba(&display).context("Failed to read back the display")?
        }
    };

    log::info!(
        "Rendered {}x{} with {:?} backend in {:.2?}",
        viewport.width,
        viewport.height,
        args.backend,
        started.elapsed()
    );

    output
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Wrote {}", args.output.display());
    Ok(())
}

fn effect_config(args: &RenderArgs) -> EffectConfig {
    EffectConfig {
        parameters: EffectParameters {
            focal_distance: args.focal_distance,
            aperture: args.aperture,
            marching_step: args.step,
        },
        resolution_scale: args.scale,
        seed: args.seed,
        max_march_distance: args.max_distance,
        ..EffectConfig::default()
    }
}

fn initialize<E: Executor>(
    builder: DofEffectBuilder,
    camera: Camera,
    viewport: Viewport,
    drawables: &[Drawable],
    executor: E,
) -> anyhow::Result<ssrtdof_render::DofEffect<E>> {
    builder
        .initialize(camera, viewport, drawables, SSRT_DOF_PROGRAM_NAME, executor)
        .context("Failed to initialize depth of field")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    #[test]
    fn effect_config_follows_arguments() {
        let cli = Cli::try_parse_from([
            "ssrtdof", "render", "in.png", "-o", "out.png", "--scale", "0.25", "--seed", "7", "--max-distance", "30",
            "--aperture", "2",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };

        let config = effect_config(&args);
        assert_eq!(config.resolution_scale, 0.25);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.max_march_distance, Some(30.0));
        assert_eq!(config.parameters.aperture, 2.0);
        assert_eq!(config.parameters.focal_distance, 5.0);
        assert_eq!(config.clip, EffectConfig::default().clip);
    }
}
