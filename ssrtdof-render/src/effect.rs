//! Effect lifecycle: one-time initialization, then a per-frame step.

use bytemuck::Zeroable;
use glam::Mat4;
use ssrtdof_gpu_shared::uniforms::DofUniforms;

use crate::camera::{Camera, ClipConvention, Viewport};
use crate::drawable::Drawable;
use crate::executor::{Executor, ExecutorSetup, FrameBindings, TargetSizes};
use crate::frustum::FrustumCorners;
use crate::graph::RenderGraph;
use crate::params::{sync_frame_parameters, EffectParameters};
use crate::samples::{RotationTexture, SampleDiscSet, SampleSetGenerator};
use crate::{Error, Result};

/// Tunables fixed at initialization, plus the starting parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectConfig {
    pub parameters: EffectParameters,
    /// Ray-march target size relative to the display.
    pub resolution_scale: f32,
    /// Seed for the sample set; `None` draws from entropy.
    pub seed: Option<u64>,
    /// March length cap; `None` uses the camera far plane.
    pub max_march_distance: Option<f32>,
    pub clip: ClipConvention,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            parameters: EffectParameters::default(),
            resolution_scale: 0.5,
            seed: None,
            max_march_distance: None,
            clip: ClipConvention::default(),
        }
    }
}

/// An effect that has not been initialized yet.
#[derive(Clone, Debug, Default)]
pub struct DofEffectBuilder {
    config: EffectConfig,
}

impl DofEffectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: EffectConfig) -> Self {
        Self { config }
    }

    pub fn with_parameters(mut self, parameters: EffectParameters) -> Self {
        self.config.parameters = parameters;
        self
    }

    pub fn with_resolution_scale(mut self, scale: f32) -> Self {
        self.config.resolution_scale = scale;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn with_max_march_distance(mut self, distance: f32) -> Self {
        self.config.max_march_distance = Some(distance);
        self
    }

    pub fn with_clip_convention(mut self, clip: ClipConvention) -> Self {
        self.config.clip = clip;
        self
    }

    /// Generate the static sampling data, build the render graph and let the
    /// executor allocate its targets. Fails if `program` cannot be resolved,
    /// the viewport is empty or the resolution scale is outside (0, 1].
    pub fn initialize<E: Executor>(
        self,
        camera: Camera,
        viewport: Viewport,
        drawables: &[Drawable],
        program: &str,
        mut executor: E,
    ) -> Result<DofEffect<E>> {
        let config = self.config;
        let sizes = target_sizes(viewport, config.resolution_scale)?;

        let mut generator = match config.seed {
            Some(seed) => SampleSetGenerator::seeded(seed),
            None => SampleSetGenerator::from_entropy(),
        };
        let (samples, rotations) = generator.generate();
        let frustum = FrustumCorners::compute(camera.fov_y_degrees, camera.aspect);

        executor.prepare(&ExecutorSetup {
            program,
            drawables,
            rotations: &rotations,
            sizes,
        })?;

        let mut uniforms = DofUniforms::zeroed();
        uniforms.frustum_corners = frustum.to_rows();
        uniforms.projection = camera.gpu_projection(config.clip).to_cols_array_2d();
        uniforms.circle_samples = samples.to_uniform();
        uniforms.max_march_distance = config.max_march_distance.unwrap_or(camera.far);

        log::info!(
            "Depth of field initialized: {} drawables, depth target {}x{}, ray-march target {}x{}",
            drawables.len(),
            sizes.linear_depth.width,
            sizes.linear_depth.height,
            sizes.ray_march.width,
            sizes.ray_march.height,
        );

        let mut effect = DofEffect {
            executor,
            graph: RenderGraph::depth_of_field(),
            samples,
            rotations,
            frustum,
            uniforms,
            parameters: config.parameters,
            camera,
            clip: config.clip,
            resolution_scale: config.resolution_scale,
            sizes,
            warned_parameters: None,
            warned_viewport: None,
            frame_count: 0,
        };
        effect.sync_parameters(viewport);
        Ok(effect)
    }
}

fn target_sizes(viewport: Viewport, resolution_scale: f32) -> Result<TargetSizes> {
    if viewport.width == 0 || viewport.height == 0 {
        return Err(Error::InvalidViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }
    if !(resolution_scale > 0.0 && resolution_scale <= 1.0) {
        return Err(Error::InvalidScale(resolution_scale));
    }
    Ok(TargetSizes::for_viewport(viewport, resolution_scale))
}

/// Per-frame input from the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInput {
    pub view: Mat4,
    pub viewport: Viewport,
}

/// An initialized depth-of-field effect bound to an executor.
pub struct DofEffect<E: Executor> {
    executor: E,
    graph: RenderGraph,
    samples: SampleDiscSet,
    rotations: RotationTexture,
    frustum: FrustumCorners,
    uniforms: DofUniforms,
    parameters: EffectParameters,
    camera: Camera,
    clip: ClipConvention,
    resolution_scale: f32,
    sizes: TargetSizes,
    warned_parameters: Option<[u32; 3]>,
    warned_viewport: Option<Viewport>,
    frame_count: u64,
}

impl<E: Executor> DofEffect<E> {
    pub fn parameters(&self) -> &EffectParameters {
        &self.parameters
    }

    /// Changes take effect at the next [`Self::on_frame`].
    pub fn parameters_mut(&mut self) -> &mut EffectParameters {
        &mut self.parameters
    }

    pub fn set_parameters(&mut self, parameters: EffectParameters) {
        self.parameters = parameters;
    }

    /// The uniform block as last synchronized.
    pub fn uniforms(&self) -> &DofUniforms {
        &self.uniforms
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn samples(&self) -> &SampleDiscSet {
        &self.samples
    }

    pub fn rotations(&self) -> &RotationTexture {
        &self.rotations
    }

    pub fn frustum(&self) -> &FrustumCorners {
        &self.frustum
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn target_sizes(&self) -> TargetSizes {
        self.sizes
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Push the mutable parameters and viewport into the uniform block.
    pub fn sync_parameters(&mut self, viewport: Viewport) {
        let clamped = sync_frame_parameters(&mut self.uniforms, &self.parameters, viewport);
        // Compared bitwise so a NaN parameter warns once, not every frame.
        let bits = [
            self.parameters.focal_distance.to_bits(),
            self.parameters.aperture.to_bits(),
            self.parameters.marching_step.to_bits(),
        ];
        if clamped && self.warned_parameters != Some(bits) {
            log::warn!("Depth of field parameters out of range, clamped: {:?}", self.parameters);
            self.warned_parameters = Some(bits);
        }
    }

    /// Synchronize parameters, then replay the render graph against `display`.
    pub fn on_frame(&mut self, frame: &FrameInput, display: &mut E::Display) -> Result<()> {
        if frame.viewport != self.sizes.linear_depth && self.warned_viewport != Some(frame.viewport) {
            log::warn!(
                "Viewport {}x{} differs from allocated {}x{}; call resize to reallocate targets",
                frame.viewport.width,
                frame.viewport.height,
                self.sizes.linear_depth.width,
                self.sizes.linear_depth.height,
            );
            self.warned_viewport = Some(frame.viewport);
        }

        self.sync_parameters(frame.viewport);

        let projection = Mat4::from_cols_array_2d(&self.uniforms.projection);
        let bindings = FrameBindings {
            uniforms: &self.uniforms,
            view: frame.view,
            projection,
        };
        self.executor.execute(&self.graph, &bindings, display)?;

        self.frame_count += 1;
        log::debug!("Depth of field frame {} executed", self.frame_count);
        Ok(())
    }

    /// Reallocate both targets for a new display size.
    pub fn resize(&mut self, viewport: Viewport) -> Result<()> {
        let sizes = target_sizes(viewport, self.resolution_scale)?;
        if sizes == self.sizes {
            return Ok(());
        }
        self.executor.resize(sizes)?;
        self.sizes = sizes;
        self.warned_viewport = None;
        log::info!("Depth of field targets resized to {}x{}", viewport.width, viewport.height);
        Ok(())
    }

    /// Recompute the frustum corners and projection from a changed camera.
    ///
    /// Nothing calls this implicitly: corners stay as computed at
    /// initialization until the host asks.
    pub fn refresh_camera(&mut self, camera: Camera) {
        self.frustum = FrustumCorners::compute(camera.fov_y_degrees, camera.aspect);
        self.uniforms.frustum_corners = self.frustum.to_rows();
        self.uniforms.projection = camera.gpu_projection(self.clip).to_cols_array_2d();
        self.camera = camera;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssrtdof_gpu_shared::shaders::SSRT_DOF_PROGRAM_NAME;

    /// Records what the effect hands over instead of rendering.
    #[derive(Default)]
    struct RecordingExecutor {
        prepared_sizes: Option<TargetSizes>,
        resized: Vec<TargetSizes>,
        frames: Vec<(DofUniforms, Mat4)>,
    }

    impl Executor for RecordingExecutor {
        type Display = ();

        fn prepare(&mut self, setup: &ExecutorSetup<'_>) -> Result<()> {
            crate::executor::resolve_program(setup.program)?;
            self.prepared_sizes = Some(setup.sizes);
            Ok(())
        }

        fn resize(&mut self, sizes: TargetSizes) -> Result<()> {
            self.resized.push(sizes);
            Ok(())
        }

        fn execute(&mut self, graph: &RenderGraph, bindings: &FrameBindings<'_>, _: &mut ()) -> Result<()> {
            assert_eq!(graph.len(), 5);
            self.frames.push((*bindings.uniforms, bindings.view));
            Ok(())
        }
    }

    fn effect(viewport: Viewport) -> DofEffect<RecordingExecutor> {
        DofEffectBuilder::new()
            .with_seed(3)
            .initialize(
                Camera::for_viewport(60.0, viewport),
                viewport,
                &[],
                SSRT_DOF_PROGRAM_NAME,
                RecordingExecutor::default(),
            )
            .unwrap()
    }

    #[test]
    fn default_config() {
        let config = EffectConfig::default();
        assert_eq!(config.parameters, EffectParameters::default());
        assert_eq!(config.resolution_scale, 0.5);
        assert_eq!(config.seed, None);
        assert_eq!(config.max_march_distance, None);
        assert_eq!(config.clip, ClipConvention::ZeroToOne);
    }

    #[test]
    fn unknown_program_fails_initialization() {
        let viewport = Viewport::new(8, 8);
        let result = DofEffectBuilder::new().initialize(
            Camera::for_viewport(60.0, viewport),
            viewport,
            &[],
            "PostProcess/Nope",
            RecordingExecutor::default(),
        );
        assert!(matches!(result, Err(Error::ProgramNotFound(_))));
    }

    fn initialize_with(builder: DofEffectBuilder, viewport: Viewport) -> Result<DofEffect<RecordingExecutor>> {
        builder.initialize(
            Camera::for_viewport(60.0, Viewport::new(4, 4)),
            viewport,
            &[],
            SSRT_DOF_PROGRAM_NAME,
            RecordingExecutor::default(),
        )
    }

    #[test]
    fn empty_viewport_fails_initialization() {
        for viewport in [Viewport::new(0, 4), Viewport::new(4, 0)] {
            let result = initialize_with(DofEffectBuilder::new(), viewport);
            assert!(
                matches!(result, Err(Error::InvalidViewport { width, height }) if width == viewport.width && height == viewport.height)
            );
        }
    }

    #[test]
    fn bad_resolution_scale_fails_initialization() {
        for scale in [0.0, -0.5, 1.5, f32::INFINITY, f32::NAN] {
            let builder = DofEffectBuilder::new().with_resolution_scale(scale);
            let result = initialize_with(builder, Viewport::new(8, 8));
            assert!(matches!(result, Err(Error::InvalidScale(_))), "scale {scale} accepted");
        }
        assert!(initialize_with(DofEffectBuilder::new().with_resolution_scale(1.0), Viewport::new(8, 8)).is_ok());
    }

    #[test]
    fn from_config_carries_every_setting() {
        let config = EffectConfig {
            resolution_scale: 0.25,
            seed: Some(9),
            max_march_distance: Some(12.0),
            ..EffectConfig::default()
        };
        let effect = initialize_with(DofEffectBuilder::from_config(config), Viewport::new(16, 8)).unwrap();
        assert_eq!(effect.uniforms().max_march_distance, 12.0);
        assert_eq!(effect.target_sizes().ray_march, Viewport::new(4, 2));
    }

    #[test]
    fn resize_to_empty_viewport_keeps_targets() {
        let mut effect = effect(Viewport::new(64, 64));
        let result = effect.resize(Viewport::new(0, 0));
        assert!(matches!(result, Err(Error::InvalidViewport { .. })));
        assert!(effect.executor().resized.is_empty());
        assert_eq!(effect.target_sizes().linear_depth, Viewport::new(64, 64));
    }

    #[test]
    fn initialization_fills_static_uniforms() {
        let viewport = Viewport::new(640, 360);
        let effect = effect(viewport);
        let uniforms = effect.uniforms();

        assert_eq!(uniforms.frustum_corners, effect.frustum().to_rows());
        assert_eq!(uniforms.circle_samples, effect.samples().to_uniform());
        assert_eq!(uniforms.max_march_distance, effect.camera().far);
        assert_eq!(
            effect.executor().prepared_sizes,
            Some(TargetSizes {
                linear_depth: viewport,
                ray_march: Viewport::new(320, 180),
            })
        );
    }

    #[test]
    fn frame_pushes_parameters_before_execution() {
        let viewport = Viewport::new(1920, 1080);
        let mut effect = effect(viewport);
        let view = Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -2.0));
        effect.on_frame(&FrameInput { view, viewport }, &mut ()).unwrap();

        let (uniforms, seen_view) = effect.executor().frames[0];
        assert_eq!(seen_view, view);
        assert_eq!(uniforms.focal_distance, 5.0);
        assert_eq!(uniforms.aperture, 0.001);
        assert_eq!(uniforms.marching_step, 0.2);
        assert_eq!(uniforms.screen_width, 1920.0);
        assert_eq!(uniforms.screen_height, 1080.0);
        assert_eq!(effect.frame_count(), 1);
    }

    #[test]
    fn parameter_changes_apply_on_next_frame() {
        let viewport = Viewport::new(64, 64);
        let mut effect = effect(viewport);
        let frame = FrameInput {
            view: Mat4::IDENTITY,
            viewport,
        };
        effect.on_frame(&frame, &mut ()).unwrap();
        effect.parameters_mut().focal_distance = 12.0;
        effect.on_frame(&frame, &mut ()).unwrap();

        let frames = &effect.executor().frames;
        assert_eq!(frames[0].0.focal_distance, 5.0);
        assert_eq!(frames[1].0.focal_distance, 12.0);
    }

    #[test]
    fn out_of_range_parameters_are_clamped_not_rejected() {
        let viewport = Viewport::new(64, 64);
        let mut effect = effect(viewport);
        effect.set_parameters(EffectParameters {
            focal_distance: 0.0,
            aperture: -2.0,
            marching_step: f32::NAN,
        });
        effect
            .on_frame(&FrameInput { view: Mat4::IDENTITY, viewport }, &mut ())
            .unwrap();

        let uniforms = effect.executor().frames[0].0;
        assert!(uniforms.focal_distance > 0.0);
        assert_eq!(uniforms.aperture, 0.0);
        assert!(uniforms.marching_step.is_finite() && uniforms.marching_step > 0.0);
    }

    #[test]
    fn resize_reallocates_only_on_change() {
        let mut effect = effect(Viewport::new(64, 64));
        effect.resize(Viewport::new(64, 64)).unwrap();
        assert!(effect.executor().resized.is_empty());

        effect.resize(Viewport::new(128, 32)).unwrap();
        assert_eq!(
            effect.executor().resized,
            vec![TargetSizes {
                linear_depth: Viewport::new(128, 32),
                ray_march: Viewport::new(64, 16),
            }]
        );
        assert_eq!(effect.target_sizes().linear_depth, Viewport::new(128, 32));
    }

    #[test]
    fn stale_viewport_still_renders() {
        let mut effect = effect(Viewport::new(64, 64));
        let frame = FrameInput {
            view: Mat4::IDENTITY,
            viewport: Viewport::new(100, 50),
        };
        effect.on_frame(&frame, &mut ()).unwrap();
        effect.on_frame(&frame, &mut ()).unwrap();
        assert_eq!(effect.frame_count(), 2);
        assert_eq!(effect.target_sizes().linear_depth, Viewport::new(64, 64));
    }

    #[test]
    fn frustum_only_changes_on_refresh() {
        let viewport = Viewport::new(64, 64);
        let mut effect = effect(viewport);
        let before = *effect.frustum();

        effect.parameters_mut().focal_distance = 2.0;
        effect
            .on_frame(&FrameInput { view: Mat4::IDENTITY, viewport }, &mut ())
            .unwrap();
        assert_eq!(*effect.frustum(), before);

        effect.refresh_camera(Camera::new(90.0, 2.0));
        assert_ne!(*effect.frustum(), before);
        assert_eq!(effect.uniforms().frustum_corners, FrustumCorners::compute(90.0, 2.0).to_rows());
    }
}
