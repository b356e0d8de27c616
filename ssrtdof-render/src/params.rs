//! Runtime-tunable effect parameters and their per-frame upload.

use ssrtdof_gpu_shared::uniforms::DofUniforms;

use crate::camera::Viewport;

/// The user-facing aperture is scaled by this before it reaches the shader.
pub const APERTURE_SCALE: f32 = 0.1;
pub const MIN_FOCAL_DISTANCE: f32 = 1e-3;
pub const MIN_MARCHING_STEP: f32 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectParameters {
    /// Distance to the plane in focus, in view-space units.
    pub focal_distance: f32,
    /// Unitless lens size; uploaded as `aperture * APERTURE_SCALE`.
    pub aperture: f32,
    /// March increment in view-space units.
    pub marching_step: f32,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            focal_distance: 5.0,
            aperture: 0.01,
            marching_step: 0.2,
        }
    }
}

impl EffectParameters {
    /// Clamp into the range the ray march can handle.
    ///
    /// Valid values are returned bit-identical. Non-finite values fall back to
    /// the defaults. The flag reports whether anything changed.
    pub fn sanitized(&self) -> (Self, bool) {
        let defaults = Self::default();
        let clamp = |value: f32, min: f32, fallback: f32| {
            if !value.is_finite() {
                fallback
            } else if value < min {
                min
            } else {
                value
            }
        };

        let sanitized = Self {
            focal_distance: clamp(self.focal_distance, MIN_FOCAL_DISTANCE, defaults.focal_distance),
            aperture: clamp(self.aperture, 0.0, defaults.aperture),
            marching_step: clamp(self.marching_step, MIN_MARCHING_STEP, defaults.marching_step),
        };
        let changed = sanitized.focal_distance.to_bits() != self.focal_distance.to_bits()
            || sanitized.aperture.to_bits() != self.aperture.to_bits()
            || sanitized.marching_step.to_bits() != self.marching_step.to_bits();
        (sanitized, changed)
    }
}

/// Write the per-frame scalars into an already populated uniform block.
///
/// Static data (samples, frustum corners, projection) is left untouched.
/// Returns `true` when the parameters had to be clamped.
pub fn sync_frame_parameters(uniforms: &mut DofUniforms, parameters: &EffectParameters, viewport: Viewport) -> bool {
    let (p, clamped) = parameters.sanitized();
    uniforms.focal_distance = p.focal_distance;
    uniforms.aperture = p.aperture * APERTURE_SCALE;
    uniforms.marching_step = p.marching_step;
    uniforms.screen_width = viewport.width as f32;
    uniforms.screen_height = viewport.height as f32;
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    #[test]
    fn sync_writes_scaled_values() {
        let mut uniforms = DofUniforms::zeroed();
        let parameters = EffectParameters {
            focal_distance: 5.0,
            aperture: 0.01,
            marching_step: 0.2,
        };
        let clamped = sync_frame_parameters(&mut uniforms, &parameters, Viewport::new(1920, 1080));

        assert!(!clamped);
        assert_eq!(uniforms.focal_distance, 5.0);
        assert_eq!(uniforms.aperture, 0.001);
        assert_eq!(uniforms.marching_step, 0.2);
        assert_eq!(uniforms.screen_width, 1920.0);
        assert_eq!(uniforms.screen_height, 1080.0);
    }

    #[test]
    fn sync_leaves_static_data_alone() {
        let mut uniforms = DofUniforms::zeroed();
        uniforms.frustum_corners[0] = [1.0, 2.0, 3.0, 0.0];
        uniforms.circle_samples[4] = [0.5; 4];
        uniforms.max_march_distance = 42.0;
        let before = uniforms;

        sync_frame_parameters(&mut uniforms, &EffectParameters::default(), Viewport::new(64, 64));
        sync_frame_parameters(&mut uniforms, &EffectParameters::default(), Viewport::new(64, 64));

        assert_eq!(uniforms.frustum_corners, before.frustum_corners);
        assert_eq!(uniforms.circle_samples, before.circle_samples);
        assert_eq!(uniforms.max_march_distance, 42.0);
    }

    #[test]
    fn degenerate_values_are_clamped() {
        let parameters = EffectParameters {
            focal_distance: -3.0,
            aperture: -1.0,
            marching_step: 0.0,
        };
        let (p, changed) = parameters.sanitized();
        assert!(changed);
        assert_eq!(p.focal_distance, MIN_FOCAL_DISTANCE);
        assert_eq!(p.aperture, 0.0);
        assert_eq!(p.marching_step, MIN_MARCHING_STEP);
    }

    #[test]
    fn non_finite_values_fall_back_to_defaults() {
        let parameters = EffectParameters {
            focal_distance: f32::NAN,
            aperture: f32::INFINITY,
            marching_step: f32::NEG_INFINITY,
        };
        let (p, changed) = parameters.sanitized();
        assert!(changed);
        assert_eq!(p, EffectParameters::default());
    }
}
