//! Camera description and projection conversion.

use glam::{Mat4, Vec4};

/// Output size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Scale both axes, rounding down and never collapsing below one pixel.
    pub fn scaled(&self, scale: f32) -> Self {
        Self {
            width: ((self.width as f32 * scale) as u32).max(1),
            height: ((self.height as f32 * scale) as u32).max(1),
        }
    }
}

/// Clip-space depth range expected by a graphics backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipConvention {
    /// OpenGL: NDC depth in [-1, 1].
    NegOneToOne,
    /// wgpu, Vulkan, Metal, D3D: NDC depth in [0, 1].
    #[default]
    ZeroToOne,
}

/// Perspective camera. View space is right-handed, looking down -Z.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            fov_y_degrees,
            aspect,
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn for_viewport(fov_y_degrees: f32, viewport: Viewport) -> Self {
        Self::new(fov_y_degrees, viewport.aspect())
    }

    pub fn with_clip_planes(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// OpenGL-style projection (NDC depth in [-1, 1]).
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    /// Projection in the convention the target backend rasterizes with.
    pub fn gpu_projection(&self, clip: ClipConvention) -> Mat4 {
        gpu_projection(self.projection(), clip)
    }
}

/// Remap an OpenGL-style projection to `clip`.
///
/// Using an unconverted matrix on a [0, 1] backend shifts every projected
/// depth, so both the depth prepass and the ray march must receive the output
/// of this function.
pub fn gpu_projection(projection: Mat4, clip: ClipConvention) -> Mat4 {
    match clip {
        ClipConvention::NegOneToOne => projection,
        ClipConvention::ZeroToOne => {
            // z' = 0.5 * z + 0.5 * w
            let remap = Mat4::from_cols(
                Vec4::X,
                Vec4::Y,
                Vec4::new(0.0, 0.0, 0.5, 0.0),
                Vec4::new(0.0, 0.0, 0.5, 1.0),
            );
            remap * projection
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_to_one_matches_native_perspective() {
        let camera = Camera::new(60.0, 16.0 / 9.0).with_clip_planes(0.3, 50.0);
        let converted = camera.gpu_projection(ClipConvention::ZeroToOne);
        let native = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.3, 50.0);
        assert!(converted.abs_diff_eq(native, 1e-5));
    }

    #[test]
    fn gl_convention_is_passthrough() {
        let camera = Camera::new(45.0, 1.0);
        assert_eq!(camera.gpu_projection(ClipConvention::NegOneToOne), camera.projection());
    }

    #[test]
    fn near_and_far_map_to_depth_range() {
        let camera = Camera::new(60.0, 1.0).with_clip_planes(1.0, 10.0);
        let proj = camera.gpu_projection(ClipConvention::ZeroToOne);
        let near = proj * Vec4::new(0.0, 0.0, -1.0, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -10.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-6);
        assert!((far.z / far.w - 1.0).abs() < 1e-6);
    }

    #[test]
    fn scaled_viewport_rounds_down_and_clamps() {
        assert_eq!(Viewport::new(1921, 1081).scaled(0.5), Viewport::new(960, 540));
        assert_eq!(Viewport::new(1, 1).scaled(0.5), Viewport::new(1, 1));
    }
}
