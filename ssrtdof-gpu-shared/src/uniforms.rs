use bytemuck::{Pod, Zeroable};

/// Number of disc samples accumulated per output pixel.
pub const CIRCLE_SAMPLE_COUNT: usize = 32;
/// Side length of the per-pixel rotation texture.
pub const ROTATION_TEXTURE_SIZE: u32 = 16;
/// Upper bound on march iterations per sample, independent of step size.
pub const MAX_MARCH_STEPS: u32 = 256;

/// Ray-march pass uniforms, matching `DofUniforms` in `ssrt_dof.wgsl`,
/// bind group 0, binding 0.
///
/// `circle_samples` packs two xy offsets per vec4 (WGSL uniform arrays have a
/// 16-byte element stride).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DofUniforms {
    /// Rows: bottom-left, top-left, top-right, bottom-right view rays.
    pub frustum_corners: [[f32; 4]; 4],
    /// Camera projection, already converted to the backend clip convention.
    pub projection: [[f32; 4]; 4],
    pub circle_samples: [[f32; 4]; CIRCLE_SAMPLE_COUNT / 2],
    pub focal_distance: f32,
    /// Lens radius in view-space units (user aperture × 0.1).
    pub aperture: f32,
    pub marching_step: f32,
    pub max_march_distance: f32,
    pub screen_width: f32,
    pub screen_height: f32,
    pub _pad1: f32,
    pub _pad2: f32,
}

impl DofUniforms {
    /// Disc sample `index` as an (x, y) pair.
    pub fn circle_sample(&self, index: usize) -> [f32; 2] {
        let packed = self.circle_samples[index / 2];
        let base = (index % 2) * 2;
        [packed[base], packed[base + 1]]
    }
}

/// Per-drawable uniforms for the linear depth pass, matching
/// `ObjectUniforms` in `linear_depth.wgsl`.
///
/// Stored at 256-byte dynamic offsets inside one buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DepthObjectUniforms {
    pub model_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}
