//! Types and shader sources shared between the wgpu executor and the CPU
//! reference executor.

pub mod shaders;
pub mod uniforms;
