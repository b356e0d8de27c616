//! Screen-space ray-traced depth of field.
//!
//! [`DofEffectBuilder::initialize`] generates the sample set and frustum rays
//! once and hands the executor its targets; every frame
//! [`DofEffect::on_frame`] pushes the parameters and replays the
//! [`RenderGraph`]: linear depth prepass, ray march at reduced resolution,
//! copy back to the display.
//!
//! Two executors are provided: [`WgpuExecutor`] and the CPU
//! [`ReferenceExecutor`], which runs the same recipe on images.

pub mod backend;
pub mod camera;
pub mod drawable;
pub mod effect;
pub mod error;
pub mod executor;
pub mod frustum;
pub mod graph;
pub mod params;
pub mod passes;
pub mod pipeline;
pub mod readback;
pub mod reference;
pub mod render_targets;
pub mod samples;

pub use backend::{GpuContext, WgpuExecutor};
pub use camera::{Camera, ClipConvention, Viewport};
pub use drawable::{Drawable, Mesh};
pub use effect::{DofEffect, DofEffectBuilder, EffectConfig, FrameInput};
pub use error::{Error, Result};
pub use executor::{Executor, ExecutorSetup, FrameBindings, TargetSizes};
pub use frustum::FrustumCorners;
pub use graph::{RenderGraph, RenderNode, ShaderPass, TargetId};
pub use params::EffectParameters;
pub use reference::{DepthImage, ReferenceExecutor};
pub use samples::{RotationTexture, SampleDiscSet, SampleSetGenerator};
pub use ssrtdof_gpu_shared::shaders::SSRT_DOF_PROGRAM_NAME;
