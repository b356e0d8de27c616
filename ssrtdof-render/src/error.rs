use thiserror::Error;

/// Errors raised while building or running the depth-of-field effect.
#[derive(Debug, Error)]
pub enum Error {
    #[error("shading program `{0}` is not registered")]
    ProgramNotFound(String),

    #[error("shading program `{name}` has {found} passes, expected at least {expected}")]
    MissingPass {
        name: String,
        found: usize,
        expected: usize,
    },

    #[error("shader compilation failed for {label}: {message}")]
    ShaderCompilation { label: String, message: String },

    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("failed to map GPU buffer: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("viewport {width}x{height} has no area")]
    InvalidViewport { width: u32, height: u32 },

    #[error("resolution scale {0} is outside (0, 1]")]
    InvalidScale(f32),

    #[error("invalid render graph: {0}")]
    Graph(String),

    #[error("executor used before `prepare`")]
    NotPrepared,

    #[error("display target is {found:?}, expected a {expected} texture")]
    DisplayMismatch { found: String, expected: &'static str },

    #[error("unsupported texture format for readback: {0:?}")]
    UnsupportedFormat(wgpu::TextureFormat),
}

pub type Result<T> = std::result::Result<T, Error>;
