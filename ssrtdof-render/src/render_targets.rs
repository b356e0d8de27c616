//! Offscreen targets and static textures for the depth-of-field passes.

use crate::samples::RotationTexture;

/// Linear depth: one f32 channel holding view-space z.
pub const LINEAR_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
/// Hardware depth for the prepass depth test.
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
/// Reduced-resolution ray-march output.
pub const RAY_MARCH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
/// Per-pixel rotation angles.
pub const ROTATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
/// Format of displays created by [`create_display_texture`].
pub const DISPLAY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Usage a host display texture needs: sampled by the ray march, written by the final blit.
pub const DISPLAY_USAGE: wgpu::TextureUsages =
    wgpu::TextureUsages::TEXTURE_BINDING.union(wgpu::TextureUsages::RENDER_ATTACHMENT);

/// Color texture with an optional depth attachment.
pub struct RenderTarget {
    pub color_texture: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth_texture: Option<wgpu::Texture>,
    pub depth_view: Option<wgpu::TextureView>,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn format(&self) -> wgpu::TextureFormat {
        self.color_texture.format()
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

pub fn create_render_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    label: &str,
    format: wgpu::TextureFormat,
    with_depth: bool,
) -> RenderTarget {
    let size = extent(width, height);

    let color_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

    let (depth_texture, depth_view) = if with_depth {
        let dt = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{label} Depth")),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let dv = dt.create_view(&wgpu::TextureViewDescriptor::default());
        (Some(dt), Some(dv))
    } else {
        (None, None)
    };

    RenderTarget {
        color_texture,
        color_view,
        depth_texture,
        depth_view,
        width,
        height,
    }
}

/// Full-resolution linear depth with its depth+stencil attachment.
pub fn create_linear_depth_target(device: &wgpu::Device, width: u32, height: u32) -> RenderTarget {
    create_render_target(device, width, height, "Linear Depth", LINEAR_DEPTH_FORMAT, true)
}

pub fn create_ray_march_target(device: &wgpu::Device, width: u32, height: u32) -> RenderTarget {
    create_render_target(device, width, height, "Ray March", RAY_MARCH_FORMAT, false)
}

/// Upload the rotation angles once. The shader fetches texels with wrapped
/// integer coordinates, so no sampler is attached.
pub fn upload_rotation_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    rotations: &RotationTexture,
) -> (wgpu::Texture, wgpu::TextureView) {
    let side = RotationTexture::SIZE;
    let size = extent(side, side);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Rotation Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: ROTATION_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rotations.as_bytes(),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * side),
            rows_per_image: Some(side),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Bilinear, clamp-to-edge sampler for color reads.
pub fn create_color_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Color Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// Create a display texture initialized from `image`.
pub fn create_display_texture(device: &wgpu::Device, queue: &wgpu::Queue, image: &image::RgbaImage) -> wgpu::Texture {
    let (width, height) = image.dimensions();
    let size = extent(width, height);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Display"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DISPLAY_FORMAT,
        usage: DISPLAY_USAGE | wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        image.as_raw(),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    texture
}
