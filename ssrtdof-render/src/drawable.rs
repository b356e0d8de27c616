//! Geometry handed over by the host for the linear depth prepass.

use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::camera::Camera;

/// Indexed triangle list.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self { positions, indices }
    }

    /// Axis-aligned rectangle in the XY plane, centered on the origin.
    pub fn quad(half_width: f32, half_height: f32) -> Self {
        Self {
            positions: vec![
                Vec3::new(-half_width, -half_height, 0.0),
                Vec3::new(half_width, -half_height, 0.0),
                Vec3::new(half_width, half_height, 0.0),
                Vec3::new(-half_width, half_height, 0.0),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// Triangles with in-range indices; a trailing partial triangle or an
    /// out-of-range index drops that triangle.
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).filter_map(|tri| {
            let a = *self.positions.get(tri[0] as usize)?;
            let b = *self.positions.get(tri[1] as usize)?;
            let c = *self.positions.get(tri[2] as usize)?;
            Some([a, b, c])
        })
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// A mesh placed in the world.
#[derive(Clone, Debug)]
pub struct Drawable {
    pub mesh: Arc<Mesh>,
    pub transform: Mat4,
}

impl Drawable {
    pub fn new(mesh: Arc<Mesh>, transform: Mat4) -> Self {
        Self { mesh, transform }
    }

    /// A plane facing the camera at view-space distance `depth`, sized to
    /// cover the whole frustum. `view` is the camera's world-to-view matrix.
    pub fn screen_plane(camera: &Camera, view: Mat4, depth: f32) -> Self {
        let half_height = depth * (camera.fov_y_degrees * 0.5).to_radians().tan() * 1.5;
        let half_width = half_height * camera.aspect;
        let in_view = Mat4::from_translation(Vec3::new(0.0, 0.0, -depth));
        Self {
            mesh: Arc::new(Mesh::quad(half_width, half_height)),
            transform: view.inverse() * in_view,
        }
    }

    /// Vertical strip covering the horizontal frustum slice `[x0, x1]`
    /// (fractions of screen width) at view-space `depth`.
    pub fn screen_strip(camera: &Camera, view: Mat4, depth: f32, x0: f32, x1: f32) -> Self {
        let half_height = depth * (camera.fov_y_degrees * 0.5).to_radians().tan();
        let half_width = half_height * camera.aspect;
        let left = (x0 * 2.0 - 1.0) * half_width;
        let right = (x1 * 2.0 - 1.0) * half_width;
        let top = half_height * 1.5;
        let mesh = Mesh::new(
            vec![
                Vec3::new(left, -top, -depth),
                Vec3::new(right, -top, -depth),
                Vec3::new(right, top, -depth),
                Vec3::new(left, top, -depth),
            ],
            vec![0, 1, 2, 0, 2, 3],
        );
        Self {
            mesh: Arc::new(mesh),
            transform: view.inverse(),
        }
    }
}
