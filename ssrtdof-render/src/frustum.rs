//! View-ray reconstruction from the camera frustum.

use glam::{Mat4, Vec2, Vec3};

/// Screen corner, in the row order the ray-march shader interpolates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Corner {
    BottomLeft = 0,
    TopLeft = 1,
    TopRight = 2,
    BottomRight = 3,
}

/// Unnormalized view-space rays through the four screen corners, each with
/// `z == -1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrustumCorners {
    corners: [Vec3; 4],
}

impl FrustumCorners {
    pub fn compute(fov_y_degrees: f32, aspect: f32) -> Self {
        let tan_half_fov = (fov_y_degrees * 0.5).to_radians().tan();

        let to_right = Vec3::X * tan_half_fov * aspect;
        let to_top = Vec3::Y * tan_half_fov;
        let view_dir = Vec3::NEG_Z;

        Self {
            corners: [
                view_dir - to_right - to_top,
                view_dir - to_right + to_top,
                view_dir + to_right + to_top,
                view_dir + to_right - to_top,
            ],
        }
    }

    pub fn from_rows(rows: &[[f32; 4]; 4]) -> Self {
        Self {
            corners: rows.map(|row| Vec3::new(row[0], row[1], row[2])),
        }
    }

    pub fn corner(&self, corner: Corner) -> Vec3 {
        self.corners[corner as usize]
    }

    pub fn corners(&self) -> &[Vec3; 4] {
        &self.corners
    }

    /// One corner per row, w = 0.
    pub fn to_rows(&self) -> [[f32; 4]; 4] {
        self.corners.map(|c| c.extend(0.0).to_array())
    }

    /// Rows packed into a matrix (row `i` is corner `i`).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.to_rows()).transpose()
    }

    /// View ray at texture-space `uv` (v = 0 is the top row).
    pub fn ray_at(&self, uv: Vec2) -> Vec3 {
        let [bottom_left, top_left, top_right, bottom_right] = self.corners;
        let bottom = bottom_left.lerp(bottom_right, uv.x);
        let top = top_left.lerp(top_right, uv.x);
        bottom.lerp(top, 1.0 - uv.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOVS: [f32; 6] = [1.0, 30.0, 60.0, 90.0, 120.0, 179.0];
    const ASPECTS: [f32; 5] = [0.25, 0.75, 1.0, 16.0 / 9.0, 4.0];

    #[test]
    fn corners_are_symmetric_and_on_unit_forward_plane() {
        for fov in FOVS {
            for aspect in ASPECTS {
                let f = FrustumCorners::compute(fov, aspect);
                let bl = f.corner(Corner::BottomLeft);
                let tl = f.corner(Corner::TopLeft);
                let tr = f.corner(Corner::TopRight);
                let br = f.corner(Corner::BottomRight);

                assert_eq!(tl.y, -bl.y);
                assert_eq!(tr.y, -br.y);
                assert_eq!(tl.y, tr.y);
                assert_eq!(tr.x, -tl.x);
                assert_eq!(br.x, -bl.x);
                assert_eq!(bl.x, tl.x);
                for c in f.corners() {
                    assert_eq!(c.z, -1.0);
                }
                assert!(bl.x < 0.0 && bl.y < 0.0);
                assert!(tr.x > 0.0 && tr.y > 0.0);
            }
        }
    }

    #[test]
    fn magnitudes_follow_fov_and_aspect() {
        let f = FrustumCorners::compute(90.0, 2.0);
        let tr = f.corner(Corner::TopRight);
        assert!((tr.y - 1.0).abs() < 1e-6);
        assert!((tr.x - 2.0).abs() < 1e-6);
    }

    #[test]
    fn matrix_rows_keep_corner_order() {
        let f = FrustumCorners::compute(60.0, 1.5);
        let m = f.to_matrix();
        assert_eq!(m.row(0).truncate(), f.corner(Corner::BottomLeft));
        assert_eq!(m.row(1).truncate(), f.corner(Corner::TopLeft));
        assert_eq!(m.row(2).truncate(), f.corner(Corner::TopRight));
        assert_eq!(m.row(3).truncate(), f.corner(Corner::BottomRight));
        assert_eq!(FrustumCorners::from_rows(&f.to_rows()), f);
    }

    #[test]
    fn ray_at_interpolates_from_screen_uv() {
        let f = FrustumCorners::compute(60.0, 1.5);
        assert_eq!(f.ray_at(Vec2::new(0.0, 1.0)), f.corner(Corner::BottomLeft));
        assert_eq!(f.ray_at(Vec2::new(0.0, 0.0)), f.corner(Corner::TopLeft));
        assert_eq!(f.ray_at(Vec2::new(1.0, 0.0)), f.corner(Corner::TopRight));
        assert_eq!(f.ray_at(Vec2::new(1.0, 1.0)), f.corner(Corner::BottomRight));
        assert!(f.ray_at(Vec2::splat(0.5)).abs_diff_eq(Vec3::NEG_Z, 1e-6));
    }
}
