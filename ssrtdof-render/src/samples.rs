//! Stochastic sampling data: lens disc offsets and per-pixel rotations.

use std::f32::consts::TAU;

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ssrtdof_gpu_shared::uniforms::{CIRCLE_SAMPLE_COUNT, ROTATION_TEXTURE_SIZE};

/// Offsets drawn uniformly (in area) from the unit disc.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleDiscSet {
    samples: [Vec2; CIRCLE_SAMPLE_COUNT],
}

impl SampleDiscSet {
    pub fn samples(&self) -> &[Vec2; CIRCLE_SAMPLE_COUNT] {
        &self.samples
    }

    /// Interleaved `x0, y0, x1, y1, ...`.
    pub fn flattened(&self) -> [f32; CIRCLE_SAMPLE_COUNT * 2] {
        let mut out = [0.0; CIRCLE_SAMPLE_COUNT * 2];
        for (i, s) in self.samples.iter().enumerate() {
            out[i * 2] = s.x;
            out[i * 2 + 1] = s.y;
        }
        out
    }

    /// Two samples per vec4, the layout of `DofUniforms::circle_samples`.
    pub fn to_uniform(&self) -> [[f32; 4]; CIRCLE_SAMPLE_COUNT / 2] {
        let flat = self.flattened();
        let mut out = [[0.0; 4]; CIRCLE_SAMPLE_COUNT / 2];
        for (packed, chunk) in out.iter_mut().zip(flat.chunks_exact(4)) {
            packed.copy_from_slice(chunk);
        }
        out
    }
}

/// 16x16 angles in [0, 2π), row-major, addressed with wrap-around.
#[derive(Clone, Debug, PartialEq)]
pub struct RotationTexture {
    angles: Vec<f32>,
}

impl RotationTexture {
    pub const SIZE: u32 = ROTATION_TEXTURE_SIZE;

    pub fn angles(&self) -> &[f32] {
        &self.angles
    }

    /// Texel at integer coordinates, wrapped into the texture.
    pub fn texel(&self, x: i64, y: i64) -> f32 {
        let size = Self::SIZE as i64;
        let x = x.rem_euclid(size);
        let y = y.rem_euclid(size);
        self.angles[(y * size + x) as usize]
    }

    /// Nearest-texel lookup with repeat addressing.
    #[cfg(test)]
    fn sample(&self, uv: Vec2) -> f32 {
        let size = Self::SIZE as f32;
        let wrapped = uv - uv.floor();
        let x = ((wrapped.x * size) as i64).min(Self::SIZE as i64 - 1);
        let y = ((wrapped.y * size) as i64).min(Self::SIZE as i64 - 1);
        self.texel(x, y)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.angles)
    }
}

/// Produces the disc sample set and rotation texture for one effect instance.
pub struct SampleSetGenerator<R = StdRng> {
    rng: R,
}

impl SampleSetGenerator<StdRng> {
    /// Reproducible generator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl<R: Rng> SampleSetGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn generate(&mut self) -> (SampleDiscSet, RotationTexture) {
        let samples = std::array::from_fn(|_| disc_sample(&mut self.rng));

        let count = (RotationTexture::SIZE * RotationTexture::SIZE) as usize;
        let angles = (0..count).map(|_| self.rng.gen_range(0.0..TAU)).collect();

        (SampleDiscSet { samples }, RotationTexture { angles })
    }
}

/// Rejection sampling keeps `x² + y² <= 1` exact and the density uniform in area.
fn disc_sample<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    loop {
        let candidate = Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        if candidate.length_squared() <= 1.0 {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_lie_inside_unit_disc() {
        let mut generator = SampleSetGenerator::seeded(7);
        for _ in 0..200 {
            let (disc, _) = generator.generate();
            for s in disc.samples() {
                assert!(s.x * s.x + s.y * s.y <= 1.0, "{s} outside disc");
            }
        }
    }

    #[test]
    fn samples_are_uniform_in_area() {
        // Four rings of equal area and four quadrants, 500 sets.
        let mut generator = SampleSetGenerator::seeded(11);
        let mut rings = [0u32; 4];
        let mut quadrants = [0u32; 4];
        let sets = 500;
        for _ in 0..sets {
            let (disc, _) = generator.generate();
            for s in disc.samples() {
                let ring = ((s.length_squared() * 4.0) as usize).min(3);
                rings[ring] += 1;
                let quadrant = (s.x >= 0.0) as usize + 2 * (s.y >= 0.0) as usize;
                quadrants[quadrant] += 1;
            }
        }
        let expected = (sets * CIRCLE_SAMPLE_COUNT) as f32 / 4.0;
        for count in rings.iter().chain(quadrants.iter()) {
            let deviation = (*count as f32 - expected).abs() / expected;
            assert!(deviation < 0.08, "bin count {count} vs expected {expected}");
        }
    }

    #[test]
    fn rotation_angles_in_range() {
        let mut generator = SampleSetGenerator::seeded(3);
        for _ in 0..20 {
            let (_, rotations) = generator.generate();
            assert_eq!(rotations.angles().len(), 256);
            assert!(rotations.angles().iter().all(|a| (0.0..TAU).contains(a)));
        }
    }

    #[test]
    fn rotation_sampling_wraps() {
        let (_, rotations) = SampleSetGenerator::seeded(5).generate();
        for y in 0..16 {
            for x in 0..16 {
                let uv = Vec2::new((x as f32 + 0.5) / 16.0, (y as f32 + 0.5) / 16.0);
                let expected = rotations.angles()[y * 16 + x];
                assert_eq!(rotations.sample(uv), expected);
                assert_eq!(rotations.sample(uv + Vec2::X), expected);
                assert_eq!(rotations.sample(uv + Vec2::Y), expected);
                assert_eq!(rotations.sample(uv - Vec2::ONE), expected);
                assert_eq!(rotations.texel(x as i64 + 16, y as i64 - 32), expected);
            }
        }
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let a = SampleSetGenerator::seeded(42).generate();
        let b = SampleSetGenerator::seeded(42).generate();
        assert_eq!(a, b);
    }

    #[test]
    fn uniform_packing_interleaves_pairs() {
        let (disc, _) = SampleSetGenerator::seeded(9).generate();
        let packed = disc.to_uniform();
        assert_eq!(packed[0], [disc.samples()[0].x, disc.samples()[0].y, disc.samples()[1].x, disc.samples()[1].y]);
        assert_eq!(packed[15][2], disc.samples()[31].x);
        assert_eq!(disc.flattened()[63], disc.samples()[31].y);
    }
}
