//! CPU-side geometry for backgrounds and hotspots.
//!
//! Everything here is plain data so it can be built and tested without a GPU;
//! call [`RawGeometry::upload`] to turn it into a [`Mesh`].
//!
//! | Builder                | Used for                                 |
//! |------------------------|------------------------------------------|
//! | [`sphere`]             | equirectangular media                    |
//! | [`flat_plane`]         | flat media                               |
//! | [`cube`]               | cube media (6x1 strip)                   |
//! | [`pyramid_face_tile`]  | one tile of tiled media                  |
//! | [`screen_quad`]        | shader backgrounds, full screen          |
//! | [`billboard`]          | hotspot markers                          |

use std::f32::consts::{FRAC_PI_2, PI};

use crate::gpu::GpuContext;
use crate::media::CubeFace;
use crate::mesh::{Mesh, Vertex3d};
use glam::{Vec2, Vec3};

/// Raw geometry data before GPU upload.
#[derive(Clone, Debug, Default)]
pub struct RawGeometry {
    /// Vertex positions, normals, and UVs.
    pub vertices: Vec<Vertex3d>,
    /// Triangle indices.
    pub indices: Vec<u32>,
}

impl RawGeometry {
    /// Creates raw geometry from vertices and indices.
    pub fn new(vertices: Vec<Vertex3d>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Computes the axis-aligned bounding box.
    ///
    /// Returns `(min, max)` corners of the bounding box.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for v in &self.vertices {
            let p = Vec3::from(v.position);
            min = min.min(p);
            max = max.max(p);
        }

        (min, max)
    }

    /// Returns the center point of the geometry.
    pub fn center(&self) -> Vec3 {
        let (min, max) = self.bounds();
        (min + max) * 0.5
    }

    /// Returns the size of the bounding box.
    pub fn size(&self) -> Vec3 {
        let (min, max) = self.bounds();
        max - min
    }

    /// Translates all vertices by the given offset.
    pub fn translate(&mut self, offset: Vec3) {
        for v in &mut self.vertices {
            v.position[0] += offset.x;
            v.position[1] += offset.y;
            v.position[2] += offset.z;
        }
    }

    /// Centers the geometry at the origin.
    pub fn recenter(&mut self) {
        let center = self.center();
        self.translate(-center);
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Append another piece of geometry, offsetting its indices.
    pub fn append(&mut self, other: &RawGeometry) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }

    /// Uploads this geometry to the GPU as a [`Mesh`].
    pub fn upload(&self, gpu: &GpuContext) -> Mesh {
        Mesh::new(gpu, &self.vertices, &self.indices)
    }
}

/// Point on the unit sphere for texture coordinates `(u, v)`.
///
/// Longitude follows `2πu + π/2`, so `u = 0.5` faces -Z (straight ahead) and
/// `u = 0.75` faces +X. `v = 0` is the zenith.
pub fn sphere_point(u: f32, v: f32) -> Vec3 {
    let theta = 2.0 * PI * u + FRAC_PI_2;
    let phi = PI * v;
    Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin())
}

/// Equirectangular texture coordinates of a direction. Inverse of [`sphere_point`].
pub fn direction_uv(direction: Vec3) -> Vec2 {
    let d = direction.normalize_or_zero();
    let lon = d.x.atan2(-d.z);
    let lat = d.y.clamp(-1.0, 1.0).asin();
    Vec2::new(0.5 + lon / (2.0 * PI), 0.5 - lat / PI)
}

/// Inward-facing UV sphere for equirectangular media.
pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> RawGeometry {
    let width_segments = width_segments.max(3);
    let height_segments = height_segments.max(2);
    let mut vertices = Vec::with_capacity(((width_segments + 1) * (height_segments + 1)) as usize);
    let mut indices = Vec::with_capacity((width_segments * height_segments * 6) as usize);

    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            let p = sphere_point(u, v);
            vertices.push(Vertex3d::new((p * radius).into(), (-p).into(), [u, v]));
        }
    }

    let row = width_segments + 1;
    for iy in 0..height_segments {
        for ix in 0..width_segments {
            let a = iy * row + ix;
            let b = a + row;
            // Wound to face the centre.
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }

    RawGeometry::new(vertices, indices)
}

/// Plane placed in front of the camera for flat media.
///
/// The plane sits at `z = -distance` and its height spans `vfov_degrees`
/// when seen from the origin; its width follows `media_aspect`.
pub fn flat_plane(media_aspect: f32, vfov_degrees: f32, distance: f32) -> RawGeometry {
    let half_h = distance * (vfov_degrees.to_radians() * 0.5).tan();
    let half_w = half_h * media_aspect.max(1e-4);
    quad(
        Vec3::new(0.0, 0.0, -distance),
        Vec3::new(half_w, 0.0, 0.0),
        Vec3::new(0.0, half_h, 0.0),
        [0.0, 0.0],
        [1.0, 1.0],
    )
}

/// Quad covering clip space from (-1, -1) to (1, 1).
pub fn screen_quad() -> RawGeometry {
    quad(Vec3::ZERO, Vec3::X, Vec3::Y, [0.0, 0.0], [1.0, 1.0])
}

/// Unit quad facing +Z, used for hotspot sprites.
pub fn billboard(size: f32) -> RawGeometry {
    let h = size * 0.5;
    quad(Vec3::ZERO, Vec3::X * h, Vec3::Y * h, [0.0, 0.0], [1.0, 1.0])
}

/// Inward cube for cube media packed as a 6x1 strip.
pub fn cube(size: f32) -> RawGeometry {
    let mut geometry = RawGeometry::default();
    for face in CubeFace::ALL {
        let u0 = face.index() as f32 / 6.0;
        let u1 = (face.index() + 1) as f32 / 6.0;
        geometry.append(&face_quad(face, size * 0.5, [u0, 0.0], [u1, 1.0], Vec2::ZERO, Vec2::ONE));
    }
    geometry
}

/// One tile of a cube face at a pyramid level.
///
/// The face is split into `tiles` x `tiles` cells; `(x, y)` counts from the
/// top-left corner as seen from inside. UVs span the whole tile texture.
pub fn pyramid_face_tile(face: CubeFace, tiles: u32, x: u32, y: u32, radius: f32) -> RawGeometry {
    let tiles = tiles.max(1);
    let step = 1.0 / tiles as f32;
    let min = Vec2::new(x as f32 * step, y as f32 * step);
    let max = min + Vec2::splat(step);
    face_quad(face, radius, [0.0, 0.0], [1.0, 1.0], min, max)
}

/// Basis of a cube face seen from inside: centre, right and down directions.
pub fn face_basis(face: CubeFace) -> (Vec3, Vec3, Vec3) {
    match face {
        CubeFace::Right => (Vec3::X, Vec3::Z, Vec3::NEG_Y),
        CubeFace::Left => (Vec3::NEG_X, Vec3::NEG_Z, Vec3::NEG_Y),
        CubeFace::Up => (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        CubeFace::Down => (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        CubeFace::Front => (Vec3::NEG_Z, Vec3::X, Vec3::NEG_Y),
        CubeFace::Back => (Vec3::Z, Vec3::NEG_X, Vec3::NEG_Y),
    }
}

/// Part of a cube face between `min` and `max` (face-relative, 0..1 from top-left).
fn face_quad(
    face: CubeFace,
    half: f32,
    uv_min: [f32; 2],
    uv_max: [f32; 2],
    min: Vec2,
    max: Vec2,
) -> RawGeometry {
    let (normal, right, down) = face_basis(face);
    let corner = |s: f32, t: f32| (normal + right * (s * 2.0 - 1.0) + down * (t * 2.0 - 1.0)) * half;

    let positions = [
        corner(min.x, min.y),
        corner(max.x, min.y),
        corner(max.x, max.y),
        corner(min.x, max.y),
    ];
    let uvs = [
        [uv_min[0], uv_min[1]],
        [uv_max[0], uv_min[1]],
        [uv_max[0], uv_max[1]],
        [uv_min[0], uv_max[1]],
    ];
    let inward = (-normal).into();
    let vertices = positions
        .iter()
        .zip(uvs)
        .map(|(p, uv)| Vertex3d::new((*p).into(), inward, uv))
        .collect();

    RawGeometry::new(vertices, vec![0, 2, 1, 0, 3, 2])
}

/// Rectangle around `center` spanned by half-axes `right` and `up`, facing +right x up.
fn quad(center: Vec3, right: Vec3, up: Vec3, uv_min: [f32; 2], uv_max: [f32; 2]) -> RawGeometry {
    let normal: [f32; 3] = right.cross(up).normalize_or_zero().into();
    let vertices = vec![
        Vertex3d::new((center - right - up).into(), normal, [uv_min[0], uv_max[1]]),
        Vertex3d::new((center + right - up).into(), normal, [uv_max[0], uv_max[1]]),
        Vertex3d::new((center + right + up).into(), normal, [uv_max[0], uv_min[1]]),
        Vertex3d::new((center - right + up).into(), normal, [uv_min[0], uv_min[1]]),
    ];
    RawGeometry::new(vertices, vec![0, 1, 2, 2, 3, 0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn raw_geometry_bounds() {
        let vertices = vec![
            Vertex3d::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([-1.0, -1.0, -1.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
        ];
        let indices = vec![0, 1, 2];
        let geom = RawGeometry::new(vertices, indices);

        let (min, max) = geom.bounds();
        assert_eq!(min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn raw_geometry_recenter() {
        let vertices = vec![
            Vertex3d::new([2.0, 2.0, 2.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([4.0, 4.0, 4.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
        ];
        let indices = vec![0, 1, 0];
        let mut geom = RawGeometry::new(vertices, indices);

        geom.recenter();

        let center = geom.center();
        assert!((center.x).abs() < 0.001);
        assert!((center.y).abs() < 0.001);
        assert!((center.z).abs() < 0.001);
    }

    #[test]
    fn sphere_forward_maps_to_texture_centre() {
        let forward = sphere_point(0.5, 0.5);
        assert_abs_diff_eq!(forward.z, -1.0, epsilon = 1e-6);
        let right = sphere_point(0.75, 0.5);
        assert_abs_diff_eq!(right.x, 1.0, epsilon = 1e-6);

        let uv = direction_uv(Vec3::NEG_Z);
        assert_abs_diff_eq!(uv.x, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(uv.y, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn direction_uv_inverts_sphere_point() {
        for (u, v) in [(0.1, 0.3), (0.6, 0.7), (0.9, 0.45)] {
            let uv = direction_uv(sphere_point(u, v));
            assert_abs_diff_eq!(uv.x, u, epsilon = 1e-5);
            assert_abs_diff_eq!(uv.y, v, epsilon = 1e-5);
        }
    }

    #[test]
    fn sphere_has_expected_counts() {
        let geom = sphere(10.0, 16, 8);
        assert_eq!(geom.vertices.len(), 17 * 9);
        assert_eq!(geom.triangle_count(), 16 * 8 * 2);
        let size = geom.size();
        assert_abs_diff_eq!(size.y, 20.0, epsilon = 1e-4);
    }

    #[test]
    fn sphere_triangles_face_inward() {
        let geom = sphere(1.0, 8, 4);
        // A mid-latitude triangle: its winding normal should point to the centre.
        let tri = &geom.indices[(8 * 6)..(8 * 6 + 3)];
        let p: Vec<Vec3> = tri
            .iter()
            .map(|&i| Vec3::from(geom.vertices[i as usize].position))
            .collect();
        let normal = (p[1] - p[0]).cross(p[2] - p[0]);
        let centroid = (p[0] + p[1] + p[2]) / 3.0;
        assert!(normal.dot(centroid) < 0.0);
    }

    #[test]
    fn flat_plane_spans_vertical_fov() {
        let geom = flat_plane(2.0, 90.0, 5.0);
        let size = geom.size();
        assert_abs_diff_eq!(size.y, 10.0, epsilon = 1e-4);
        assert_abs_diff_eq!(size.x, 20.0, epsilon = 1e-4);
        assert_abs_diff_eq!(geom.center().z, -5.0, epsilon = 1e-6);
    }

    #[test]
    fn screen_quad_covers_clip_space() {
        let (min, max) = screen_quad().bounds();
        assert_eq!(min.truncate(), glam::Vec2::new(-1.0, -1.0));
        assert_eq!(max.truncate(), glam::Vec2::new(1.0, 1.0));
    }

    #[test]
    fn cube_has_six_faces_in_strip() {
        let geom = cube(2.0);
        assert_eq!(geom.triangle_count(), 12);
        let max_u = geom.vertices.iter().map(|v| v.uv[0]).fold(0.0, f32::max);
        assert_abs_diff_eq!(max_u, 1.0);
    }

    #[test]
    fn pyramid_tiles_partition_a_face() {
        let (tiles, radius) = (4, 2.0);
        let mut rects = Vec::new();
        for y in 0..tiles {
            for x in 0..tiles {
                let (min, max) = pyramid_face_tile(CubeFace::Front, tiles, x, y, radius).bounds();
                // The front face lies in the z = -radius plane.
                assert_abs_diff_eq!(min.z, -radius, epsilon = 1e-5);
                assert_abs_diff_eq!(max.z, -radius, epsilon = 1e-5);
                rects.push((min.truncate(), max.truncate()));
            }
        }

        let area: f32 = rects.iter().map(|(min, max)| (*max - *min).element_product()).sum();
        assert_abs_diff_eq!(area, (2.0 * radius) * (2.0 * radius), epsilon = 1e-4);

        for (i, (a_min, a_max)) in rects.iter().enumerate() {
            for (b_min, b_max) in &rects[i + 1..] {
                let overlap = (a_max.min(*b_max) - a_min.max(*b_min)).max(glam::Vec2::ZERO);
                assert_abs_diff_eq!(overlap.x * overlap.y, 0.0, epsilon = 1e-6);
            }
        }

        let lo = rects.iter().fold(glam::Vec2::splat(f32::INFINITY), |acc, (min, _)| acc.min(*min));
        let hi = rects.iter().fold(glam::Vec2::splat(f32::NEG_INFINITY), |acc, (_, max)| acc.max(*max));
        assert_abs_diff_eq!(lo.x, -radius, epsilon = 1e-5);
        assert_abs_diff_eq!(lo.y, -radius, epsilon = 1e-5);
        assert_abs_diff_eq!(hi.x, radius, epsilon = 1e-5);
        assert_abs_diff_eq!(hi.y, radius, epsilon = 1e-5);

        // Tile (0, 0) is the top-left corner seen from inside.
        let (first_min, first_max) = rects[0];
        assert_abs_diff_eq!(first_min.x, -radius, epsilon = 1e-5);
        assert_abs_diff_eq!(first_max.y, radius, epsilon = 1e-5);
    }
}
