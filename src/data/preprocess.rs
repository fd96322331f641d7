use std::path::Path;

use nalgebra::VectorView3;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

use super::mesh::TriangleMesh;
use crate::error::{Error, Result};

/// Samples `num_points` points uniformly over the surface of the mesh.
///
/// Triangles are picked proportionally to their area, then a point is drawn
/// uniformly inside the triangle. Returns `[num_points * 3]` flattened coordinates.
pub fn sample_surface<R: Rng>(
    mesh: &TriangleMesh,
    num_points: usize,
    source: &Path,
    rng: &mut R,
) -> Result<Vec<f32>> {
    let corners = |face: &[usize; 3]| {
        [
            VectorView3::from_slice(&mesh.vertices[face[0]]),
            VectorView3::from_slice(&mesh.vertices[face[1]]),
            VectorView3::from_slice(&mesh.vertices[face[2]]),
        ]
    };

    // Build triangle areas
    let areas = mesh
        .faces
        .iter()
        .map(|face| {
            let [v0, v1, v2] = corners(face);
            (v1 - v0).cross(&(v2 - v0)).norm() * 0.5
        })
        .collect::<Vec<f32>>();
    let dist =
        WeightedIndex::new(&areas).map_err(|_| Error::DegenerateMesh(source.to_path_buf()))?;

    // Sample points
    let mut points = Vec::with_capacity(num_points * 3);
    for _ in 0..num_points {
        let [v0, v1, v2] = corners(&mesh.faces[dist.sample(rng)]);

        let r1: f32 = rng.random();
        let r2: f32 = rng.random();
        let (r1, r2) = if r1 + r2 > 1.0 {
            (1.0 - r1, 1.0 - r2)
        } else {
            (r1, r2)
        };
        let p = v0 + (v1 - v0) * r1 + (v2 - v0) * r2;
        points.extend_from_slice(p.as_slice());
    }

    Ok(points)
}

/// Centers the cloud on its centroid and scales it into the unit sphere.
pub fn normalize_unit_sphere(points: Vec<f32>) -> Result<Vec<f32>> {
    let num_points = points.len() / 3;
    let mut cloud = ndarray::Array2::from_shape_vec((num_points, 3), points)
        .map_err(|e| Error::InvalidConfig(format!("point buffer: {e}")))?;
    let Some(centroid) = cloud.mean_axis(ndarray::Axis(0)) else {
        return Ok(cloud.into_raw_vec_and_offset().0);
    };
    cloud -= &centroid;
    let max_norm = cloud
        .rows()
        .into_iter()
        .map(|r| (r[0].powi(2) + r[1].powi(2) + r[2].powi(2)).sqrt())
        .fold(0.0f32, f32::max);
    if max_norm > 0.0 {
        cloud /= max_norm;
    }

    Ok(cloud.into_raw_vec_and_offset().0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn right_triangle() -> TriangleMesh {
        TriangleMesh {
            vertices: vec![[0.0, 0.0, 2.0], [1.0, 0.0, 2.0], [0.0, 1.0, 2.0]],
            faces: vec![[0, 1, 2]],
        }
    }

    #[test]
    fn samples_lie_on_the_triangle() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = sample_surface(&right_triangle(), 200, Path::new("t.off"), &mut rng).unwrap();

        assert_eq!(points.len(), 600);
        for p in points.chunks_exact(3) {
            assert!(p[0] >= 0.0 && p[1] >= 0.0 && p[0] + p[1] <= 1.0 + 1e-6);
            assert_eq!(p[2], 2.0);
        }
    }

    #[test]
    fn zero_area_mesh_is_degenerate() {
        let mesh = TriangleMesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            faces: vec![[0, 1, 2]],
        };
        let mut rng = StdRng::seed_from_u64(0);

        assert!(matches!(
            sample_surface(&mesh, 10, Path::new("line.off"), &mut rng),
            Err(Error::DegenerateMesh(_))
        ));
    }

    #[test]
    fn normalized_cloud_fits_unit_sphere() {
        let points = vec![2.0, 2.0, 2.0, 4.0, 2.0, 2.0, 2.0, 6.0, 2.0];
        let normalized = normalize_unit_sphere(points).unwrap();

        let centroid = normalized
            .chunks_exact(3)
            .fold([0.0f32; 3], |acc, p| [acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]]);
        assert!(centroid.iter().all(|c| c.abs() < 1e-5));

        let max_norm = normalized
            .chunks_exact(3)
            .map(|p| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt())
            .fold(0.0f32, f32::max);
        assert!((max_norm - 1.0).abs() < 1e-5);
    }
}
