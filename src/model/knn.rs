use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use crate::error::{Error, Result};

/// Squared euclidean distances between every pair of points of each cloud.
///
/// points: [B, N, C] -> distances: [B, N, N]
pub fn pairwise_distance<B: Backend>(points: Tensor<B, 3>) -> Tensor<B, 3> {
    // ||x_i||² + ||x_j||² - 2 x_i·x_j
    let inner = points
        .clone()
        .matmul(points.clone().swap_dims(1, 2))
        .mul_scalar(-2.0); // [B, N, N]
    let square = points.powi_scalar(2).sum_dim(2); // [B, N, 1]

    (square.clone() + inner + square.swap_dims(1, 2)).clamp_min(0.0)
}

/// Indices of the `k` nearest neighbours of every point, the point itself included.
///
/// points: [B, N, C] -> indices: [B, N, k]
pub fn knn<B: Backend>(points: Tensor<B, 3>, k: usize) -> Result<Tensor<B, 3, Int>> {
    let [batch_size, num_points, channels] = points.dims();
    if k == 0 || num_points < k {
        return Err(Error::shape(
            "knn point count",
            &[batch_size, k.max(1), channels],
            &[batch_size, num_points, channels],
        ));
    }

    // topk keeps the largest values, so rank by negated distance
    let distances = pairwise_distance(points.detach());
    let (_, indices) = distances.neg().topk_with_indices(k, 2);

    Ok(indices)
}

/// Gathers the feature vector of every neighbour.
///
/// features: [B, N, C], indices: [B, N, k] -> neighbours: [B, N, k, C]
pub fn gather_neighbors<B: Backend>(
    features: Tensor<B, 3>,
    indices: Tensor<B, 3, Int>,
) -> Tensor<B, 4> {
    let [batch_size, num_points, channels] = features.dims();
    let [_, _, k] = indices.dims();

    let indices = indices
        .reshape([batch_size, num_points * k, 1])
        .repeat_dim(2, channels); // [B, N*k, C]

    features
        .gather(1, indices)
        .reshape([batch_size, num_points, k, channels])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type B = NdArray<f32>;

    fn cloud(batch_size: usize, num_points: usize) -> Tensor<B, 3> {
        let device = Default::default();
        // distinct, well separated points on a helix
        let values = (0..batch_size * num_points)
            .flat_map(|i| {
                let t = (i % num_points) as f32 * 0.7 + (i / num_points) as f32 * 0.1;
                [t.cos(), t.sin(), 0.25 * t]
            })
            .collect::<Vec<f32>>();
        Tensor::from_data(TensorData::new(values, [batch_size, num_points, 3]), &device)
    }

    #[test]
    fn distances_are_symmetric_with_zero_diagonal() {
        let points = cloud(2, 6);
        let distances = pairwise_distance(points.clone());
        assert_eq!(distances.dims(), [2, 6, 6]);

        let asymmetry = (distances.clone() - distances.clone().swap_dims(1, 2))
            .abs()
            .max()
            .into_scalar();
        assert!(asymmetry < 1e-5, "asymmetry: {asymmetry}");

        let values = distances.into_data().to_vec::<f32>().unwrap();
        let raw = points.into_data().to_vec::<f32>().unwrap();
        for b in 0..2 {
            for i in 0..6 {
                assert!(values[b * 36 + i * 6 + i].abs() < 1e-5);
                for j in 0..6 {
                    let p = &raw[(b * 6 + i) * 3..(b * 6 + i) * 3 + 3];
                    let q = &raw[(b * 6 + j) * 3..(b * 6 + j) * 3 + 3];
                    let naive: f32 = p.iter().zip(q).map(|(a, c)| (a - c).powi(2)).sum();
                    assert!((values[b * 36 + i * 6 + j] - naive).abs() < 1e-4);
                }
            }
        }
    }

    #[test]
    fn knn_returns_k_valid_indices_including_self() {
        let (num_points, k) = (10, 4);
        let indices = knn(cloud(3, num_points), k).unwrap();
        assert_eq!(indices.dims(), [3, num_points, k]);

        let values = indices.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        for (row, neighbours) in values.chunks(k).enumerate() {
            let point = (row % num_points) as i64;
            assert!(neighbours.iter().all(|&j| (0..num_points as i64).contains(&j)));
            assert_eq!(neighbours[0], point);
        }
    }

    #[test]
    fn knn_handles_batch_of_one() {
        let indices = knn(cloud(1, 5), 5).unwrap();
        assert_eq!(indices.dims(), [1, 5, 5]);
    }

    #[test]
    fn knn_rejects_fewer_points_than_neighbours() {
        let result = knn(cloud(1, 3), 4);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn gather_picks_neighbour_rows() {
        let device = Default::default();
        let features = Tensor::<B, 3>::from_data(
            TensorData::new(vec![0.0f32, 1.0, 10.0, 11.0, 20.0, 21.0], [1, 3, 2]),
            &device,
        );
        let indices = Tensor::<B, 3, Int>::from_data(
            TensorData::new(vec![2i64, 0, 1, 1, 0, 2], [1, 3, 2]),
            &device,
        );
        let neighbours = gather_neighbors(features, indices);
        assert_eq!(neighbours.dims(), [1, 3, 2, 2]);
        neighbours.into_data().assert_eq(
            &TensorData::new(
                vec![20.0f32, 21.0, 0.0, 1.0, 10.0, 11.0, 10.0, 11.0, 0.0, 1.0, 20.0, 21.0],
                [1, 3, 2, 2],
            ),
            true,
        );
    }
}
