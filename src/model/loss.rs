use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use super::discriminator::ScorePair;

/// Sum over the points of `(score - target)²`, scaled by `weight / 2N`.
///
/// scores: [B, N] -> [B]
fn point_term<B: Backend>(scores: Tensor<B, 2>, target: f32, weight: f64) -> Tensor<B, 1> {
    let [batch_size, num_points] = scores.dims();
    scores
        .sub_scalar(target)
        .powi_scalar(2)
        .sum_dim(1)
        .reshape([batch_size])
        .mul_scalar(weight / (2 * num_points) as f64)
}

/// Least-squares generator loss: fake clouds are pushed towards the real label 1.
///
/// mean_B [ 0.5 (s - 1)² + λ/(2N) Σ_N (p - 1)² ]
pub fn generator_loss<B: Backend>(fake: &ScorePair<B>, per_point_weight: f64) -> Tensor<B, 1> {
    let shape = fake.shape.clone().sub_scalar(1.0).powi_scalar(2).mul_scalar(0.5);
    let point = point_term(fake.point.clone(), 1.0, per_point_weight);

    (shape + point).mean()
}

/// Least-squares discriminator loss: real towards 1, fake towards 0.
///
/// Σ_B [ 0.5 (f_s² + (r_s - 1)²) + λ/(2N) Σ_N (f_p² + (r_p - 1)²) ]
pub fn discriminator_loss<B: Backend>(
    real: &ScorePair<B>,
    fake: &ScorePair<B>,
    per_point_weight: f64,
) -> Tensor<B, 1> {
    let shape = (fake.shape.clone().powi_scalar(2)
        + real.shape.clone().sub_scalar(1.0).powi_scalar(2))
    .mul_scalar(0.5);
    let point = point_term(fake.point.clone(), 0.0, per_point_weight)
        + point_term(real.point.clone(), 1.0, per_point_weight);

    (shape + point).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type B = NdArray<f32>;

    fn scores(shape: Vec<f32>, point: Vec<f32>, num_points: usize) -> ScorePair<B> {
        let device = Default::default();
        let batch_size = shape.len();
        ScorePair {
            shape: Tensor::from_data(TensorData::new(shape, [batch_size]), &device),
            point: Tensor::from_data(TensorData::new(point, [batch_size, num_points]), &device),
        }
    }

    #[test]
    fn generator_loss_is_zero_when_everything_looks_real() {
        let fake = scores(vec![1.0, 1.0], vec![1.0; 6], 3);
        let loss = generator_loss(&fake, 0.1).into_scalar();

        assert_eq!(loss, 0.0);
    }

    #[test]
    fn generator_loss_averages_over_the_batch() {
        // cloud 0: 0.5 * (0 - 1)² + 0.5 / 4 * ((3 - 1)² + (1 - 1)²) = 0.5 + 0.5
        // cloud 1: 0.5 * (3 - 1)² + 0.5 / 4 * ((1 - 1)² + (-1 - 1)²) = 2.0 + 0.5
        let fake = scores(vec![0.0, 3.0], vec![3.0, 1.0, 1.0, -1.0], 2);
        let loss = generator_loss(&fake, 0.5).into_scalar();

        assert!((loss - 1.75).abs() < 1e-6, "loss: {loss}");
    }

    #[test]
    fn discriminator_loss_sums_over_the_batch() {
        // cloud 0: 0.5 * (1 + 0) + 1 / 4 * ((1 + 0) + (0 + 1)) = 0.5 + 0.5
        // cloud 1: 0.5 * (0 + 4) + 1 / 4 * ((4 + 0) + (0 + 0)) = 2.0 + 1.0
        let real = scores(vec![1.0, -1.0], vec![1.0, 0.0, 1.0, 1.0], 2);
        let fake = scores(vec![1.0, 0.0], vec![1.0, 0.0, 2.0, 0.0], 2);
        let loss = discriminator_loss(&real, &fake, 1.0).into_scalar();

        assert!((loss - 4.0).abs() < 1e-6, "loss: {loss}");
    }

    #[test]
    fn perfect_discriminator_has_zero_loss() {
        let real = scores(vec![1.0], vec![1.0; 4], 4);
        let fake = scores(vec![0.0], vec![0.0; 4], 4);

        assert_eq!(discriminator_loss(&real, &fake, 0.1).into_scalar(), 0.0);
    }
}
