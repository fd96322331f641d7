mod attention;
mod discriminator;
mod generator;
mod knn;
mod loss;
mod mlp;
mod style;

pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use generator::{Generator, GeneratorConfig};
pub use loss::{discriminator_loss, generator_loss};

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Max over the point axis, computed on the last axis so the backward scatter
/// stays on the last axis too.
///
/// features: [B, N, C] -> pooled: [B, 1, C]
pub(crate) fn max_pool_points<B: Backend>(features: Tensor<B, 3>) -> Tensor<B, 3> {
    features.swap_dims(1, 2).max_dim(2).swap_dims(1, 2)
}

#[macro_export]
macro_rules! debug_assert_finite {
    ($tensor:expr) => {
        debug_assert!(
            burn::tensor::ElementConversion::elem::<f32>($tensor.clone().sum().into_scalar())
                .is_finite(),
            "Tensor contains NaN or inf"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::TensorData;

    type B = Autodiff<NdArray<f32>>;

    #[test]
    fn max_pool_routes_gradient_to_the_maximum() {
        let device = Default::default();
        let features = Tensor::<B, 3>::from_data(
            TensorData::new(vec![1.0f32, 5.0, 3.0, -2.0, 2.0, 0.0], [1, 3, 2]),
            &device,
        )
        .require_grad();

        let pooled = max_pool_points(features.clone());
        pooled
            .clone()
            .into_data()
            .assert_eq(&TensorData::new(vec![3.0f32, 5.0], [1, 1, 2]), false);

        let grads = pooled.sum().backward();
        let grad = features.grad(&grads).unwrap();
        grad.into_data().assert_eq(
            &TensorData::new(vec![0.0f32, 1.0, 1.0, 0.0, 0.0, 0.0], [1, 3, 2]),
            false,
        );
    }
}
