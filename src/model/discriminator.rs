use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{LayerNorm, LayerNormConfig, LeakyRelu, LeakyReluConfig};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use super::max_pool_points;
use super::mlp::PointMlp;
use crate::error::{self, Error};

#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    pub num_points: usize,
    #[config(default = "vec![64, 128, 256, 512]")]
    pub conv_widths: Vec<usize>,
    #[config(default = "vec![256, 64]")]
    pub head_widths: Vec<usize>,
    #[config(default = 0.01)]
    pub negative_slope: f64,
}

impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> error::Result<Discriminator<B>> {
        if self.num_points == 0 || self.conv_widths.is_empty() {
            return Err(Error::InvalidConfig(
                "discriminator needs points and at least one convolution".into(),
            ));
        }

        let mut convs = Vec::with_capacity(self.conv_widths.len());
        let mut norms = Vec::with_capacity(self.conv_widths.len());
        let mut d_input = 3;
        for &d_output in &self.conv_widths {
            convs.push(Conv1dConfig::new(d_input, d_output, 1).init(device));
            norms.push(LayerNormConfig::new(d_output).init(device));
            d_input = d_output;
        }

        // [512, 256, 64, 1]
        let head: Vec<usize> = std::iter::once(d_input)
            .chain(self.head_widths.iter().copied())
            .chain(std::iter::once(1))
            .collect();

        Ok(Discriminator {
            convs,
            norms,
            activation: LeakyReluConfig::new()
                .with_negative_slope(self.negative_slope)
                .init(),
            shape_head: PointMlp::new(&head, self.negative_slope, false, device),
            point_head: PointMlp::new(&head, self.negative_slope, false, device),
            num_points: self.num_points,
        })
    }
}

/// Raw scores of a batch of clouds, once per shape and once per point.
#[derive(Clone, Debug)]
pub struct ScorePair<B: Backend> {
    /// `[B]`
    pub shape: Tensor<B, 1>,
    /// `[B, N]`
    pub point: Tensor<B, 2>,
}

/// Scores point clouds holistically and point-wise.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    convs: Vec<Conv1d<B>>,
    norms: Vec<LayerNorm<B>>,
    activation: LeakyRelu,
    shape_head: PointMlp<B>,
    point_head: PointMlp<B>,
    num_points: usize,
}

impl<B: Backend> Discriminator<B> {
    /// cloud: [B, N, 3] -> features: [B, N, 512]
    fn features(&self, cloud: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut x = cloud;
        for (conv, norm) in self.convs.iter().zip(&self.norms) {
            x = conv.forward(x.swap_dims(1, 2)).swap_dims(1, 2);
            x = self.activation.forward(norm.forward(x));
        }
        x
    }

    /// cloud: [B, N, 3] -> (shape: [B], point: [B, N])
    pub fn score(&self, cloud: Tensor<B, 3>) -> error::Result<ScorePair<B>> {
        let [batch_size, num_points, channels] = cloud.dims();
        if num_points != self.num_points || channels != 3 {
            return Err(Error::shape(
                "discriminator cloud",
                &[batch_size, self.num_points, 3],
                &[batch_size, num_points, channels],
            ));
        }

        let features = self.features(cloud);

        // raw logits, regressed onto 0/1 by the least-squares losses
        let shape = self
            .shape_head
            .forward(max_pool_points(features.clone())) // [B, 1, 1]
            .reshape([batch_size]);
        let point = self
            .point_head
            .forward(features) // [B, N, 1]
            .reshape([batch_size, num_points]);

        Ok(ScorePair { shape, point })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn scores_have_one_value_per_shape_and_per_point() {
        let device = Default::default();
        let discriminator = DiscriminatorConfig::new(32).init::<B>(&device).unwrap();

        let cloud = Tensor::<B, 3>::random([4, 32, 3], Distribution::Uniform(-1.0, 1.0), &device);
        let scores = discriminator.score(cloud).unwrap();

        assert_eq!(scores.shape.dims(), [4]);
        assert_eq!(scores.point.dims(), [4, 32]);
    }

    #[test]
    fn scores_batch_of_one() {
        let device = Default::default();
        let discriminator = DiscriminatorConfig::new(8)
            .with_conv_widths(vec![16, 32])
            .init::<B>(&device)
            .unwrap();

        let cloud = Tensor::<B, 3>::random([1, 8, 3], Distribution::Default, &device);
        let scores = discriminator.score(cloud).unwrap();

        assert_eq!(scores.shape.dims(), [1]);
        assert_eq!(scores.point.dims(), [1, 8]);
    }

    #[test]
    fn both_scores_backpropagate_to_the_cloud() {
        type AB = burn::backend::Autodiff<B>;
        let device = Default::default();
        let discriminator = DiscriminatorConfig::new(8)
            .with_conv_widths(vec![16])
            .init::<AB>(&device)
            .unwrap();

        let cloud = Tensor::<AB, 3>::random([1, 8, 3], Distribution::Default, &device)
            .require_grad();
        let scores = discriminator.score(cloud.clone()).unwrap();
        let grads = (scores.shape.sum() + scores.point.sum()).backward();

        assert_eq!(cloud.grad(&grads).unwrap().dims(), [1, 8, 3]);
    }

    #[test]
    fn rejects_other_point_count() {
        let device = Default::default();
        let discriminator = DiscriminatorConfig::new(8).init::<B>(&device).unwrap();

        let cloud = Tensor::<B, 3>::zeros([1, 9, 3], &device);

        assert!(matches!(
            discriminator.score(cloud),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
