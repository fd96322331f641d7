use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{LayerNorm, LayerNormConfig, LeakyRelu, LeakyReluConfig, Linear, LinearConfig};
use burn::tensor::Tensor;
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;

use super::knn::{gather_neighbors, knn};
use crate::error::{Error, Result};

/// Linear projection + layer norm + leaky relu, applied on the last axis.
#[derive(Module, Debug)]
pub struct PointwiseBlock<B: Backend> {
    linear: Linear<B>,
    norm: LayerNorm<B>,
    activation: LeakyRelu,
}

impl<B: Backend> PointwiseBlock<B> {
    pub fn new(d_input: usize, d_output: usize, negative_slope: f64, device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(d_input, d_output).init(device),
            norm: LayerNormConfig::new(d_output).init(device),
            activation: LeakyReluConfig::new()
                .with_negative_slope(negative_slope)
                .init(),
        }
    }

    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let x = self.linear.forward(input);
        self.activation.forward(self.norm.forward(x))
    }
}

/// Graph attention over the k-NN neighbourhood of every point.
///
/// The edge branch `x_i || (x_j - x_i)` produces attention logits that are
/// soft-maxed across the neighbours; the duplicated central feature `x_i`
/// produces the values. The weighted values are collapsed across the
/// neighbours by a `[1, k]` convolution.
#[derive(Module, Debug)]
pub struct GraphAttention<B: Backend> {
    edge: PointwiseBlock<B>,
    central: PointwiseBlock<B>,
    aggregate: Conv2d<B>,
    d_input: usize,
    d_output: usize,
    k: usize,
}

impl<B: Backend> GraphAttention<B> {
    /// k: how many nearest neighbours (20 by default)
    /// d_input: channels of the incoming per-point features (xyz=3)
    /// d_output: channels of the produced per-point features
    pub fn new(
        d_input: usize,
        d_output: usize,
        k: usize,
        negative_slope: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            edge: PointwiseBlock::new(2 * d_input, d_output, negative_slope, device),
            central: PointwiseBlock::new(d_input, d_output, negative_slope, device),
            aggregate: Conv2dConfig::new([d_output, d_output], [1, k]).init(device),
            d_input,
            d_output,
            k,
        }
    }

    /// features: [B, N, C_in] -> features: [B, N, C_out]
    pub fn forward(&self, features: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let [batch_size, num_points, channels] = features.dims();
        if channels != self.d_input {
            return Err(Error::shape(
                "graph attention input",
                &[batch_size, num_points, self.d_input],
                &[batch_size, num_points, channels],
            ));
        }

        // 1. k-NN indices [B, N, k]
        let indices = knn(features.clone(), self.k)?;

        // 2. Edge features: x_i || (x_j - x_i)
        let neighbors = gather_neighbors(features.clone(), indices); // [B, N, k, C_in]
        let central = features.unsqueeze_dim::<4>(2).repeat_dim(2, self.k); // [B, N, k, C_in]
        let edge = Tensor::cat(vec![central.clone(), neighbors - central.clone()], 3); // [B, N, k, 2*C_in]

        // 3. Attention weights over the neighbours
        let weights = softmax(self.edge.forward(edge), 2); // [B, N, k, C_out]

        // 4. Values from the duplicated central feature
        let values = self.central.forward(central); // [B, N, k, C_out]

        // 5. Collapse the neighbour axis
        let weighted = (values * weights).swap_dims(1, 3).swap_dims(2, 3); // [B, C_out, N, k]
        let out = self.aggregate.forward(weighted); // [B, C_out, N, 1]

        Ok(out
            .reshape([batch_size, self.d_output, num_points])
            .swap_dims(1, 2))
    }
}
