use burn::module::Module;
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use crate::error::{Error, Result};

/// Normalization whose scale and bias come from a per-point style tensor.
#[derive(Module, Clone, Debug)]
pub struct AdaptiveStyleNorm {
    d_model: usize,
    epsilon: f64,
}

impl AdaptiveStyleNorm {
    pub fn new(d_model: usize) -> Self {
        Self {
            d_model,
            epsilon: 1e-5,
        }
    }

    /// Zero mean, unit variance per channel, with statistics taken over the
    /// batch and point axes.
    ///
    /// features: [B, N, C] -> normalized: [B, N, C]
    pub fn normalize<B: Backend>(&self, features: Tensor<B, 3>) -> Tensor<B, 3> {
        let mean = features.clone().mean_dim(1).mean_dim(0); // [1, 1, C]
        let centered = features - mean;
        let variance = centered.clone().powi_scalar(2).mean_dim(1).mean_dim(0); // [1, 1, C]

        centered / variance.add_scalar(self.epsilon).sqrt()
    }

    /// features: [B, N, C], style: [B, N, 2C] -> styled: [B, N, C]
    pub fn forward<B: Backend>(
        &self,
        features: Tensor<B, 3>,
        style: Tensor<B, 3>,
    ) -> Result<Tensor<B, 3>> {
        let [batch_size, num_points, channels] = features.dims();
        if channels != self.d_model {
            return Err(Error::shape(
                "style norm features",
                &[batch_size, num_points, self.d_model],
                &[batch_size, num_points, channels],
            ));
        }
        let expected = [batch_size, num_points, 2 * channels];
        if style.dims() != expected {
            return Err(Error::shape("style norm style", &expected, &style.dims()));
        }

        let scale = style.clone().narrow(2, 0, channels);
        let bias = style.narrow(2, channels, channels);

        Ok(scale * self.normalize(features) + bias)
    }
}
