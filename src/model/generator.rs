use burn::config::Config;
use burn::module::Module;
use burn::tensor::Tensor;
use burn::tensor::activation::tanh;
use burn::tensor::backend::Backend;

use super::attention::GraphAttention;
use super::max_pool_points;
use super::mlp::PointMlp;
use super::style::AdaptiveStyleNorm;
use crate::debug_assert_finite;
use crate::error::{self, Error};

#[derive(Config, Debug)]
pub struct GeneratorConfig {
    pub num_points: usize,
    pub latent_dim: usize,
    #[config(default = 20)]
    pub k: usize,
    #[config(default = 128)]
    pub d_feature_embed: usize,
    #[config(default = 64)]
    pub d_stage1: usize,
    #[config(default = 128)]
    pub d_stage2: usize,
    #[config(default = 512)]
    pub d_global: usize,
    #[config(default = 0.01)]
    pub negative_slope: f64,
}

impl GeneratorConfig {
    pub fn validate(&self) -> error::Result<()> {
        if self.latent_dim == 0 {
            return Err(Error::InvalidConfig("latent_dim must be positive".into()));
        }
        if self.k == 0 || self.num_points < self.k {
            return Err(Error::InvalidConfig(format!(
                "num_points ({}) must be at least k ({}) and k positive",
                self.num_points, self.k
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> error::Result<Generator<B>> {
        self.validate()?;
        let slope = self.negative_slope;

        Ok(Generator {
            feature_embed: PointMlp::new(
                &[3 + self.latent_dim, self.d_feature_embed, self.d_feature_embed],
                slope,
                true,
                device,
            ),
            style_proj1: PointMlp::new(
                &[self.d_feature_embed, self.d_feature_embed, 2 * self.d_stage1],
                slope,
                false,
                device,
            ),
            style_proj2: PointMlp::new(
                &[self.d_feature_embed, self.d_feature_embed, 2 * self.d_stage2],
                slope,
                false,
                device,
            ),
            attention1: GraphAttention::new(3, self.d_stage1, self.k, slope, device),
            attention2: GraphAttention::new(self.d_stage1, self.d_stage2, self.k, slope, device),
            style_norm1: AdaptiveStyleNorm::new(self.d_stage1),
            style_norm2: AdaptiveStyleNorm::new(self.d_stage2),
            global_mlp: PointMlp::new(
                &[self.d_stage2, self.d_global / 2, self.d_global],
                slope,
                false,
                device,
            ),
            decoder: PointMlp::new(
                &[self.d_stage2 + self.d_global, 256, 64, 3],
                slope,
                false,
                device,
            ),
            num_points: self.num_points,
            latent_dim: self.latent_dim,
        })
    }
}

/// Deforms a fixed sphere into a shape, conditioned on a latent style vector.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    feature_embed: PointMlp<B>,
    style_proj1: PointMlp<B>,
    style_proj2: PointMlp<B>,
    attention1: GraphAttention<B>,
    attention2: GraphAttention<B>,
    style_norm1: AdaptiveStyleNorm,
    style_norm2: AdaptiveStyleNorm,
    global_mlp: PointMlp<B>,
    decoder: PointMlp<B>,
    num_points: usize,
    latent_dim: usize,
}

impl<B: Backend> Generator<B> {
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// sphere: [B, N, 3], latent: [B, D] -> point cloud: [B, N, 3] in [-1, 1]
    pub fn generate(
        &self,
        sphere: Tensor<B, 3>,
        latent: Tensor<B, 2>,
    ) -> error::Result<Tensor<B, 3>> {
        let [batch_size, num_points, channels] = sphere.dims();
        if num_points != self.num_points || channels != 3 {
            return Err(Error::shape(
                "generator sphere",
                &[batch_size, self.num_points, 3],
                &[batch_size, num_points, channels],
            ));
        }
        let expected = [batch_size, self.latent_dim];
        if latent.dims() != expected {
            return Err(Error::shape("generator latent", &expected, &latent.dims()));
        }

        // 1. Local style from the latent broadcast over the sphere
        let latent = latent.unsqueeze_dim::<3>(1).repeat_dim(1, num_points); // [B, N, D]
        let style = self
            .feature_embed
            .forward(Tensor::cat(vec![sphere.clone(), latent], 2)); // [B, N, 128]
        let style1 = self.style_proj1.forward(style.clone()); // [B, N, 2*64]
        let style2 = self.style_proj2.forward(style); // [B, N, 2*128]

        // 2. Stage 1
        let x = self.attention1.forward(sphere)?; // [B, N, 64]
        let x = self.style_norm1.forward(x, style1)?;

        // 3. Stage 2
        let x = self.attention2.forward(x)?; // [B, N, 128]
        let x = self.style_norm2.forward(x, style2)?;

        // 4. Global shape descriptor, broadcast back to the points
        let global = self
            .global_mlp
            .forward(max_pool_points(x.clone())) // [B, 1, 512]
            .repeat_dim(1, num_points); // [B, N, 512]
        let out = self.decoder.forward(Tensor::cat(vec![x, global], 2)); // [B, N, 3]

        let cloud = tanh(out);
        debug_assert_finite!(cloud);

        Ok(cloud)
    }
}
