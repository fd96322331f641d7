use burn::module::Module;
use burn::nn::{LeakyRelu, LeakyReluConfig, Linear, LinearConfig};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Stack of linear layers applied independently to every point (1x1 convolutions).
#[derive(Module, Debug)]
pub struct PointMlp<B: Backend> {
    layers: Vec<Linear<B>>,
    activation: LeakyRelu,
    activate_last: bool,
}

impl<B: Backend> PointMlp<B> {
    /// widths: [d_input, hidden.., d_output]
    pub fn new(
        widths: &[usize],
        negative_slope: f64,
        activate_last: bool,
        device: &B::Device,
    ) -> Self {
        let layers = widths
            .windows(2)
            .map(|pair| LinearConfig::new(pair[0], pair[1]).init(device))
            .collect();

        Self {
            layers,
            activation: LeakyReluConfig::new()
                .with_negative_slope(negative_slope)
                .init(),
            activate_last,
        }
    }

    /// x: [.., d_input] -> [.., d_output]
    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let mut x = input;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if self.activate_last || i < self.layers.len() - 1 {
                x = self.activation.forward(x);
            }
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn maps_last_axis_only() {
        let device = Default::default();
        let mlp = PointMlp::<NdArray>::new(&[5, 7, 2], 0.01, false, &device);

        let output = mlp.forward(Tensor::zeros([3, 4, 5], &device));

        assert_eq!(output.dims(), [3, 4, 2]);
    }
}
