//! A plain feed-forward classifier: a chain of [`Linear`] layers with ReLU
//! between the hidden ones, logits out.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    /// Hidden layers followed by the output layer.
    pub layers: Vec<Linear<B>>,
}

#[derive(Config, Debug)]
pub struct MlpConfig {
    /// Number of input features, e.g. `28 * 28` for flattened MNIST digits.
    pub input_size: usize,
    /// Number of classes.
    pub output_size: usize,
    /// Widths of the hidden layers, in order. May be empty, which leaves a
    /// single linear map from input to output.
    pub hidden_layers: Vec<usize>,
}

impl MlpConfig {
    /// The full width chain: input, hidden widths, output.
    pub fn widths(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.hidden_layers.len() + 2);
        widths.push(self.input_size);
        widths.extend_from_slice(&self.hidden_layers);
        widths.push(self.output_size);
        widths
    }

    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let widths = self.widths();
        let mut layers = Vec::with_capacity(widths.len() - 1);
        for pair in widths.windows(2) {
            layers.push(LinearConfig::new(pair[0], pair[1]).init(device));
        }
        Mlp { layers }
    }
}

impl<B: Backend> Mlp<B> {
    /// # Shapes
    ///   - Input [batch, input_size]
    ///   - Output [batch, output_size]
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, _features] = input.dims();
        let last = self.layers.len() - 1;

        let mut x = input;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = relu(x);
            }
        }
        debug_assert_eq!([batch, self.output_size()], x.dims());

        x
    }

    /// The width chain read back from the layer weights: input, hidden
    /// widths, output. Inverse of [`MlpConfig::widths`].
    pub fn widths(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.layers.len() + 1);
        for (i, layer) in self.layers.iter().enumerate() {
            let [d_input, d_output] = layer.weight.dims();
            if i == 0 {
                widths.push(d_input);
            }
            widths.push(d_output);
        }
        widths
    }

    pub fn input_size(&self) -> usize {
        let [d_input, _] = self.layers[0].weight.dims();
        d_input
    }

    pub fn output_size(&self) -> usize {
        let [_, d_output] = self.layers[self.layers.len() - 1].weight.dims();
        d_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn forward_produces_one_logit_row_per_item() {
        let device = Default::default();
        let model: Mlp<TestBackend> = MlpConfig::new(12, 3, vec![8, 6]).init(&device);

        let input = Tensor::zeros([5, 12], &device);
        let logits = model.forward(input);

        assert_eq!([5, 3], logits.dims());
    }

    #[test]
    fn widths_round_trip_through_the_model() {
        let device = Default::default();
        let config = MlpConfig::new(4, 2, vec![16, 8]);
        let model: Mlp<TestBackend> = config.init(&device);

        assert_eq!(config.widths(), model.widths());
        assert_eq!(4, model.input_size());
        assert_eq!(2, model.output_size());
    }

    #[test]
    fn empty_hidden_layers_leave_a_single_linear_map() {
        let device = Default::default();
        let model: Mlp<TestBackend> = MlpConfig::new(4, 2, vec![]).init(&device);

        assert_eq!(1, model.layers.len());
        assert_eq!([3, 2], model.forward(Tensor::zeros([3, 4], &device)).dims());
    }
}
