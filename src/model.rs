use crate::mnist::{HEIGHT, NUM_CLASSES, WIDTH};
use burn::{
    nn::{
        Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
    train::ClassificationOutput,
};

pub const KERNEL_SIZE: usize = 5;
pub const CONV1_CHANNELS: usize = 32;
pub const CONV2_CHANNELS: usize = 64;
pub const HIDDEN_SIZE: usize = 1024;

/// Each pooling stage halves the image side.
const POOLED_HEIGHT: usize = HEIGHT / 4;
const POOLED_WIDTH: usize = WIDTH / 4;

pub trait ModelConfigExt<B: Backend>: Config {
    type Model: Module<B>;
    fn init(&self, device: &B::Device) -> Self::Model;
}

/// Two convolution+pool stages, a fully-connected stage with dropout and a linear output.
#[derive(Config, Debug)]
pub struct ConvNetConfig {
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,

    /// Probability that a hidden unit of the fully-connected stage is kept during training.
    #[config(default = 0.75)]
    pub keep_prob: f64,

    /// Initializer of every weight and bias.
    #[config(default = "Initializer::Normal { mean: 0.0, std: 1.0 }")]
    pub initializer: Initializer,
}

#[derive(Module, Debug)]
pub struct ConvNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub fc1: Linear<B>,
    pub out: Linear<B>,
    pub pool: MaxPool2d,
    pub dropout: Dropout,
    pub activation: Relu,
}

impl<B: Backend> ModelConfigExt<B> for ConvNetConfig {
    type Model = ConvNet<B>;

    fn init(&self, device: &B::Device) -> Self::Model {
        ConvNetConfig::init(self, device)
    }
}

impl ConvNetConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvNet<B> {
        let conv = |channels: [usize; 2]| {
            Conv2dConfig::new(channels, [KERNEL_SIZE, KERNEL_SIZE])
                .with_padding(PaddingConfig2d::Same)
                .with_bias(true)
                .with_initializer(self.initializer.clone())
                .init(device)
        };
        let linear = |d_input: usize, d_output: usize| {
            LinearConfig::new(d_input, d_output)
                .with_bias(true)
                .with_initializer(self.initializer.clone())
                .init(device)
        };

        ConvNet {
            conv1: conv([1, CONV1_CHANNELS]),
            conv2: conv([CONV1_CHANNELS, CONV2_CHANNELS]),
            fc1: linear(POOLED_HEIGHT * POOLED_WIDTH * CONV2_CHANNELS, HIDDEN_SIZE),
            out: linear(HIDDEN_SIZE, self.num_classes),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            dropout: DropoutConfig::new(1.0 - self.keep_prob).init(),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> ConvNet<B> {
    /// # Shapes
    ///
    /// - images: `[batch_size, HEIGHT * WIDTH]`
    /// - output: `[batch_size, num_classes]`
    ///
    /// Dropout is only active when `B` tracks gradients.
    pub fn forward(&self, images: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch_size, input_size] = images.dims();
        assert_eq!(input_size, HEIGHT * WIDTH);

        let x = images.reshape([batch_size, 1, HEIGHT, WIDTH]);

        let x = self.conv1.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);
        assert_eq!([batch_size, CONV1_CHANNELS, HEIGHT / 2, WIDTH / 2], x.dims());

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);
        assert_eq!(
            [batch_size, CONV2_CHANNELS, POOLED_HEIGHT, POOLED_WIDTH],
            x.dims()
        );

        let x = x.reshape([batch_size, CONV2_CHANNELS * POOLED_HEIGHT * POOLED_WIDTH]);
        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.out.forward(x)
    }

    /// Logits and the mean softmax cross-entropy against `targets`.
    pub fn forward_classification(
        &self,
        images: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let [batch_size, _] = images.dims();
        assert_eq!([batch_size], targets.dims());

        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;

    type B = NdArray<f32>;

    #[test]
    fn logits_have_one_column_per_class() {
        let device = Default::default();
        let model: ConvNet<B> = ConvNetConfig::new().init(&device);
        let images = Tensor::<B, 2>::ones([3, HEIGHT * WIDTH], &device);
        assert_eq!(model.forward(images).dims(), [3, NUM_CLASSES]);
    }

    #[test]
    fn parameter_count_matches_the_layout() {
        let device = Default::default();
        let model: ConvNet<B> = ConvNetConfig::new().init(&device);
        let expected = (5 * 5 * 32 + 32)
            + (5 * 5 * 32 * 64 + 64)
            + (7 * 7 * 64 * 1024 + 1024)
            + (1024 * 10 + 10);
        assert_eq!(model.num_params(), expected);
    }

    #[test]
    fn inference_ignores_dropout() {
        let device = Default::default();
        let model: ConvNet<Autodiff<B>> = ConvNetConfig::new()
            .with_keep_prob(0.5)
            .init(&device);
        let model = model.valid();
        let images = Tensor::<B, 2>::random(
            [2, HEIGHT * WIDTH],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let first = model.forward(images.clone());
        let second = model.forward(images);
        first.into_data().assert_eq(&second.into_data(), true);
    }

    #[test]
    fn classification_loss_is_a_finite_scalar() {
        let device = Default::default();
        let model: ConvNet<B> = ConvNetConfig::new()
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: 0.01,
            })
            .init(&device);
        let images = Tensor::<B, 2>::zeros([4, HEIGHT * WIDTH], &device);
        let targets = Tensor::<B, 1, Int>::from_data([0, 1, 2, 3], &device);
        let output = model.forward_classification(images, targets);
        assert_eq!(output.loss.dims(), [1]);
        assert!(crate::metric::measure(&output).loss.is_finite());
    }
}
