//! ResNet image classifier with Keras-style layer names.
//!
//! The default configuration is the ResNet-50 layout: a 7x7 stem, four
//! bottleneck stages with `[3, 4, 6, 3]` blocks and a softmax head. Block
//! outputs are named `conv{stage}_block{n}_out`, so `conv5_block3_out` is the
//! last residual block, an 8x8 feature map for 256x256 input.

use burn::module::{Ignored, Param};
use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::{relu, softmax};
use serde::{Deserialize, Serialize};

use lungcam_core::config::{INPUT_CHANNELS, N_CLASSES};

use crate::error::{ModelError, Result};
use crate::traits::{LayeredClassifier, ModelOutput};

/// Batch norm epsilon used by Keras ResNet50.
const BN_EPSILON: f64 = 1.001e-5;

/// Stage numbering starts at `conv2`, as in Keras.
const FIRST_STAGE: usize = 2;

/// Configuration for [`LungResNet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LungResNetConfig {
    /// Number of output classes.
    pub n_classes: usize,
    /// Number of input channels.
    pub in_channels: usize,
    /// Filters of the stem convolution.
    pub stem_filters: usize,
    /// Number of bottleneck blocks in each stage.
    pub stage_blocks: Vec<usize>,
    /// Bottleneck width of each stage (output is `width * expansion`).
    pub stage_filters: Vec<usize>,
    /// Channel expansion of the last 1x1 convolution in each block.
    pub expansion: usize,
}

impl Default for LungResNetConfig {
    fn default() -> Self {
        Self {
            n_classes: N_CLASSES,
            in_channels: INPUT_CHANNELS,
            stem_filters: 64,
            stage_blocks: vec![3, 4, 6, 3],
            stage_filters: vec![64, 128, 256, 512],
            expansion: 4,
        }
    }
}

impl LungResNetConfig {
    /// ResNet-50 layout with `n_classes` outputs.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            ..Default::default()
        }
    }

    /// Check that the configuration describes a buildable network.
    pub fn validate(&self) -> Result<()> {
        if self.stage_blocks.is_empty() || self.stage_blocks.len() != self.stage_filters.len() {
            return Err(ModelError::InvalidConfig(format!(
                "stage_blocks ({}) and stage_filters ({}) must be non-empty and equally long",
                self.stage_blocks.len(),
                self.stage_filters.len()
            )));
        }
        let zero_sized = [self.n_classes, self.in_channels, self.stem_filters, self.expansion]
            .into_iter()
            .chain(self.stage_blocks.iter().copied())
            .chain(self.stage_filters.iter().copied())
            .any(|v| v == 0);
        if zero_sized {
            return Err(ModelError::InvalidConfig(
                "all sizes and block counts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Probeable layer names, in forward order.
    pub fn layer_names(&self) -> Vec<String> {
        let mut names = vec!["conv1_relu".to_string(), "pool1_pool".to_string()];
        for (offset, &blocks) in self.stage_blocks.iter().enumerate() {
            let stage = FIRST_STAGE + offset;
            names.extend((1..=blocks).map(|block| format!("conv{stage}_block{block}_out")));
        }
        names
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<LungResNet<B>> {
        self.validate()?;
        Ok(LungResNet::new(self, device))
    }
}

/// Batch norm with frozen statistics.
///
/// Always normalizes with the stored running mean and variance, whatever the
/// backend, so a forward pass under autodiff never updates the statistics.
#[derive(Module, Debug)]
pub struct FrozenBatchNorm<B: Backend> {
    gamma: Param<Tensor<B, 1>>,
    beta: Param<Tensor<B, 1>>,
    running_mean: Param<Tensor<B, 1>>,
    running_var: Param<Tensor<B, 1>>,
}

impl<B: Backend> FrozenBatchNorm<B> {
    /// Identity-initialized batch norm over `channels`.
    pub fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            gamma: Param::from_tensor(Tensor::ones([channels], device)),
            beta: Param::from_tensor(Tensor::zeros([channels], device)),
            running_mean: Param::from_tensor(Tensor::zeros([channels], device)),
            running_var: Param::from_tensor(Tensor::ones([channels], device)),
        }
    }

    /// Normalize a `(N, C, H, W)` tensor.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [channels] = self.gamma.val().dims();
        let scale = self.gamma.val() / (self.running_var.val() + BN_EPSILON).sqrt();
        let shift = self.beta.val() - self.running_mean.val() * scale.clone();

        x * scale.reshape([1, channels, 1, 1]) + shift.reshape([1, channels, 1, 1])
    }
}

/// Bottleneck residual block: 1x1 reduce, 3x3, 1x1 expand, plus shortcut.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: FrozenBatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: FrozenBatchNorm<B>,
    conv3: Conv2d<B>,
    bn3: FrozenBatchNorm<B>,
    shortcut: Option<Conv2d<B>>,
    shortcut_bn: Option<FrozenBatchNorm<B>>,
}

impl<B: Backend> Bottleneck<B> {
    /// Create a new bottleneck block.
    ///
    /// The stride is applied by the first 1x1 convolution, as Keras does.
    pub fn new(
        in_channels: usize,
        width: usize,
        expansion: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let out_channels = width * expansion;

        let conv1 = Conv2dConfig::new([in_channels, width], [1, 1])
            .with_stride([stride, stride])
            .init(device);
        let bn1 = FrozenBatchNorm::new(width, device);

        let conv2 = Conv2dConfig::new([width, width], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let bn2 = FrozenBatchNorm::new(width, device);

        let conv3 = Conv2dConfig::new([width, out_channels], [1, 1]).init(device);
        let bn3 = FrozenBatchNorm::new(out_channels, device);

        // Projection shortcut if the shape changes
        let (shortcut, shortcut_bn) = if in_channels != out_channels || stride != 1 {
            let sc = Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .init(device);
            (Some(sc), Some(FrozenBatchNorm::new(out_channels, device)))
        } else {
            (None, None)
        };

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            conv3,
            bn3,
            shortcut,
            shortcut_bn,
        }
    }

    /// Forward pass.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = relu(self.bn1.forward(self.conv1.forward(x.clone())));
        let out = relu(self.bn2.forward(self.conv2.forward(out)));
        let out = self.bn3.forward(self.conv3.forward(out));

        let shortcut = match (&self.shortcut, &self.shortcut_bn) {
            (Some(sc), Some(sc_bn)) => sc_bn.forward(sc.forward(x)),
            _ => x,
        };

        relu(out + shortcut)
    }
}

/// ResNet classifier over channels-last `(1, 256, 256, 3)` input.
#[derive(Module, Debug)]
pub struct LungResNet<B: Backend> {
    stem: Conv2d<B>,
    stem_bn: FrozenBatchNorm<B>,
    pool: MaxPool2d,
    blocks: Vec<Bottleneck<B>>,
    gap: AdaptiveAvgPool2d,
    fc: Linear<B>,
    layer_names: Ignored<Vec<String>>,
}

impl<B: Backend> LungResNet<B> {
    /// Create a new model. Use [`LungResNetConfig::init`] to validate first.
    pub fn new(config: &LungResNetConfig, device: &B::Device) -> Self {
        let stem = Conv2dConfig::new([config.in_channels, config.stem_filters], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .init(device);
        let stem_bn = FrozenBatchNorm::new(config.stem_filters, device);
        let pool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut blocks = Vec::new();
        let mut in_channels = config.stem_filters;
        for (stage, (&n_blocks, &width)) in config
            .stage_blocks
            .iter()
            .zip(&config.stage_filters)
            .enumerate()
        {
            for block in 0..n_blocks {
                let stride = if stage > 0 && block == 0 { 2 } else { 1 };
                blocks.push(Bottleneck::new(in_channels, width, config.expansion, stride, device));
                in_channels = width * config.expansion;
            }
        }

        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc = LinearConfig::new(in_channels, config.n_classes).init(device);

        Self {
            stem,
            stem_bn,
            pool,
            blocks,
            gap,
            fc,
            layer_names: Ignored(config.layer_names()),
        }
    }

    /// Number of forward stages: stem, pool, then one per block.
    fn n_stages(&self) -> usize {
        2 + self.blocks.len()
    }

    fn position(&self, layer: &str) -> Result<usize> {
        self.layer_names
            .iter()
            .position(|name| name == layer)
            .ok_or_else(|| ModelError::LayerNotFound {
                layer: layer.to_string(),
                available: self.layer_names.0.clone(),
            })
    }

    /// Run stages `start..end` on a channels-first tensor.
    fn run(&self, x: Tensor<B, 4>, start: usize, end: usize) -> Tensor<B, 4> {
        (start..end).fold(x, |x, stage| match stage {
            0 => relu(self.stem_bn.forward(self.stem.forward(x))),
            1 => self.pool.forward(x),
            i => self.blocks[i - 2].forward(x),
        })
    }

    /// Pool, classify and normalize to probabilities.
    fn head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let pooled = self.gap.forward(features);
        let [batch, channels, _, _] = pooled.dims();
        let logits = self.fc.forward(pooled.reshape([batch, channels]));
        softmax(logits, 1)
    }

    /// Forward pass returning class probabilities.
    pub fn forward_probs(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.run(x.permute([0, 3, 1, 2]), 0, self.n_stages());
        self.head(features)
    }
}

impl<B: Backend> LayeredClassifier<B> for LungResNet<B> {
    fn layer_names(&self) -> Vec<String> {
        self.layer_names.0.clone()
    }

    fn forward_to(&self, x: Tensor<B, 4>, layer: &str) -> Result<Tensor<B, 4>> {
        let end = self.position(layer)? + 1;
        Ok(self.run(x.permute([0, 3, 1, 2]), 0, end))
    }

    fn forward_from(&self, activation: Tensor<B, 4>, layer: &str) -> Result<ModelOutput<B>> {
        let start = self.position(layer)? + 1;
        let features = self.run(activation, start, self.n_stages());
        Ok(ModelOutput::Single(self.head(features)))
    }

    fn forward(&self, x: Tensor<B, 4>) -> ModelOutput<B> {
        ModelOutput::Single(self.forward_probs(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lungcam_core::backend::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> LungResNetConfig {
        LungResNetConfig {
            stem_filters: 8,
            stage_blocks: vec![1, 1, 1, 3],
            stage_filters: vec![4, 4, 8, 8],
            expansion: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_is_resnet50() {
        let config = LungResNetConfig::default();
        assert_eq!(config.stage_blocks, vec![3, 4, 6, 3]);
        assert_eq!(config.n_classes, 4);

        let names = config.layer_names();
        assert_eq!(names.len(), 2 + 16);
        assert_eq!(names[2], "conv2_block1_out");
        assert_eq!(names.last().map(String::as_str), Some("conv5_block3_out"));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = small_config();
        config.stage_filters.pop();
        assert!(config.validate().is_err());

        let mut config = small_config();
        config.stage_blocks[0] = 0;
        assert!(config.init::<TestBackend>(&Default::default()).is_err());
    }

    #[test]
    fn test_feature_map_resolution() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::ones([1, 256, 256, 3], &device);

        let stem = model.forward_to(x.clone(), "conv1_relu").unwrap();
        assert_eq!(stem.dims(), [1, 8, 128, 128]);

        let pooled = model.forward_to(x.clone(), "pool1_pool").unwrap();
        assert_eq!(pooled.dims(), [1, 8, 64, 64]);

        let last = model.forward_to(x, "conv5_block3_out").unwrap();
        assert_eq!(last.dims(), [1, 16, 8, 8]);
    }

    #[test]
    fn test_unknown_layer() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::zeros([1, 256, 256, 3], &device);

        let err = model.forward_to(x, "not_a_real_layer").unwrap_err();
        match err {
            ModelError::LayerNotFound { layer, available } => {
                assert_eq!(layer, "not_a_real_layer");
                assert!(available.contains(&"conv5_block3_out".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_split_forward_matches_full_forward() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::random(
            [1, 256, 256, 3],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );

        let full: Vec<f32> = model.forward_probs(x.clone()).into_data().to_vec().unwrap();

        for layer in ["pool1_pool", "conv3_block1_out", "conv5_block3_out"] {
            let act = model.forward_to(x.clone(), layer).unwrap();
            let split = match model.forward_from(act, layer).unwrap() {
                ModelOutput::Single(p) => p,
                ModelOutput::Heads(_) => panic!("expected single output"),
            };
            let split: Vec<f32> = split.into_data().to_vec().unwrap();
            for (a, b) in full.iter().zip(&split) {
                assert!((a - b).abs() < 1e-5, "{layer}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::ones([1, 256, 256, 3], &device) * 0.5;

        let probs: Vec<f32> = model.forward_probs(x).into_data().to_vec().unwrap();
        assert_eq!(probs.len(), 4);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_frozen_batch_norm_identity() {
        let device = Default::default();
        let bn = FrozenBatchNorm::<TestBackend>::new(2, &device);
        let x = Tensor::<TestBackend, 4>::ones([1, 2, 3, 3], &device) * 3.0;

        let y: Vec<f32> = bn.forward(x).into_data().to_vec().unwrap();
        for v in y {
            assert!((v - 3.0).abs() < 1e-3);
        }
    }
}
