//! Parameter layout of the convolutional encoder and the temporal-contrasting
//! model, initialized deterministically from the run seed.
//!
//! Keys follow the module structure of the training backend so checkpoints it
//! writes line up with what is built here.

use super::ModelFactory;
use crate::datasets::DatasetConfig;
use crate::error::StageError;
use crate::model::{Device, ModelPair, ModelState};
use crate::tensor::{ParameterMapping, Tensor};
use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;

/// Output channels of the first two conv blocks.
const BLOCK1_CHANNELS: usize = 32;
const BLOCK2_CHANNELS: usize = 64;
/// Kernel width of conv blocks 2 and 3.
const INNER_KERNEL: usize = 8;

/// Builds the standard encoder / temporal-contrasting layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutModelFactory;

impl ModelFactory for LayoutModelFactory {
    fn build(
        &self,
        config: &DatasetConfig,
        seed: u64,
        device: &Device,
    ) -> Result<ModelPair, StageError> {
        if config.final_out_channels < 4 || config.tc.hidden_dim == 0 {
            return Err(StageError::collaborator(
                "model factory",
                "final_out_channels must be at least 4 and hidden_dim non-zero",
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let model = encoder_layout(config, &mut rng);
        let temporal_contr_model = temporal_contrast_layout(config, &mut rng);
        tracing::debug!(
            device = %device,
            model_parameters = model.len(),
            temporal_contr_parameters = temporal_contr_model.len(),
            "Built model pair"
        );

        Ok(ModelPair {
            model: ModelState::new(model),
            temporal_contr_model: ModelState::new(temporal_contr_model),
        })
    }
}

fn encoder_layout(config: &DatasetConfig, rng: &mut StdRng) -> ParameterMapping {
    let mut params = ParameterMapping::new();
    let blocks = [
        (BLOCK1_CHANNELS, config.input_channels, config.kernel_size),
        (BLOCK2_CHANNELS, BLOCK1_CHANNELS, INNER_KERNEL),
        (config.final_out_channels, BLOCK2_CHANNELS, INNER_KERNEL),
    ];
    for (i, (out_ch, in_ch, kernel)) in blocks.into_iter().enumerate() {
        let block = format!("conv_block{}", i + 1);
        // bias-free conv followed by batch norm
        params.insert(
            format!("{block}.0.weight"),
            uniform(vec![out_ch, in_ch, kernel], in_ch * kernel, rng),
        );
        batch_norm(&mut params, &format!("{block}.1"), out_ch);
    }

    let flat = config.features_len * config.final_out_channels;
    params.insert(
        "logits.weight",
        uniform(vec![config.num_classes, flat], flat, rng),
    );
    params.insert("logits.bias", uniform(vec![config.num_classes], flat, rng));
    params
}

fn temporal_contrast_layout(config: &DatasetConfig, rng: &mut StdRng) -> ParameterMapping {
    let channels = config.final_out_channels;
    let hidden = config.tc.hidden_dim;
    let mut params = ParameterMapping::new();

    for i in 0..config.tc.timesteps {
        params.insert(format!("Wk.{i}.weight"), uniform(vec![channels, hidden], hidden, rng));
        params.insert(format!("Wk.{i}.bias"), uniform(vec![channels], hidden, rng));
    }

    let half = channels / 2;
    let quarter = channels / 4;
    params.insert("projection_head.0.weight", uniform(vec![half, hidden], hidden, rng));
    params.insert("projection_head.0.bias", uniform(vec![half], hidden, rng));
    batch_norm(&mut params, "projection_head.1", half);
    params.insert("projection_head.3.weight", uniform(vec![quarter, half], half, rng));
    params.insert("projection_head.3.bias", uniform(vec![quarter], half, rng));

    params.insert(
        "seq_transformer.patch_to_embedding.weight",
        uniform(vec![hidden, channels], channels, rng),
    );
    params.insert(
        "seq_transformer.patch_to_embedding.bias",
        uniform(vec![hidden], channels, rng),
    );
    params.insert(
        "seq_transformer.c_token",
        uniform(vec![1, 1, hidden], hidden, rng),
    );
    params
}

fn batch_norm(params: &mut ParameterMapping, prefix: &str, features: usize) {
    params.insert(format!("{prefix}.weight"), Tensor::full(vec![features], 1.0));
    params.insert(format!("{prefix}.bias"), Tensor::zeros(vec![features]));
    params.insert(format!("{prefix}.running_mean"), Tensor::zeros(vec![features]));
    params.insert(format!("{prefix}.running_var"), Tensor::full(vec![features], 1.0));
    params.insert(format!("{prefix}.num_batches_tracked"), Tensor::scalar(0.0));
}

/// U(-1/sqrt(fan_in), 1/sqrt(fan_in))
fn uniform(shape: Vec<usize>, fan_in: usize, rng: &mut StdRng) -> Tensor {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    let dist = Uniform::new(-bound, bound);
    let numel = shape.iter().product();
    Tensor {
        shape,
        data: (0..numel).map(|_| dist.sample(rng)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_keys_and_shapes() {
        let config = DatasetConfig::epilepsy();
        let pair = LayoutModelFactory
            .build(&config, 0, &Device::cpu())
            .unwrap();
        let params = pair.model.parameters();

        assert_eq!(
            params.get("conv_block1.0.weight").unwrap().shape,
            vec![32, 1, 8]
        );
        assert_eq!(
            params.get("conv_block3.0.weight").unwrap().shape,
            vec![128, 64, 8]
        );
        assert_eq!(
            params.get("logits.weight").unwrap().shape,
            vec![2, 24 * 128]
        );
        assert!(params.get("conv_block2.1.num_batches_tracked").unwrap().shape.is_empty());
        // 3 blocks x (conv + 5 batch-norm entries) + logits weight/bias
        assert_eq!(params.len(), 3 * 6 + 2);
    }

    #[test]
    fn test_temporal_contrast_keys() {
        let config = DatasetConfig::epilepsy();
        let pair = LayoutModelFactory
            .build(&config, 0, &Device::cpu())
            .unwrap();
        let tc = pair.temporal_contr_model.parameters();

        assert!(tc.contains_key("Wk.9.weight"));
        assert!(!tc.contains_key("Wk.10.weight"));
        assert_eq!(tc.get("projection_head.3.weight").unwrap().shape, vec![32, 64]);
    }

    #[test]
    fn test_same_seed_same_initialization() {
        let config = DatasetConfig::har();
        let a = LayoutModelFactory.build(&config, 42, &Device::cpu()).unwrap();
        let b = LayoutModelFactory.build(&config, 42, &Device::cpu()).unwrap();
        let c = LayoutModelFactory.build(&config, 43, &Device::cpu()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.model.parameters(), c.model.parameters());
    }

    #[test]
    fn test_initialized_values_within_bound() {
        let config = DatasetConfig::epilepsy();
        let pair = LayoutModelFactory.build(&config, 1, &Device::cpu()).unwrap();
        let w = pair.model.parameters().get("conv_block1.0.weight").unwrap();
        let bound = 1.0 / (8.0f32).sqrt();
        assert!(w.data.iter().all(|v| v.abs() <= bound));
    }
}
