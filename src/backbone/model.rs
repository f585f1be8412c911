// Copyright 2019-present, the HuggingFace Inc. team, The Google AI Language Team and Facebook, Inc.
// Copyright 2021 The ielab team, The University of Queensland
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::backbone::embeddings::BackboneEmbeddings;
use crate::backbone::encoder::Encoder;
use crate::common::activations::{Activation, TensorFunction};
use crate::common::linear::{linear_no_bias, LinearNoBias};
use crate::{Config, TildeError};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tch::nn::init::DEFAULT_KAIMING_UNIFORM;
use tch::{nn, Kind, Tensor};

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # Backbone encoder configuration
/// Defines the architecture of the bidirectional encoder the TILDE models are
/// built on (number of layers, hidden layer size, vocabulary size...). The field
/// structure follows the Transformers library configuration for the BERT family,
/// allowing converted checkpoints of that family to be used without remapping.
pub struct BackboneConfig {
    pub hidden_act: Activation,
    pub attention_probs_dropout_prob: f64,
    pub hidden_dropout_prob: f64,
    pub hidden_size: i64,
    pub initializer_range: f64,
    pub intermediate_size: i64,
    pub layer_norm_eps: Option<f64>,
    pub max_position_embeddings: i64,
    pub num_attention_heads: i64,
    pub num_hidden_layers: i64,
    pub type_vocab_size: i64,
    pub vocab_size: i64,
}

impl Config for BackboneConfig {}

impl Default for BackboneConfig {
    fn default() -> Self {
        BackboneConfig {
            hidden_act: Activation::gelu,
            attention_probs_dropout_prob: 0.1,
            hidden_dropout_prob: 0.1,
            hidden_size: 768,
            initializer_range: 0.02,
            intermediate_size: 3072,
            layer_norm_eps: Some(1e-12),
            max_position_embeddings: 512,
            num_attention_heads: 12,
            num_hidden_layers: 12,
            type_vocab_size: 2,
            vocab_size: 30522,
        }
    }
}

/// # Backbone encoder model
/// Maps `(input_ids, attention_mask, token_type_ids)` to per-token hidden states.
/// It is made of the following blocks:
/// - `embeddings`: `token`, `position` and `segment_id` embeddings
/// - `encoder`: stack of bi-directional transformer layers
///
/// The pooling layer present in classification-oriented variants is omitted: both
/// TILDE models consume the full hidden state sequence.
pub struct BackboneModel {
    embeddings: BackboneEmbeddings,
    encoder: Encoder,
}

impl BackboneModel {
    /// Build a new `BackboneModel`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the backbone model
    /// * `config` - `BackboneConfig` object defining the model architecture
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_tilde::backbone::{BackboneConfig, BackboneModel};
    /// use rust_tilde::Config;
    /// use std::path::Path;
    /// use tch::{nn, Device};
    ///
    /// let config_path = Path::new("path/to/config.json");
    /// let device = Device::Cpu;
    /// let p = nn::VarStore::new(device);
    /// let config = BackboneConfig::from_file(config_path);
    /// let backbone = BackboneModel::new(&p.root() / "bert", &config);
    /// ```
    pub fn new<'p, P>(p: P, config: &BackboneConfig) -> BackboneModel
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let embeddings = BackboneEmbeddings::new(p / "embeddings", config);
        let encoder = Encoder::new(p / "encoder", config);

        BackboneModel {
            embeddings,
            encoder,
        }
    }

    /// Forward pass through the model
    ///
    /// # Arguments
    ///
    /// * `input_ids` - Input tensor of shape (*batch size*, *sequence_length*)
    /// * `mask` - Optional mask of shape (*batch size*, *sequence_length*). Masked positions have value 0, non-masked value 1. If None set to 1.
    /// * `token_type_ids` - Optional segment id of shape (*batch size*, *sequence_length*). Convention is value of 0 for the first sentence (incl. *SEP*) and 1 for the second sentence. If None set to 0.
    /// * `train` - boolean flag to turn on/off the dropout layers in the model. Should be set to false for inference.
    ///
    /// # Returns
    ///
    /// * `Tensor` of shape (*batch size*, *sequence_length*, *hidden_size*) holding the last hidden states
    pub fn forward_t(
        &self,
        input_ids: &Tensor,
        mask: Option<&Tensor>,
        token_type_ids: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor, TildeError> {
        let input_shape = input_ids.size();
        if input_shape.len() != 2 {
            return Err(TildeError::ValueError(format!(
                "Invalid input ids dimension, expected 2, got {}",
                input_shape.len()
            )));
        }
        let device = input_ids.device();

        let calc_mask = Tensor::ones(&input_shape, (Kind::Int8, device));
        let mask = mask.unwrap_or(&calc_mask);

        let extended_attention_mask = match mask.dim() {
            3 => mask.unsqueeze(1),
            2 => mask.unsqueeze(1).unsqueeze(1),
            _ => {
                return Err(TildeError::ValueError(
                    "Invalid attention mask dimension, must be 2 or 3".into(),
                ));
            }
        };

        let embedding_output = self.embeddings.forward_t(input_ids, token_type_ids, train);

        let extended_attention_mask: Tensor =
            ((extended_attention_mask.ones_like() - extended_attention_mask) * -10000.0)
                .to_kind(embedding_output.kind());

        Ok(self
            .encoder
            .forward_t(&embedding_output, Some(&extended_attention_mask), train))
    }
}

pub struct PredictionHeadTransform {
    dense: nn::Linear,
    activation: TensorFunction,
    layer_norm: nn::LayerNorm,
}

impl PredictionHeadTransform {
    pub fn new<'p, P>(p: P, config: &BackboneConfig) -> PredictionHeadTransform
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let dense = nn::linear(
            p / "dense",
            config.hidden_size,
            config.hidden_size,
            Default::default(),
        );
        let activation = config.hidden_act.get_function();
        let layer_norm_config = nn::LayerNormConfig {
            eps: config.layer_norm_eps.unwrap_or(1e-12),
            ..Default::default()
        };
        let layer_norm =
            nn::layer_norm(p / "LayerNorm", vec![config.hidden_size], layer_norm_config);

        PredictionHeadTransform {
            dense,
            activation,
            layer_norm,
        }
    }

    pub fn forward(&self, hidden_states: &Tensor) -> Tensor {
        self.activation.get_fn()(&hidden_states.apply(&self.dense)).apply(&self.layer_norm)
    }
}

/// # Masked language model head
/// Projects per-token hidden states to per-token vocabulary logits through the
/// prediction head transform, a no-bias decoder projection and an output bias.
pub struct MaskedLmHead {
    transform: PredictionHeadTransform,
    decoder: LinearNoBias,
    bias: Tensor,
}

impl MaskedLmHead {
    pub fn new<'p, P>(p: P, config: &BackboneConfig) -> MaskedLmHead
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow() / "predictions";
        let transform = PredictionHeadTransform::new(&p / "transform", config);
        let decoder = linear_no_bias(
            &p / "decoder",
            config.hidden_size,
            config.vocab_size,
            Default::default(),
        );
        let bias = p.var("bias", &[config.vocab_size], DEFAULT_KAIMING_UNIFORM);

        MaskedLmHead {
            transform,
            decoder,
            bias,
        }
    }

    pub fn forward(&self, hidden_states: &Tensor) -> Tensor {
        self.transform.forward(hidden_states).apply(&self.decoder) + &self.bias
    }
}

/// # Backbone with a masked language model head
/// Maps `(input_ids, attention_mask, token_type_ids)` to per-token vocabulary
/// logits of shape (*batch size*, *sequence_length*, *vocab_size*).
/// It is made of the following blocks:
/// - `backbone`: Base `BackboneModel`
/// - `cls`: masked language model prediction head
pub struct MaskedLmBackbone {
    backbone: BackboneModel,
    cls: MaskedLmHead,
}

impl MaskedLmBackbone {
    /// Build a new `MaskedLmBackbone`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the model
    /// * `config` - `BackboneConfig` object defining the model architecture and vocab size
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_tilde::backbone::{BackboneConfig, MaskedLmBackbone};
    /// use rust_tilde::Config;
    /// use std::path::Path;
    /// use tch::{nn, Device};
    ///
    /// let config_path = Path::new("path/to/config.json");
    /// let device = Device::Cpu;
    /// let p = nn::VarStore::new(device);
    /// let config = BackboneConfig::from_file(config_path);
    /// let model = MaskedLmBackbone::new(&p.root(), &config);
    /// ```
    pub fn new<'p, P>(p: P, config: &BackboneConfig) -> MaskedLmBackbone
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let backbone = BackboneModel::new(p / "bert", config);
        let cls = MaskedLmHead::new(p / "cls", config);

        MaskedLmBackbone { backbone, cls }
    }

    /// Forward pass through the model, returning per-token vocabulary logits of
    /// shape (*batch size*, *sequence_length*, *vocab_size*).
    pub fn forward_t(
        &self,
        input_ids: &Tensor,
        mask: Option<&Tensor>,
        token_type_ids: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor, TildeError> {
        let hidden_states = self
            .backbone
            .forward_t(input_ids, mask, token_type_ids, train)?;
        Ok(self.cls.forward(&hidden_states))
    }
}
