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

use crate::backbone::model::BackboneConfig;
use crate::common::dropout::Dropout;
use std::borrow::Borrow;
use tch::nn::{embedding, EmbeddingConfig};
use tch::{nn, Kind, Tensor};

#[derive(Debug)]
/// # Embedding layer for the backbone encoder
/// Sums word, position and segment embeddings before layer normalization and dropout.
pub struct BackboneEmbeddings {
    word_embeddings: nn::Embedding,
    position_embeddings: nn::Embedding,
    token_type_embeddings: nn::Embedding,
    layer_norm: nn::LayerNorm,
    dropout: Dropout,
}

impl BackboneEmbeddings {
    /// Build a new `BackboneEmbeddings`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the embedding layer
    /// * `config` - `BackboneConfig` object defining the vocabulary, position and hidden sizes
    pub fn new<'p, P>(p: P, config: &BackboneConfig) -> BackboneEmbeddings
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let embedding_config = EmbeddingConfig {
            padding_idx: 0,
            ..Default::default()
        };

        let word_embeddings = embedding(
            p / "word_embeddings",
            config.vocab_size,
            config.hidden_size,
            embedding_config,
        );

        let position_embeddings = embedding(
            p / "position_embeddings",
            config.max_position_embeddings,
            config.hidden_size,
            Default::default(),
        );

        let token_type_embeddings = embedding(
            p / "token_type_embeddings",
            config.type_vocab_size,
            config.hidden_size,
            Default::default(),
        );

        let layer_norm_config = nn::LayerNormConfig {
            eps: config.layer_norm_eps.unwrap_or(1e-12),
            ..Default::default()
        };
        let layer_norm =
            nn::layer_norm(p / "LayerNorm", vec![config.hidden_size], layer_norm_config);
        let dropout = Dropout::new(config.hidden_dropout_prob);
        BackboneEmbeddings {
            word_embeddings,
            position_embeddings,
            token_type_embeddings,
            layer_norm,
            dropout,
        }
    }

    /// Forward pass through the embedding layer
    ///
    /// # Arguments
    ///
    /// * `input_ids` - Input tensor of shape (*batch size*, *sequence_length*)
    /// * `token_type_ids` - Optional segment id of shape (*batch size*, *sequence_length*). If None set to 0.
    /// * `train` - boolean flag to turn on/off the dropout layers in the model. Should be set to false for inference.
    ///
    /// # Returns
    ///
    /// * `Tensor` of shape (*batch size*, *sequence_length*, *hidden_size*)
    pub fn forward_t(
        &self,
        input_ids: &Tensor,
        token_type_ids: Option<&Tensor>,
        train: bool,
    ) -> Tensor {
        let input_shape = input_ids.size();
        let seq_length = input_shape[1];
        let device = input_ids.device();

        let position_ids = Tensor::arange(seq_length, (Kind::Int64, device))
            .unsqueeze(0)
            .expand(&input_shape, true);

        let calc_token_type_ids = if token_type_ids.is_none() {
            Some(Tensor::zeros(&input_shape, (Kind::Int64, device)))
        } else {
            None
        };
        let token_type_ids =
            token_type_ids.unwrap_or_else(|| calc_token_type_ids.as_ref().unwrap());

        let embeddings: Tensor = input_ids.apply(&self.word_embeddings)
            + position_ids.apply(&self.position_embeddings)
            + token_type_ids.apply(&self.token_type_embeddings);

        embeddings
            .apply(&self.layer_norm)
            .apply_t(&self.dropout, train)
    }
}
