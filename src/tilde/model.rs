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

use crate::backbone::{BackboneConfig, MaskedLmBackbone};
use crate::training::QlmTrainingBatch;
use crate::TildeError;
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tch::nn::OptimizerConfig;
use tch::{nn, Kind, Tensor};

/// Fixed learning rate of the quasi-language-model objective. No schedule is
/// applied to this model.
const QLM_LEARNING_RATE: f64 = 2e-5;

/// Accumulated binary relevance term for one side of a training batch.
///
/// For every batch element, vocabulary entries are split by their 0/1 label
/// into positives and negatives, and the term accumulates
/// `-Σ log σ(x_pos) - Σ log(1 - σ(x_neg))` across the batch. The two sums are
/// computed with the fused log-sigmoid identity
/// (`log(1 - σ(x)) = logsigmoid(-x)`) so probabilities saturating at 0 or 1
/// cannot produce an infinite loss. An empty positive or negative set
/// contributes zero.
///
/// # Arguments
///
/// * `logits` - Vocabulary logits of shape (*batch size*, *vocab_size*)
/// * `labels` - 0/1 relevance labels of shape (*batch size*, *vocab_size*)
pub fn binary_relevance_term(logits: &Tensor, labels: &Tensor) -> Tensor {
    let labels = labels.to_kind(Kind::Float);
    let positive_term = &labels * logits.log_sigmoid();
    let negative_term = (labels.ones_like() - &labels) * logits.neg().log_sigmoid();
    (positive_term + negative_term).sum(Kind::Float).neg()
}

/// # TILDE bi-directional quasi-language-model
/// Scores every vocabulary entry for its likelihood of appearing in a query
/// matching a given passage (and vice versa), through the first output position
/// of a masked language model head. Trained with a dual-sided binary relevance
/// loss restricted to valid (non stop) vocabulary tokens.
pub struct TildeModel {
    backbone: MaskedLmBackbone,
    stop_ids: HashSet<i64>,
    vocab_size: i64,
    num_valid_tokens: i64,
}

impl TildeModel {
    /// Build a new `TildeModel`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the model
    /// * `config` - `BackboneConfig` object defining the backbone architecture and vocab size
    /// * `stop_ids` - Vocabulary ids excluded from relevance scoring, computed once per
    ///   tokenizer by [`get_stop_ids`](crate::tilde::get_stop_ids)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_tilde::backbone::BackboneConfig;
    /// use rust_tilde::tilde::{get_stop_ids, TildeModel};
    /// use rust_tilde::Config;
    /// use rust_tokenizers::vocab::{BertVocab, Vocab};
    /// use std::path::Path;
    /// use tch::{nn, Device};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let device = Device::cuda_if_available();
    /// let vs = nn::VarStore::new(device);
    /// let config = BackboneConfig::from_file(Path::new("path/to/config.json"));
    /// let vocab = BertVocab::from_file("path/to/vocab.txt")?;
    /// let model = TildeModel::new(&vs.root(), &config, get_stop_ids(&vocab));
    /// # Ok(())
    /// # }
    /// ```
    pub fn new<'p, P>(p: P, config: &BackboneConfig, stop_ids: HashSet<i64>) -> TildeModel
    where
        P: Borrow<nn::Path<'p>>,
    {
        let backbone = MaskedLmBackbone::new(p, config);
        let num_valid_tokens = config.vocab_size - stop_ids.len() as i64;

        TildeModel {
            backbone,
            stop_ids,
            vocab_size: config.vocab_size,
            num_valid_tokens,
        }
    }

    /// Vocabulary size of the underlying backbone.
    pub fn vocab_size(&self) -> i64 {
        self.vocab_size
    }

    /// Number of vocabulary entries participating in the loss:
    /// vocabulary size minus the number of stop token ids.
    pub fn num_valid_tokens(&self) -> i64 {
        self.num_valid_tokens
    }

    /// Vocabulary ids excluded from relevance scoring.
    pub fn stop_ids(&self) -> &HashSet<i64> {
        &self.stop_ids
    }

    /// Scores every vocabulary entry for a batch of tokenized sequences.
    ///
    /// Runs the backbone and returns the vocabulary logits at the first output
    /// position (the expansion position), with no activation applied.
    ///
    /// # Arguments
    ///
    /// * `input_ids` - Token ids of shape (*batch size*, *sequence_length*)
    /// * `token_type_ids` - Optional segment ids of the same shape. If None set to 0.
    /// * `attention_mask` - Optional 0/1 mask of the same shape. If None set to 1.
    /// * `train` - boolean flag to turn on/off the dropout layers in the model. Should be set to false for inference.
    ///
    /// # Returns
    ///
    /// * `Tensor` of shape (*batch size*, *vocab_size*)
    pub fn score(
        &self,
        input_ids: &Tensor,
        token_type_ids: Option<&Tensor>,
        attention_mask: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor, TildeError> {
        let logits = self
            .backbone
            .forward_t(input_ids, attention_mask, token_type_ids, train)?;
        Ok(logits.select(1, 0))
    }

    /// Single training step over a passage/query batch.
    ///
    /// Both sides are scored independently; the two accumulated binary
    /// relevance terms are summed and normalized by
    /// `num_valid_tokens * 2`, the size of the scoring surface across the
    /// two-sided objective.
    ///
    /// # Returns
    ///
    /// * Scalar loss `Tensor`, differentiable with respect to the backbone parameters
    pub fn training_step(&self, batch: &QlmTrainingBatch) -> Result<Tensor, TildeError> {
        let passage_logits = self.score(
            &batch.passage_input_ids,
            Some(&batch.passage_token_type_ids),
            Some(&batch.passage_attention_mask),
            true,
        )?;
        let query_logits = self.score(
            &batch.query_input_ids,
            Some(&batch.query_token_type_ids),
            Some(&batch.query_attention_mask),
            true,
        )?;

        let passage_term = binary_relevance_term(&passage_logits, &batch.passage_target_labels);
        let query_term = binary_relevance_term(&query_logits, &batch.query_target_labels);

        Ok((passage_term + query_term) / ((self.num_valid_tokens * 2) as f64))
    }

    /// Adam optimizer over the model parameters at the fixed quasi-language-model
    /// learning rate.
    pub fn configure_optimizer(&self, vs: &nn::VarStore) -> Result<nn::Optimizer, TildeError> {
        Ok(nn::Adam::default().build(vs, QLM_LEARNING_RATE)?)
    }

    /// Persists the backbone weights and configuration to `target_dir`.
    ///
    /// Only the backbone is serialized; the loss machinery holds no state of
    /// its own. The directory is created if missing and receives `model.ot`
    /// (weights) and `config.json`.
    pub fn save<P: AsRef<Path>>(
        &self,
        vs: &nn::VarStore,
        config: &BackboneConfig,
        target_dir: P,
    ) -> Result<(), TildeError> {
        let target_dir = target_dir.as_ref();
        fs::create_dir_all(target_dir)?;
        vs.save(target_dir.join("model.ot"))?;
        let config_json = serde_json::to_string_pretty(config)?;
        fs::write(target_dir.join("config.json"), config_json)?;
        Ok(())
    }
}
