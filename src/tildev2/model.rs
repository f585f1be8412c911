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

use crate::backbone::{BackboneConfig, BackboneModel};
use crate::training::{RankingBatch, SequenceBatch};
use crate::TildeError;
use std::borrow::Borrow;
use tch::nn::Init;
use tch::{nn, Kind, Tensor};

/// Returns a copy of `attention_mask` with the separator position of every row
/// zeroed out, removing the trailing separator token from interaction-score
/// contribution.
///
/// The separator of a row is its last attended position, located at
/// `sum(row) - 1`. Exactly one position per row is zeroed; all other positions
/// are unchanged. The input tensor is never mutated, so a mask reused elsewhere
/// in a batch pipeline keeps its original content.
pub fn mask_sep(attention_mask: &Tensor) -> Tensor {
    let sep_positions = attention_mask.sum_dim_intlist([1].as_slice(), true, Kind::Int64) - 1;
    attention_mask.scatter(1, &sep_positions, &Tensor::zeros_like(attention_mask))
}

/// Builds the binary exact-match gate between query and document token ids.
///
/// The gate has shape (*num queries*, *query_len*, *num documents*, *doc_len*)
/// and holds 1.0 where the query token id equals the document token id, 0.0
/// everywhere else.
pub fn exact_match_gate(qry_input_ids: &Tensor, doc_input_ids: &Tensor) -> Tensor {
    let qry_ids = qry_input_ids.unsqueeze(2).unsqueeze(3); // Q x LQ x 1 x 1
    let doc_ids = doc_input_ids.unsqueeze(0).unsqueeze(1); // 1 x 1 x D x LD
    doc_ids.eq_tensor(&qry_ids).to_kind(Kind::Float)
}

/// Computes the cartesian exact-match interaction score between every query and
/// every document of a batch.
///
/// The raw cartesian product of query and document token weights is gated by
/// [`exact_match_gate`], max-pooled over document positions (duplicate matches
/// within the same document count once), weighted by the separator-masked query
/// attention mask and summed over query positions, skipping position 0 (the
/// leading classification token).
///
/// # Arguments
///
/// * `doc_reps` - Document token weights, shape (*D*, *LD*, 1)
/// * `doc_input_ids` - Document token ids, shape (*D*, *LD*)
/// * `qry_reps` - Query token weights, shape (*Q*, *LQ*, 1)
/// * `qry_input_ids` - Query token ids, shape (*Q*, *LQ*)
/// * `qry_attention_mask` - Separator-masked query attention mask, shape (*Q*, *LQ*)
///
/// # Returns
///
/// * Score matrix `Tensor` of shape (*Q*, *D*); every cell is non-negative
pub fn compute_tok_score_cartesian(
    doc_reps: &Tensor,
    doc_input_ids: &Tensor,
    qry_reps: &Tensor,
    qry_input_ids: &Tensor,
    qry_attention_mask: &Tensor,
) -> Tensor {
    let exact_match = exact_match_gate(qry_input_ids, doc_input_ids); // Q x LQ x D x LD

    let qry_shape = qry_reps.size();
    let doc_shape = doc_reps.size();
    let scores_no_masking = qry_reps
        .view([-1, 1]) // (Q * LQ) x d
        .matmul(&doc_reps.view([-1, 1]).transpose(0, 1)) // d x (D * LD)
        .view([qry_shape[0], qry_shape[1], doc_shape[0], doc_shape[1]]); // Q x LQ x D x LD

    // max pooling over duplicate matches within the same document
    let (scores, _) = (scores_no_masking * exact_match).max_dim(3, false); // Q x LQ x D

    let masked_scores = scores * qry_attention_mask.to_kind(Kind::Float).unsqueeze(2);
    let query_length = masked_scores.size()[1];
    masked_scores
        .slice(1, 1, query_length, 1)
        .sum_dim_intlist([1].as_slice(), false, Kind::Float) // Q x D
}

/// Ranking labels for a grouped-candidate score matrix: the positive document
/// of query `i` occupies slot 0 of its group, at column `i * train_group_size`.
pub fn ranking_labels(num_queries: i64, train_group_size: i64, device: tch::Device) -> Tensor {
    Tensor::arange(num_queries, (Kind::Int64, device)) * train_group_size
}

/// # TILDEv2 token-interaction scoring model
/// Encodes documents into per-token non-negative weights and ranks grouped
/// candidate documents against their query with a sparse exact-match
/// interaction score. Query tokens carry a uniform weight of 1: only the
/// document-side weighting is learned.
pub struct TildeV2Model {
    backbone: BackboneModel,
    tok_proj: nn::Linear,
    train_group_size: i64,
}

impl TildeV2Model {
    /// Build a new `TildeV2Model`
    ///
    /// The token projection layer is initialized from a Gaussian with the
    /// backbone's `initializer_range` standard deviation and a zero bias, so
    /// warm starts from checkpoints of the same family reproduce the original
    /// training dynamics.
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the model
    /// * `config` - `BackboneConfig` object defining the backbone architecture
    /// * `train_group_size` - Number of candidate documents per query, exactly one
    ///   of which (slot 0) is the positive
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_tilde::backbone::BackboneConfig;
    /// use rust_tilde::tildev2::TildeV2Model;
    /// use rust_tilde::Config;
    /// use std::path::Path;
    /// use tch::{nn, Device};
    ///
    /// let device = Device::cuda_if_available();
    /// let vs = nn::VarStore::new(device);
    /// let config = BackboneConfig::from_file(Path::new("path/to/config.json"));
    /// let model = TildeV2Model::new(&vs.root(), &config, 8);
    /// ```
    pub fn new<'p, P>(p: P, config: &BackboneConfig, train_group_size: i64) -> TildeV2Model
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let backbone = BackboneModel::new(p / "bert", config);
        let projection_config = nn::LinearConfig {
            ws_init: Init::Randn {
                mean: 0.,
                stdev: config.initializer_range,
            },
            bs_init: Some(Init::Const(0.)),
            ..Default::default()
        };
        let tok_proj = nn::linear(p / "tok_proj", config.hidden_size, 1, projection_config);

        TildeV2Model {
            backbone,
            tok_proj,
            train_group_size,
        }
    }

    /// Number of candidate documents per query group.
    pub fn train_group_size(&self) -> i64 {
        self.train_group_size
    }

    /// Encodes a batch of sequences into per-token non-negative weights.
    ///
    /// All three of `{input_ids, attention_mask, token_type_ids}` are required
    /// with identical shapes; a mismatch is a caller contract violation
    /// surfaced before any tensor computation runs. Hidden states are projected
    /// to a scalar per position and rectified, so no weight is ever negative.
    ///
    /// # Returns
    ///
    /// * `Tensor` of shape (*batch size*, *sequence_length*, 1)
    pub fn encode(&self, features: &SequenceBatch, train: bool) -> Result<Tensor, TildeError> {
        features.validate()?;
        let hidden_states = self.backbone.forward_t(
            &features.input_ids,
            Some(&features.attention_mask),
            Some(&features.token_type_ids),
            train,
        )?;
        Ok(hidden_states.apply(&self.tok_proj).relu())
    }

    /// Forward pass over one ranking batch.
    ///
    /// Only the document side is encoded (query weights are fixed at 1). The
    /// cartesian score matrix is ranked with a mean-reduced cross-entropy
    /// against the slot-0 group labels.
    ///
    /// # Returns
    ///
    /// * `(loss, scores)` - scalar ranking loss and the flattened
    ///   (*num queries* x *num documents*) score matrix
    pub fn forward(
        &self,
        batch: &RankingBatch,
        train: bool,
    ) -> Result<(Tensor, Tensor), TildeError> {
        batch.query.validate()?;
        if batch.documents.len() != self.train_group_size * batch.query.len() {
            return Err(TildeError::ValueError(format!(
                "document batch size ({}) must equal train_group_size ({}) x number of queries ({})",
                batch.documents.len(),
                self.train_group_size,
                batch.query.len()
            )));
        }

        let doc_reps = self.encode(&batch.documents, train)?;
        let doc_input_ids = &batch.documents.input_ids;

        let qry_input_ids = &batch.query.input_ids;
        let qry_attention_mask = mask_sep(&batch.query.attention_mask);
        let qry_reps = qry_input_ids.ones_like().to_kind(Kind::Float).unsqueeze(2);

        let scores = compute_tok_score_cartesian(
            &doc_reps,
            doc_input_ids,
            &qry_reps,
            qry_input_ids,
            &qry_attention_mask,
        ); // Q x D

        let labels = ranking_labels(scores.size()[0], self.train_group_size, scores.device());
        let loss = scores.cross_entropy_for_logits(&labels);
        Ok((loss, scores.view(-1)))
    }
}
