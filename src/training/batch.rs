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

use crate::TildeError;
use tch::{Device, Tensor};

/// # Tokenized sequence batch
/// Fixed-length token id sequences with their segment ids and attention mask.
/// All three tensors must share the shape (*batch size*, *sequence_length*);
/// `validate` surfaces a shape mismatch as a caller contract violation before
/// any tensor computation runs.
pub struct SequenceBatch {
    /// Token ids, shape (*batch size*, *sequence_length*)
    pub input_ids: Tensor,
    /// Segment ids marking which sub-span each position belongs to
    pub token_type_ids: Tensor,
    /// 0/1 mask marking real vs padding tokens
    pub attention_mask: Tensor,
}

impl SequenceBatch {
    pub fn new(
        input_ids: Tensor,
        token_type_ids: Tensor,
        attention_mask: Tensor,
    ) -> Result<SequenceBatch, TildeError> {
        let batch = SequenceBatch {
            input_ids,
            token_type_ids,
            attention_mask,
        };
        batch.validate()?;
        Ok(batch)
    }

    /// Checks the three required fields are mutually consistent 2-D grids.
    pub fn validate(&self) -> Result<(), TildeError> {
        if self.input_ids.dim() != 2 {
            return Err(TildeError::ValueError(format!(
                "sequence batch must be 2-dimensional, got {} dimensions",
                self.input_ids.dim()
            )));
        }
        if self.token_type_ids.size() != self.input_ids.size()
            || self.attention_mask.size() != self.input_ids.size()
        {
            return Err(TildeError::ValueError(format!(
                "input_ids, token_type_ids and attention_mask must share a shape, \
                 got {:?}, {:?} and {:?}",
                self.input_ids.size(),
                self.token_type_ids.size(),
                self.attention_mask.size()
            )));
        }
        Ok(())
    }

    /// Number of sequences in the batch.
    pub fn len(&self) -> i64 {
        self.input_ids.size()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the batch with every tensor placed on `device`.
    pub fn to_device(&self, device: Device) -> SequenceBatch {
        SequenceBatch {
            input_ids: self.input_ids.to_device(device),
            token_type_ids: self.token_type_ids.to_device(device),
            attention_mask: self.attention_mask.to_device(device),
        }
    }
}

/// # Training batch for the bi-directional quasi-language-model
/// Carries the passage side and the query side of a training example. The field
/// count and order form the contract with the upstream data pipeline: five
/// tensors per side, with the target label tensors holding a 0/1 value per
/// vocabulary entry. The negative label tensors are part of the contract but
/// the loss derives negatives from the complement of the target labels.
pub struct QlmTrainingBatch {
    pub passage_input_ids: Tensor,
    pub passage_token_type_ids: Tensor,
    pub passage_attention_mask: Tensor,
    /// Query-likelihood targets for the passage side, shape (*batch size*, *vocab_size*)
    pub passage_target_labels: Tensor,
    pub passage_negative_labels: Tensor,
    pub query_input_ids: Tensor,
    pub query_token_type_ids: Tensor,
    pub query_attention_mask: Tensor,
    /// Document-likelihood targets for the query side, shape (*batch size*, *vocab_size*)
    pub query_target_labels: Tensor,
    pub query_negative_labels: Tensor,
}

impl QlmTrainingBatch {
    /// Returns a copy of the batch with every tensor placed on `device`.
    pub fn to_device(&self, device: Device) -> QlmTrainingBatch {
        QlmTrainingBatch {
            passage_input_ids: self.passage_input_ids.to_device(device),
            passage_token_type_ids: self.passage_token_type_ids.to_device(device),
            passage_attention_mask: self.passage_attention_mask.to_device(device),
            passage_target_labels: self.passage_target_labels.to_device(device),
            passage_negative_labels: self.passage_negative_labels.to_device(device),
            query_input_ids: self.query_input_ids.to_device(device),
            query_token_type_ids: self.query_token_type_ids.to_device(device),
            query_attention_mask: self.query_attention_mask.to_device(device),
            query_target_labels: self.query_target_labels.to_device(device),
            query_negative_labels: self.query_negative_labels.to_device(device),
        }
    }
}

/// # Ranking batch for the token-interaction model
/// One batch of queries with their grouped candidate documents. Document batch
/// size must equal `train_group_size * number of queries`; the positive
/// document occupies the first slot of each group.
pub struct RankingBatch {
    pub query: SequenceBatch,
    pub documents: SequenceBatch,
}

impl RankingBatch {
    pub fn new(
        query: SequenceBatch,
        documents: SequenceBatch,
        train_group_size: i64,
    ) -> Result<RankingBatch, TildeError> {
        query.validate()?;
        documents.validate()?;
        if documents.len() != train_group_size * query.len() {
            return Err(TildeError::ValueError(format!(
                "document batch size ({}) must equal train_group_size ({}) x number of queries ({})",
                documents.len(),
                train_group_size,
                query.len()
            )));
        }
        Ok(RankingBatch { query, documents })
    }

    /// Returns a copy of the batch with every tensor of both nested sequence
    /// batches placed on `device`.
    pub fn to_device(&self, device: Device) -> RankingBatch {
        RankingBatch {
            query: self.query.to_device(device),
            documents: self.documents.to_device(device),
        }
    }
}
