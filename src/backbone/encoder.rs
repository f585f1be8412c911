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

use crate::backbone::attention::{Attention, Intermediate, Output};
use crate::backbone::model::BackboneConfig;
use std::borrow::Borrow;
use tch::{nn, Tensor};

/// # Encoder layer
/// Single transformer layer: self-attention followed by an intermediate (linear)
/// and output (linear + layer norm) block. The encoder is bi-directional only,
/// there is no causal masking or cross-attention path.
pub struct EncoderLayer {
    attention: Attention,
    intermediate: Intermediate,
    output: Output,
}

impl EncoderLayer {
    pub fn new<'p, P>(p: P, config: &BackboneConfig) -> EncoderLayer
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let attention = Attention::new(p / "attention", config);
        let intermediate = Intermediate::new(p / "intermediate", config);
        let output = Output::new(p / "output", config);

        EncoderLayer {
            attention,
            intermediate,
            output,
        }
    }

    pub fn forward_t(&self, hidden_states: &Tensor, mask: Option<&Tensor>, train: bool) -> Tensor {
        let attention_output = self.attention.forward_t(hidden_states, mask, train);
        let output = self.intermediate.forward(&attention_output);
        self.output.forward_t(&output, &attention_output, train)
    }
}

/// # Encoder stack
/// Vector of `EncoderLayer` through which the hidden states are passed.
pub struct Encoder {
    layers: Vec<EncoderLayer>,
}

impl Encoder {
    pub fn new<'p, P>(p: P, config: &BackboneConfig) -> Encoder
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow() / "layer";
        let mut layers: Vec<EncoderLayer> = vec![];
        for layer_index in 0..config.num_hidden_layers {
            layers.push(EncoderLayer::new(&p / layer_index, config));
        }

        Encoder { layers }
    }

    /// Forward pass through the encoder stack, returning the last hidden states
    /// of shape (*batch size*, *sequence_length*, *hidden_size*).
    pub fn forward_t(&self, input: &Tensor, mask: Option<&Tensor>, train: bool) -> Tensor {
        let mut hidden_state: Option<Tensor> = None;

        for layer in &self.layers {
            let layer_input = hidden_state.as_ref().unwrap_or(input);
            hidden_state = Some(layer.forward_t(layer_input, mask, train));
        }

        hidden_state.unwrap_or_else(|| input.copy())
    }
}
