//! # Bidirectional encoder backbone
//!
//! Concrete realization of the encoder collaborator the TILDE models are built
//! on: a BERT-family bidirectional transformer mapping `(input_ids,
//! attention_mask, token_type_ids)` to per-token hidden states
//! (`BackboneModel`) or per-token vocabulary logits (`MaskedLmBackbone`).
//!
//! The variable store layout follows the Transformers checkpoint naming
//! convention (`bert/embeddings/word_embeddings`, `cls/predictions/...`), so
//! converted checkpoints of the same model family load without remapping:
//!
//! ```no_run
//! use rust_tilde::backbone::{BackboneConfig, MaskedLmBackbone};
//! use rust_tilde::Config;
//! use std::path::Path;
//! use tch::{nn, Device};
//!
//! # fn main() -> anyhow::Result<()> {
//! let device = Device::cuda_if_available();
//! let mut vs = nn::VarStore::new(device);
//! let config = BackboneConfig::from_file(Path::new("path/to/config.json"));
//! let model = MaskedLmBackbone::new(&vs.root(), &config);
//! vs.load("path/to/model.ot")?;
//! # Ok(())
//! # }
//! ```

mod attention;
mod embeddings;
mod encoder;
mod model;

pub use model::{
    BackboneConfig, BackboneModel, MaskedLmBackbone, MaskedLmHead, PredictionHeadTransform,
};
