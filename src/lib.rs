//! Ready-to-train TILDE term weighting models for information retrieval
//! (BERT-family backbone, [tch-rs](https://github.com/LaurentMazare/tch-rs) backend).
//!
//! This crate implements the two TILDE scoring models on top of a
//! bidirectional transformer encoder:
//! - [`tilde::TildeModel`]: bi-directional quasi-language-model. Scores every
//!   vocabulary entry for its likelihood of appearing in a matching
//!   query/passage through the first output position of a masked language
//!   model head, trained with a dual-sided binary relevance loss over the
//!   valid (non stop) vocabulary.
//! - [`tildev2::TildeV2Model`]: contextualized exact-match term weighting.
//!   Assigns every document token a learned non-negative weight and ranks
//!   grouped candidate documents by the summed weights of exactly-matching
//!   query tokens, trained with a listwise cross-entropy.
//!
//! The encoder backbone lives in [`backbone`] and follows the Transformers
//! checkpoint conventions of its model family: a converted `model.ot` weights
//! file, a `config.json` architecture file and a `vocab.txt` vocabulary are
//! all that is needed to warm-start either model.
//!
//! # Quick example
//!
//! ```no_run
//! use rust_tilde::backbone::BackboneConfig;
//! use rust_tilde::tilde::{get_stop_ids, TildeModel};
//! use rust_tilde::Config;
//! use rust_tokenizers::vocab::{BertVocab, Vocab};
//! use tch::{nn, no_grad, Device, Kind, Tensor};
//!
//! # fn main() -> anyhow::Result<()> {
//! let device = Device::cuda_if_available();
//! let mut vs = nn::VarStore::new(device);
//! let config = BackboneConfig::from_file("path/to/config.json");
//! let vocab = BertVocab::from_file("path/to/vocab.txt")?;
//! let model = TildeModel::new(&vs.root(), &config, get_stop_ids(&vocab));
//! vs.load("path/to/model.ot")?;
//!
//! let input_ids = Tensor::zeros(&[1, 16], (Kind::Int64, device));
//! let expansion_logits = no_grad(|| model.score(&input_ids, None, None, false))?;
//! # Ok(())
//! # }
//! ```

pub mod backbone;
pub mod common;
pub mod tilde;
pub mod tildev2;
pub mod training;

pub use common::config::Config;
pub use common::error::TildeError;
