//! # TILDE: Term Independent Likelihood moDEl
//!
//! Bi-directional quasi-language-model for passage and query term scoring. The
//! model scores every vocabulary entry through the first output position of a
//! masked language model head and is trained with a dual-sided binary relevance
//! loss over the valid (non stop) vocabulary:
//! - passage side: likelihood of each vocabulary entry appearing in a matching query
//! - query side: likelihood of each vocabulary entry appearing in a matching passage
//!
//! Stop tokens (punctuation, stop words, the possessive subword) are excluded
//! from the scoring surface; their ids are computed once per tokenizer by
//! [`get_stop_ids`] and fixed for the lifetime of the model.

mod model;
mod stop_tokens;

pub use model::{binary_relevance_term, TildeModel};
pub use stop_tokens::get_stop_ids;
