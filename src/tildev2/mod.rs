//! # TILDEv2: contextualized exact-match term weighting
//!
//! Second generation model: instead of scoring the whole vocabulary, the
//! encoder assigns every document token a learned non-negative weight, and
//! query/document relevance is the sum of the weights of exactly-matching
//! tokens. Query weights are uniform; only the document side is trained, with a
//! listwise cross-entropy over groups of one positive and several negative
//! candidate documents.
//!
//! The interaction computation materializes a tensor proportional to
//! (*query_len* x *num queries* x *doc_len* x *num documents*); batch
//! dimensions should be sized with that in mind.

mod model;

pub use model::{
    compute_tok_score_cartesian, exact_match_gate, mask_sep, ranking_labels, TildeV2Model,
};
