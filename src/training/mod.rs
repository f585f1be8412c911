//! # Training orchestration
//!
//! Batch contracts and the training loop glue around the TILDE models: device
//! routing, warm-up arithmetic, checkpoint persistence and the lifecycle
//! extension points the loop calls at defined stages. The models themselves
//! only produce losses; everything in this module is replaceable orchestration.

mod batch;
mod trainer;

pub use batch::{QlmTrainingBatch, RankingBatch, SequenceBatch};
pub use trainer::{
    DefaultLifecycle, TildeV2Trainer, TrainerLifecycle, TrainingArguments, TRAINING_ARGS_NAME,
};
