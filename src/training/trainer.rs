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

use crate::backbone::BackboneConfig;
use crate::tildev2::TildeV2Model;
use crate::training::RankingBatch;
use crate::TildeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tch::nn::OptimizerConfig;
use tch::{nn, Device};
use tracing::{debug, info};

/// File name of the hyperparameter snapshot written next to the model weights.
pub const TRAINING_ARGS_NAME: &str = "training_args.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
/// # Hyperparameters of a ranking training run
/// Serialized as [`TRAINING_ARGS_NAME`] into the checkpoint directory, named
/// distinctly from the model weights.
pub struct TrainingArguments {
    /// Checkpoint directory
    pub output_dir: PathBuf,
    pub learning_rate: f64,
    pub train_batch_size: i64,
    /// Number of candidate documents per query, positive in slot 0
    pub train_group_size: i64,
    pub num_train_epochs: i64,
    /// Absolute warm-up step count, used when no ratio is configured
    pub warmup_steps: i64,
    /// Warm-up expressed as a fraction of the total training steps; takes
    /// precedence over `warmup_steps` when positive
    pub warmup_ratio: f64,
    /// Checkpoint every n optimizer steps
    pub save_steps: i64,
    /// Rank of this worker in a data-parallel setting; rank 0 is the
    /// designated writer of tokenizer and hyperparameter files
    pub process_rank: i64,
}

impl Default for TrainingArguments {
    fn default() -> Self {
        TrainingArguments {
            output_dir: PathBuf::from("checkpoints"),
            learning_rate: 5e-5,
            train_batch_size: 8,
            train_group_size: 8,
            num_train_epochs: 3,
            warmup_steps: 0,
            warmup_ratio: 0.0,
            save_steps: 1,
            process_rank: 0,
        }
    }
}

impl TrainingArguments {
    /// Total warm-up steps for a training run of `num_training_steps` steps:
    /// `num_training_steps * warmup_ratio` when a ratio is configured,
    /// otherwise the absolute `warmup_steps` count.
    pub fn warmup_steps(&self, num_training_steps: i64) -> i64 {
        if self.warmup_ratio > 0.0 {
            (num_training_steps as f64 * self.warmup_ratio) as i64
        } else {
            self.warmup_steps
        }
    }

    /// True for the single worker designated to write shared checkpoint files.
    pub fn is_main_process(&self) -> bool {
        self.process_rank == 0
    }

    /// Serializes the hyperparameter snapshot into `target_dir`.
    pub fn save<P: AsRef<Path>>(&self, target_dir: P) -> Result<(), TildeError> {
        let arguments_json = serde_json::to_string_pretty(self)?;
        fs::write(target_dir.as_ref().join(TRAINING_ARGS_NAME), arguments_json)?;
        Ok(())
    }
}

/// # Trainer lifecycle extension points
/// Named hooks invoked by the trainer at defined lifecycle stages. The default
/// implementations reproduce the stock behavior; implementors override
/// individual stages instead of subclassing the training loop.
pub trait TrainerLifecycle {
    /// Called after a checkpoint has been written to `output_dir`.
    fn on_save(&self, _output_dir: &Path) -> Result<(), TildeError> {
        Ok(())
    }

    /// Supplies the training batches for the run. Returning `None` falls back
    /// to the dataset the trainer was constructed with.
    fn provide_train_iterator(&mut self) -> Option<Vec<RankingBatch>> {
        None
    }

    /// Number of warm-up steps for the run.
    fn configure_schedule(&self, num_training_steps: i64, arguments: &TrainingArguments) -> i64 {
        arguments.warmup_steps(num_training_steps)
    }
}

/// Stock lifecycle with no additional behavior.
pub struct DefaultLifecycle;

impl TrainerLifecycle for DefaultLifecycle {}

/// # Trainer for the token-interaction model
/// Drives optimizer steps over pre-collated ranking batches, routes batch
/// tensors to the active compute device, and persists model weights, backbone
/// configuration, tokenizer vocabulary and hyperparameter snapshot after
/// optimizer steps. Data-parallel replication is the caller's concern; the
/// trainer itself is synchronous and single-threaded.
pub struct TildeV2Trainer<'a> {
    model: &'a TildeV2Model,
    var_store: &'a nn::VarStore,
    config: &'a BackboneConfig,
    arguments: TrainingArguments,
    optimizer: nn::Optimizer,
    lifecycle: Box<dyn TrainerLifecycle>,
    train_data: Option<Vec<RankingBatch>>,
    vocab_file: Option<PathBuf>,
    global_step: i64,
}

impl<'a> TildeV2Trainer<'a> {
    /// Build a new `TildeV2Trainer`
    ///
    /// # Arguments
    ///
    /// * `model` - Model to train; its parameters must live in `var_store`
    /// * `var_store` - Variable store holding the trainable parameters
    /// * `config` - Backbone configuration, persisted with every checkpoint
    /// * `arguments` - Run hyperparameters
    /// * `train_data` - Pre-collated training batches; `None` is accepted at
    ///   construction and rejected when training starts
    /// * `vocab_file` - Tokenizer vocabulary to copy into checkpoints
    pub fn new(
        model: &'a TildeV2Model,
        var_store: &'a nn::VarStore,
        config: &'a BackboneConfig,
        arguments: TrainingArguments,
        train_data: Option<Vec<RankingBatch>>,
        vocab_file: Option<PathBuf>,
    ) -> Result<TildeV2Trainer<'a>, TildeError> {
        let optimizer = nn::Adam::default().build(var_store, arguments.learning_rate)?;
        Ok(TildeV2Trainer {
            model,
            var_store,
            config,
            arguments,
            optimizer,
            lifecycle: Box::new(DefaultLifecycle),
            train_data,
            vocab_file,
            global_step: 0,
        })
    }

    /// Replaces the lifecycle extension points.
    pub fn with_lifecycle(mut self, lifecycle: Box<dyn TrainerLifecycle>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Device the model parameters live on.
    pub fn device(&self) -> Device {
        self.var_store.device()
    }

    /// Number of optimizer steps taken so far.
    pub fn global_step(&self) -> i64 {
        self.global_step
    }

    /// Returns a copy of the batch with every tensor of its nested query and
    /// document structures placed on the active compute device.
    pub fn prepare_batch(&self, batch: &RankingBatch) -> RankingBatch {
        batch.to_device(self.device())
    }

    /// Takes the training batches out of the trainer, failing immediately when
    /// no dataset was supplied.
    fn take_train_data(&mut self) -> Result<Vec<RankingBatch>, TildeError> {
        self.train_data.take().ok_or_else(|| {
            TildeError::InvalidConfigurationError(
                "Trainer: training requires a train dataset.".to_string(),
            )
        })
    }

    /// Single optimizer step over one ranking batch. Returns the batch loss.
    pub fn step(&mut self, batch: &RankingBatch) -> Result<f64, TildeError> {
        let batch = self.prepare_batch(batch);
        let (loss, _scores) = self.model.forward(&batch, true)?;
        self.optimizer.backward_step(&loss);
        self.global_step += 1;

        let loss_value = loss.double_value(&[]);
        debug!(step = self.global_step, loss = loss_value, "optimizer step");

        if self.arguments.save_steps > 0 && self.global_step % self.arguments.save_steps == 0 {
            self.save_checkpoint()?;
        }
        Ok(loss_value)
    }

    /// Runs the configured number of epochs over the training batches.
    ///
    /// Fails with an `InvalidConfigurationError` when the trainer was built
    /// without a dataset. Returns the loss of the final optimizer step.
    pub fn train(&mut self) -> Result<f64, TildeError> {
        let batches = match self.lifecycle.provide_train_iterator() {
            Some(batches) => batches,
            None => self.take_train_data()?,
        };
        let num_training_steps = batches.len() as i64 * self.arguments.num_train_epochs;
        let warmup_steps = self
            .lifecycle
            .configure_schedule(num_training_steps, &self.arguments);
        info!(
            num_training_steps,
            warmup_steps, "starting ranking training run"
        );

        let mut last_loss = 0.0;
        for _epoch in 0..self.arguments.num_train_epochs {
            for batch in &batches {
                last_loss = self.step(batch)?;
            }
        }
        Ok(last_loss)
    }

    /// Writes a checkpoint into the output directory: model weights and
    /// backbone configuration always; tokenizer vocabulary and hyperparameter
    /// snapshot only from the designated main process.
    pub fn save_checkpoint(&self) -> Result<(), TildeError> {
        let output_dir = self.arguments.output_dir.as_path();
        fs::create_dir_all(output_dir)?;

        self.var_store.save(output_dir.join("model.ot"))?;
        let config_json = serde_json::to_string_pretty(self.config)?;
        fs::write(output_dir.join("config.json"), config_json)?;

        if self.arguments.is_main_process() {
            if let Some(vocab_file) = &self.vocab_file {
                fs::copy(vocab_file, output_dir.join("vocab.txt"))?;
            }
            self.arguments.save(output_dir)?;
        }

        info!(step = self.global_step, directory = %output_dir.display(), "checkpoint written");
        self.lifecycle.on_save(output_dir)
    }
}
