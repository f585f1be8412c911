use rust_tilde::backbone::BackboneConfig;
use rust_tilde::tildev2::TildeV2Model;
use rust_tilde::training::{
    RankingBatch, SequenceBatch, TildeV2Trainer, TrainerLifecycle, TrainingArguments,
    TRAINING_ARGS_NAME,
};
use rust_tilde::TildeError;
use tch::{nn, Device, Kind, Tensor};

fn tiny_config() -> BackboneConfig {
    BackboneConfig {
        hidden_size: 16,
        intermediate_size: 32,
        max_position_embeddings: 24,
        num_attention_heads: 2,
        num_hidden_layers: 1,
        vocab_size: 32,
        ..Default::default()
    }
}

fn ranking_batch(train_group_size: i64) -> anyhow::Result<RankingBatch> {
    let query = SequenceBatch::new(
        Tensor::randint(32, &[1, 4], (Kind::Int64, Device::Cpu)),
        Tensor::zeros(&[1, 4], (Kind::Int64, Device::Cpu)),
        Tensor::ones(&[1, 4], (Kind::Int64, Device::Cpu)),
    )?;
    let documents = SequenceBatch::new(
        Tensor::randint(32, &[train_group_size, 5], (Kind::Int64, Device::Cpu)),
        Tensor::zeros(&[train_group_size, 5], (Kind::Int64, Device::Cpu)),
        Tensor::ones(&[train_group_size, 5], (Kind::Int64, Device::Cpu)),
    )?;
    Ok(RankingBatch::new(query, documents, train_group_size)?)
}

#[test]
fn warmup_ratio_takes_precedence_over_absolute_steps() {
    let mut arguments = TrainingArguments {
        warmup_steps: 7,
        warmup_ratio: 0.0,
        ..Default::default()
    };
    assert_eq!(arguments.warmup_steps(1000), 7);

    arguments.warmup_ratio = 0.1;
    assert_eq!(arguments.warmup_steps(1000), 100);
}

#[test]
fn training_without_a_dataset_is_a_configuration_error() -> anyhow::Result<()> {
    let config = tiny_config();
    let vs = nn::VarStore::new(Device::Cpu);
    let model = TildeV2Model::new(&vs.root(), &config, 2);
    let arguments = TrainingArguments::default();

    let mut trainer = TildeV2Trainer::new(&model, &vs, &config, arguments, None, None)?;
    assert!(matches!(
        trainer.train(),
        Err(TildeError::InvalidConfigurationError(_))
    ));
    Ok(())
}

#[test]
fn checkpoints_hold_weights_config_vocab_and_arguments() -> anyhow::Result<()> {
    tch::manual_seed(13);
    let config = tiny_config();
    let vs = nn::VarStore::new(Device::Cpu);
    let model = TildeV2Model::new(&vs.root(), &config, 2);

    let output_dir = tempfile::tempdir()?;
    let vocab_source = output_dir.path().join("source_vocab.txt");
    std::fs::write(&vocab_source, "[PAD]\n[UNK]\n[CLS]\n[SEP]\n[MASK]\n")?;

    let arguments = TrainingArguments {
        output_dir: output_dir.path().join("run"),
        ..Default::default()
    };
    let trainer = TildeV2Trainer::new(
        &model,
        &vs,
        &config,
        arguments,
        None,
        Some(vocab_source),
    )?;
    trainer.save_checkpoint()?;

    let run_dir = output_dir.path().join("run");
    assert!(run_dir.join("model.ot").exists());
    assert!(run_dir.join("config.json").exists());
    assert!(run_dir.join("vocab.txt").exists());
    assert!(run_dir.join(TRAINING_ARGS_NAME).exists());
    Ok(())
}

#[test]
fn secondary_workers_skip_shared_checkpoint_files() -> anyhow::Result<()> {
    let config = tiny_config();
    let vs = nn::VarStore::new(Device::Cpu);
    let model = TildeV2Model::new(&vs.root(), &config, 2);

    let output_dir = tempfile::tempdir()?;
    let arguments = TrainingArguments {
        output_dir: output_dir.path().join("run"),
        process_rank: 1,
        ..Default::default()
    };
    let trainer = TildeV2Trainer::new(&model, &vs, &config, arguments, None, None)?;
    trainer.save_checkpoint()?;

    let run_dir = output_dir.path().join("run");
    assert!(run_dir.join("model.ot").exists());
    assert!(run_dir.join("config.json").exists());
    assert!(!run_dir.join(TRAINING_ARGS_NAME).exists());
    Ok(())
}

struct FixedDataset {
    batches: Option<Vec<RankingBatch>>,
}

impl TrainerLifecycle for FixedDataset {
    fn provide_train_iterator(&mut self) -> Option<Vec<RankingBatch>> {
        self.batches.take()
    }
}

#[test]
fn lifecycle_can_supply_the_training_batches() -> anyhow::Result<()> {
    tch::manual_seed(19);
    let config = tiny_config();
    let train_group_size = 2;
    let vs = nn::VarStore::new(Device::Cpu);
    let model = TildeV2Model::new(&vs.root(), &config, train_group_size);

    let output_dir = tempfile::tempdir()?;
    let arguments = TrainingArguments {
        output_dir: output_dir.path().join("run"),
        num_train_epochs: 1,
        save_steps: 0,
        ..Default::default()
    };
    let lifecycle = FixedDataset {
        batches: Some(vec![ranking_batch(train_group_size)?]),
    };
    let mut trainer = TildeV2Trainer::new(&model, &vs, &config, arguments, None, None)?
        .with_lifecycle(Box::new(lifecycle));

    let final_loss = trainer.train()?;
    assert!(final_loss.is_finite());
    assert_eq!(trainer.global_step(), 1);
    Ok(())
}

#[test]
fn training_run_steps_through_every_batch() -> anyhow::Result<()> {
    tch::manual_seed(17);
    let config = tiny_config();
    let train_group_size = 2;
    let vs = nn::VarStore::new(Device::Cpu);
    let model = TildeV2Model::new(&vs.root(), &config, train_group_size);

    let batches = vec![
        ranking_batch(train_group_size)?,
        ranking_batch(train_group_size)?,
    ];

    let output_dir = tempfile::tempdir()?;
    let arguments = TrainingArguments {
        output_dir: output_dir.path().join("run"),
        num_train_epochs: 1,
        save_steps: 2,
        ..Default::default()
    };
    let mut trainer =
        TildeV2Trainer::new(&model, &vs, &config, arguments, Some(batches), None)?;

    let final_loss = trainer.train()?;
    assert!(final_loss.is_finite());
    assert_eq!(trainer.global_step(), 2);
    assert!(output_dir.path().join("run").join("model.ot").exists());
    Ok(())
}
