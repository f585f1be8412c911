use rust_tilde::backbone::BackboneConfig;
use rust_tilde::tilde::{binary_relevance_term, get_stop_ids, TildeModel};
use rust_tilde::TildeError;
use rust_tokenizers::vocab::{BertVocab, Vocab};
use std::collections::HashSet;
use tch::{nn, no_grad, Device, Kind, Tensor};

static TEST_VOCAB: &str = "[PAD]
[UNK]
[CLS]
[SEP]
[MASK]
the
where
apple
apples
##s
##ing
!
,
juice
drink
orange
";

fn test_vocab() -> anyhow::Result<(tempfile::TempDir, BertVocab)> {
    let tmp_dir = tempfile::tempdir()?;
    let vocab_path = tmp_dir.path().join("vocab.txt");
    std::fs::write(&vocab_path, TEST_VOCAB)?;
    let vocab = BertVocab::from_file(vocab_path.to_str().unwrap())?;
    Ok((tmp_dir, vocab))
}

fn tiny_config() -> BackboneConfig {
    BackboneConfig {
        hidden_size: 16,
        intermediate_size: 32,
        max_position_embeddings: 24,
        num_attention_heads: 2,
        num_hidden_layers: 2,
        vocab_size: 16,
        ..Default::default()
    }
}

#[test]
fn stop_ids_follow_vocabulary_rules() -> anyhow::Result<()> {
    let (_tmp_dir, vocab) = test_vocab()?;
    let stop_ids = get_stop_ids(&vocab);

    // special tokens, punctuation, the stop word and the possessive subword
    for token in ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]", "the", "##s", "!", ","] {
        assert!(
            stop_ids.contains(&vocab.token_to_id(token)),
            "expected {} to be excluded",
            token
        );
    }
    // interrogatives, content words and plain subword continuations are kept
    for token in ["where", "apple", "apples", "##ing", "juice", "drink", "orange"] {
        assert!(
            !stop_ids.contains(&vocab.token_to_id(token)),
            "expected {} to be kept",
            token
        );
    }

    // deterministic for a fixed vocabulary
    assert_eq!(stop_ids, get_stop_ids(&vocab));
    Ok(())
}

#[test]
fn score_covers_the_full_vocabulary() -> anyhow::Result<()> {
    let (_tmp_dir, vocab) = test_vocab()?;
    let stop_ids = get_stop_ids(&vocab);
    let num_stop_ids = stop_ids.len() as i64;

    let config = tiny_config();
    let vs = nn::VarStore::new(Device::Cpu);
    let model = TildeModel::new(&vs.root(), &config, stop_ids);

    assert_eq!(model.num_valid_tokens(), config.vocab_size - num_stop_ids);

    let input_ids = Tensor::zeros(&[2, 6], (Kind::Int64, Device::Cpu));
    let scores = no_grad(|| model.score(&input_ids, None, None, false))?;
    assert_eq!(scores.size(), &[2, config.vocab_size]);
    Ok(())
}

#[test]
fn relevance_term_vanishes_on_degenerate_labels() {
    let logits = Tensor::from_slice(&[1.5_f32, -0.3, 0.7, -2.1]).view([1, 4]);

    // all-ones labels: the negative sum contributes nothing
    let all_ones = Tensor::ones(&[1, 4], (Kind::Float, Device::Cpu));
    let term = binary_relevance_term(&logits, &all_ones);
    let positive_only = logits.log_sigmoid().sum(Kind::Float).neg();
    assert!(term.allclose(&positive_only, 1e-5, 1e-8, false));

    // all-zeros labels: the positive sum contributes nothing
    let all_zeros = Tensor::zeros(&[1, 4], (Kind::Float, Device::Cpu));
    let term = binary_relevance_term(&logits, &all_zeros);
    let negative_only = logits.neg().log_sigmoid().sum(Kind::Float).neg();
    assert!(term.allclose(&negative_only, 1e-5, 1e-8, false));
}

#[test]
fn relevance_term_matches_sigmoid_formulation() {
    // the fused log-sigmoid identity must agree with the naive
    // sigmoid-then-log computation away from saturation
    let logits = Tensor::from_slice(&[0.5_f32, -1.0, 2.0, -0.2]).view([1, 4]);
    let labels = Tensor::from_slice(&[1.0_f32, 0.0, 0.0, 1.0]).view([1, 4]);

    let term = binary_relevance_term(&logits, &labels);

    let probabilities = logits.sigmoid();
    let naive = (&labels * probabilities.log()
        + (labels.ones_like() - &labels) * (probabilities.ones_like() - &probabilities).log())
    .sum(Kind::Float)
    .neg();
    assert!(term.allclose(&naive, 1e-5, 1e-8, false));
}

#[test]
fn training_step_produces_finite_scalar_loss() -> Result<(), TildeError> {
    tch::manual_seed(42);
    let config = tiny_config();
    let vs = nn::VarStore::new(Device::Cpu);
    let stop_ids: HashSet<i64> = [0, 1, 2, 3, 4].iter().copied().collect();
    let model = TildeModel::new(&vs.root(), &config, stop_ids);

    let batch = rust_tilde::training::QlmTrainingBatch {
        passage_input_ids: Tensor::randint(16, &[2, 6], (Kind::Int64, Device::Cpu)),
        passage_token_type_ids: Tensor::zeros(&[2, 6], (Kind::Int64, Device::Cpu)),
        passage_attention_mask: Tensor::ones(&[2, 6], (Kind::Int64, Device::Cpu)),
        passage_target_labels: Tensor::randint(2, &[2, 16], (Kind::Int64, Device::Cpu)),
        passage_negative_labels: Tensor::zeros(&[2, 16], (Kind::Int64, Device::Cpu)),
        query_input_ids: Tensor::randint(16, &[2, 4], (Kind::Int64, Device::Cpu)),
        query_token_type_ids: Tensor::zeros(&[2, 4], (Kind::Int64, Device::Cpu)),
        query_attention_mask: Tensor::ones(&[2, 4], (Kind::Int64, Device::Cpu)),
        query_target_labels: Tensor::randint(2, &[2, 16], (Kind::Int64, Device::Cpu)),
        query_negative_labels: Tensor::zeros(&[2, 16], (Kind::Int64, Device::Cpu)),
    };

    let loss = model.training_step(&batch)?;
    assert!(loss.size().is_empty());
    assert!(loss.double_value(&[]).is_finite());
    Ok(())
}

#[test]
fn saved_checkpoint_reproduces_scores() -> anyhow::Result<()> {
    tch::manual_seed(7);
    let (_tmp_dir, vocab) = test_vocab()?;
    let stop_ids = get_stop_ids(&vocab);
    let config = tiny_config();

    let vs = nn::VarStore::new(Device::Cpu);
    let model = TildeModel::new(&vs.root(), &config, stop_ids.clone());

    let checkpoint_dir = tempfile::tempdir()?;
    model.save(&vs, &config, checkpoint_dir.path())?;
    assert!(checkpoint_dir.path().join("model.ot").exists());
    assert!(checkpoint_dir.path().join("config.json").exists());

    let mut reloaded_vs = nn::VarStore::new(Device::Cpu);
    let reloaded = TildeModel::new(&reloaded_vs.root(), &config, stop_ids);
    reloaded_vs.load(checkpoint_dir.path().join("model.ot"))?;

    let input_ids = Tensor::randint(16, &[1, 8], (Kind::Int64, Device::Cpu));
    let scores = no_grad(|| model.score(&input_ids, None, None, false))?;
    let reloaded_scores = no_grad(|| reloaded.score(&input_ids, None, None, false))?;
    assert!(scores.equal(&reloaded_scores));
    Ok(())
}
