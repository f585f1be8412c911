use rust_tilde::backbone::BackboneConfig;
use rust_tilde::tildev2::{
    compute_tok_score_cartesian, exact_match_gate, mask_sep, ranking_labels, TildeV2Model,
};
use rust_tilde::training::{RankingBatch, SequenceBatch};
use rust_tilde::TildeError;
use std::convert::TryFrom;
use tch::{nn, no_grad, Device, Kind, Tensor};

fn tiny_config() -> BackboneConfig {
    BackboneConfig {
        hidden_size: 16,
        intermediate_size: 32,
        max_position_embeddings: 24,
        num_attention_heads: 2,
        num_hidden_layers: 2,
        vocab_size: 32,
        ..Default::default()
    }
}

fn sequence_batch(input_ids: Tensor) -> SequenceBatch {
    let token_type_ids = input_ids.zeros_like();
    let attention_mask = input_ids.ones_like();
    SequenceBatch {
        input_ids,
        token_type_ids,
        attention_mask,
    }
}

#[test]
fn mask_sep_zeroes_the_last_attended_position() {
    let attention_mask = Tensor::from_slice(&[1_i64, 1, 1, 0, 0, 1, 1, 1, 1, 1]).view([2, 5]);
    let original = attention_mask.copy();

    let masked = mask_sep(&attention_mask);

    let expected = Tensor::from_slice(&[1_i64, 1, 0, 0, 0, 1, 1, 1, 1, 0]).view([2, 5]);
    assert!(masked.equal(&expected));
    // pure function: the input mask is left untouched
    assert!(attention_mask.equal(&original));
}

#[test]
fn exact_match_gate_is_binary_on_token_identity() {
    let qry_input_ids = Tensor::from_slice(&[1_i64, 2]).view([1, 2]);
    let doc_input_ids = Tensor::from_slice(&[1_i64, 3, 2, 2]).view([2, 2]);

    let gate = exact_match_gate(&qry_input_ids, &doc_input_ids);
    assert_eq!(gate.size(), &[1, 2, 2, 2]);

    let expected = Tensor::from_slice(&[1_f32, 0., 0., 0., 0., 0., 1., 1.]).view([1, 2, 2, 2]);
    assert!(gate.equal(&expected));
}

#[test]
fn cartesian_scores_have_query_by_document_shape() {
    tch::manual_seed(3);
    let doc_reps = Tensor::rand(&[4, 5, 1], (Kind::Float, Device::Cpu));
    let doc_input_ids = Tensor::randint(8, &[4, 5], (Kind::Int64, Device::Cpu));
    let qry_reps = Tensor::ones(&[2, 3, 1], (Kind::Float, Device::Cpu));
    let qry_input_ids = Tensor::randint(8, &[2, 3], (Kind::Int64, Device::Cpu));
    let qry_attention_mask = Tensor::ones(&[2, 3], (Kind::Int64, Device::Cpu));

    let scores = compute_tok_score_cartesian(
        &doc_reps,
        &doc_input_ids,
        &qry_reps,
        &qry_input_ids,
        &qry_attention_mask,
    );

    assert_eq!(scores.size(), &[2, 4]);
    assert!(scores.min().double_value(&[]) >= 0.0);
}

#[test]
fn cartesian_scores_max_pool_duplicate_matches() {
    // document holds token 5 twice with weights 0.5 and 0.3: the match must
    // count once, at the larger weight
    let doc_reps = Tensor::from_slice(&[0.2_f32, 0.5, 0.3]).view([1, 3, 1]);
    let doc_input_ids = Tensor::from_slice(&[7_i64, 5, 5]).view([1, 3]);
    let qry_reps = Tensor::ones(&[1, 3, 1], (Kind::Float, Device::Cpu));
    let qry_input_ids = Tensor::from_slice(&[0_i64, 5, 9]).view([1, 3]);
    let qry_attention_mask = mask_sep(&Tensor::ones(&[1, 3], (Kind::Int64, Device::Cpu)));

    let scores = compute_tok_score_cartesian(
        &doc_reps,
        &doc_input_ids,
        &qry_reps,
        &qry_input_ids,
        &qry_attention_mask,
    );

    assert_eq!(scores.size(), &[1, 1]);
    assert!((scores.double_value(&[0, 0]) - 0.5).abs() < 1e-6);
}

#[test]
fn ranking_labels_point_at_group_slot_zero() -> anyhow::Result<()> {
    let labels = ranking_labels(2, 4, Device::Cpu);
    assert_eq!(Vec::<i64>::try_from(&labels)?, vec![0, 4]);

    let single = ranking_labels(1, 8, Device::Cpu);
    assert_eq!(Vec::<i64>::try_from(&single)?, vec![0]);
    Ok(())
}

#[test]
fn encode_is_idempotent_and_non_negative() -> Result<(), TildeError> {
    tch::manual_seed(11);
    let config = tiny_config();
    let vs = nn::VarStore::new(Device::Cpu);
    let model = TildeV2Model::new(&vs.root(), &config, 8);

    let features = sequence_batch(Tensor::randint(32, &[3, 6], (Kind::Int64, Device::Cpu)));
    let weights = no_grad(|| model.encode(&features, false))?;
    let weights_again = no_grad(|| model.encode(&features, false))?;

    assert_eq!(weights.size(), &[3, 6, 1]);
    assert!(weights.min().double_value(&[]) >= 0.0);
    assert!(weights.equal(&weights_again));
    Ok(())
}

#[test]
fn encode_rejects_inconsistent_features() {
    let config = tiny_config();
    let vs = nn::VarStore::new(Device::Cpu);
    let model = TildeV2Model::new(&vs.root(), &config, 8);

    let features = SequenceBatch {
        input_ids: Tensor::zeros(&[2, 6], (Kind::Int64, Device::Cpu)),
        token_type_ids: Tensor::zeros(&[2, 6], (Kind::Int64, Device::Cpu)),
        attention_mask: Tensor::ones(&[2, 4], (Kind::Int64, Device::Cpu)),
    };
    match model.encode(&features, false) {
        Err(TildeError::ValueError(_)) => {}
        other => panic!("expected a value error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn forward_ranks_grouped_candidates() -> anyhow::Result<()> {
    tch::manual_seed(5);
    let config = tiny_config();
    let train_group_size = 2;
    let vs = nn::VarStore::new(Device::Cpu);
    let model = TildeV2Model::new(&vs.root(), &config, train_group_size);

    let query = sequence_batch(Tensor::randint(32, &[1, 4], (Kind::Int64, Device::Cpu)));
    let documents = sequence_batch(Tensor::randint(32, &[2, 5], (Kind::Int64, Device::Cpu)));
    let batch = RankingBatch::new(query, documents, train_group_size)?;

    let (loss, scores) = no_grad(|| model.forward(&batch, false))?;
    assert!(loss.size().is_empty());
    assert!(loss.double_value(&[]).is_finite());
    assert_eq!(scores.size(), &[2]);

    // the loss is the mean cross-entropy of the score matrix against slot 0
    let expected_loss = scores
        .view([1, 2])
        .cross_entropy_for_logits(&Tensor::from_slice(&[0_i64]));
    assert!(loss.allclose(&expected_loss, 1e-5, 1e-8, false));
    Ok(())
}

#[test]
fn forward_rejects_mismatched_group_size() -> anyhow::Result<()> {
    let config = tiny_config();
    let vs = nn::VarStore::new(Device::Cpu);
    let model = TildeV2Model::new(&vs.root(), &config, 8);

    let query = sequence_batch(Tensor::zeros(&[1, 4], (Kind::Int64, Device::Cpu)));
    // 3 documents cannot form groups of 8 for a single query
    let documents = sequence_batch(Tensor::zeros(&[3, 5], (Kind::Int64, Device::Cpu)));
    let batch = RankingBatch {
        query,
        documents,
    };
    assert!(matches!(
        model.forward(&batch, false),
        Err(TildeError::ValueError(_))
    ));
    Ok(())
}
