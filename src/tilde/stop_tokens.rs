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

use lazy_static::lazy_static;
use rust_tokenizers::vocab::{BertVocab, Vocab};
use std::collections::HashSet;

/// English stop words excluded from expansion scoring. Interrogatives
/// (where/how/what/when/which/why/who) are deliberately kept: they carry
/// signal for question-style queries.
static STOP_WORD_LIST: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "whom", "this",
    "that", "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have",
    "has", "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if",
    "or", "because", "as", "until", "while", "of", "at", "by", "for", "with", "about",
    "against", "between", "into", "through", "during", "before", "after", "above", "below",
    "to", "from", "up", "down", "in", "out", "on", "off", "over", "under", "again", "further",
    "then", "once", "here", "there", "all", "any", "both", "each", "few", "more", "most",
    "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too",
    "very", "s", "t", "can", "will", "just", "don", "should", "now", "d", "ll", "m", "o", "re",
    "ve", "y", "ain", "aren", "couldn", "didn", "doesn", "hadn", "hasn", "haven", "isn", "ma",
    "mightn", "mustn", "needn", "shan", "shouldn", "wasn", "weren", "won", "wouldn",
];

lazy_static! {
    static ref STOP_WORDS: HashSet<&'static str> = STOP_WORD_LIST.iter().copied().collect();
}

/// Computes the set of vocabulary token ids excluded from relevance scoring.
///
/// Excluded are the single-token English stop words above, every token
/// containing a non-alphanumeric character (punctuation, special markers such
/// as `[CLS]` or `[SEP]`) and the possessive subword `##s`. Other subword
/// continuations are kept. The result is deterministic for a given vocabulary
/// and fixed for the lifetime of a model instance.
///
/// # Arguments
///
/// * `vocab` - `BertVocab` to scan.
///
/// # Returns
///
/// * `HashSet<i64>` holding the excluded token ids
pub fn get_stop_ids(vocab: &BertVocab) -> HashSet<i64> {
    let mut stop_ids = HashSet::new();
    for (token, &id) in vocab.values() {
        if STOP_WORDS.contains(token.as_str()) {
            stop_ids.insert(id);
            continue;
        }
        if token == "##s" {
            stop_ids.insert(id);
            continue;
        }
        // subword continuations are kept, apart from the possessive above
        if token.starts_with('#') && token.len() > 1 {
            continue;
        }
        if !token.chars().all(char::is_alphanumeric) {
            stop_ids.insert(id);
        }
    }
    stop_ids
}
