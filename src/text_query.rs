//! The composite free-text query over event name, description and tags.

use serde::{Deserialize, Serialize};

use crate::{
    analyzer::{Pipeline, tokenize},
    error::Result,
    query_tree::QueryTree,
    tantivy_index::fields,
};

/// Per-field weights of the event text query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextQueryWeights {
    pub name: f32,
    pub description: f32,
    pub tag: f32,
    /// Kept small: n-grams give partial, typo-tolerant recall only.
    pub ngram: f32,
    pub tie_breaker: f32,
}

impl Default for TextQueryWeights {
    fn default() -> Self {
        Self {
            name: 3.0,
            description: 1.0,
            tag: 2.0,
            ngram: 0.1,
            tie_breaker: 0.0,
        }
    }
}

/// Build the disjunction-max query for free `text`.
///
/// The disjuncts are:
/// - tag field: every word token and every 2-3 word shingle
/// - name field: every word token, plus an all-words co-occurrence clause
///   when there are at least two tokens
/// - description field: same shape as name
/// - combined n-gram field: every 3-5 character n-gram
///
/// Fields that yield no tokens simply contribute no disjuncts.
pub fn event_text_query(
    text: &str,
    weights: &TextQueryWeights,
) -> Result<QueryTree> {
    let words = tokenize(Pipeline::Word, text)?;
    let mut disjuncts = Vec::new();

    let shingles = tokenize(Pipeline::Shingle, text)?;
    for token in words.iter().chain(&shingles) {
        disjuncts.push(term(fields::TAG, token).boosted(weights.tag));
    }

    text_field(&mut disjuncts, fields::NAME, &words, weights.name);
    text_field(
        &mut disjuncts,
        fields::DESCRIPTION,
        &words,
        weights.description,
    );

    for token in tokenize(Pipeline::Ngram, text)? {
        disjuncts.push(
            term(fields::COMBINED_NGRAMS, &token).boosted(weights.ngram),
        );
    }

    Ok(QueryTree::DisjunctionMax {
        disjuncts,
        tie_breaker: weights.tie_breaker,
    })
}

fn text_field(
    disjuncts: &mut Vec<QueryTree>,
    field: &str,
    words: &[String],
    boost: f32,
) {
    for token in words {
        disjuncts.push(term(field, token).boosted(boost));
    }
    // A single token co-occurring with itself says nothing new.
    if words.len() >= 2 {
        disjuncts.push(
            QueryTree::AllTerms {
                field: field.to_string(),
                terms: words.to_vec(),
            }
            .boosted(boost),
        );
    }
}

fn term(field: &str, value: &str) -> QueryTree {
    QueryTree::Term {
        field: field.to_string(),
        value: value.to_string(),
    }
}
