//! The compiled query tree.
//!
//! A [`QueryTree`] is an immutable, engine-independent description of a
//! query. It is produced by the DSL compiler and translated into a tantivy
//! query only when it is executed against an index snapshot.

use std::ops::Bound;

use tantivy::{
    Term,
    query::{
        AllQuery,
        BooleanQuery,
        BoostQuery,
        ConstScoreQuery,
        DisjunctionMaxQuery,
        EmptyQuery,
        Occur,
        Query,
        RangeQuery,
        TermQuery,
    },
    schema::{Field, FieldType, IndexRecordOption, Schema},
};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum QueryTree {
    /// Conjunction, disjunction and negation of sub-queries.
    Boolean(Vec<(Occur, QueryTree)>),
    /// Every record, with a score of zero.
    MatchAll,
    /// Exact single-token match.
    Term { field: String, value: String },
    /// All terms co-occur somewhere in the field, in any order and at any
    /// distance.
    AllTerms { field: String, terms: Vec<String> },
    Range { field: String, range: NumericRange },
    /// Best sub-score plus `tie_breaker` times the sum of the others.
    DisjunctionMax {
        disjuncts: Vec<QueryTree>,
        tie_breaker: f32,
    },
    Boost { query: Box<QueryTree>, factor: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericRange {
    I64 { lower: Bound<i64>, upper: Bound<i64> },
    F64 { lower: Bound<f64>, upper: Bound<f64> },
}

impl QueryTree {
    /// A conjunction where every sub-query must match.
    pub fn all_of(queries: Vec<QueryTree>) -> Self {
        Self::Boolean(
            queries.into_iter().map(|q| (Occur::Must, q)).collect(),
        )
    }

    /// Scale this node's score. A factor of 1 leaves the node unwrapped.
    pub fn boosted(self, factor: f32) -> Self {
        if factor == 1.0 {
            self
        } else {
            Self::Boost {
                query: Box::new(self),
                factor,
            }
        }
    }

    /// Translate into a tantivy query against the given schema.
    ///
    /// Fails when a referenced field does not exist or its type does not
    /// fit the node (e.g. a float range over an integer field).
    pub fn to_query(&self, schema: &Schema) -> Result<Box<dyn Query>> {
        Ok(match self {
            Self::Boolean(clauses) => {
                let clauses = clauses
                    .iter()
                    .map(|(occur, q)| Ok((*occur, q.to_query(schema)?)))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(BooleanQuery::new(clauses))
            }
            Self::MatchAll => {
                Box::new(ConstScoreQuery::new(Box::new(AllQuery), 0.0))
            }
            Self::Term { field, value } => {
                let (field, field_type) = lookup(schema, field)?;
                term_query(field, &field_type, value)?
            }
            Self::AllTerms { field, terms } => {
                let (field, field_type) = lookup(schema, field)?;
                let clauses = terms
                    .iter()
                    .map(|t| {
                        Ok((Occur::Must, term_query(field, &field_type, t)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Box::new(BooleanQuery::new(clauses))
            }
            Self::Range { field, range } => {
                range_query(schema, field, *range)?
            }
            Self::DisjunctionMax {
                disjuncts,
                tie_breaker,
            } => {
                if disjuncts.is_empty() {
                    return Ok(Box::new(EmptyQuery));
                }
                let disjuncts = disjuncts
                    .iter()
                    .map(|q| q.to_query(schema))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(DisjunctionMaxQuery::with_tie_breaker(
                    disjuncts,
                    *tie_breaker,
                ))
            }
            Self::Boost { query, factor } => {
                Box::new(BoostQuery::new(query.to_query(schema)?, *factor))
            }
        })
    }
}

fn lookup(schema: &Schema, name: &str) -> Result<(Field, FieldType)> {
    let field = schema.get_field(name).map_err(|_| Error::NotFound {
        kind: "field",
        name: name.to_string(),
    })?;
    let field_type = schema.get_field_entry(field).field_type().clone();
    Ok((field, field_type))
}

fn term_query(
    field: Field,
    field_type: &FieldType,
    value: &str,
) -> Result<Box<dyn Query>> {
    let bad_value = |expected: &str| {
        Error::invalid_query(
            "term",
            format!("'{value}' is not a valid {expected}"),
        )
    };
    let term = match field_type {
        FieldType::Str(_) => Term::from_field_text(field, value),
        FieldType::U64(_) => Term::from_field_u64(
            field,
            value.parse().map_err(|_| bad_value("unsigned integer"))?,
        ),
        FieldType::I64(_) => Term::from_field_i64(
            field,
            value.parse().map_err(|_| bad_value("integer"))?,
        ),
        FieldType::F64(_) => Term::from_field_f64(
            field,
            value.parse().map_err(|_| bad_value("number"))?,
        ),
        _ => {
            return Err(Error::invalid_query(
                "term",
                "field type does not support term queries",
            ));
        }
    };
    let record_option = field_type
        .get_index_record_option()
        .unwrap_or(IndexRecordOption::Basic);
    Ok(Box::new(TermQuery::new(term, record_option)))
}

fn range_query(
    schema: &Schema,
    name: &str,
    range: NumericRange,
) -> Result<Box<dyn Query>> {
    let (field, field_type) = lookup(schema, name)?;

    let (lower, upper) = match (range, &field_type) {
        (NumericRange::I64 { lower, upper }, FieldType::I64(_)) => {
            let (lower, upper) = widen(lower, upper, i64::MIN);
            (
                lower.map(|v| Term::from_field_i64(field, v)),
                upper.map(|v| Term::from_field_i64(field, v)),
            )
        }
        (NumericRange::I64 { lower, upper }, FieldType::F64(_)) => {
            let (lower, upper) = widen(lower, upper, i64::MIN);
            (
                lower.map(|v| Term::from_field_f64(field, v as f64)),
                upper.map(|v| Term::from_field_f64(field, v as f64)),
            )
        }
        (NumericRange::F64 { lower, upper }, FieldType::F64(_)) => {
            let (lower, upper) = widen(lower, upper, f64::MIN);
            (
                lower.map(|v| Term::from_field_f64(field, v)),
                upper.map(|v| Term::from_field_f64(field, v)),
            )
        }
        _ => {
            return Err(Error::invalid_query(
                "range",
                format!("field '{name}' does not hold this kind of number"),
            ));
        }
    };

    Ok(Box::new(RangeQuery::new(lower, upper)))
}

/// A range needs at least one bound to name its field; a fully open range
/// becomes `[min, ∞)`.
fn widen<T>(lower: Bound<T>, upper: Bound<T>, min: T) -> (Bound<T>, Bound<T>) {
    match (lower, upper) {
        (Bound::Unbounded, Bound::Unbounded) => {
            (Bound::Included(min), Bound::Unbounded)
        }
        bounds => bounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tantivy_index::{fields, build_schema};

    #[test]
    fn unit_boost_is_not_wrapped() {
        assert_eq!(QueryTree::MatchAll.boosted(1.0), QueryTree::MatchAll);
        assert!(matches!(
            QueryTree::MatchAll.boosted(2.0),
            QueryTree::Boost { factor, .. } if factor == 2.0
        ));
    }

    #[test]
    fn unknown_field_is_an_error() {
        let (schema, _) = build_schema();
        let tree = QueryTree::Term {
            field: "nope".into(),
            value: "x".into(),
        };
        assert!(matches!(
            tree.to_query(&schema),
            Err(Error::NotFound { kind: "field", .. })
        ));
    }

    #[test]
    fn float_range_over_integer_field_is_an_error() {
        let (schema, _) = build_schema();
        let tree = QueryTree::Range {
            field: fields::CREATED.into(),
            range: NumericRange::F64 {
                lower: Bound::Included(1.0),
                upper: Bound::Unbounded,
            },
        };
        assert!(matches!(
            tree.to_query(&schema),
            Err(Error::InvalidQuery { .. })
        ));
    }

    #[test]
    fn non_numeric_term_on_numeric_field_is_an_error() {
        let (schema, _) = build_schema();
        let tree = QueryTree::Term {
            field: fields::SHOW_START.into(),
            value: "tomorrow".into(),
        };
        assert!(tree.to_query(&schema).is_err());
    }

    #[test]
    fn open_range_is_widened() {
        let (lower, upper) =
            widen::<i64>(Bound::Unbounded, Bound::Unbounded, i64::MIN);
        assert_eq!(lower, Bound::Included(i64::MIN));
        assert_eq!(upper, Bound::Unbounded);

        let (lower, _) =
            widen::<i64>(Bound::Excluded(3), Bound::Unbounded, i64::MIN);
        assert_eq!(lower, Bound::Excluded(3));
    }

    #[test]
    fn empty_disjunction_translates() {
        let (schema, _) = build_schema();
        let tree = QueryTree::DisjunctionMax {
            disjuncts: vec![],
            tie_breaker: 0.0,
        };
        assert!(tree.to_query(&schema).is_ok());
    }
}
