//! Compiler for the JSON query language.
//!
//! A query is a JSON object whose `type` (case-insensitive) selects the
//! kind of node, e.g.
//!
//! ```json
//! {"type": "boolean query", "clauses": [
//!     {"occur": "must", "query": {"type": "event text", "text": "jazz"}},
//!     {"occur": "must", "query": {"type": "future events"}}
//! ]}
//! ```
//!
//! Every node accepts an optional `boost` (default 1). Unknown keys are
//! ignored. Any unsupported type or malformed field aborts the whole
//! compilation.

use std::{
    ops::Bound,
    time::{SystemTime, UNIX_EPOCH},
};

use serde_json::{Map, Value};
use tantivy::query::Occur;

use crate::{
    error::{Error, Result},
    geo::{self, BoundingBox},
    query_tree::{NumericRange, QueryTree},
    tantivy_index::fields,
    text_query::{TextQueryWeights, event_text_query},
};

/// Milliseconds since the Unix epoch, as stored in the time fields.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// Compiles query nodes into [`QueryTree`]s.
///
/// Time-relative nodes ("future events", "past events") are evaluated
/// against the compiler's `now`, fixed at construction.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    now: i64,
    weights: TextQueryWeights,
}

impl QueryCompiler {
    pub fn new(weights: TextQueryWeights) -> Self {
        Self::at(now_millis(), weights)
    }

    pub fn at(now: i64, weights: TextQueryWeights) -> Self {
        Self { now, weights }
    }

    pub fn compile(&self, query: &Value) -> Result<QueryTree> {
        let node = Node::new(query)?;
        let tree = match node.kind.as_str() {
            "boolean query" => self.boolean(&node)?,
            "match all documents" => QueryTree::MatchAll,
            "term" => QueryTree::Term {
                field: node.str("field")?.to_string(),
                value: node.str("value")?.to_string(),
            },
            "integer range" => integer_range(&node, true)?,
            "long range" => integer_range(&node, false)?,
            "float range" => float_range(&node, true)?,
            "double range" => float_range(&node, false)?,
            "coordinate envelope" => geo::rectangle(
                node.str("latitudeField")?,
                node.str("longitudeField")?,
                envelope(&node)?,
            ),
            "coordinate circle envelope" => circle(
                &node,
                node.str("latitudeField")?,
                node.str("longitudeField")?,
            )?,
            "event text" => {
                event_text_query(node.str("text")?, &self.weights)?
            }
            "event tags" => event_tags(&node)?,
            "future events" => QueryTree::Range {
                field: fields::SHOW_START.to_string(),
                range: NumericRange::I64 {
                    lower: Bound::Excluded(self.now),
                    upper: Bound::Unbounded,
                },
            },
            "past events" => QueryTree::Range {
                field: fields::SHOW_START.to_string(),
                range: NumericRange::I64 {
                    lower: Bound::Unbounded,
                    upper: Bound::Excluded(self.now),
                },
            },
            "event location coordinate envelope" => geo::rectangle(
                fields::LATITUDE,
                fields::LONGITUDE,
                envelope(&node)?,
            ),
            "event location coordinate circle envelope" => {
                circle(&node, fields::LATITUDE, fields::LONGITUDE)?
            }
            _ => {
                return Err(Error::UnsupportedQueryType(
                    node.type_name.clone(),
                ));
            }
        };

        Ok(tree.boosted(node.boost()?))
    }

    fn boolean(&self, node: &Node) -> Result<QueryTree> {
        let mut clauses = Vec::new();
        for clause in node.array("clauses")? {
            let clause = clause.as_object().ok_or_else(|| {
                node.invalid("every clause must be an object")
            })?;
            let occur = clause
                .get("occur")
                .and_then(Value::as_str)
                .ok_or_else(|| node.invalid("clause is missing 'occur'"))?;
            let occur = parse_occur(occur).ok_or_else(|| {
                node.invalid(format!(
                    "expected occur 'must', 'should' or 'must not', \
                     but was '{occur}'"
                ))
            })?;
            let query = clause
                .get("query")
                .ok_or_else(|| node.invalid("clause is missing 'query'"))?;
            clauses.push((occur, self.compile(query)?));
        }
        Ok(QueryTree::Boolean(clauses))
    }
}

fn parse_occur(occur: &str) -> Option<Occur> {
    match occur.to_lowercase().as_str() {
        "must" => Some(Occur::Must),
        "should" => Some(Occur::Should),
        "must not" => Some(Occur::MustNot),
        _ => None,
    }
}

fn integer_range(node: &Node, narrow: bool) -> Result<QueryTree> {
    let read_bound = |key: &str, include_key: &str| -> Result<Bound<i64>> {
        let Some(value) = node.opt_i64(key)? else {
            return Ok(Bound::Unbounded);
        };
        if narrow && i32::try_from(value).is_err() {
            return Err(node.invalid(format!("'{key}' is out of range")));
        }
        Ok(bound(value, node.bool_or(include_key, true)?))
    };

    Ok(QueryTree::Range {
        field: node.str("field")?.to_string(),
        range: NumericRange::I64 {
            lower: read_bound("minimum", "includeMinimum")?,
            upper: read_bound("maximum", "includeMaximum")?,
        },
    })
}

fn float_range(node: &Node, narrow: bool) -> Result<QueryTree> {
    let read_bound = |key: &str, include_key: &str| -> Result<Bound<f64>> {
        let Some(value) = node.opt_f64(key)? else {
            return Ok(Bound::Unbounded);
        };
        let value = if narrow { value as f32 as f64 } else { value };
        Ok(bound(value, node.bool_or(include_key, true)?))
    };

    Ok(QueryTree::Range {
        field: node.str("field")?.to_string(),
        range: NumericRange::F64 {
            lower: read_bound("minimum", "includeMinimum")?,
            upper: read_bound("maximum", "includeMaximum")?,
        },
    })
}

fn bound<T>(value: T, inclusive: bool) -> Bound<T> {
    if inclusive {
        Bound::Included(value)
    } else {
        Bound::Excluded(value)
    }
}

fn envelope(node: &Node) -> Result<BoundingBox> {
    Ok(BoundingBox {
        south: node.f64("southLatitude")?,
        west: node.f64("westLongitude")?,
        north: node.f64("northLatitude")?,
        east: node.f64("eastLongitude")?,
    })
}

fn circle(
    node: &Node,
    latitude_field: &str,
    longitude_field: &str,
) -> Result<QueryTree> {
    geo::circle(
        latitude_field,
        longitude_field,
        node.f64("centroidLatitude")?,
        node.f64("centroidLongitude")?,
        node.f64("radiusKilometers")?,
    )
}

fn event_tags(node: &Node) -> Result<QueryTree> {
    let tags = node
        .array("values")?
        .iter()
        .map(|value| {
            let tag = value
                .as_str()
                .ok_or_else(|| node.invalid("every value must be a string"))?;
            Ok(QueryTree::Term {
                field: fields::TAG_EXACT.to_string(),
                value: tag.to_uppercase(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(QueryTree::all_of(tags))
}

/// A JSON query node with typed field accessors that produce errors naming
/// the node's type and the offending field.
struct Node<'a> {
    /// The type as written, for error messages.
    type_name: String,
    /// Lowercased type.
    kind: String,
    fields: &'a Map<String, Value>,
}

impl<'a> Node<'a> {
    fn new(value: &'a Value) -> Result<Self> {
        let fields = value.as_object().ok_or_else(|| {
            Error::invalid_query("query", "expected a JSON object")
        })?;
        let type_name = fields
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::invalid_query("query", "missing string field 'type'")
            })?
            .to_string();
        Ok(Self {
            kind: type_name.to_lowercase(),
            type_name,
            fields,
        })
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::invalid_query(&self.type_name, reason)
    }

    /// `None` for absent and `null` values.
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    fn str(&self, key: &str) -> Result<&'a str> {
        self.get(key).and_then(Value::as_str).ok_or_else(|| {
            self.invalid(format!("missing string field '{key}'"))
        })
    }

    fn array(&self, key: &str) -> Result<&'a Vec<Value>> {
        self.get(key).and_then(Value::as_array).ok_or_else(|| {
            self.invalid(format!("missing array field '{key}'"))
        })
    }

    fn f64(&self, key: &str) -> Result<f64> {
        self.opt_f64(key)?.ok_or_else(|| {
            self.invalid(format!("missing numeric field '{key}'"))
        })
    }

    fn opt_f64(&self, key: &str) -> Result<Option<f64>> {
        self.get(key)
            .map(|v| {
                v.as_f64().ok_or_else(|| {
                    self.invalid(format!("'{key}' must be a number"))
                })
            })
            .transpose()
    }

    fn opt_i64(&self, key: &str) -> Result<Option<i64>> {
        self.get(key)
            .map(|v| {
                v.as_i64().ok_or_else(|| {
                    self.invalid(format!("'{key}' must be an integer"))
                })
            })
            .transpose()
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| {
                self.invalid(format!("'{key}' must be a boolean"))
            }),
        }
    }

    fn boost(&self) -> Result<f32> {
        Ok(self.opt_f64("boost")?.map_or(1.0, |b| b as f32))
    }
}
