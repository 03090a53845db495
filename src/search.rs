use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tantivy::{
    DocAddress,
    DocId,
    Score,
    SegmentOrdinal,
    SegmentReader,
    TantivyDocument,
    collector::{Collector, SegmentCollector},
    columnar::Column,
    schema::{Field, Value as _},
};
use tracing::debug;

use crate::{
    error::Result,
    query_dsl::QueryCompiler,
    query_tree::QueryTree,
    tantivy_index::{IndexManager, fields},
};

const DEFAULT_LIMIT: usize = 10;

/// A compiled query plus its execution options.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: QueryTree,
    /// When false every score is 0 and ordering falls back to identity.
    pub scoring: bool,
    pub include_payload: bool,
    pub start_index: usize,
    pub limit: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    query: Value,
    #[serde(default = "scoring_default")]
    scoring: bool,
    #[serde(default)]
    include_payload: bool,
    #[serde(default)]
    start_index: usize,
    #[serde(default = "limit_default")]
    limit: usize,
}

fn scoring_default() -> bool {
    true
}

fn limit_default() -> usize {
    DEFAULT_LIMIT
}

impl SearchRequest {
    /// A scored request for the first page of `query`.
    pub fn new(query: QueryTree) -> Self {
        Self {
            query,
            scoring: true,
            include_payload: false,
            start_index: 0,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Parse `{query, scoring?, includePayload?, startIndex?, limit?}` and
    /// compile the query.
    pub fn from_json(
        request: &Value,
        compiler: &QueryCompiler,
    ) -> Result<Self> {
        let raw: RawRequest = serde_json::from_value(request.clone())?;
        Ok(Self {
            query: compiler.compile(&raw.query)?,
            scoring: raw.scoring,
            include_payload: raw.include_payload,
            start_index: raw.start_index,
            limit: raw.limit,
        })
    }
}

/// One entity in a result page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub identity: u64,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    /// Distinct matching identities, not matching records.
    pub total_matches: usize,
    pub results: Vec<SearchResult>,
}

/// Execute `request` against the latest committed state of `index`.
///
/// Records are grouped by identity; an identity scores the maximum of its
/// matching records. Identities are ranked by score descending, then by
/// identity ascending, and the `[start_index, start_index + limit)` window
/// of that ranking is returned.
pub fn execute(
    index: &IndexManager,
    request: &SearchRequest,
) -> Result<SearchResults> {
    let snapshot = index.snapshot();
    let searcher = snapshot.searcher();

    let query = request.query.to_query(searcher.schema())?;
    let best = searcher.search(
        query.as_ref(),
        &BestRecordPerIdentity {
            scoring: request.scoring,
        },
    )?;

    let total_matches = best.len();
    let mut ranked: Vec<(u64, BestRecord)> = best.into_iter().collect();
    ranked.sort_by(|(a_id, a), (b_id, b)| {
        b.score.total_cmp(&a.score).then(a_id.cmp(b_id))
    });

    let payload_field = index.fields().payload;
    let results = ranked
        .into_iter()
        .skip(request.start_index)
        .take(request.limit)
        .map(|(identity, best)| {
            let payload = if request.include_payload {
                let doc: TantivyDocument = searcher.doc(best.address)?;
                Some(extract_text(&doc, payload_field))
            } else {
                None
            };
            Ok(SearchResult {
                identity,
                score: best.score,
                payload,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        total_matches,
        returned = results.len(),
        start_index = request.start_index,
        "executed search"
    );

    Ok(SearchResults {
        total_matches,
        results,
    })
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

#[derive(Debug, Clone, Copy)]
struct BestRecord {
    score: Score,
    address: DocAddress,
}

/// Keep `candidate` if it beats the record already held for `identity`.
fn keep_best(
    best: &mut HashMap<u64, BestRecord>,
    identity: u64,
    candidate: BestRecord,
) {
    best.entry(identity)
        .and_modify(|held| {
            if candidate.score > held.score {
                *held = candidate;
            }
        })
        .or_insert(candidate);
}

/// Folds every matching record into a per-identity best record.
struct BestRecordPerIdentity {
    scoring: bool,
}

impl Collector for BestRecordPerIdentity {
    type Fruit = HashMap<u64, BestRecord>;
    type Child = BestRecordSegmentCollector;

    fn for_segment(
        &self,
        segment_ord: SegmentOrdinal,
        segment: &SegmentReader,
    ) -> tantivy::Result<Self::Child> {
        let identities = segment.fast_fields().u64(fields::IDENTITY)?;
        Ok(BestRecordSegmentCollector {
            segment_ord,
            identities,
            scoring: self.scoring,
            best: HashMap::new(),
        })
    }

    fn requires_scoring(&self) -> bool {
        self.scoring
    }

    fn merge_fruits(
        &self,
        segment_fruits: Vec<Self::Fruit>,
    ) -> tantivy::Result<Self::Fruit> {
        let mut merged = HashMap::new();
        for fruit in segment_fruits {
            for (identity, candidate) in fruit {
                keep_best(&mut merged, identity, candidate);
            }
        }
        Ok(merged)
    }
}

struct BestRecordSegmentCollector {
    segment_ord: SegmentOrdinal,
    identities: Column<u64>,
    scoring: bool,
    best: HashMap<u64, BestRecord>,
}

impl SegmentCollector for BestRecordSegmentCollector {
    type Fruit = HashMap<u64, BestRecord>;

    fn collect(&mut self, doc: DocId, score: Score) {
        let Some(identity) = self.identities.first(doc) else {
            return;
        };
        let candidate = BestRecord {
            score: if self.scoring { score } else { 0.0 },
            address: DocAddress::new(self.segment_ord, doc),
        };
        keep_best(&mut self.best, identity, candidate);
    }

    fn harvest(self) -> Self::Fruit {
        self.best
    }
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &SearchResults) {
    if results.results.is_empty() {
        println!("No results found.");
        return;
    }

    for r in &results.results {
        println!("[{:.3}] {}", r.score, r.identity);
        if let Some(payload) = &r.payload {
            println!("     {payload}");
        }
    }
    println!(
        "\n{} of {} match(es)",
        results.results.len(),
        results.total_matches
    );
}

/// Format results as JSON output.
pub fn format_json(results: &SearchResults) -> Result<()> {
    println!("{}", serde_json::to_string(results)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tantivy::{collector::TopDocs, query::Occur};

    use super::*;
    use crate::{
        event::{Event, Show, ShowStatus},
        text_query::{TextQueryWeights, event_text_query},
    };

    fn compiler() -> QueryCompiler {
        QueryCompiler::at(0, TextQueryWeights::default())
    }

    fn named(identity: u64, name: &str) -> Event {
        Event {
            identity,
            name: Some(name.into()),
            ..Event::default()
        }
    }

    fn index(events: &[Event]) -> IndexManager {
        let idx = IndexManager::open_in_ram(15_000_000).unwrap();
        for event in events {
            let payload = serde_json::to_string(event).unwrap();
            idx.index_event(event, &payload).unwrap();
        }
        idx.commit().unwrap();
        idx
    }

    fn show(status: ShowStatus, start: i64) -> Show {
        Show {
            status,
            start,
            end: None,
        }
    }

    fn status_query() -> QueryTree {
        let status = |value: &str| QueryTree::Term {
            field: fields::SHOW_STATUS.into(),
            value: value.into(),
        };
        QueryTree::Boolean(vec![
            (Occur::Should, status("scheduled")),
            (Occur::Should, status("cancelled").boosted(3.0)),
        ])
    }

    #[test]
    fn identity_scores_the_max_of_its_records() {
        let mut both = named(1, "Double bill");
        both.shows = vec![
            show(ShowStatus::Scheduled, 10),
            show(ShowStatus::Cancelled, 20),
        ];
        let mut single = named(2, "Single");
        single.shows = vec![show(ShowStatus::Scheduled, 30)];
        let idx = index(&[both, single]);

        let request = SearchRequest::new(status_query());
        let results = execute(&idx, &request).unwrap();

        assert_eq!(results.total_matches, 2);
        assert_eq!(results.results.len(), 2);
        assert_eq!(results.results[0].identity, 1);

        let snapshot = idx.snapshot();
        let query = status_query()
            .to_query(snapshot.searcher().schema())
            .unwrap();
        let top = snapshot
            .searcher()
            .search(query.as_ref(), &TopDocs::with_limit(10))
            .unwrap();
        let max = top.iter().map(|(s, _)| *s).fold(f32::MIN, f32::max);
        assert!((results.results[0].score - max).abs() < 1e-6);
    }

    #[test]
    fn fold_keeps_the_higher_score() {
        let mut best = HashMap::new();
        let at = |doc| DocAddress::new(0, doc);
        keep_best(&mut best, 7, BestRecord { score: 0.8, address: at(0) });
        keep_best(&mut best, 7, BestRecord { score: 1.3, address: at(1) });
        keep_best(&mut best, 7, BestRecord { score: 1.0, address: at(2) });

        assert_eq!(best.len(), 1);
        assert_eq!(best[&7].score, 1.3);
        assert_eq!(best[&7].address, at(1));
    }

    #[test]
    fn pagination_windows_distinct_identities() {
        // Equal-length names where identity i repeats "cinema" i times, so
        // scores rise strictly with identity.
        let events: Vec<Event> = (1..=5)
            .map(|i| {
                let words: Vec<&str> = (0..5)
                    .map(|w| if w < i { "cinema" } else { "sunset" })
                    .collect();
                named(i, &words.join(" "))
            })
            .collect();
        let idx = index(&events);
        let query = compiler()
            .compile(&json!({"type": "event text", "text": "cinema"}))
            .unwrap();

        let mut request = SearchRequest::new(query);
        request.limit = 2;
        let page = execute(&idx, &request).unwrap();
        assert_eq!(page.total_matches, 5);
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[0].identity, 5);
        assert_eq!(page.results[1].identity, 4);
        assert!(page.results[0].score > page.results[1].score);

        request.start_index = 4;
        let tail = execute(&idx, &request).unwrap();
        assert_eq!(tail.results.len(), 1);
        assert_eq!(tail.results[0].identity, 1);

        request.start_index = 10;
        let empty = execute(&idx, &request).unwrap();
        assert_eq!(empty.total_matches, 5);
        assert!(empty.results.is_empty());
    }

    #[test]
    fn equal_scores_fall_back_to_ascending_identity() {
        let events: Vec<Event> =
            (1..=3).rev().map(|i| named(i, "Open air cinema")).collect();
        let idx = index(&events);
        let query = compiler()
            .compile(&json!({"type": "event text", "text": "cinema"}))
            .unwrap();

        let results = execute(&idx, &SearchRequest::new(query)).unwrap();
        let ids: Vec<u64> =
            results.results.iter().map(|r| r.identity).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn many_shows_give_one_result() {
        let mut event = named(1, "Festival");
        event.shows = (0..4).map(|i| show(ShowStatus::Scheduled, i)).collect();
        let idx = index(&[event]);

        let request = SearchRequest::new(QueryTree::MatchAll);
        let results = execute(&idx, &request).unwrap();
        assert_eq!(results.total_matches, 1);
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].score, 0.0);
    }

    #[test]
    fn long_range_over_show_start() {
        let events: Vec<Event> = (1..=30)
            .map(|i| {
                let mut e = named(i, "Show");
                e.shows = vec![show(ShowStatus::Scheduled, i as i64)];
                e
            })
            .collect();
        let idx = index(&events);

        let query = compiler()
            .compile(&json!({
                "type": "long range",
                "field": fields::SHOW_START,
                "minimum": 10, "includeMinimum": false,
                "maximum": 20, "includeMaximum": true,
            }))
            .unwrap();
        let mut request = SearchRequest::new(query);
        request.limit = 100;

        let results = execute(&idx, &request).unwrap();
        let mut ids: Vec<u64> =
            results.results.iter().map(|r| r.identity).collect();
        ids.sort_unstable();
        assert_eq!(ids, (11..=20).collect::<Vec<_>>());
    }

    #[test]
    fn tag_phrase_matches_the_tagged_record() {
        let mut tagged = named(1, "Evening concert");
        tagged.tags = vec!["jazz night".into()];
        let mut night_only = named(2, "Late show");
        night_only.tags = vec!["night".into()];
        let idx = index(&[tagged, night_only]);

        let phrase = QueryTree::Term {
            field: fields::TAG.into(),
            value: "jazz night".into(),
        };
        let results =
            execute(&idx, &SearchRequest::new(phrase.clone())).unwrap();
        assert_eq!(results.total_matches, 1);
        assert_eq!(results.results[0].identity, 1);

        let text = event_text_query("jazz night", &TextQueryWeights::default())
            .unwrap();
        let QueryTree::DisjunctionMax { disjuncts, .. } = text else {
            panic!("expected a disjunction max");
        };
        assert!(disjuncts.contains(&phrase.boosted(2.0)));
    }

    #[test]
    fn tag_phrase_outranks_name_word_that_is_common_in_names() {
        // The tag disjunct is weighted 2 and the name disjunct 3, so with
        // comparable idf a bare name match wins under max-only scoring.
        // The tagged event ranks first only because "jazz" appears in many
        // names here, which lowers its name-field idf.
        let mut tagged = named(1, "Evening concert");
        tagged.tags = vec!["jazz night".into()];
        let mut events = vec![tagged, named(2, "jazz")];
        events.extend((10..18).map(|i| named(i, "jazz brunch")));
        let idx = index(&events);

        let query = compiler()
            .compile(&json!({"type": "event text", "text": "jazz night"}))
            .unwrap();
        let results = execute(&idx, &SearchRequest::new(query)).unwrap();

        let rank = |identity| {
            results
                .results
                .iter()
                .position(|r| r.identity == identity)
                .unwrap()
        };
        assert!(rank(1) < rank(2));
    }

    #[test]
    fn name_word_outranks_tag_phrase_with_comparable_idf() {
        let mut tagged = named(1, "Evening concert");
        tagged.tags = vec!["jazz night".into()];
        let idx = index(&[tagged, named(2, "jazz")]);

        let query = compiler()
            .compile(&json!({"type": "event text", "text": "jazz night"}))
            .unwrap();
        let results = execute(&idx, &SearchRequest::new(query)).unwrap();

        let ids: Vec<u64> =
            results.results.iter().map(|r| r.identity).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn unscored_search_returns_zero_scores() {
        let idx = index(&[named(1, "jazz"), named(2, "jazz jazz")]);
        let query = compiler()
            .compile(&json!({"type": "event text", "text": "jazz"}))
            .unwrap();
        let mut request = SearchRequest::new(query);
        request.scoring = false;

        let results = execute(&idx, &request).unwrap();
        assert_eq!(results.total_matches, 2);
        assert!(results.results.iter().all(|r| r.score == 0.0));
        assert_eq!(results.results[0].identity, 1);
    }

    #[test]
    fn payload_is_attached_on_request() {
        let idx = index(&[named(3, "Opera")]);
        let mut request = SearchRequest::new(QueryTree::MatchAll);

        let without = execute(&idx, &request).unwrap();
        assert_eq!(without.results[0].payload, None);

        request.include_payload = true;
        let with = execute(&idx, &request).unwrap();
        let payload: Event =
            serde_json::from_str(with.results[0].payload.as_deref().unwrap())
                .unwrap();
        assert_eq!(payload.identity, 3);
    }

    #[test]
    fn request_json_defaults() {
        let request = SearchRequest::from_json(
            &json!({"query": {"type": "match all documents"}}),
            &compiler(),
        )
        .unwrap();
        assert_eq!(request.query, QueryTree::MatchAll);
        assert!(request.scoring);
        assert!(!request.include_payload);
        assert_eq!(request.start_index, 0);
        assert_eq!(request.limit, 10);
    }

    #[test]
    fn request_json_with_bogus_type_fails() {
        let err = SearchRequest::from_json(
            &json!({"query": {"type": "bogus"}}),
            &compiler(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::UnsupportedQueryType(t) if t == "bogus"
        ));
    }

    #[test]
    fn results_serialize_in_camel_case() {
        let results = SearchResults {
            total_matches: 1,
            results: vec![SearchResult {
                identity: 4,
                score: 0.5,
                payload: None,
            }],
        };
        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            json!({
                "totalMatches": 1,
                "results": [{"identity": 4, "score": 0.5}]
            })
        );
    }
}
