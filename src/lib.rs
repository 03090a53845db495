//! event-search - a search engine for events and their shows.
//!
//! Events are projected into one index record per show and stored in a
//! [Tantivy](https://github.com/quickwit-oss/tantivy) index. Queries are
//! written in a small JSON language, compiled into a [`QueryTree`], and
//! executed so that every event appears at most once in a result page,
//! scored by its best matching show.
//!
//! # Quick start
//!
//! ```no_run
//! use event_search::{DataDir, SearchService, Settings};
//! use serde_json::json;
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let settings = Settings::load(&data_dir.settings_file()).unwrap();
//! let service = SearchService::open(&data_dir, settings).unwrap();
//!
//! let events = r#"{"identity": 1, "name": "Jazz night", "shows": [{"start": 1767225600000}]}"#;
//! service.import(events.as_bytes()).unwrap();
//!
//! let request = service
//!     .request(&json!({"type": "boolean query", "clauses": [
//!         {"occur": "must", "query": {"type": "event text", "text": "jazz"}},
//!         {"occur": "must", "query": {"type": "future events"}}
//!     ]}))
//!     .unwrap();
//! for r in service.execute(&request).unwrap().results {
//!     println!("{} (score: {:.3})", r.identity, r.score);
//! }
//! ```

pub mod analyzer;
pub mod config;
pub mod data_dir;
pub mod error;
pub mod event;
pub mod geo;
pub mod ingestion;
pub mod projection;
pub mod query_dsl;
pub mod query_tree;
pub mod search;
pub mod service;
pub mod tantivy_index;
pub mod text_query;

pub use config::Settings;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use event::Event;
pub use query_dsl::QueryCompiler;
pub use query_tree::QueryTree;
pub use search::{SearchRequest, SearchResults};
pub use service::SearchService;
pub use tantivy_index::IndexManager;
