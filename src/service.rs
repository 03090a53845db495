use std::io::BufRead;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::{
    config::Settings,
    data_dir::DataDir,
    error::Result,
    ingestion,
    query_dsl::QueryCompiler,
    query_tree::QueryTree,
    search::{self, SearchRequest, SearchResults},
    tantivy_index::IndexManager,
};

/// Everything a caller needs to index and search events: the settings it
/// was opened with and the index they configure.
///
/// There is no process-wide instance; open one and pass it around.
#[derive(Debug)]
pub struct SearchService {
    settings: Settings,
    index: IndexManager,
}

/// Index size, as reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub records: u64,
    pub events: usize,
}

impl SearchService {
    /// Open the index under `data_dir` with the given settings.
    pub fn open(data_dir: &DataDir, settings: Settings) -> Result<Self> {
        let index = IndexManager::open(
            &data_dir.index_dir(),
            settings.writer_memory_budget,
        )?;
        info!(data_dir = %data_dir.root().display(), "search service ready");
        Ok(Self { settings, index })
    }

    /// Open a service over an in-memory index (for testing).
    pub fn open_in_ram(settings: Settings) -> Result<Self> {
        let index = IndexManager::open_in_ram(settings.writer_memory_budget)?;
        Ok(Self { settings, index })
    }

    pub fn close(self) -> Result<()> {
        self.index.close()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    /// A compiler using the configured text weights, with `now` fixed at the
    /// time of the call.
    pub fn compiler(&self) -> QueryCompiler {
        QueryCompiler::new(self.settings.text_query)
    }

    /// Import JSON-lines events and commit. Returns the number of events.
    pub fn import(&self, input: impl BufRead) -> Result<usize> {
        let events = ingestion::read_events(input)?;
        ingestion::ingest_events(&self.index, &events)?;
        Ok(events.len())
    }

    /// Delete an event and commit.
    pub fn delete(&self, identity: u64) -> Result<()> {
        self.index.delete(identity)?;
        self.index.commit()
    }

    /// Compile a DSL query into a default request.
    pub fn request(&self, query: &Value) -> Result<SearchRequest> {
        Ok(SearchRequest::new(self.compiler().compile(query)?))
    }

    pub fn execute(&self, request: &SearchRequest) -> Result<SearchResults> {
        search::execute(&self.index, request)
    }

    pub fn status(&self) -> Result<Status> {
        let records = self.index.snapshot().num_records();
        let mut request = SearchRequest::new(QueryTree::MatchAll);
        request.scoring = false;
        request.limit = 0;
        let events = self.execute(&request)?.total_matches;
        Ok(Status { records, events })
    }
}
