use std::io::BufRead;

use rayon::prelude::*;
use tracing::info;

use crate::{
    error::{Error, Result},
    event::Event,
    projection::{self, IndexedRecord},
    tantivy_index::IndexManager,
};

/// An event parsed from one input line, with the line kept verbatim as its
/// payload.
#[derive(Debug, Clone)]
pub struct ImportedEvent {
    pub event: Event,
    pub payload: String,
}

/// Read JSON-lines events. Blank lines are skipped; line numbers in errors
/// are 1-based.
pub fn read_events(input: impl BufRead) -> Result<Vec<ImportedEvent>> {
    let mut events = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let line = line?;
        let payload = line.trim();
        if payload.is_empty() {
            continue;
        }
        let event = serde_json::from_str(payload)
            .map_err(|source| Error::InvalidEvent { line: i + 1, source })?;
        events.push(ImportedEvent {
            event,
            payload: payload.to_string(),
        });
    }
    Ok(events)
}

/// Upsert a batch of events into the index and commit once.
///
/// Returns the number of records written.
pub fn ingest_events(
    index: &IndexManager,
    events: &[ImportedEvent],
) -> Result<usize> {
    // Project in parallel, then write sequentially through the single writer.
    let projected: Vec<(u64, Vec<IndexedRecord>)> = events
        .par_iter()
        .map(|e| {
            (
                e.event.identity,
                projection::project(&e.event, &e.payload),
            )
        })
        .collect();

    let mut records = 0;
    for (identity, event_records) in &projected {
        index.upsert(*identity, event_records)?;
        records += event_records.len();
    }

    index.commit()?;
    info!(events = events.len(), records, "imported events");
    Ok(records)
}
