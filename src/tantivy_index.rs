use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    Searcher,
    TantivyDocument,
    Term,
    directory::MmapDirectory,
    indexer::UserOperation,
    schema::*,
};
use tracing::{debug, info, trace, warn};

use crate::{
    analyzer::{self, NGRAM_TOKENIZER, TAG_TOKENIZER, WORD_TOKENIZER},
    error::{Error, Result},
    event::Event,
    projection::{self, IndexedRecord},
};

/// Field names used in the schema.
pub mod fields {
    pub const IDENTITY: &str = "identity";
    pub const PAYLOAD: &str = "payload";
    pub const CREATED: &str = "created";
    pub const MODIFIED: &str = "modified";
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const TAG: &str = "tag";
    pub const TAG_EXACT: &str = "tag_exact";
    pub const LOCATION_NAME: &str = "location_name";
    pub const ADDRESS_NAME: &str = "address_name";
    pub const STREET_ADDRESS: &str = "street_address";
    pub const POSTAL_CODE: &str = "postal_code";
    pub const ADDRESS_LOCALITY: &str = "address_locality";
    pub const ADDRESS_COUNTRY: &str = "address_country";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const COMBINED_NGRAMS: &str = "combined_ngrams";
    pub const SHOW_STATUS: &str = "show_status";
    pub const SHOW_START: &str = "show_start";
    pub const SHOW_END: &str = "show_end";
}

/// Resolved field handles for the schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaFields {
    pub identity: Field,
    pub payload: Field,
    pub created: Field,
    pub modified: Field,
    pub name: Field,
    pub description: Field,
    pub tag: Field,
    pub tag_exact: Field,
    pub location_name: Field,
    pub address_name: Field,
    pub street_address: Field,
    pub postal_code: Field,
    pub address_locality: Field,
    pub address_country: Field,
    pub latitude: Field,
    pub longitude: Field,
    pub combined_ngrams: Field,
    pub show_status: Field,
    pub show_start: Field,
    pub show_end: Field,
}

impl SchemaFields {
    fn resolve(schema: &Schema) -> Result<Self> {
        let f = |name: &str| -> Result<Field> { Ok(schema.get_field(name)?) };
        Ok(Self {
            identity: f(fields::IDENTITY)?,
            payload: f(fields::PAYLOAD)?,
            created: f(fields::CREATED)?,
            modified: f(fields::MODIFIED)?,
            name: f(fields::NAME)?,
            description: f(fields::DESCRIPTION)?,
            tag: f(fields::TAG)?,
            tag_exact: f(fields::TAG_EXACT)?,
            location_name: f(fields::LOCATION_NAME)?,
            address_name: f(fields::ADDRESS_NAME)?,
            street_address: f(fields::STREET_ADDRESS)?,
            postal_code: f(fields::POSTAL_CODE)?,
            address_locality: f(fields::ADDRESS_LOCALITY)?,
            address_country: f(fields::ADDRESS_COUNTRY)?,
            latitude: f(fields::LATITUDE)?,
            longitude: f(fields::LONGITUDE)?,
            combined_ngrams: f(fields::COMBINED_NGRAMS)?,
            show_status: f(fields::SHOW_STATUS)?,
            show_start: f(fields::SHOW_START)?,
            show_end: f(fields::SHOW_END)?,
        })
    }
}

fn analyzed(tokenizer: &str, record_option: IndexRecordOption) -> TextOptions {
    TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(tokenizer)
            .set_index_option(record_option),
    )
}

pub(crate) fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let identity =
        builder.add_u64_field(fields::IDENTITY, INDEXED | FAST | STORED);
    let payload = builder.add_text_field(fields::PAYLOAD, STORED);
    let created = builder.add_i64_field(fields::CREATED, INDEXED | FAST);
    let modified = builder.add_i64_field(fields::MODIFIED, INDEXED | FAST);

    let words = analyzed(
        WORD_TOKENIZER,
        IndexRecordOption::WithFreqsAndPositions,
    );
    let name = builder.add_text_field(fields::NAME, words.clone());
    let description =
        builder.add_text_field(fields::DESCRIPTION, words.clone());
    let tag = builder.add_text_field(
        fields::TAG,
        analyzed(TAG_TOKENIZER, IndexRecordOption::WithFreqs),
    );
    let tag_exact = builder.add_text_field(fields::TAG_EXACT, STRING);

    let location_name =
        builder.add_text_field(fields::LOCATION_NAME, words.clone());
    let address_name =
        builder.add_text_field(fields::ADDRESS_NAME, words.clone());
    let street_address =
        builder.add_text_field(fields::STREET_ADDRESS, words.clone());
    let postal_code =
        builder.add_text_field(fields::POSTAL_CODE, words.clone());
    let address_locality =
        builder.add_text_field(fields::ADDRESS_LOCALITY, words.clone());
    let address_country =
        builder.add_text_field(fields::ADDRESS_COUNTRY, words);

    let latitude = builder.add_f64_field(fields::LATITUDE, INDEXED | FAST);
    let longitude = builder.add_f64_field(fields::LONGITUDE, INDEXED | FAST);

    let combined_ngrams = builder.add_text_field(
        fields::COMBINED_NGRAMS,
        analyzed(NGRAM_TOKENIZER, IndexRecordOption::WithFreqs),
    );

    let show_status = builder.add_text_field(fields::SHOW_STATUS, STRING);
    let show_start = builder.add_i64_field(fields::SHOW_START, INDEXED | FAST);
    let show_end = builder.add_i64_field(fields::SHOW_END, INDEXED | FAST);

    let schema = builder.build();
    let fields = SchemaFields {
        identity,
        payload,
        created,
        modified,
        name,
        description,
        tag,
        tag_exact,
        location_name,
        address_name,
        street_address,
        postal_code,
        address_locality,
        address_country,
        latitude,
        longitude,
        combined_ngrams,
        show_status,
        show_start,
        show_end,
    };

    (schema, fields)
}

/// Owns the write and read side of the event index.
///
/// Opening acquires the index writer (and with it the directory lock) and a
/// manually reloaded reader. Writes become visible to searches only after
/// [`IndexManager::commit`]; every search runs on a [`Snapshot`] frozen at
/// acquisition time.
pub struct IndexManager {
    index: Index,
    fields: SchemaFields,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
}

impl IndexManager {
    /// Open or create the index at the given directory.
    ///
    /// A directory that is missing and cannot be created is fatal.
    pub fn open(dir: &Path, memory_budget: usize) -> Result<Self> {
        info!(path = %dir.display(), "opening event index");
        std::fs::create_dir_all(dir)
            .map_err(|_| Error::DataDir(dir.to_path_buf()))?;

        let (schema, _) = build_schema();
        let directory = MmapDirectory::open(dir)?;
        let index = Index::open_or_create(directory, schema)?;
        Self::from_index(index, memory_budget)
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram(memory_budget: usize) -> Result<Self> {
        let (schema, _) = build_schema();
        Self::from_index(Index::create_in_ram(schema), memory_budget)
    }

    fn from_index(index: Index, memory_budget: usize) -> Result<Self> {
        analyzer::register_tokenizers(&index)?;
        let fields = SchemaFields::resolve(&index.schema())?;

        let writer = index.writer(memory_budget)?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        info!("event index open");
        Ok(Self {
            index,
            fields,
            writer: Mutex::new(writer),
            reader,
        })
    }

    /// Release the reader, then the writer. Uncommitted writes are lost.
    pub fn close(self) -> Result<()> {
        let Self { reader, writer, .. } = self;
        drop(reader);
        let writer = writer.into_inner().map_err(|_| Error::LockPoisoned)?;
        writer.wait_merging_threads()?;
        info!("event index closed");
        Ok(())
    }

    pub fn fields(&self) -> SchemaFields {
        self.fields
    }

    pub fn schema(&self) -> Schema {
        self.index.schema()
    }

    /// Replace every record of `identity` with `records`.
    ///
    /// The delete and the inserts are submitted as one batch, so a snapshot
    /// sees either the previous record set or the new one.
    ///
    /// If the batch is rejected the writer is rolled back, which discards
    /// every write since the last commit, including earlier upserts and
    /// deletes that already returned `Ok`. The error is
    /// [`Error::UpsertRolledBack`]; callers must replay those writes.
    pub fn upsert(
        &self,
        identity: u64,
        records: &[IndexedRecord],
    ) -> Result<()> {
        let mut operations = Vec::with_capacity(records.len() + 1);
        operations.push(UserOperation::Delete(self.identity_term(identity)));
        operations.extend(
            records
                .iter()
                .map(|r| UserOperation::Add(self.document(identity, r))),
        );

        let mut writer = self.lock_writer()?;
        if let Err(e) = writer.run(operations) {
            warn!(identity, error = %e, "upsert failed, rolling back");
            writer.rollback()?;
            return Err(Error::UpsertRolledBack {
                identity,
                source: e,
            });
        }

        debug!(identity, records = records.len(), "upserted event");
        Ok(())
    }

    /// Project an event and upsert its records.
    pub fn index_event(&self, event: &Event, payload: &str) -> Result<()> {
        let records = projection::project(event, payload);
        self.upsert(event.identity, &records)
    }

    /// Retire every record of `identity`.
    pub fn delete(&self, identity: u64) -> Result<()> {
        let writer = self.lock_writer()?;
        writer.delete_term(self.identity_term(identity));
        debug!(identity, "deleted event");
        Ok(())
    }

    /// Persist pending writes and refresh the reader so new snapshots
    /// observe them.
    pub fn commit(&self) -> Result<()> {
        let mut writer = self.lock_writer()?;
        let opstamp = writer.commit()?;
        self.reader.reload()?;
        debug!(opstamp, "committed event index");
        Ok(())
    }

    /// Acquire a read-only view of the last committed state. Released on
    /// drop.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            searcher: self.reader.searcher(),
        }
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, IndexWriter>> {
        self.writer.lock().map_err(|_| Error::LockPoisoned)
    }

    fn identity_term(&self, identity: u64) -> Term {
        Term::from_field_u64(self.fields.identity, identity)
    }

    fn document(
        &self,
        identity: u64,
        record: &IndexedRecord,
    ) -> TantivyDocument {
        let f = &self.fields;
        let mut doc = TantivyDocument::default();

        doc.add_u64(f.identity, identity);
        doc.add_text(f.payload, &record.payload);
        doc.add_i64(f.created, record.created);
        doc.add_i64(f.modified, record.modified);

        let optional_text = [
            (f.name, &record.name),
            (f.description, &record.description),
            (f.location_name, &record.location_name),
            (f.address_name, &record.address_name),
            (f.street_address, &record.street_address),
            (f.postal_code, &record.postal_code),
            (f.address_locality, &record.address_locality),
            (f.address_country, &record.address_country),
        ];
        for (field, value) in optional_text {
            if let Some(value) = value {
                doc.add_text(field, value);
            }
        }

        for tag in &record.tags {
            doc.add_text(f.tag, tag);
            doc.add_text(f.tag_exact, tag.to_uppercase());
        }

        if let Some((latitude, longitude)) = record.coordinates {
            doc.add_f64(f.latitude, latitude);
            doc.add_f64(f.longitude, longitude);
        }

        for text in &record.combined_text {
            doc.add_text(f.combined_ngrams, text);
        }

        if let Some(show) = record.show {
            doc.add_text(f.show_status, show.status.as_str());
            doc.add_i64(f.show_start, show.start);
            if let Some(end) = show.end {
                doc.add_i64(f.show_end, end);
            }
        }

        doc
    }
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager").finish_non_exhaustive()
    }
}

/// A point-in-time view of the index used for one search.
pub struct Snapshot {
    searcher: Searcher,
}

impl Snapshot {
    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    /// Number of records (not events) visible in this snapshot.
    pub fn num_records(&self) -> u64 {
        self.searcher.num_docs()
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        trace!("released index snapshot");
    }
}

#[cfg(test)]
mod tests {
    use tantivy::{collector::Count, query::TermQuery};

    use super::*;
    use crate::event::{Show, ShowStatus};

    const BUDGET: usize = 15_000_000;

    fn event(identity: u64, shows: usize) -> Event {
        Event {
            identity,
            name: Some(format!("Event {identity}")),
            tags: vec!["jazz".into()],
            shows: (0..shows)
                .map(|i| Show {
                    status: ShowStatus::Scheduled,
                    start: 1000 + i as i64,
                    end: None,
                })
                .collect(),
            ..Event::default()
        }
    }

    fn records_of(idx: &IndexManager, identity: u64) -> usize {
        let snapshot = idx.snapshot();
        let query = TermQuery::new(
            Term::from_field_u64(idx.fields().identity, identity),
            IndexRecordOption::Basic,
        );
        snapshot.searcher().search(&query, &Count).unwrap()
    }

    #[test]
    fn one_record_per_show() {
        let idx = IndexManager::open_in_ram(BUDGET).unwrap();
        idx.index_event(&event(1, 3), "{}").unwrap();
        idx.index_event(&event(2, 0), "{}").unwrap();
        idx.commit().unwrap();

        assert_eq!(records_of(&idx, 1), 3);
        assert_eq!(records_of(&idx, 2), 1);
        assert_eq!(idx.snapshot().num_records(), 4);
    }

    #[test]
    fn writes_are_invisible_until_commit() {
        let idx = IndexManager::open_in_ram(BUDGET).unwrap();
        idx.index_event(&event(1, 2), "{}").unwrap();
        assert_eq!(records_of(&idx, 1), 0);

        idx.commit().unwrap();
        assert_eq!(records_of(&idx, 1), 2);
    }

    #[test]
    fn upsert_replaces_the_whole_record_set() {
        let idx = IndexManager::open_in_ram(BUDGET).unwrap();
        idx.index_event(&event(1, 3), "{}").unwrap();
        idx.commit().unwrap();

        idx.index_event(&event(1, 1), "{}").unwrap();
        idx.commit().unwrap();

        assert_eq!(records_of(&idx, 1), 1);
    }

    #[test]
    fn delete_retires_every_record() {
        let idx = IndexManager::open_in_ram(BUDGET).unwrap();
        idx.index_event(&event(1, 2), "{}").unwrap();
        idx.index_event(&event(2, 1), "{}").unwrap();
        idx.commit().unwrap();

        idx.delete(1).unwrap();
        idx.commit().unwrap();

        assert_eq!(records_of(&idx, 1), 0);
        assert_eq!(records_of(&idx, 2), 1);
    }

    #[test]
    fn snapshot_is_frozen_at_acquisition() {
        let idx = IndexManager::open_in_ram(BUDGET).unwrap();
        idx.index_event(&event(1, 1), "{}").unwrap();
        idx.commit().unwrap();

        let before = idx.snapshot();
        idx.index_event(&event(2, 1), "{}").unwrap();
        idx.commit().unwrap();

        assert_eq!(before.num_records(), 1);
        assert_eq!(idx.snapshot().num_records(), 2);
    }

    #[test]
    fn concurrent_readers_never_see_a_mixture() {
        let idx = IndexManager::open_in_ram(BUDGET).unwrap();
        idx.index_event(&event(1, 3), "{}").unwrap();
        idx.commit().unwrap();

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                for _ in 0..200 {
                    let count = records_of(&idx, 1);
                    assert!(count == 3 || count == 2, "saw {count} records");
                }
            });

            for round in 0..20 {
                let shows = if round % 2 == 0 { 2 } else { 3 };
                idx.index_event(&event(1, shows), "{}").unwrap();
                idx.commit().unwrap();
            }

            reader.join().unwrap();
        });
    }

    #[test]
    fn disk_persistence() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");

        {
            let idx = IndexManager::open(&dir, BUDGET).unwrap();
            idx.index_event(&event(9, 2), "{\"identity\":9}").unwrap();
            idx.commit().unwrap();
            idx.close().unwrap();
        }

        {
            let idx = IndexManager::open(&dir, BUDGET).unwrap();
            assert_eq!(records_of(&idx, 9), 2);
            idx.close().unwrap();
        }
    }

    #[test]
    fn uncreatable_directory_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("file");
        std::fs::write(&file, "x").unwrap();

        let err = IndexManager::open(&file.join("index"), BUDGET).unwrap_err();
        assert!(matches!(err, Error::DataDir(_)));
    }

    #[test]
    fn tags_are_indexed_exactly_in_upper_case() {
        let idx = IndexManager::open_in_ram(BUDGET).unwrap();
        let mut live = event(1, 0);
        live.tags = vec!["Live Music".into()];
        idx.index_event(&live, "{}").unwrap();
        idx.commit().unwrap();

        let query = TermQuery::new(
            Term::from_field_text(idx.fields().tag_exact, "LIVE MUSIC"),
            IndexRecordOption::Basic,
        );
        let count = idx.snapshot().searcher().search(&query, &Count).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn rolled_back_upsert_reports_discarded_writes() {
        let err = Error::UpsertRolledBack {
            identity: 42,
            source: tantivy::TantivyError::InvalidArgument("closed".into()),
        };
        let message = err.to_string();
        assert!(message.contains("event 42"));
        assert!(message.contains("every write since the last commit"));
    }
}
