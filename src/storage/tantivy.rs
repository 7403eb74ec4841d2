//! Tantivy-backed index handle
//!
//! One [`IndexHandle`] owns the on-disk index of one entity kind. The tantivy
//! schema is derived from the kind's [`FieldSchema`]: exact fields become
//! `STRING` fields, tokenized fields use the default tokenizer with positions.
//!
//! Writes happen in scoped batches. A batch opens the writer, applies its
//! operations, commits, compacts the segments and reloads the reader before
//! the writer is released, so a finished `upsert` is immediately searchable.

use crate::codec::FieldDocument;
use crate::config::Settings;
use crate::error::{IndexError, IndexResult, StorageContext};
use crate::query::{BuiltQuery, parse_with_fallback};
use crate::schema::{FieldSchema, SortOrder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tantivy::{
    DocAddress, Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy,
    TantivyDocument as Document, TantivyError, Term,
    collector::{Count, DocSetCollector, TopDocs},
    directory::{MmapDirectory, error::LockError},
    query::{Query, QueryParser},
    schema::{
        Field, IndexRecordOption, STORED, STRING, Schema, SchemaBuilder, TextFieldIndexing,
        TextOptions, Value,
    },
};

/// File tantivy holds an exclusive OS lock on while a writer is alive
///
/// The file itself stays on disk after the writer is released.
pub const WRITER_LOCK_FILE: &str = ".tantivy-writer.lock";

/// Clamp the writer heap to what tantivy accepts (15MB-2GB)
pub fn normalized_heap_bytes(heap_bytes: usize) -> usize {
    const MIN_HEAP: usize = 15 * 1024 * 1024; // 15MB
    const MAX_HEAP: usize = 2 * 1024 * 1024 * 1024; // 2GB
    heap_bytes.clamp(MIN_HEAP, MAX_HEAP)
}

/// Build the tantivy schema of one kind
///
/// Returns the schema plus a name→field map for the codec.
fn build_schema(fields: &FieldSchema) -> (Schema, HashMap<&'static str, Field>) {
    let mut builder = SchemaBuilder::default();

    let text_indexing = TextFieldIndexing::default()
        .set_tokenizer("default")
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);

    let mut map = HashMap::with_capacity(fields.fields.len());
    for spec in fields.fields {
        let field = if spec.is_tokenized() {
            let mut options = TextOptions::default().set_indexing_options(text_indexing.clone());
            if spec.stored {
                options = options.set_stored();
            }
            builder.add_text_field(spec.name, options)
        } else if spec.stored {
            builder.add_text_field(spec.name, STRING | STORED)
        } else {
            builder.add_text_field(spec.name, STRING)
        };
        map.insert(spec.name, field);
    }

    (builder.build(), map)
}

/// Open index of one entity kind
pub struct IndexHandle {
    schema: &'static FieldSchema,
    index: Index,
    reader: IndexReader,
    fields: HashMap<&'static str, Field>,
    index_path: PathBuf,
    heap_size: usize,
    optimize_after_write: bool,
    /// Serializes write batches within this process
    write_guard: Mutex<()>,
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("kind", &self.schema.kind)
            .field("index_path", &self.index_path)
            .field("heap_size", &self.heap_size)
            .finish()
    }
}

impl IndexHandle {
    /// Open the index at `index_path`, creating the directory and an empty
    /// index when none exists yet
    pub fn open(
        index_path: impl AsRef<Path>,
        schema: &'static FieldSchema,
        settings: &Settings,
    ) -> IndexResult<Self> {
        let index_path = index_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&index_path).storage_at(&index_path)?;

        let heap_size = normalized_heap_bytes(settings.heap_bytes());
        let (tantivy_schema, fields) = build_schema(schema);

        let existing = index_path.join("meta.json").exists();
        let index = if existing {
            Index::open_in_dir(&index_path).storage_at(&index_path)?
        } else {
            let dir = MmapDirectory::open(&index_path).storage_at(&index_path)?;
            Index::create(dir, tantivy_schema, IndexSettings::default())
                .storage_at(&index_path)?
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::tantivy("open reader", e))?;

        tracing::debug!(
            kind = %schema.kind,
            path = %index_path.display(),
            existing,
            heap_mb = heap_size / 1_000_000,
            "index opened"
        );

        Ok(Self {
            schema,
            index,
            reader,
            fields,
            index_path,
            heap_size,
            optimize_after_write: settings.indexing.optimize_after_write,
            write_guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.index_path
    }

    pub fn schema(&self) -> &'static FieldSchema {
        self.schema
    }

    /// Number of live documents visible to searches
    pub fn document_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Add documents in one batch, replacing documents with the same key when
    /// the kind has replace semantics
    ///
    /// A failure part way leaves the documents applied before it committed.
    pub fn upsert_documents(&self, docs: &[FieldDocument]) -> IndexResult<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let key_field = self.field(self.schema.key_field)?;
        let replaces = self.schema.kind.replaces_on_upsert();

        self.with_writer(|writer| {
            for doc in docs {
                if replaces {
                    if let Some(key) = doc.get(self.schema.key_field) {
                        writer.delete_term(Term::from_field_text(key_field, key));
                    }
                }
                writer
                    .add_document(self.to_tantivy(doc))
                    .map_err(|e| IndexError::tantivy("add document", e))?;
            }
            Ok(docs.len())
        })
        .map(|added| {
            tracing::debug!(kind = %self.schema.kind, added, "documents upserted");
        })
    }

    /// Run a query and return at most `max_hits` documents in `order`
    pub fn search(
        &self,
        query: &BuiltQuery,
        max_hits: usize,
        order: SortOrder,
    ) -> IndexResult<Vec<FieldDocument>> {
        let targets = query
            .target_fields
            .iter()
            .map(|name| self.field(name))
            .collect::<IndexResult<Vec<Field>>>()?;

        let mut parser = QueryParser::for_index(&self.index, targets);
        if query.conjunction {
            parser.set_conjunction_by_default();
        }
        let parsed: Box<dyn Query> =
            parse_with_fallback(&query.expression, |q| parser.parse_query(q))?;

        let searcher = self.reader.searcher();
        let total = searcher
            .search(&*parsed, &Count)
            .map_err(|e| IndexError::tantivy("count", e))?;
        let limit = total.min(max_hits);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let addresses: Vec<DocAddress> = match order {
            SortOrder::Relevance => searcher
                .search(&*parsed, &TopDocs::with_limit(limit))
                .map_err(|e| IndexError::tantivy("search", e))?
                .into_iter()
                .map(|(_score, addr)| addr)
                .collect(),
            SortOrder::IndexOrder | SortOrder::FieldAscending(_) => {
                let mut all: Vec<DocAddress> = searcher
                    .search(&*parsed, &DocSetCollector)
                    .map_err(|e| IndexError::tantivy("search", e))?
                    .into_iter()
                    .collect();
                all.sort();
                if order == SortOrder::IndexOrder {
                    all.truncate(limit);
                }
                all
            }
        };

        let mut docs = Vec::with_capacity(addresses.len());
        for addr in addresses {
            let stored: Document = searcher
                .doc(addr)
                .map_err(|e| IndexError::tantivy("load document", e))?;
            docs.push(self.from_tantivy(&stored));
        }

        if let SortOrder::FieldAscending(name) = order {
            // case-insensitive and stable, so ties keep index order
            docs.sort_by_cached_key(|doc| doc.get(name).unwrap_or("").to_lowercase());
        }
        docs.truncate(limit);

        tracing::debug!(
            kind = %self.schema.kind,
            query = %query.expression,
            total,
            returned = docs.len(),
            "search finished"
        );
        Ok(docs)
    }

    /// Run `ops` against a fresh writer, then commit, compact and reload
    ///
    /// The commit happens even when `ops` fails so the operations applied
    /// before the failure persist.
    fn with_writer<T>(
        &self,
        ops: impl FnOnce(&mut IndexWriter<Document>) -> IndexResult<T>,
    ) -> IndexResult<T> {
        let _guard = self.write_guard.lock().map_err(|_| IndexError::MutexPoisoned)?;

        let mut writer = self.acquire_writer()?;

        let outcome = ops(&mut writer);

        writer
            .commit()
            .map_err(|e| IndexError::tantivy("commit", e))?;

        if self.optimize_after_write {
            self.optimize(&mut writer);
        }
        if let Err(e) = writer.wait_merging_threads() {
            tracing::warn!(kind = %self.schema.kind, error = %e, "merge threads did not finish cleanly");
        }

        self.reader
            .reload()
            .map_err(|e| IndexError::tantivy("reload reader", e))?;

        outcome
    }

    /// Merge all searchable segments into one; failures only degrade
    /// performance and are logged
    fn optimize(&self, writer: &mut IndexWriter<Document>) {
        let segments = match self.index.searchable_segment_ids() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(kind = %self.schema.kind, error = %e, "could not list segments");
                return;
            }
        };
        if segments.len() < 2 {
            return;
        }
        if let Err(e) = writer.merge(&segments).wait() {
            tracing::warn!(
                kind = %self.schema.kind,
                segments = segments.len(),
                error = %e,
                "segment merge failed"
            );
        }
    }

    /// Open the single writer of this index
    ///
    /// A writer alive elsewhere (another handle or another process) makes this
    /// fail with [`IndexError::StorageUnavailable`]. A lock file nobody holds
    /// is reused as is; one that cannot be opened at all is removed and the
    /// writer is retried once.
    fn acquire_writer(&self) -> IndexResult<IndexWriter<Document>> {
        match self.open_writer() {
            Err(TantivyError::LockFailure(LockError::IoError(e), _)) => {
                let lock_path = self.index_path.join(WRITER_LOCK_FILE);
                tracing::warn!(
                    path = %lock_path.display(),
                    error = %e,
                    "writer lock file unusable, replacing it"
                );
                std::fs::remove_file(&lock_path).storage_at(&lock_path)?;
                self.open_writer().map_err(|e| self.writer_error(e))
            }
            other => other.map_err(|e| self.writer_error(e)),
        }
    }

    fn open_writer(&self) -> tantivy::Result<IndexWriter<Document>> {
        self.index
            .writer_with_num_threads::<Document>(1, self.heap_size)
    }

    fn writer_error(&self, err: TantivyError) -> IndexError {
        if matches!(err, TantivyError::LockFailure(LockError::LockBusy, _)) {
            tracing::warn!(kind = %self.schema.kind, path = %self.index_path.display(), "writer lock is held");
        }
        IndexError::StorageUnavailable {
            path: self.index_path.clone(),
            cause: err.to_string(),
        }
    }

    fn field(&self, name: &str) -> IndexResult<Field> {
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| IndexError::Config {
                reason: format!("field '{name}' is not part of the {} index", self.schema.kind),
            })
    }

    fn to_tantivy(&self, doc: &FieldDocument) -> Document {
        let mut out = Document::default();
        for (name, value) in doc.iter() {
            match self.fields.get(name) {
                Some(field) => out.add_text(*field, value),
                None => {
                    tracing::warn!(kind = %self.schema.kind, field = name, "unknown field dropped")
                }
            }
        }
        out
    }

    fn from_tantivy(&self, stored: &Document) -> FieldDocument {
        let mut doc = FieldDocument::new();
        for spec in self.schema.fields.iter().filter(|s| s.stored) {
            let value = self
                .fields
                .get(spec.name)
                .and_then(|field| stored.get_first(*field))
                .and_then(|v| v.as_str());
            if let Some(value) = value {
                doc.insert(spec.name, value);
            }
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Predicates, QueryBuilder};
    use crate::schema::{fields_for, names};
    use crate::types::EntityKind;
    use tempfile::TempDir;

    fn code_doc(id: &str, description: &str, code: &str) -> FieldDocument {
        let mut doc = FieldDocument::new();
        doc.insert(names::ID, id);
        doc.insert(names::DESCRIPTION, description);
        doc.insert(names::CODE, code);
        doc
    }

    fn open(temp_dir: &TempDir, kind: EntityKind) -> IndexHandle {
        IndexHandle::open(
            temp_dir.path().join(kind.dir_name()),
            fields_for(kind),
            &Settings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_heap_normalization() {
        assert_eq!(normalized_heap_bytes(1), 15 * 1024 * 1024);
        assert_eq!(normalized_heap_bytes(50_000_000), 50_000_000);
        assert_eq!(normalized_heap_bytes(usize::MAX), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_open_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let handle = open(&temp_dir, EntityKind::Code);
        assert!(handle.path().join("meta.json").exists());
        assert_eq!(handle.document_count(), 0);
    }

    #[test]
    fn test_upsert_replaces_same_key() {
        let temp_dir = TempDir::new().unwrap();
        let handle = open(&temp_dir, EntityKind::Code);

        handle
            .upsert_documents(&[code_doc("7", "Cholera", "A00")])
            .unwrap();
        handle
            .upsert_documents(&[code_doc("7", "Cholera unspecified", "A00.9")])
            .unwrap();

        assert_eq!(handle.document_count(), 1);
        let query = QueryBuilder::for_kind(EntityKind::Code)
            .fields(&Predicates::new().eq(names::ID, "7"))
            .unwrap()
            .unwrap();
        let docs = handle.search(&query, 10, SortOrder::Relevance).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get(names::CODE), Some("A00.9"));
    }

    #[test]
    fn test_append_kinds_keep_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let handle = open(&temp_dir, EntityKind::Treatment);

        let mut doc = FieldDocument::new();
        doc.insert(names::ID, "T-1");
        doc.insert(names::HOSPITAL, "H1");
        handle.upsert_documents(&[doc.clone()]).unwrap();
        handle.upsert_documents(&[doc]).unwrap();

        assert_eq!(handle.document_count(), 2);
    }

    #[test]
    fn test_reopen_sees_committed_documents() {
        let temp_dir = TempDir::new().unwrap();
        {
            let handle = open(&temp_dir, EntityKind::Code);
            handle
                .upsert_documents(&[code_doc("1", "Typhoid fever", "A01")])
                .unwrap();
        }
        let handle = open(&temp_dir, EntityKind::Code);
        assert_eq!(handle.document_count(), 1);
    }

    #[test]
    fn test_released_lock_file_does_not_block_writes() {
        let temp_dir = TempDir::new().unwrap();
        let handle = open(&temp_dir, EntityKind::Code);
        handle
            .upsert_documents(&[code_doc("1", "Typhoid fever", "A01")])
            .unwrap();
        assert!(handle.path().join(WRITER_LOCK_FILE).exists());

        handle
            .upsert_documents(&[code_doc("2", "Cholera", "A00")])
            .unwrap();
        assert_eq!(handle.document_count(), 2);
    }

    #[test]
    fn test_live_writer_is_not_broken() {
        let temp_dir = TempDir::new().unwrap();
        let handle = open(&temp_dir, EntityKind::Code);

        let other = Index::open_in_dir(handle.path()).unwrap();
        let live: IndexWriter<Document> = other.writer_with_num_threads(1, 15_000_000).unwrap();

        let err = handle
            .upsert_documents(&[code_doc("1", "Typhoid fever", "A01")])
            .unwrap_err();
        assert_eq!(err.status_code(), "STORAGE_UNAVAILABLE");
        assert!(handle.path().join(WRITER_LOCK_FILE).exists());

        drop(live);
        handle
            .upsert_documents(&[code_doc("1", "Typhoid fever", "A01")])
            .unwrap();
        assert_eq!(handle.document_count(), 1);
    }

    #[test]
    fn test_field_ascending_sort_and_limit() {
        let temp_dir = TempDir::new().unwrap();
        let handle = open(&temp_dir, EntityKind::Diagnosis);

        let docs: Vec<FieldDocument> = [("1", "pain chest"), ("2", "abdominal pain"), ("3", "back pain")]
            .iter()
            .map(|(id, description)| {
                let mut doc = FieldDocument::new();
                doc.insert(names::ID, *id);
                doc.insert(names::DESCRIPTION, *description);
                doc
            })
            .collect();
        handle.upsert_documents(&docs).unwrap();

        let query = QueryBuilder::for_kind(EntityKind::Diagnosis)
            .free_text("pain")
            .unwrap();
        let hits = handle
            .search(&query, 2, SortOrder::FieldAscending(names::DESCRIPTION))
            .unwrap();
        let descriptions: Vec<&str> = hits.iter().filter_map(|d| d.get(names::DESCRIPTION)).collect();
        assert_eq!(descriptions, vec!["abdominal pain", "back pain"]);
    }

    #[test]
    fn test_no_hits_returns_empty() {
        let temp_dir = TempDir::new().unwrap();
        let handle = open(&temp_dir, EntityKind::Code);
        let query = QueryBuilder::for_kind(EntityKind::Code)
            .free_text("nothing")
            .unwrap();
        assert!(handle.search(&query, 10, SortOrder::Relevance).unwrap().is_empty());
    }

    #[test]
    fn test_field_ascending_ignores_case() {
        let temp_dir = TempDir::new().unwrap();
        let handle = open(&temp_dir, EntityKind::Diagnosis);

        let docs: Vec<FieldDocument> = [("1", "Pain in throat"), ("2", "abdominal pain")]
            .iter()
            .map(|(id, description)| {
                let mut doc = FieldDocument::new();
                doc.insert(names::ID, *id);
                doc.insert(names::DESCRIPTION, *description);
                doc
            })
            .collect();
        handle.upsert_documents(&docs).unwrap();

        let query = QueryBuilder::for_kind(EntityKind::Diagnosis)
            .free_text("pain")
            .unwrap();
        let hits = handle
            .search(&query, 10, SortOrder::FieldAscending(names::DESCRIPTION))
            .unwrap();
        let ids: Vec<&str> = hits.iter().filter_map(|d| d.get(names::ID)).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }
}
