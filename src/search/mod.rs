//! 検索サービスモジュール
//!
//! エンティティ種別ごとの公開操作 (upsert、完全一致検索、フリーテキスト検索、
//! 構造化検索) を提供します。すべての種別が同じ汎用実装
//! [`SearchService<E>`] を共有し、種別固有の操作のみ個別の `impl` に置かれます。
//!
//! 空の入力はインデックスに触れずに空の結果を返します。
//! インデックスは最初に必要になった時点で開かれます。
//!
//! # 使用例
//!
//! ```no_run
//! use ehr_search::config::Settings;
//! use ehr_search::entity::Patient;
//! use ehr_search::search::SearchService;
//!
//! let service = SearchService::<Patient>::new(&Settings::with_index_root("/srv/ehr"), None);
//! service.upsert(&Patient::new("42", "Maria Silva").with_cpf("12345678900"))?;
//!
//! let found = service.free_text_search("Silva")?;
//! assert_eq!(found[0].id, "42");
//! # Ok::<(), ehr_search::error::IndexError>(())
//! ```

use crate::codec::{DocumentDecoder, FieldDocument};
use crate::config::Settings;
use crate::entity::{Entity, Patient, Record, Treatment};
use crate::error::{IndexError, IndexResult};
use crate::query::{BuiltQuery, Criteria, Predicates, QueryBuilder};
use crate::schema::{SortOrder, names};
use crate::storage::IndexHandle;
use crate::types::{HospitalDb, HospitalDirectory, UndecoratedHospitals};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// 1種別分の検索サービス
pub struct SearchService<E: Entity> {
    settings: Settings,
    location: PathBuf,
    hospitals: Arc<dyn HospitalDirectory>,
    handle: Mutex<Option<Arc<IndexHandle>>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> std::fmt::Debug for SearchService<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("kind", &E::KIND)
            .field("location", &self.location)
            .finish()
    }
}

impl<E: Entity> SearchService<E> {
    /// Service over the directory resolved from `explicit` and the settings
    pub fn new(settings: &Settings, explicit: Option<&Path>) -> Self {
        Self {
            location: settings.index_dir_for(E::KIND, explicit),
            settings: settings.clone(),
            hospitals: Arc::new(UndecoratedHospitals),
            handle: Mutex::new(None),
            _entity: PhantomData,
        }
    }

    /// Decorate hospital keys of decoded results through `hospitals`
    pub fn with_hospitals(mut self, hospitals: Arc<dyn HospitalDirectory>) -> Self {
        self.hospitals = hospitals;
        self
    }

    /// Resolved index directory
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Number of stored documents
    pub fn document_count(&self) -> IndexResult<u64> {
        Ok(self.handle()?.document_count())
    }

    pub fn upsert(&self, entity: &E) -> IndexResult<()> {
        self.upsert_batch(std::slice::from_ref(entity))
    }

    /// Upsert several entities in one writer scope
    pub fn upsert_batch(&self, entities: &[E]) -> IndexResult<()> {
        let docs: Vec<FieldDocument> = entities
            .iter()
            .filter(|entity| {
                let keep = !entity.key().trim().is_empty();
                if !keep {
                    tracing::warn!(kind = %E::KIND, "entity without identity key skipped");
                }
                keep
            })
            .map(E::encode)
            .collect();
        if docs.is_empty() {
            return Ok(());
        }

        self.handle()?.upsert_documents(&docs)?;
        tracing::info!(kind = %E::KIND, count = docs.len(), "indexed");
        Ok(())
    }

    /// First entity whose identity key equals `key`
    ///
    /// A blank key yields `E::default()`; no match is [`IndexError::NoSuchEntity`].
    pub fn lookup_by_key(&self, key: &str) -> IndexResult<E> {
        self.lookup_by(E::schema().key_field, key)
    }

    /// Relevance- or field-ranked free text over the kind's free-text fields
    pub fn free_text_search(&self, text: &str) -> IndexResult<Vec<E>> {
        let schema = E::schema();
        let query = QueryBuilder::for_kind(E::KIND).free_text(text);
        self.run(query, self.settings.search.free_text_limit, schema.free_text_sort)
    }

    /// Effectively unbounded search over structured criteria
    pub fn structured_search(&self, criteria: &Criteria) -> IndexResult<Vec<E>> {
        if criteria.is_blank() {
            return Ok(Vec::new());
        }
        let query = QueryBuilder::for_kind(E::KIND).build(criteria)?;
        self.run(query, self.structured_limit(), E::schema().structured_sort)
    }

    /// Entities matching any of `entities` by their identity predicates
    pub fn search_matching(&self, entities: &[E]) -> IndexResult<Vec<E>> {
        let sets: Vec<Predicates> = entities.iter().map(E::identity).collect();
        self.structured_search(&Criteria::AnyOf(sets))
    }

    fn structured_limit(&self) -> usize {
        E::schema()
            .structured_limit
            .unwrap_or(self.settings.search.structured_limit)
    }

    fn lookup_by(&self, field: &str, value: &str) -> IndexResult<E> {
        if value.trim().is_empty() {
            return Ok(E::default());
        }
        let query = QueryBuilder::for_kind(E::KIND).fields(&Predicates::new().eq(field, value))?;
        self.run(query, self.settings.search.free_text_limit, SortOrder::Relevance)?
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::NoSuchEntity {
                kind: E::KIND,
                key: value.to_string(),
            })
    }

    fn run(
        &self,
        query: Option<BuiltQuery>,
        limit: usize,
        order: SortOrder,
    ) -> IndexResult<Vec<E>> {
        let Some(query) = query else {
            return Ok(Vec::new());
        };
        let docs = self.handle()?.search(&query, limit, order)?;

        let mut entities = Vec::with_capacity(docs.len());
        for doc in &docs {
            match E::decode(&DocumentDecoder::new(E::KIND, doc), self.hospitals.as_ref()) {
                Ok(entity) => entities.push(entity),
                Err(e @ IndexError::CorruptDocument { .. }) => {
                    tracing::warn!(kind = %E::KIND, error = %e, "corrupt result skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(entities)
    }

    /// Open the index on first use
    fn handle(&self) -> IndexResult<Arc<IndexHandle>> {
        let mut guard = self.handle.lock().map_err(|_| IndexError::MutexPoisoned)?;
        if let Some(handle) = guard.as_ref() {
            return Ok(Arc::clone(handle));
        }
        let handle = Arc::new(IndexHandle::open(&self.location, E::schema(), &self.settings)?);
        *guard = Some(Arc::clone(&handle));
        Ok(handle)
    }
}

impl SearchService<Patient> {
    /// Name, birthday and any of `hospitals`, AND-ed
    pub fn advanced_search(
        &self,
        patient: &Patient,
        hospitals: &[HospitalDb],
    ) -> IndexResult<Vec<Patient>> {
        self.structured_search(&Criteria::Fields(patient.advanced_criteria(hospitals)))
    }

    /// First patient with the given CPF
    pub fn find_by_cpf(&self, cpf: &str) -> IndexResult<Patient> {
        self.lookup_by(names::CPF, cpf)
    }
}

impl SearchService<Record> {
    /// Index the embedded records of `patients`, each stamped with its owner's CPF
    pub fn index_patient_records(&self, patients: &[Patient]) -> IndexResult<()> {
        let records: Vec<Record> = patients
            .iter()
            .flat_map(|patient| {
                let cpf = patient.cpf.as_deref().unwrap_or_default();
                patient.records.iter().map(move |record| record.owned_by(cpf))
            })
            .collect();
        self.upsert_batch(&records)
    }

    /// Records owned by the patient with `cpf`
    pub fn records_for_patient(&self, cpf: &str) -> IndexResult<Vec<Record>> {
        let query =
            QueryBuilder::for_kind(Record::KIND).fields(&Predicates::new().eq(names::PATIENT_CPF, cpf))?;
        self.run(query, self.settings.search.free_text_limit, SortOrder::Relevance)
    }
}

impl SearchService<Treatment> {
    /// Treatments referenced by `records`, in insertion order
    pub fn search_by_records(&self, records: &[Record]) -> IndexResult<Vec<Treatment>> {
        let sets: Vec<Predicates> = records
            .iter()
            .map(|record| {
                Predicates::new()
                    .eq(names::ID, record.code.as_str())
                    .eq(names::HOSPITAL, record.hospital.key.as_str())
            })
            .collect();
        let query = QueryBuilder::for_kind(Treatment::KIND).any_of(&sets)?;
        self.run(query, self.structured_limit(), SortOrder::IndexOrder)
    }

    /// Treatments matching any of `treatments` on every stored attribute
    pub fn periodic_search(&self, treatments: &[Treatment]) -> IndexResult<Vec<Treatment>> {
        self.search_matching(treatments)
    }
}
