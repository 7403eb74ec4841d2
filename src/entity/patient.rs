use super::{Entity, Record};
use crate::codec::{DocumentDecoder, DocumentEncoder, FieldDocument};
use crate::error::IndexResult;
use crate::query::Predicates;
use crate::schema::names::*;
use crate::types::{EntityKind, HospitalDb, HospitalDirectory};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 患者
///
/// 埋め込みの `records` は患者インデックスには保存されず、
/// 記録インデックスに別途登録されます。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub cpf: Option<String>,
    pub hospital: HospitalDb,
    pub date_birthday: Option<NaiveDate>,
    pub entry_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl Patient {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_cpf(mut self, cpf: impl Into<String>) -> Self {
        self.cpf = Some(cpf.into());
        self
    }

    /// Predicates of an advanced search: name, birthday and any of the hospitals
    pub fn advanced_criteria(&self, hospitals: &[HospitalDb]) -> Predicates {
        Predicates::new()
            .eq(NAME, self.name.as_str())
            .date(DATE_BIRTHDAY, self.date_birthday)
            .any_of(HOSPITAL, hospitals.iter().map(|h| h.as_key()))
    }
}

impl Entity for Patient {
    const KIND: EntityKind = EntityKind::Patient;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn encode(&self) -> FieldDocument {
        DocumentEncoder::new(Self::schema())
            .text(ID, &self.id)
            .text(NAME, &self.name)
            .opt_text(CPF, self.cpf.as_deref())
            .category(HOSPITAL, self.hospital.as_key())
            .date(DATE_BIRTHDAY, self.date_birthday)
            .date(ENTRY_DATE, self.entry_date)
            .date(CHECK_OUT_DATE, self.check_out_date)
            .finish()
    }

    fn decode(doc: &DocumentDecoder<'_>, _hospitals: &dyn HospitalDirectory) -> IndexResult<Self> {
        Ok(Self {
            id: doc.required(ID)?.to_string(),
            name: doc.string(NAME),
            cpf: doc.text(CPF).map(str::to_string),
            hospital: doc.category(HOSPITAL, HospitalDb::parse_lenient),
            date_birthday: doc.date(DATE_BIRTHDAY),
            entry_date: doc.date(ENTRY_DATE),
            check_out_date: doc.date(CHECK_OUT_DATE),
            records: Vec::new(),
        })
    }

    fn identity(&self) -> Predicates {
        Predicates::new().opt_eq(CPF, self.cpf.as_deref())
    }
}
