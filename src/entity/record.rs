use super::{Entity, decorate};
use crate::codec::{DocumentDecoder, DocumentEncoder, FieldDocument};
use crate::error::IndexResult;
use crate::query::Predicates;
use crate::schema::names::*;
use crate::types::{EntityKind, Hospital, HospitalDirectory};
use serde::{Deserialize, Serialize};

/// 患者に埋め込まれた臨床記録
///
/// `code` は治療の識別子を指します。同じ `code` を持つ記録が複数存在できます。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub code: String,
    pub hospital: Hospital,
    /// 所有患者のCPF (記録インデックスへの登録時に設定)
    #[serde(default)]
    pub patient_cpf: String,
}

impl Record {
    pub fn new(code: impl Into<String>, hospital: Hospital) -> Self {
        Self {
            code: code.into(),
            hospital,
            patient_cpf: String::new(),
        }
    }

    /// Copy of this record owned by the given patient
    pub fn owned_by(&self, patient_cpf: &str) -> Self {
        Self {
            patient_cpf: patient_cpf.to_string(),
            ..self.clone()
        }
    }
}

impl Entity for Record {
    const KIND: EntityKind = EntityKind::Record;

    fn key(&self) -> String {
        self.code.clone()
    }

    fn encode(&self) -> FieldDocument {
        DocumentEncoder::new(Self::schema())
            .text(PATIENT_CPF, &self.patient_cpf)
            .text(CODE, &self.code)
            .text(HOSPITAL, &self.hospital.key)
            .finish()
    }

    fn decode(doc: &DocumentDecoder<'_>, hospitals: &dyn HospitalDirectory) -> IndexResult<Self> {
        Ok(Self {
            code: doc.required(CODE)?.to_string(),
            hospital: decorate(hospitals, Self::KIND, &doc.string(HOSPITAL)),
            patient_cpf: doc.string(PATIENT_CPF),
        })
    }

    fn identity(&self) -> Predicates {
        Predicates::new()
            .eq(CODE, self.code.as_str())
            .eq(HOSPITAL, self.hospital.key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UndecoratedHospitals;

    #[test]
    fn test_record_keeps_owner_cpf() {
        let record = Record::new("T-1", Hospital::new("H1")).owned_by("123");
        let doc = record.encode();
        assert_eq!(doc.get(PATIENT_CPF), Some("123"));

        let decoded =
            Record::decode(&DocumentDecoder::new(EntityKind::Record, &doc), &UndecoratedHospitals)
                .unwrap();
        assert_eq!(decoded, record);
    }
}
