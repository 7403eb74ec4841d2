//! Reference code tables: CID codes, DEF diagnoses and TUSS procedures

use super::{Entity, numeric_key};
use crate::codec::{DocumentDecoder, DocumentEncoder, FieldDocument};
use crate::error::IndexResult;
use crate::query::Predicates;
use crate::schema::names::*;
use crate::types::{EntityKind, HospitalDirectory};
use serde::{Deserialize, Serialize};

/// CID disease classification code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub id: u32,
    pub code: String,
    pub description: String,
}

/// DEF diagnosis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub id: u32,
    pub description: String,
}

/// TUSS procedure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: u32,
    pub code: String,
    pub description: String,
}

impl Entity for Code {
    const KIND: EntityKind = EntityKind::Code;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn encode(&self) -> FieldDocument {
        DocumentEncoder::new(Self::schema())
            .text(ID, &self.key())
            .text(DESCRIPTION, &self.description)
            .text(CODE, &self.code)
            .finish()
    }

    fn decode(doc: &DocumentDecoder<'_>, _hospitals: &dyn HospitalDirectory) -> IndexResult<Self> {
        Ok(Self {
            id: numeric_key(Self::KIND, ID, doc.required(ID)?)?,
            code: doc.string(CODE),
            description: doc.string(DESCRIPTION),
        })
    }

    fn identity(&self) -> Predicates {
        Predicates::new().eq(ID, self.key())
    }
}

impl Entity for Diagnosis {
    const KIND: EntityKind = EntityKind::Diagnosis;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn encode(&self) -> FieldDocument {
        DocumentEncoder::new(Self::schema())
            .text(ID, &self.key())
            .text(DESCRIPTION, &self.description)
            .finish()
    }

    fn decode(doc: &DocumentDecoder<'_>, _hospitals: &dyn HospitalDirectory) -> IndexResult<Self> {
        Ok(Self {
            id: numeric_key(Self::KIND, ID, doc.required(ID)?)?,
            description: doc.string(DESCRIPTION),
        })
    }

    fn identity(&self) -> Predicates {
        Predicates::new().eq(ID, self.key())
    }
}

impl Entity for Procedure {
    const KIND: EntityKind = EntityKind::Procedure;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn encode(&self) -> FieldDocument {
        DocumentEncoder::new(Self::schema())
            .text(ID, &self.key())
            .text(DESCRIPTION, &self.description)
            .text(CODE, &self.code)
            .finish()
    }

    fn decode(doc: &DocumentDecoder<'_>, _hospitals: &dyn HospitalDirectory) -> IndexResult<Self> {
        Ok(Self {
            id: numeric_key(Self::KIND, ID, doc.required(ID)?)?,
            code: doc.string(CODE),
            description: doc.string(DESCRIPTION),
        })
    }

    fn identity(&self) -> Predicates {
        Predicates::new().eq(ID, self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UndecoratedHospitals;

    #[test]
    fn test_code_round_trip() {
        let code = Code {
            id: 12,
            code: "A00".to_string(),
            description: "Cholera".to_string(),
        };
        let doc = code.encode();
        assert_eq!(doc.get(ID), Some("12"));
        let decoded =
            Code::decode(&DocumentDecoder::new(EntityKind::Code, &doc), &UndecoratedHospitals)
                .unwrap();
        assert_eq!(decoded, code);
    }

    #[test]
    fn test_non_numeric_id_is_corrupt() {
        let mut doc = FieldDocument::new();
        doc.insert(ID, "x1");
        doc.insert(DESCRIPTION, "pain");
        let err = Diagnosis::decode(
            &DocumentDecoder::new(EntityKind::Diagnosis, &doc),
            &UndecoratedHospitals,
        )
        .unwrap_err();
        assert_eq!(err.status_code(), "CORRUPT_DOCUMENT");
    }

    #[test]
    fn test_procedure_without_code_skips_field() {
        let procedure = Procedure {
            id: 3,
            code: String::new(),
            description: "Consulta".to_string(),
        };
        let doc = procedure.encode();
        assert_eq!(doc.get(CODE), None);
        assert_eq!(doc.len(), 2);
    }
}
