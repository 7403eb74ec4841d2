use super::{Entity, decorate};
use crate::codec::{DocumentDecoder, DocumentEncoder, FieldDocument};
use crate::error::IndexResult;
use crate::query::Predicates;
use crate::schema::names::*;
use crate::types::{EntityKind, Hospital, HospitalDirectory};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 治療 (入院から退院まで)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treatment {
    pub id: String,
    pub hospital: Hospital,
    pub entry_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
}

impl Treatment {
    pub fn new(id: impl Into<String>, hospital: Hospital) -> Self {
        Self {
            id: id.into(),
            hospital,
            entry_date: None,
            check_out_date: None,
        }
    }
}

impl Entity for Treatment {
    const KIND: EntityKind = EntityKind::Treatment;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn encode(&self) -> FieldDocument {
        DocumentEncoder::new(Self::schema())
            .text(ID, &self.id)
            .text(HOSPITAL, &self.hospital.key)
            .date(CHECK_OUT_DATE, self.check_out_date)
            .date(ENTRY_DATE, self.entry_date)
            .finish()
    }

    fn decode(doc: &DocumentDecoder<'_>, hospitals: &dyn HospitalDirectory) -> IndexResult<Self> {
        Ok(Self {
            id: doc.required(ID)?.to_string(),
            hospital: decorate(hospitals, Self::KIND, &doc.string(HOSPITAL)),
            entry_date: doc.date(ENTRY_DATE),
            check_out_date: doc.date(CHECK_OUT_DATE),
        })
    }

    /// Every stored attribute, used by the periodic search
    fn identity(&self) -> Predicates {
        Predicates::new()
            .eq(HOSPITAL, self.hospital.key.as_str())
            .date(CHECK_OUT_DATE, self.check_out_date)
            .eq(ID, self.id.as_str())
            .date(ENTRY_DATE, self.entry_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UndecoratedHospitals;

    #[test]
    fn test_treatment_round_trip() {
        let treatment = Treatment {
            entry_date: NaiveDate::from_ymd_opt(2020, 1, 2),
            check_out_date: NaiveDate::from_ymd_opt(2020, 1, 9),
            ..Treatment::new("T-1", Hospital::new("H1"))
        };
        let doc = treatment.encode();
        assert_eq!(doc.get(ENTRY_DATE), Some("2020-01-02"));

        let decoded = Treatment::decode(
            &DocumentDecoder::new(EntityKind::Treatment, &doc),
            &UndecoratedHospitals,
        )
        .unwrap();
        assert_eq!(decoded, treatment);
    }

    #[test]
    fn test_identity_orders_hospital_first() {
        let treatment = Treatment {
            entry_date: NaiveDate::from_ymd_opt(2020, 1, 2),
            ..Treatment::new("T-1", Hospital::new("H1"))
        };
        let fields: Vec<String> = treatment
            .identity()
            .clauses()
            .iter()
            .map(|(f, _)| f.clone())
            .collect();
        assert_eq!(fields, vec![HOSPITAL, ID, ENTRY_DATE]);
    }
}
