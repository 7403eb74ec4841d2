//! フィールドスキーマモジュール
//!
//! エンティティ種別ごとの静的なフィールド表を提供します。
//! ドキュメントコーデック (エンコード) とクエリビルダー (検索対象フィールド)
//! の両方が同じ表を参照します。
//!
//! # 使用例
//!
//! ```
//! use ehr_search::schema::{fields_for, Tokenization};
//! use ehr_search::types::EntityKind;
//!
//! let schema = fields_for(EntityKind::Patient);
//! assert_eq!(schema.key_field, "id");
//! assert_eq!(schema.field("name").unwrap().tokenization, Tokenization::Tokenized);
//! ```

use crate::types::EntityKind;

/// Field names shared by the entity codecs and query construction.
pub mod names {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const CPF: &str = "cpf";
    pub const HOSPITAL: &str = "hospital";
    pub const DATE_BIRTHDAY: &str = "date_birthday";
    pub const ENTRY_DATE: &str = "entry_date";
    pub const CHECK_OUT_DATE: &str = "check_out_date";
    pub const CODE: &str = "code";
    pub const DESCRIPTION: &str = "description";
    pub const PATIENT_CPF: &str = "patient_cpf";
}

use names::*;

/// Tokenization policy of one index field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tokenization {
    /// Analyzed with the default tokenizer (lower-cased words)
    Tokenized,
    /// Indexed as one raw term
    Exact,
}

/// One entry of a field schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub tokenization: Tokenization,
    pub stored: bool,
}

impl FieldSpec {
    const fn tokenized(name: &'static str) -> Self {
        Self {
            name,
            tokenization: Tokenization::Tokenized,
            stored: true,
        }
    }

    const fn exact(name: &'static str) -> Self {
        Self {
            name,
            tokenization: Tokenization::Exact,
            stored: true,
        }
    }

    pub fn is_tokenized(&self) -> bool {
        self.tokenization == Tokenization::Tokenized
    }
}

/// Ordering applied to search hits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Engine score, best first
    Relevance,
    /// Order in which documents were added
    IndexOrder,
    /// Stored value of one field, ascending
    FieldAscending(&'static str),
}

/// Static per-kind field table
#[derive(Debug)]
pub struct FieldSchema {
    pub kind: EntityKind,
    /// Identity key; always exact and stored
    pub key_field: &'static str,
    pub fields: &'static [FieldSpec],
    /// Default target fields of free-text search
    pub free_text_fields: &'static [&'static str],
    pub free_text_sort: SortOrder,
    pub structured_sort: SortOrder,
    /// Kind-specific cap for structured search; `None` uses the configured limit
    pub structured_limit: Option<usize>,
}

impl FieldSchema {
    /// Look up a field entry by name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn key_spec(&self) -> &FieldSpec {
        // key_field is checked against fields in tests
        self.field(self.key_field).unwrap_or(&self.fields[0])
    }
}

const TREATMENT_STRUCTURED_LIMIT: usize = 300;

static PATIENT: FieldSchema = FieldSchema {
    kind: EntityKind::Patient,
    key_field: ID,
    fields: &[
        FieldSpec::exact(ID),
        FieldSpec::tokenized(NAME),
        FieldSpec::exact(CPF),
        FieldSpec::tokenized(HOSPITAL),
        FieldSpec::exact(DATE_BIRTHDAY),
        FieldSpec::exact(ENTRY_DATE),
        FieldSpec::exact(CHECK_OUT_DATE),
    ],
    free_text_fields: &[NAME, CPF],
    free_text_sort: SortOrder::Relevance,
    structured_sort: SortOrder::Relevance,
    structured_limit: None,
};

static CODE_SCHEMA: FieldSchema = FieldSchema {
    kind: EntityKind::Code,
    key_field: ID,
    fields: &[
        FieldSpec::exact(ID),
        FieldSpec::tokenized(DESCRIPTION),
        FieldSpec::tokenized(CODE),
    ],
    free_text_fields: &[DESCRIPTION, CODE],
    free_text_sort: SortOrder::Relevance,
    structured_sort: SortOrder::Relevance,
    structured_limit: None,
};

static DIAGNOSIS: FieldSchema = FieldSchema {
    kind: EntityKind::Diagnosis,
    key_field: ID,
    fields: &[FieldSpec::exact(ID), FieldSpec::tokenized(DESCRIPTION)],
    free_text_fields: &[DESCRIPTION],
    free_text_sort: SortOrder::FieldAscending(DESCRIPTION),
    structured_sort: SortOrder::Relevance,
    structured_limit: None,
};

static PROCEDURE: FieldSchema = FieldSchema {
    kind: EntityKind::Procedure,
    key_field: ID,
    fields: &[
        FieldSpec::exact(ID),
        FieldSpec::tokenized(DESCRIPTION),
        FieldSpec::tokenized(CODE),
    ],
    free_text_fields: &[DESCRIPTION, CODE],
    free_text_sort: SortOrder::FieldAscending(DESCRIPTION),
    structured_sort: SortOrder::Relevance,
    structured_limit: None,
};

static TREATMENT: FieldSchema = FieldSchema {
    kind: EntityKind::Treatment,
    key_field: ID,
    fields: &[
        FieldSpec::exact(ID),
        FieldSpec::exact(HOSPITAL),
        FieldSpec::exact(CHECK_OUT_DATE),
        FieldSpec::exact(ENTRY_DATE),
    ],
    free_text_fields: &[ID],
    free_text_sort: SortOrder::Relevance,
    structured_sort: SortOrder::Relevance,
    structured_limit: Some(TREATMENT_STRUCTURED_LIMIT),
};

static RECORD: FieldSchema = FieldSchema {
    kind: EntityKind::Record,
    key_field: CODE,
    fields: &[
        FieldSpec::exact(PATIENT_CPF),
        FieldSpec::exact(CODE),
        FieldSpec::exact(HOSPITAL),
    ],
    free_text_fields: &[PATIENT_CPF],
    free_text_sort: SortOrder::Relevance,
    structured_sort: SortOrder::Relevance,
    structured_limit: None,
};

/// Return the field schema of an entity kind
pub fn fields_for(kind: EntityKind) -> &'static FieldSchema {
    match kind {
        EntityKind::Patient => &PATIENT,
        EntityKind::Code => &CODE_SCHEMA,
        EntityKind::Diagnosis => &DIAGNOSIS,
        EntityKind::Procedure => &PROCEDURE,
        EntityKind::Treatment => &TREATMENT,
        EntityKind::Record => &RECORD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_field_is_exact_and_stored() {
        for kind in EntityKind::ALL {
            let schema = fields_for(kind);
            let key = schema
                .field(schema.key_field)
                .unwrap_or_else(|| panic!("{kind}: key field missing from schema"));
            assert_eq!(key.tokenization, Tokenization::Exact, "{kind}");
            assert!(key.stored, "{kind}");
            assert_eq!(schema.key_spec().name, schema.key_field);
        }
    }

    #[test]
    fn test_field_names_are_unique_per_kind() {
        for kind in EntityKind::ALL {
            let schema = fields_for(kind);
            let names: HashSet<&str> = schema.fields.iter().map(|f| f.name).collect();
            assert_eq!(names.len(), schema.fields.len(), "{kind}");
        }
    }

    #[test]
    fn test_search_targets_exist_in_schema() {
        for kind in EntityKind::ALL {
            let schema = fields_for(kind);
            assert_eq!(schema.kind, kind);
            assert!(!schema.free_text_fields.is_empty(), "{kind}");
            for name in schema.free_text_fields {
                assert!(schema.field(name).is_some(), "{kind}: {name}");
            }
            for sort in [schema.free_text_sort, schema.structured_sort] {
                if let SortOrder::FieldAscending(name) = sort {
                    let spec = schema.field(name).expect("sort field in schema");
                    assert!(spec.stored, "{kind}: sort field must be stored");
                }
            }
        }
    }

    #[test]
    fn test_treatment_caps_structured_search() {
        assert_eq!(fields_for(EntityKind::Treatment).structured_limit, Some(300));
        assert_eq!(fields_for(EntityKind::Patient).structured_limit, None);
    }
}
