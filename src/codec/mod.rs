//! Document codec
//!
//! Flat field→value documents and the helpers entity types use to encode
//! themselves into them and decode themselves back out.
//!
//! Decoding is lenient for everything except the identity key: unparseable
//! categories fall back to a default and unparseable dates are left unset,
//! both logged at `warn`.

use crate::error::{IndexError, IndexResult};
use crate::schema::FieldSchema;
use crate::types::{CategoryMatch, EntityKind};
use chrono::NaiveDate;

/// Locale-independent date format used for every date field
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// The flat representation of one entity as stored in the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDocument {
    entries: Vec<(&'static str, String)>,
}

impl FieldDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value
    pub fn insert(&mut self, field: &'static str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.entries.iter().map(|(name, value)| (*name, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds a [`FieldDocument`] following one kind's schema
///
/// Blank values are skipped, so absent attributes never produce a field.
pub struct DocumentEncoder {
    schema: &'static FieldSchema,
    doc: FieldDocument,
}

impl DocumentEncoder {
    pub fn new(schema: &'static FieldSchema) -> Self {
        Self {
            schema,
            doc: FieldDocument::new(),
        }
    }

    pub fn text(mut self, field: &'static str, value: &str) -> Self {
        if value.trim().is_empty() {
            return self;
        }
        if self.schema.field(field).is_none() {
            tracing::warn!(kind = %self.schema.kind, field, "field not in schema, skipped");
            return self;
        }
        self.doc.insert(field, value);
        self
    }

    pub fn opt_text(self, field: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.text(field, value),
            None => self,
        }
    }

    /// Category keys are lower-cased when the field is tokenized
    pub fn category(self, field: &'static str, key: &str) -> Self {
        let tokenized = self
            .schema
            .field(field)
            .map(|spec| spec.is_tokenized())
            .unwrap_or(false);
        if tokenized {
            let lowered = key.to_lowercase();
            self.text(field, &lowered)
        } else {
            self.text(field, key)
        }
    }

    pub fn date(self, field: &'static str, value: Option<NaiveDate>) -> Self {
        match value {
            Some(date) => self.text(field, &format_date(date)),
            None => self,
        }
    }

    pub fn finish(self) -> FieldDocument {
        self.doc
    }
}

/// Read access to a result document with the lenient-decode policy
pub struct DocumentDecoder<'a> {
    kind: EntityKind,
    doc: &'a FieldDocument,
}

impl<'a> DocumentDecoder<'a> {
    pub fn new(kind: EntityKind, doc: &'a FieldDocument) -> Self {
        Self { kind, doc }
    }

    /// A field that must be present, such as the identity key
    pub fn required(&self, field: &str) -> IndexResult<&'a str> {
        match self.doc.get(field) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(IndexError::CorruptDocument {
                kind: self.kind,
                field: field.to_string(),
            }),
        }
    }

    pub fn text(&self, field: &str) -> Option<&'a str> {
        self.doc.get(field).filter(|v| !v.is_empty())
    }

    /// Optional text, empty when absent
    pub fn string(&self, field: &str) -> String {
        self.text(field).unwrap_or_default().to_string()
    }

    /// Parsed only when a value is stored; a malformed value leaves the date unset
    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        let raw = self.text(field)?;
        let parsed = parse_date(raw);
        if parsed.is_none() {
            tracing::warn!(kind = %self.kind, field, value = raw, "unparseable stored date, left unset");
        }
        parsed
    }

    /// Parse a category, substituting the fallback for unknown or missing values
    pub fn category<C: Copy>(
        &self,
        field: &str,
        parse: impl Fn(&str) -> CategoryMatch<C>,
    ) -> C {
        let parsed = parse(self.text(field).unwrap_or_default());
        if let CategoryMatch::Unknown { raw, .. } = &parsed {
            tracing::warn!(kind = %self.kind, field, value = %raw, "unknown stored category, using default");
        }
        parsed.value()
    }
}
