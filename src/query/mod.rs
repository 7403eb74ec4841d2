//! Query construction
//!
//! Translates search criteria into a boolean query expression in the index
//! engine's query syntax. Expressions are assembled as a small AST
//! ([`QueryExpr`]) and rendered once at the boundary, so quoting and
//! parenthesization are decided in one place.
//!
//! Precedence rules:
//! - distinct fields of one predicate set are joined with `AND`
//! - several values for one field are joined with `OR` and parenthesized
//! - predicate sets of different entities are each parenthesized and joined
//!   with `OR`, with no trailing operator after the last one
//!
//! # Example
//!
//! ```
//! use ehr_search::query::{Predicates, QueryBuilder};
//! use ehr_search::types::EntityKind;
//!
//! let builder = QueryBuilder::for_kind(EntityKind::Patient);
//! let sets = vec![
//!     Predicates::new().eq("cpf", "111"),
//!     Predicates::new().eq("cpf", "222"),
//! ];
//! let built = builder.any_of(&sets).unwrap().unwrap();
//! assert_eq!(built.expression, r#"(cpf:"111") OR (cpf:"222")"#);
//! ```

use crate::codec::format_date;
use crate::error::{IndexError, IndexResult};
use crate::schema::{FieldSchema, fields_for};
use crate::types::EntityKind;
use chrono::NaiveDate;
use std::fmt::Display;

/// Remove the wildcard characters so user input is always matched literally
pub fn strip_wildcards(input: &str) -> String {
    input.chars().filter(|c| !matches!(c, '*' | '?')).collect()
}

/// Quote every whitespace-separated word as a phrase
///
/// Operators, field prefixes and brackets inside a quoted phrase are matched
/// literally, so the result always parses.
pub fn quote_words(input: &str) -> String {
    input
        .split_whitespace()
        .map(quote_phrase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_phrase(value: &str) -> String {
    let quoted = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{quoted}\"")
}

/// Value of one structured predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateValue {
    One(String),
    AnyOf(Vec<String>),
}

/// Attribute predicates describing one entity
///
/// Order of insertion is the priority order of the rendered clauses.
/// Blank values are dropped on insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicates {
    clauses: Vec<(String, PredicateValue)>,
}

impl Predicates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.clauses
                .push((field.to_string(), PredicateValue::One(value)));
        }
        self
    }

    pub fn opt_eq(self, field: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.eq(field, value),
            None => self,
        }
    }

    pub fn date(self, field: &str, value: Option<NaiveDate>) -> Self {
        match value {
            Some(date) => self.eq(field, format_date(date)),
            None => self,
        }
    }

    /// Match any of the values; a single value degrades to [`Predicates::eq`]
    pub fn any_of<I, S>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values: Vec<String> = values
            .into_iter()
            .map(Into::into)
            .filter(|v| !v.trim().is_empty())
            .collect();
        match values.len() {
            0 => {}
            1 => {
                let value = values.remove(0);
                self.clauses.push((field.to_string(), PredicateValue::One(value)));
            }
            _ => self
                .clauses
                .push((field.to_string(), PredicateValue::AnyOf(values))),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(String, PredicateValue)] {
        &self.clauses
    }
}

/// Search criteria accepted by structured search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criteria {
    /// Free text over the kind's free-text fields
    Text(String),
    /// Predicates of one entity, AND-ed
    Fields(Predicates),
    /// Predicates of several entities, OR-ed
    AnyOf(Vec<Predicates>),
}

impl Criteria {
    /// True when the criteria cannot match anything and must not reach the index
    pub fn is_blank(&self) -> bool {
        match self {
            Criteria::Text(text) => strip_wildcards(text).trim().is_empty(),
            Criteria::Fields(predicates) => predicates.is_empty(),
            Criteria::AnyOf(sets) => sets.iter().all(Predicates::is_empty),
        }
    }
}

/// Boolean query AST
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryExpr {
    Term { field: String, value: String },
    And(Vec<QueryExpr>),
    Or(Vec<QueryExpr>),
}

impl QueryExpr {
    pub fn term(field: &str, value: &str) -> Self {
        QueryExpr::Term {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Render to the engine's query syntax
    pub fn render(&self) -> String {
        match self {
            QueryExpr::Term { field, value } => format!("{field}:{}", quote_phrase(value)),
            QueryExpr::And(children) => children
                .iter()
                .map(|child| match child {
                    QueryExpr::Or(items) if items.len() > 1 => format!("({})", child.render()),
                    QueryExpr::And(items) if items.len() > 1 => format!("({})", child.render()),
                    _ => child.render(),
                })
                .collect::<Vec<_>>()
                .join(" AND "),
            QueryExpr::Or(children) => children
                .iter()
                .map(|child| match child {
                    QueryExpr::And(_) | QueryExpr::Or(_) => format!("({})", child.render()),
                    QueryExpr::Term { .. } => child.render(),
                })
                .collect::<Vec<_>>()
                .join(" OR "),
        }
    }
}

/// A rendered query plus the fields it targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub expression: String,
    /// Default fields handed to the engine's parser
    pub target_fields: Vec<&'static str>,
    /// Whether bare terms are AND-ed by the parser
    pub conjunction: bool,
}

/// Builds query expressions for one entity kind
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    schema: &'static FieldSchema,
}

impl QueryBuilder {
    pub fn for_kind(kind: EntityKind) -> Self {
        Self {
            schema: fields_for(kind),
        }
    }

    /// Free text over the kind's free-text fields; `None` when nothing is left
    /// after the wildcards are stripped
    pub fn free_text(&self, text: &str) -> Option<BuiltQuery> {
        let stripped = strip_wildcards(text);
        let stripped = stripped.trim();
        if stripped.is_empty() {
            return None;
        }
        Some(BuiltQuery {
            expression: stripped.to_string(),
            target_fields: self.schema.free_text_fields.to_vec(),
            conjunction: false,
        })
    }

    /// Conjunction of one entity's predicates
    pub fn fields(&self, predicates: &Predicates) -> IndexResult<Option<BuiltQuery>> {
        if predicates.is_empty() {
            return Ok(None);
        }
        let mut targets = Vec::new();
        let expr = self.conjunction(predicates, &mut targets)?;
        if is_empty_expr(&expr) {
            return Ok(None);
        }
        Ok(Some(BuiltQuery {
            expression: expr.render(),
            conjunction: targets.len() > 1,
            target_fields: targets,
        }))
    }

    /// Disjunction of several entities' predicates
    pub fn any_of(&self, sets: &[Predicates]) -> IndexResult<Option<BuiltQuery>> {
        let mut targets = Vec::new();
        let mut clauses = Vec::new();
        for predicates in sets.iter().filter(|p| !p.is_empty()) {
            let expr = self.conjunction(predicates, &mut targets)?;
            if !is_empty_expr(&expr) {
                clauses.push(expr);
            }
        }
        if clauses.is_empty() {
            return Ok(None);
        }
        Ok(Some(BuiltQuery {
            expression: QueryExpr::Or(clauses).render(),
            target_fields: targets,
            conjunction: true,
        }))
    }

    pub fn build(&self, criteria: &Criteria) -> IndexResult<Option<BuiltQuery>> {
        match criteria {
            Criteria::Text(text) => Ok(self.free_text(text)),
            Criteria::Fields(predicates) => self.fields(predicates),
            Criteria::AnyOf(sets) => self.any_of(sets),
        }
    }

    fn conjunction(
        &self,
        predicates: &Predicates,
        targets: &mut Vec<&'static str>,
    ) -> IndexResult<QueryExpr> {
        let mut parts = Vec::new();
        for (field, value) in predicates.clauses() {
            let spec = self.schema.field(field).ok_or_else(|| IndexError::QuerySyntax {
                query: field.clone(),
                cause: format!("'{field}' is not a {} field", self.schema.kind),
            })?;
            if !targets.contains(&spec.name) {
                targets.push(spec.name);
            }
            let tokenized = spec.is_tokenized();
            match value {
                PredicateValue::One(v) => parts.push(value_expr(spec.name, v, tokenized)),
                PredicateValue::AnyOf(values) => {
                    let alternatives: Vec<QueryExpr> = values
                        .iter()
                        .map(|v| value_expr(spec.name, v, tokenized))
                        .filter(|e| !is_empty_expr(e))
                        .collect();
                    if !alternatives.is_empty() {
                        parts.push(QueryExpr::Or(alternatives));
                    }
                }
            }
        }

        // flatten multi-word values so each entity is one flat conjunction
        let mut flat = Vec::new();
        for part in parts {
            match part {
                QueryExpr::And(items) => flat.extend(items),
                other => flat.push(other),
            }
        }
        Ok(QueryExpr::And(flat))
    }
}

/// Nothing left to match once wildcards are stripped
fn is_empty_expr(expr: &QueryExpr) -> bool {
    matches!(expr, QueryExpr::And(items) | QueryExpr::Or(items) if items.is_empty())
}

/// Tokenized values match word by word; exact values match as one term
fn value_expr(field: &str, value: &str, tokenized: bool) -> QueryExpr {
    let value = strip_wildcards(value);
    if value.trim().is_empty() {
        return QueryExpr::And(Vec::new());
    }
    if !tokenized {
        return QueryExpr::term(field, value.trim());
    }
    let words: Vec<QueryExpr> = value
        .split_whitespace()
        .map(|word| QueryExpr::term(field, word))
        .collect();
    if words.len() == 1 {
        words.into_iter().next().unwrap_or_else(|| QueryExpr::And(Vec::new()))
    } else {
        QueryExpr::And(words)
    }
}

/// Parse an expression, retrying once with every word quoted
pub fn parse_with_fallback<Q, E, F>(expression: &str, parse: F) -> IndexResult<Q>
where
    E: Display,
    F: Fn(&str) -> Result<Q, E>,
{
    match parse(expression) {
        Ok(query) => Ok(query),
        Err(first) => {
            let quoted = quote_words(expression);
            tracing::warn!(query = expression, error = %first, "query did not parse, retrying quoted");
            parse(&quoted).map_err(|e| IndexError::QuerySyntax {
                query: expression.to_string(),
                cause: e.to_string(),
            })
        }
    }
}
