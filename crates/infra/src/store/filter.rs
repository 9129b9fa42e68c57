//! Query filters over indexed document fields.
//!
//! Supported predicates: equality, set-membership, date-range and
//! regex-substring. All predicates in a [`Filter`] must hold (logical AND);
//! [`Predicate::Any`] expresses a disjunction.

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};

use super::r#trait::{Document, FieldValue, StoreError};

#[derive(Debug, Clone)]
pub enum Predicate {
    Eq {
        field: &'static str,
        value: FieldValue,
    },
    In {
        field: &'static str,
        values: Vec<FieldValue>,
    },
    /// Inclusive on both ends; either bound may be open.
    Between {
        field: &'static str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
    Matches {
        field: &'static str,
        pattern: Regex,
    },
    Any(Vec<Predicate>),
}

impl Predicate {
    fn holds<T: Document>(&self, doc: &T) -> bool {
        match self {
            Predicate::Eq { field, value } => doc.field(field).as_ref() == Some(value),
            Predicate::In { field, values } => doc
                .field(field)
                .is_some_and(|actual| values.contains(&actual)),
            Predicate::Between { field, from, to } => {
                match doc.field(field).and_then(|v| v.as_time()) {
                    Some(t) => from.is_none_or(|f| t >= f) && to.is_none_or(|u| t <= u),
                    None => false,
                }
            }
            Predicate::Matches { field, pattern } => match doc.field(field) {
                Some(FieldValue::Text(text)) => pattern.is_match(&text),
                _ => false,
            },
            Predicate::Any(options) => options.iter().any(|p| p.holds(doc)),
        }
    }
}

/// Conjunction of predicates. The empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.predicates.push(Predicate::Eq {
            field,
            value: value.into(),
        });
        self
    }

    pub fn one_of<V: Into<FieldValue>>(
        mut self,
        field: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.predicates.push(Predicate::In {
            field,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn between(
        mut self,
        field: &'static str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        if from.is_some() || to.is_some() {
            self.predicates.push(Predicate::Between { field, from, to });
        }
        self
    }

    /// Regex match. The pattern is compiled case-insensitively.
    pub fn matches(self, field: &'static str, pattern: &str) -> Result<Self, StoreError> {
        let pattern = compile(field, pattern)?;
        Ok(self.predicate(Predicate::Matches { field, pattern }))
    }

    /// Regex match against any of `fields`.
    pub fn matches_any(self, fields: &[&'static str], pattern: &str) -> Result<Self, StoreError> {
        let options = fields
            .iter()
            .map(|&field| {
                compile(field, pattern).map(|pattern| Predicate::Matches { field, pattern })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.predicate(Predicate::Any(options)))
    }

    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn matches_doc<T: Document>(&self, doc: &T) -> bool {
        self.predicates.iter().all(|p| p.holds(doc))
    }
}

fn compile(field: &str, pattern: &str) -> Result<Regex, StoreError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| StoreError::InvalidFilter(format!("{field}: {e}")))
}
