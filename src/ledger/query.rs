//! Structured rich-query selectors
//!
//! Selectors are plain data: a document type plus a list of field predicates
//! and an optional sort. Ledger backends evaluate them against the decoded
//! JSON document, so no query text is ever assembled from caller input.

use std::cmp::Ordering;

use serde_json::Value;

/// A single field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals value
    Eq(String, Value),
    /// Field is present (`true`) or absent (`false`)
    Exists(String, bool),
    /// Field equals one of the values
    In(String, Vec<Value>),
}

impl Predicate {
    fn matches(&self, doc: &Value) -> bool {
        match self {
            Predicate::Eq(field, want) => doc.get(field) == Some(want),
            Predicate::Exists(field, present) => doc.get(field).is_some() == *present,
            Predicate::In(field, options) => doc
                .get(field)
                .map(|v| options.contains(v))
                .unwrap_or(false),
        }
    }
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

/// Rich query over documents of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub doc_type: String,
    pub predicates: Vec<Predicate>,
    pub sort: Option<Sort>,
}

impl Selector {
    /// Match every document whose `type` is `doc_type`.
    pub fn doc_type(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            predicates: Vec::new(),
            sort: None,
        }
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Eq(field.into(), value.into()));
        self
    }

    pub fn exists(mut self, field: impl Into<String>, present: bool) -> Self {
        self.predicates.push(Predicate::Exists(field.into(), present));
        self
    }

    pub fn any_of<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.predicates.push(Predicate::In(
            field.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            descending: true,
        });
        self
    }

    pub fn sort_asc(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            descending: false,
        });
        self
    }

    /// Whether `doc` satisfies the type filter and every predicate.
    pub fn matches(&self, doc: &Value) -> bool {
        if doc.get("type").and_then(Value::as_str) != Some(self.doc_type.as_str()) {
            return false;
        }
        self.predicates.iter().all(|p| p.matches(doc))
    }

    /// Evaluate against raw ledger bytes. Non-JSON values never match.
    pub fn matches_bytes(&self, bytes: &[u8]) -> Option<Value> {
        let doc: Value = serde_json::from_slice(bytes).ok()?;
        self.matches(&doc).then_some(doc)
    }

    /// Order `(key, doc)` pairs by the sort field, falling back to key order.
    /// Documents missing the sort field go last either way.
    pub fn order<T>(&self, rows: &mut [(String, Value, T)]) {
        match &self.sort {
            None => rows.sort_by(|a, b| a.0.cmp(&b.0)),
            Some(sort) => rows.sort_by(|a, b| {
                let ord = match (a.1.get(&sort.field), b.1.get(&sort.field)) {
                    (Some(x), Some(y)) => {
                        let ord = compare_values(x, y);
                        if sort.descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                ord.then_with(|| a.0.cmp(&b.0))
            }),
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
