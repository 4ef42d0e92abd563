//! Documents, document paths and field patches.
//!
//! A document is a JSON object stored under a slash-separated path such as
//! `users/u1/topics/t1`. Writes are expressed as a [`Patch`]: an ordered list
//! of field operations addressed by dotted field paths (`data.07`).

use std::fmt;

use serde_json::{Map, Value};

use crate::error::ValidationError;

pub type Document = Map<String, Value>;

/// Slash-separated path to a document or collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
    /// Build a path from segments.
    ///
    /// # Errors
    /// Returns an error if any segment is empty or contains `/`.
    pub fn new<S: AsRef<str>>(segments: &[S]) -> Result<Self, ValidationError> {
        if segments.is_empty() {
            return Err(ValidationError::InvalidPathSegment {
                segment: String::new(),
                message: "path has no segments".into(),
            });
        }
        for segment in segments {
            validate_segment(segment.as_ref())?;
        }
        let joined = segments
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join("/");
        Ok(Self(joined))
    }

    /// Parse a path string as stored by a backend.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let segments: Vec<&str> = raw.split('/').collect();
        Self::new(&segments)
    }

    /// Append one segment.
    pub fn child(&self, segment: &str) -> Result<Self, ValidationError> {
        validate_segment(segment)?;
        Ok(Self(format!("{}/{}", self.0, segment)))
    }

    /// Path of the enclosing collection (or document), if any.
    pub fn parent(&self) -> Option<DocPath> {
        self.0.rsplit_once('/').map(|(head, _)| DocPath(head.to_string()))
    }

    /// Last segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `self` is a direct child of `collection`.
    pub fn is_child_of(&self, collection: &DocPath) -> bool {
        self.parent().as_ref() == Some(collection)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_segment(segment: &str) -> Result<(), ValidationError> {
    if segment.is_empty() {
        return Err(ValidationError::InvalidPathSegment {
            segment: segment.to_string(),
            message: "segment is empty".into(),
        });
    }
    if segment.contains('/') {
        return Err(ValidationError::InvalidPathSegment {
            segment: segment.to_string(),
            message: "segment contains '/'".into(),
        });
    }
    Ok(())
}

/// One field write.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Overwrite the field.
    Set(Value),
    /// Add to the field; missing or non-numeric fields count as zero.
    Increment(i64),
    /// Remove the field.
    Remove,
}

/// How a patch combines with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Apply over the existing document, creating it if absent.
    Merge,
    /// Apply over an empty document.
    Replace,
}

/// Ordered set of field writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<(String, FieldOp)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push((field.into(), FieldOp::Set(value.into())));
        self
    }

    pub fn increment(mut self, field: impl Into<String>, by: i64) -> Self {
        self.ops.push((field.into(), FieldOp::Increment(by)));
        self
    }

    pub fn remove(mut self, field: impl Into<String>) -> Self {
        self.ops.push((field.into(), FieldOp::Remove));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every operation to `doc` in order.
    ///
    /// # Errors
    /// Returns an error if a field path is empty or has an empty component.
    pub fn apply(&self, doc: &mut Document) -> Result<(), ValidationError> {
        for (field, op) in &self.ops {
            apply_op(doc, field, op)?;
        }
        Ok(())
    }
}

fn apply_op(doc: &mut Document, field: &str, op: &FieldOp) -> Result<(), ValidationError> {
    let parts: Vec<&str> = field.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ValidationError::InvalidFieldPath(field.to_string()));
    }
    let (leaf, parents) = parts
        .split_last()
        .ok_or_else(|| ValidationError::InvalidFieldPath(field.to_string()))?;

    let mut current = doc;
    for part in parents {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            if matches!(op, FieldOp::Remove) {
                return Ok(());
            }
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => unreachable!("entry was just made an object"),
        };
    }

    match op {
        FieldOp::Set(value) => {
            current.insert(leaf.to_string(), value.clone());
        }
        FieldOp::Increment(by) => {
            let next = match current.get(*leaf) {
                Some(Value::Number(n)) => match n.as_i64() {
                    Some(i) => Value::from(i.saturating_add(*by)),
                    None => Value::from(n.as_f64().unwrap_or(0.0) + *by as f64),
                },
                _ => Value::from(*by),
            };
            current.insert(leaf.to_string(), next);
        }
        FieldOp::Remove => {
            current.remove(*leaf);
        }
    }
    Ok(())
}

/// Read a dotted field path.
pub fn field<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
