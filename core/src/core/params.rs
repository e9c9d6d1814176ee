// opkit/src/core/params.rs

//! Validated parameters, the context map, and the changeset used by an
//! operation's validation hook.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Typed, validated parameters of one operation. Immutable once built and cheap to
/// clone into step closures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Arc<Map<String, Value>>);

impl Params {
  pub fn new(fields: Map<String, Value>) -> Self {
    Params(Arc::new(fields))
  }

  pub fn get(&self, field: &str) -> Option<&Value> {
    self.0.get(field)
  }

  /// Follows `path` through nested objects. Returns `None` for an empty path or as
  /// soon as a segment is missing.
  pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
    let (first, rest) = path.split_first()?;
    rest
      .iter()
      .try_fold(self.0.get(first.as_ref())?, |value, segment| value.get(segment.as_ref()))
  }

  /// Deserializes the whole parameter map into `T`.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
    T::deserialize(Value::Object(self.0.as_ref().clone()))
  }

  pub fn as_map(&self) -> &Map<String, Value> {
    &self.0
  }

  pub fn to_value(&self) -> Value {
    Value::Object(self.0.as_ref().clone())
  }
}

/// Caller-supplied context (current user, request metadata, ...). Children inherit
/// their parent's context by sharing it unless an embedding overrides it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context(Arc<Map<String, Value>>);

impl Context {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_map(fields: Map<String, Value>) -> Self {
    Context(Arc::new(fields))
  }

  /// Returns a copy with `key` set. The receiver (and anyone sharing it) is unchanged.
  pub fn with(&self, key: impl Into<String>, value: Value) -> Self {
    let mut fields = self.0.as_ref().clone();
    fields.insert(key.into(), value);
    Context(Arc::new(fields))
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  pub fn as_map(&self) -> &Map<String, Value> {
    &self.0
  }
}

impl From<Value> for Context {
  /// Non-object values produce an empty context.
  fn from(value: Value) -> Self {
    match value {
      Value::Object(fields) => Context::from_map(fields),
      _ => Context::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  pub field: String,
  pub message: String,
}

/// Field-level validation errors of a rejected parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostic {
  errors: Vec<FieldError>,
}

impl Diagnostic {
  pub fn errors(&self) -> &[FieldError] {
    &self.errors
  }

  /// Messages recorded against `field`.
  pub fn messages_for(&self, field: &str) -> Vec<&str> {
    self
      .errors
      .iter()
      .filter(|e| e.field == field)
      .map(|e| e.message.as_str())
      .collect()
  }

  pub fn to_value(&self) -> Value {
    serde_json::to_value(self).unwrap_or(Value::Null)
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (idx, e) in self.errors.iter().enumerate() {
      if idx > 0 {
        f.write_str("; ")?;
      }
      write!(f, "{}: {}", e.field, e.message)?;
    }
    Ok(())
  }
}

/// Raw parameters being cast and validated. Passed through
/// [`Operation::changeset`](crate::Operation::changeset) before a pipeline is built.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
  fields: Map<String, Value>,
  errors: Vec<FieldError>,
}

impl Changeset {
  /// Starts a changeset from raw input. Anything but a JSON object (or null, which
  /// counts as no parameters) is rejected with an error on field `params`.
  pub fn cast(raw: Value) -> Self {
    match raw {
      Value::Object(fields) => Changeset {
        fields,
        errors: Vec::new(),
      },
      Value::Null => Changeset::default(),
      other => Changeset::default().add_error("params", format!("expected an object, got {}", other)),
    }
  }

  pub fn get(&self, field: &str) -> Option<&Value> {
    self.fields.get(field)
  }

  pub fn put(mut self, field: impl Into<String>, value: Value) -> Self {
    self.fields.insert(field.into(), value);
    self
  }

  pub fn add_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
    self.errors.push(FieldError {
      field: field.into(),
      message: message.into(),
    });
    self
  }

  /// Each listed field must be present and not null.
  pub fn validate_required(mut self, fields: &[&str]) -> Self {
    for field in fields {
      if matches!(self.fields.get(*field), None | Some(Value::Null)) {
        self = self.add_error(*field, "can't be blank");
      }
    }
    self
  }

  /// Runs `check` on `field` when it is present.
  pub fn validate_with(self, field: &str, check: impl Fn(&Value) -> Result<(), String>) -> Self {
    let outcome = self.fields.get(field).map(&check);
    match outcome {
      Some(Err(message)) => self.add_error(field, message),
      _ => self,
    }
  }

  pub fn is_valid(&self) -> bool {
    self.errors.is_empty()
  }

  pub fn apply(self) -> Result<Params, Diagnostic> {
    if self.errors.is_empty() {
      Ok(Params::new(self.fields))
    } else {
      Err(Diagnostic { errors: self.errors })
    }
  }
}
