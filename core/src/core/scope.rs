// opkit/src/core/scope.rs

//! Scope identifiers, scope paths and step keys.
//!
//! Every pipeline state lives at a `ScopePath`: the root operation's identifier
//! followed by one identifier per embedded child operation. A step declared at a
//! path is addressed by a `StepKey` (the full path plus the step name), which is
//! the only identity the executor knows about.

use std::fmt;
use uuid::Uuid;

/// Opaque token naming one level of pipeline nesting.
///
/// Caller-supplied identifiers must be unique among siblings. Generated ones are
/// unique by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(String);

impl ScopeId {
  pub fn new(id: impl Into<String>) -> Self {
    ScopeId(id.into())
  }

  /// A fresh identifier that cannot collide with any other generated one.
  pub fn generate() -> Self {
    ScopeId(Uuid::new_v4().simple().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ScopeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ScopeId {
  fn from(id: &str) -> Self {
    ScopeId::new(id)
  }
}

impl From<String> for ScopeId {
  fn from(id: String) -> Self {
    ScopeId(id)
  }
}

/// Root-to-leaf sequence of scope identifiers. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopePath(Vec<ScopeId>);

impl ScopePath {
  pub fn root(id: ScopeId) -> Self {
    ScopePath(vec![id])
  }

  /// Returns the path of a child scope. The receiver is left untouched; child
  /// paths are always extensions of their parent.
  pub fn push(&self, id: ScopeId) -> Self {
    let mut ids = self.0.clone();
    ids.push(id);
    ScopePath(ids)
  }

  pub fn ids(&self) -> &[ScopeId] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Whether the path has no identifiers. A path always has at least one.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn is_root(&self) -> bool {
    self.0.len() == 1
  }

  pub fn root_id(&self) -> &ScopeId {
    &self.0[0]
  }

  pub fn leaf_id(&self) -> &ScopeId {
    &self.0[self.0.len() - 1]
  }

  /// The identifiers below `ancestor`, or `None` if `ancestor` is not a prefix of
  /// this path.
  pub fn relative_to(&self, ancestor: &ScopePath) -> Option<&[ScopeId]> {
    self.0.strip_prefix(ancestor.0.as_slice())
  }

  /// Builds the key of a step named `name` declared at this path.
  pub fn key_for(&self, name: impl Into<String>) -> StepKey {
    StepKey {
      scope: self.clone(),
      name: name.into(),
    }
  }
}

impl fmt::Display for ScopePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (idx, id) in self.0.iter().enumerate() {
      if idx > 0 {
        f.write_str("/")?;
      }
      f.write_str(id.as_str())?;
    }
    Ok(())
  }
}

/// Namespaced identity of a step: the full scope path it was declared at plus its
/// name. Two keys are equal iff both parts are equal, so equal names in different
/// scopes never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepKey {
  scope: ScopePath,
  name: String,
}

impl StepKey {
  pub fn scope(&self) -> &ScopePath {
    &self.scope
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Segments between `ancestor` and the step itself (exclusive of the name), or
  /// `None` when the step is not declared at or below `ancestor`.
  pub fn relative_to(&self, ancestor: &ScopePath) -> Option<&[ScopeId]> {
    self.scope.relative_to(ancestor)
  }
}

impl fmt::Display for StepKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.scope, self.name)
  }
}
