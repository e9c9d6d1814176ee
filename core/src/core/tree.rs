// opkit/src/core/tree.rs

//! The flat accumulator produced by the executor and the nested result tree
//! that steps, callbacks and callers see, plus the transform between them.

use crate::core::scope::{ScopeId, ScopePath, StepKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One entry of a result tree: either a step's value or the tree of a child scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultNode {
  Value(Value),
  Scope(ResultTree),
}

/// Nested mapping from step name (or child scope identifier) to a value or a
/// subtree, shaped like the scope hierarchy of the operation.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ResultTree(BTreeMap<String, ResultNode>);

impl ResultTree {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.0.contains_key(name)
  }

  pub fn node(&self, name: &str) -> Option<&ResultNode> {
    self.0.get(name)
  }

  /// The value of the step `name`, if it is a leaf of this tree.
  pub fn value(&self, name: &str) -> Option<&Value> {
    match self.0.get(name) {
      Some(ResultNode::Value(v)) => Some(v),
      _ => None,
    }
  }

  /// The subtree of child scope `id`.
  pub fn scope(&self, id: &str) -> Option<&ResultTree> {
    match self.0.get(id) {
      Some(ResultNode::Scope(t)) => Some(t),
      _ => None,
    }
  }

  /// Deserializes the value of step `name` into `T`.
  pub fn decode<T: DeserializeOwned>(&self, name: &str) -> Option<Result<T, serde_json::Error>> {
    self.value(name).map(|v| T::deserialize(v))
  }

  /// Walks down the given scope identifiers.
  pub fn subtree(&self, path: &[ScopeId]) -> Option<&ResultTree> {
    path.iter().try_fold(self, |tree, id| tree.scope(id.as_str()))
  }

  pub fn insert(&mut self, name: impl Into<String>, node: ResultNode) -> Option<ResultNode> {
    self.0.insert(name.into(), node)
  }

  pub fn insert_value(&mut self, name: impl Into<String>, value: Value) -> Option<ResultNode> {
    self.insert(name, ResultNode::Value(value))
  }

  pub fn remove(&mut self, name: &str) -> Option<ResultNode> {
    self.0.remove(name)
  }

  /// Replaces the subtree at `path` (creating intermediate scopes as needed).
  /// An empty `path` replaces the whole tree.
  pub fn replace_subtree(&mut self, path: &[ScopeId], subtree: ResultTree) {
    match path.split_first() {
      None => *self = subtree,
      Some((head, rest)) => {
        let slot = self
          .0
          .entry(head.as_str().to_string())
          .or_insert_with(|| ResultNode::Scope(ResultTree::new()));
        if let ResultNode::Value(_) = slot {
          *slot = ResultNode::Scope(ResultTree::new());
        }
        if let ResultNode::Scope(child) = slot {
          child.replace_subtree(rest, subtree);
        }
      }
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &ResultNode)> {
    self.0.iter()
  }

  /// Inverse of [`to_tree`]: namespaces every leaf under `scope` (and the child
  /// identifiers leading to it).
  pub fn flatten(&self, scope: &ScopePath) -> Vec<(StepKey, Value)> {
    let mut out = Vec::new();
    self.flatten_into(scope, &mut out);
    out
  }

  fn flatten_into(&self, scope: &ScopePath, out: &mut Vec<(StepKey, Value)>) {
    for (name, node) in &self.0 {
      match node {
        ResultNode::Value(v) => out.push((scope.key_for(name.clone()), v.clone())),
        ResultNode::Scope(child) => child.flatten_into(&scope.push(ScopeId::new(name.clone())), out),
      }
    }
  }

  /// Plain nested JSON rendering of the tree.
  pub fn into_value(self) -> Value {
    Value::Object(
      self
        .0
        .into_iter()
        .map(|(k, node)| {
          let v = match node {
            ResultNode::Value(v) => v,
            ResultNode::Scope(t) => t.into_value(),
          };
          (k, v)
        })
        .collect(),
    )
  }
}

impl FromIterator<(String, Value)> for ResultTree {
  fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
    ResultTree(iter.into_iter().map(|(k, v)| (k, ResultNode::Value(v))).collect())
  }
}

/// Ordered `(key, value)` pairs in the order the executor completed them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Accumulator {
  entries: Vec<(StepKey, Value)>,
}

impl Accumulator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_entries(entries: Vec<(StepKey, Value)>) -> Self {
    Self { entries }
  }

  pub fn push(&mut self, key: StepKey, value: Value) {
    self.entries.push((key, value));
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, key: &StepKey) -> Option<&Value> {
    self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
  }

  pub fn keys(&self) -> impl Iterator<Item = &StepKey> {
    self.entries.iter().map(|(k, _)| k)
  }

  pub fn entries(&self) -> &[(StepKey, Value)] {
    &self.entries
  }

  pub fn into_entries(self) -> Vec<(StepKey, Value)> {
    self.entries
  }

  /// Everything visible at or below `scope`, as a tree.
  pub fn to_tree(&self, scope: &ScopePath) -> ResultTree {
    to_tree(&self.entries, scope)
  }
}

// A key with some of its leading scope segments already peeled off.
type Relative<'a> = (&'a [ScopeId], &'a str, &'a Value);

/// Projects flat `(key, value)` pairs onto the tree visible from `scope`.
///
/// Entries outside `scope` (unrelated siblings, ancestors) are dropped. An empty
/// input always yields an empty tree.
pub fn to_tree(entries: &[(StepKey, Value)], scope: &ScopePath) -> ResultTree {
  let mut relative: Vec<Relative<'_>> = entries
    .iter()
    .map(|(key, value)| (key.scope().ids(), key.name(), value))
    .collect();

  // Peel: strip the scope path one level at a time from the outermost end.
  for id in scope.ids() {
    relative = peel(relative, id);
  }

  group(relative)
}

fn peel<'a>(entries: Vec<Relative<'a>>, id: &ScopeId) -> Vec<Relative<'a>> {
  entries
    .into_iter()
    .filter_map(|(segments, name, value)| match segments.split_first() {
      Some((head, rest)) if head == id => Some((rest, name, value)),
      _ => None,
    })
    .collect()
}

fn group(entries: Vec<Relative<'_>>) -> ResultTree {
  let mut tree = ResultTree::new();
  let mut children: BTreeMap<&ScopeId, Vec<Relative<'_>>> = BTreeMap::new();

  for (segments, name, value) in entries {
    match segments.split_first() {
      None => {
        tree.insert_value(name, value.clone());
      }
      Some((child, _)) => children.entry(child).or_default().push((segments, name, value)),
    }
  }

  for (child, entries) in children {
    tree.insert(child.as_str(), ResultNode::Scope(group(peel(entries, child))));
  }
  tree
}
