// opkit/src/core/phase.rs

//! Phases an operation run moves through. Used for span fields and to tell which
//! stage a staged callback fault happened in.

use std::fmt;

/// `Validating → Building → PreTransaction → AtomicExecution → PostCommit → Done`.
/// A run never revisits a phase; a failure ends it in whatever phase it is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Validating,
  Building,
  PreTransaction,
  AtomicExecution,
  PostCommit,
  Done,
}

impl Phase {
  pub fn as_str(&self) -> &'static str {
    match self {
      Phase::Validating => "validating",
      Phase::Building => "building",
      Phase::PreTransaction => "pre_transaction",
      Phase::AtomicExecution => "atomic_execution",
      Phase::PostCommit => "post_commit",
      Phase::Done => "done",
    }
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
