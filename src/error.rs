//! Error taxonomy for the resource mirror.

use thiserror::Error;

use crate::resources::TaskStatus;
use crate::workflow::TaskAction;

/// Everything the mirror can report to a caller.
///
/// Transport and server-side failures leave the cache in its prior,
/// well-defined state; workflow failures are computed before any network
/// call is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
  /// Transport-level failure. The only cache mutation is clearing the
  /// in-flight flag for the affected key.
  #[error("network failure: {0}")]
  Network(String),

  /// The server rejected a write.
  #[error("rejected by server: {0}")]
  Validation(String),

  /// Read of an id the server does not know.
  #[error("resource not found")]
  NotFound,

  /// The actor lacks the role the action requires.
  #[error("the {action} action requires the admin role")]
  Unauthorized { action: TaskAction },

  /// The action is not defined for the task's current status.
  #[error("cannot {action} a task in status {status}")]
  IllegalTransition {
    status: TaskStatus,
    action: TaskAction,
  },

  /// A cache mutex was poisoned by a panicking thread.
  #[error("cache lock poisoned")]
  LockPoisoned,
}

pub type Result<T> = std::result::Result<T, Error>;
