//! Task approval state machine.
//!
//! Pure function over a task's `(complete, status)` pair. Computing the next
//! state never touches the network; the caller persists the result and
//! updates the cache on success.

use std::fmt;

use crate::error::{Error, Result};
use crate::resources::{Task, TaskStatus, ADMIN_ROLE};

/// An action a consumer can request against a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
  /// Owner checks the task off. Moves it into review.
  MarkComplete,
  /// Owner unchecks their own task before it was reviewed.
  UnmarkComplete,
  /// Admin accepts the completion.
  Approve,
  /// Admin sends the task back.
  Reject,
}

impl TaskAction {
  /// Approval decisions are reserved for admins; checking a task off is not.
  pub fn requires_admin(self) -> bool {
    matches!(self, TaskAction::Approve | TaskAction::Reject)
  }
}

impl fmt::Display for TaskAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      TaskAction::MarkComplete => "mark complete",
      TaskAction::UnmarkComplete => "unmark complete",
      TaskAction::Approve => "approve",
      TaskAction::Reject => "reject",
    };
    f.write_str(s)
  }
}

/// The workflow-relevant slice of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskState {
  pub complete: bool,
  pub status: TaskStatus,
}

impl TaskState {
  /// `complete` implies the task left `open`; `approved` implies `complete`.
  pub fn is_consistent(self) -> bool {
    match self.status {
      TaskStatus::Open => !self.complete,
      TaskStatus::AwaitingApproval => true,
      TaskStatus::Approved => self.complete,
    }
  }
}

impl From<&Task> for TaskState {
  fn from(task: &Task) -> Self {
    TaskState {
      complete: task.complete,
      status: task.status,
    }
  }
}

/// Compute the next state for `action`, or fail without side effects.
///
/// Role gate first: approval decisions require the `admin` role regardless
/// of the current status. Then the transition table:
///
/// - `open` + mark complete -> `awaiting_approval`, complete
/// - `awaiting_approval` + unmark complete -> `open`, not complete
/// - `awaiting_approval` + approve (admin) -> `approved`, complete
/// - `awaiting_approval` + reject (admin) -> `open`, not complete
///
/// `approved` is terminal; everything else is an `IllegalTransition`.
pub fn transition<S: AsRef<str>>(
  current: TaskState,
  action: TaskAction,
  actor_roles: &[S],
) -> Result<TaskState> {
  if action.requires_admin() && !actor_roles.iter().any(|r| r.as_ref() == ADMIN_ROLE) {
    return Err(Error::Unauthorized { action });
  }

  match (current.status, action) {
    (TaskStatus::Open, TaskAction::MarkComplete) => Ok(TaskState {
      complete: true,
      status: TaskStatus::AwaitingApproval,
    }),
    (TaskStatus::AwaitingApproval, TaskAction::UnmarkComplete) => Ok(TaskState {
      complete: false,
      status: TaskStatus::Open,
    }),
    (TaskStatus::AwaitingApproval, TaskAction::Approve) => Ok(TaskState {
      complete: true,
      status: TaskStatus::Approved,
    }),
    (TaskStatus::AwaitingApproval, TaskAction::Reject) => Ok(TaskState {
      complete: false,
      status: TaskStatus::Open,
    }),
    _ => Err(Error::IllegalTransition {
      status: current.status,
      action,
    }),
  }
}
