//! Concrete resource kinds mirrored from the server.
//!
//! Field names follow the wire format (`_id`, `_flow`, `_task`, `_user`);
//! unknown fields are ignored so server-side additions don't break the
//! client.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::Resource;

/// Role string that unlocks approval actions.
pub const ADMIN_ROLE: &str = "admin";

/// A flow: an ordered collection of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
  #[serde(rename = "_id")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowDraft {
  pub name: String,
  pub description: String,
}

impl Resource for Flow {
  type Draft = FlowDraft;

  fn id(&self) -> &str {
    &self.id
  }

  fn kind() -> &'static str {
    "flow"
  }

  fn collection() -> &'static str {
    "flows"
  }
}

/// Approval status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  Open,
  AwaitingApproval,
  Approved,
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      TaskStatus::Open => "open",
      TaskStatus::AwaitingApproval => "awaiting_approval",
      TaskStatus::Approved => "approved",
    };
    f.write_str(s)
  }
}

/// A task inside a flow, subject to the approval workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
  #[serde(rename = "_id")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub complete: bool,
  pub status: TaskStatus,
  /// Id of the owning flow.
  #[serde(rename = "_flow")]
  pub flow_id: String,
}

impl Task {
  /// Filter field for "tasks belonging to a flow" list queries.
  pub const BY_FLOW: &'static str = "_flow";
}

/// Create payload for a task. New tasks start unchecked and open.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDraft {
  pub name: String,
  pub description: String,
  pub complete: bool,
  pub status: TaskStatus,
  #[serde(rename = "_flow")]
  pub flow_id: String,
}

impl TaskDraft {
  pub fn new(flow_id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      description: String::new(),
      complete: false,
      status: TaskStatus::Open,
      flow_id: flow_id.into(),
    }
  }
}

impl Resource for Task {
  type Draft = TaskDraft;

  fn id(&self) -> &str {
    &self.id
  }

  fn kind() -> &'static str {
    "task"
  }

  fn collection() -> &'static str {
    "tasks"
  }
}

/// A comment attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(rename = "_task")]
  pub task_id: String,
  #[serde(rename = "_user")]
  pub user_id: String,
  pub content: String,
  #[serde(default)]
  pub created: Option<DateTime<Utc>>,
}

impl Note {
  /// Filter field for "notes belonging to a task" list queries.
  pub const BY_TASK: &'static str = "_task";
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteDraft {
  #[serde(rename = "_task")]
  pub task_id: String,
  #[serde(rename = "_user")]
  pub user_id: String,
  pub content: String,
}

impl Resource for Note {
  type Draft = NoteDraft;

  fn id(&self) -> &str {
    &self.id
  }

  fn kind() -> &'static str {
    "note"
  }

  fn collection() -> &'static str {
    "notes"
  }
}

/// An account on the server. Roles gate the approval actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(default)]
  pub username: String,
  #[serde(rename = "firstName", default)]
  pub first_name: String,
  #[serde(rename = "lastName", default)]
  pub last_name: String,
  #[serde(default)]
  pub roles: Vec<String>,
}

impl User {
  pub fn is_admin(&self) -> bool {
    self.roles.iter().any(|r| r == ADMIN_ROLE)
  }

  pub fn display_name(&self) -> String {
    let name = format!("{} {}", self.first_name, self.last_name);
    let name = name.trim();
    if name.is_empty() {
      self.username.clone()
    } else {
      name.to_string()
    }
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserDraft {
  pub username: String,
  #[serde(rename = "firstName")]
  pub first_name: String,
  #[serde(rename = "lastName")]
  pub last_name: String,
}

impl Resource for User {
  type Draft = UserDraft;

  fn id(&self) -> &str {
    &self.id
  }

  fn kind() -> &'static str {
    "user"
  }

  fn collection() -> &'static str {
    "users"
  }
}
