//! The per-kind coordinator bundle handed to the presentation layer.

use crate::error::Result;
use crate::fetch::FetchCoordinator;
use crate::remote::RemoteResourceClient;
use crate::resources::{Flow, Note, Task, User};

/// One coordinator per resource kind over a shared remote client.
///
/// This is the whole surface a consumer needs: synchronous reads, idempotent
/// `ensure_*` calls, explicit invalidation, and the task workflow command on
/// the `tasks` coordinator.
pub struct Mirror<C> {
  pub flows: FetchCoordinator<Flow, C>,
  pub tasks: FetchCoordinator<Task, C>,
  pub notes: FetchCoordinator<Note, C>,
  pub users: FetchCoordinator<User, C>,
}

impl<C> Mirror<C>
where
  C: Clone
    + RemoteResourceClient<Flow>
    + RemoteResourceClient<Task>
    + RemoteResourceClient<Note>
    + RemoteResourceClient<User>,
{
  pub fn new(remote: C) -> Self {
    Self {
      flows: FetchCoordinator::new(remote.clone()),
      tasks: FetchCoordinator::new(remote.clone()),
      notes: FetchCoordinator::new(remote.clone()),
      users: FetchCoordinator::new(remote),
    }
  }

  /// Clear every cached record and list membership, kind by kind.
  pub fn reset(&self) -> Result<()> {
    self.flows.reset()?;
    self.tasks.reset()?;
    self.notes.reset()?;
    self.users.reset()
  }
}
