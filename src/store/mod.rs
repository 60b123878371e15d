//! In-memory normalized mirror of server-held resources.

mod entity;
mod list;

pub use entity::{EntityEntry, EntityStore};
pub use list::{ListEntry, ListIndex, ListKey};

use chrono::{DateTime, Utc};

/// Per-key fetch metadata shared by the entity store and the list index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchMeta {
  /// A fetch for this key is outstanding.
  pub is_fetching: bool,
  /// The cached value is known-stale and must be refetched before being
  /// treated as authoritative.
  pub did_invalidate: bool,
  /// When the last successful fetch or write-back landed.
  pub last_updated: Option<DateTime<Utc>>,
}

impl FetchMeta {
  fn begin_fetch(&mut self) {
    self.is_fetching = true;
  }

  fn receive_success(&mut self) {
    self.is_fetching = false;
    self.did_invalidate = false;
    self.last_updated = Some(Utc::now());
  }

  fn receive_failure(&mut self) {
    self.is_fetching = false;
  }

  fn invalidate(&mut self) {
    self.did_invalidate = true;
  }
}
