//! Query-scoped index of record ids with per-query fetch metadata.

use std::collections::HashMap;
use std::fmt;

use super::{EntityStore, FetchMeta};
use crate::resource::Resource;

/// Identifies one list query within a resource kind: either the whole
/// collection or a single-field filter (e.g. `_flow = <id>`).
///
/// The resource kind itself is carried by which per-kind index holds the
/// entry, so the key only encodes the filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListKey {
  All,
  Filtered { field: String, value: String },
}

impl ListKey {
  pub fn all() -> Self {
    ListKey::All
  }

  pub fn filtered(field: impl Into<String>, value: impl Into<String>) -> Self {
    ListKey::Filtered {
      field: field.into(),
      value: value.into(),
    }
  }
}

impl fmt::Display for ListKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ListKey::All => f.write_str("all"),
      ListKey::Filtered { field, value } => write!(f, "{field}={value}"),
    }
  }
}

/// Ordered id sequence for one query, plus its fetch metadata. The metadata
/// describes the membership of the result set, not the freshness of the
/// individual records.
#[derive(Debug, Clone, Default)]
pub struct ListEntry {
  pub ids: Vec<String>,
  pub meta: FetchMeta,
}

impl ListEntry {
  pub fn is_fresh(&self) -> bool {
    self.meta.last_updated.is_some() && !self.meta.is_fetching && !self.meta.did_invalidate
  }
}

/// Pure state container mapping list keys to ordered id sequences. Ids are
/// weak references into the entity store; lookups resolve them lazily.
#[derive(Debug, Default)]
pub struct ListIndex {
  entries: HashMap<ListKey, ListEntry>,
}

impl ListIndex {
  pub fn new() -> Self {
    Self::default()
  }

  /// Ordered ids for `key`, or `None` if the query was never fetched.
  pub fn ids(&self, key: &ListKey) -> Option<&[String]> {
    self.entries.get(key).map(|e| e.ids.as_slice())
  }

  pub fn entry(&self, key: &ListKey) -> Option<&ListEntry> {
    self.entries.get(key)
  }

  /// Mark a fetch for `key` as outstanding. Idempotent while fetching.
  pub fn begin_fetch(&mut self, key: &ListKey) {
    self.entries.entry(key.clone()).or_default().meta.begin_fetch();
  }

  /// Replace the id sequence for `key` with a fresh server result.
  pub fn receive_success(&mut self, key: &ListKey, ids: Vec<String>) {
    let entry = self.entries.entry(key.clone()).or_default();
    entry.ids = ids;
    entry.meta.receive_success();
  }

  /// A list fetch resolved with an error; previous membership stays.
  pub fn receive_failure(&mut self, key: &ListKey) {
    if let Some(entry) = self.entries.get_mut(key) {
      entry.meta.receive_failure();
    }
  }

  /// Mark the membership for `key` as stale without dropping it.
  pub fn invalidate(&mut self, key: &ListKey) {
    self.entries.entry(key.clone()).or_default().meta.invalidate();
  }

  /// Resolve the id sequence for `key` through the entity store, in order.
  ///
  /// Ids with no cached record are dangling references and are skipped; a
  /// partially populated cache yields a partial list rather than an error.
  /// A never-fetched key yields an empty list.
  pub fn materialize<R: Resource>(&self, key: &ListKey, entities: &EntityStore<R>) -> Vec<R> {
    self
      .ids(key)
      .unwrap_or(&[])
      .iter()
      .filter_map(|id| entities.get(id).cloned())
      .collect()
  }

  /// Drop every entry.
  pub fn clear(&mut self) {
    self.entries.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resources::{Task, TaskStatus};

  fn task(id: &str) -> Task {
    Task {
      id: id.to_string(),
      name: format!("task {id}"),
      description: String::new(),
      complete: false,
      status: TaskStatus::Open,
      flow_id: "f1".to_string(),
    }
  }

  fn flow_key() -> ListKey {
    ListKey::filtered(Task::BY_FLOW, "f1")
  }

  #[test]
  fn receive_success_replaces_membership_in_order() {
    let mut index = ListIndex::new();
    index.begin_fetch(&flow_key());
    index.receive_success(&flow_key(), vec!["t2".into(), "t1".into()]);

    assert_eq!(index.ids(&flow_key()).unwrap(), ["t2", "t1"]);
    assert!(index.entry(&flow_key()).unwrap().is_fresh());
    assert!(index.ids(&ListKey::all()).is_none());
  }

  #[test]
  fn materialize_preserves_order_and_skips_dangling_ids() {
    let mut entities = EntityStore::<Task>::new();
    entities.receive_success(task("t1"));
    entities.receive_success(task("t3"));

    let mut index = ListIndex::new();
    index.receive_success(
      &flow_key(),
      vec!["t3".into(), "missing".into(), "t1".into()],
    );

    let records = index.materialize(&flow_key(), &entities);
    let ids: Vec<&str> = records.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["t3", "t1"]);
  }

  #[test]
  fn materialize_of_unknown_key_is_empty() {
    let entities = EntityStore::<Task>::new();
    let index = ListIndex::new();
    assert!(index.materialize(&flow_key(), &entities).is_empty());
  }

  #[test]
  fn invalidate_keeps_membership_readable() {
    let mut index = ListIndex::new();
    index.receive_success(&flow_key(), vec!["t1".into()]);
    index.invalidate(&flow_key());

    let entry = index.entry(&flow_key()).unwrap();
    assert!(entry.meta.did_invalidate);
    assert!(!entry.is_fresh());
    assert_eq!(index.ids(&flow_key()).unwrap(), ["t1"]);
  }

  #[test]
  fn failure_clears_fetching_and_keeps_previous_ids() {
    let mut index = ListIndex::new();
    index.receive_success(&flow_key(), vec!["t1".into()]);
    index.begin_fetch(&flow_key());
    index.receive_failure(&flow_key());

    let entry = index.entry(&flow_key()).unwrap();
    assert!(!entry.meta.is_fetching);
    assert_eq!(entry.ids, ["t1"]);
  }
}
