//! Normalized id -> record cache with per-record fetch metadata.

use std::collections::HashMap;

use chrono::Utc;

use super::FetchMeta;
use crate::resource::Resource;

/// A cached record slot. The record may be absent while a first fetch is in
/// flight, or after a read that failed.
#[derive(Debug, Clone)]
pub struct EntityEntry<R> {
  pub record: Option<R>,
  pub meta: FetchMeta,
}

impl<R> Default for EntityEntry<R> {
  fn default() -> Self {
    Self {
      record: None,
      meta: FetchMeta::default(),
    }
  }
}

impl<R> EntityEntry<R> {
  /// A record is usable only when it is present, not mid-fetch, and not
  /// invalidated.
  pub fn is_fresh(&self) -> bool {
    self.record.is_some() && !self.meta.is_fetching && !self.meta.did_invalidate
  }
}

/// Pure state container mapping record ids to cached records. Never issues
/// network calls; all side effects are the field mutations described on each
/// operation.
#[derive(Debug)]
pub struct EntityStore<R: Resource> {
  entries: HashMap<String, EntityEntry<R>>,
}

impl<R: Resource> Default for EntityStore<R> {
  fn default() -> Self {
    Self {
      entries: HashMap::new(),
    }
  }
}

impl<R: Resource> EntityStore<R> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Last known record for `id`, regardless of freshness.
  pub fn get(&self, id: &str) -> Option<&R> {
    self.entries.get(id).and_then(|e| e.record.as_ref())
  }

  /// Record for `id` only if it is fresh per the usability invariant.
  pub fn get_fresh(&self, id: &str) -> Option<&R> {
    self
      .entries
      .get(id)
      .filter(|e| e.is_fresh())
      .and_then(|e| e.record.as_ref())
  }

  /// Full entry including metadata.
  pub fn entry(&self, id: &str) -> Option<&EntityEntry<R>> {
    self.entries.get(id)
  }

  /// Mark a fetch for `id` as outstanding. Idempotent while fetching.
  pub fn begin_fetch(&mut self, id: &str) {
    self.entries.entry(id.to_string()).or_default().meta.begin_fetch();
  }

  /// Store a freshly fetched record and clear the fetching/stale flags.
  pub fn receive_success(&mut self, record: R) {
    let entry = self.entries.entry(record.id().to_string()).or_default();
    entry.record = Some(record);
    entry.meta.receive_success();
  }

  /// A fetch resolved with an error. The previous record, if any, stays
  /// visible; only the in-flight flag is cleared.
  pub fn receive_failure(&mut self, id: &str) {
    if let Some(entry) = self.entries.get_mut(id) {
      entry.meta.receive_failure();
    }
  }

  /// Mark the cached record as stale without dropping it.
  pub fn invalidate(&mut self, id: &str) {
    self.entries.entry(id.to_string()).or_default().meta.invalidate();
  }

  /// Write-back after a successful create/update. Clears staleness and
  /// stamps the update time but leaves any concurrent fetch flag untouched.
  pub fn upsert_from_write(&mut self, record: R) {
    let entry = self.entries.entry(record.id().to_string()).or_default();
    entry.record = Some(record);
    entry.meta.did_invalidate = false;
    entry.meta.last_updated = Some(Utc::now());
  }

  /// Drop every entry.
  pub fn clear(&mut self) {
    self.entries.clear();
  }
}
