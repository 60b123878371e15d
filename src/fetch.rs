//! Fetch coordination over the entity store and list index.
//!
//! Guarantees at most one outstanding remote call per cache key: the claim
//! decision and the in-flight flag write happen under one lock acquisition
//! with no await point in between, and the lock is never held across the
//! network call itself.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::remote::RemoteResourceClient;
use crate::resource::Resource;
use crate::resources::Task;
use crate::store::{EntityStore, ListIndex, ListKey};
use crate::workflow::{self, TaskAction, TaskState};

/// What `ensure_single`/`ensure_list` did for the requested key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
  /// The cached value was fresh; no network call was made.
  Cached,
  /// Another fetch for this key is already outstanding; no new call was
  /// made. Re-read the cache once that fetch resolves.
  Pending,
  /// A remote call was issued and its result written back.
  Fetched,
}

/// Both stores for one resource kind, guarded together so a claim check and
/// its flag write are a single critical section.
struct CacheState<R: Resource> {
  entities: EntityStore<R>,
  lists: ListIndex,
}

/// Outcome of the claim check, decided while the lock is held.
enum Claim {
  Cached,
  Pending,
  Fetch,
}

/// Deduplicating fetch layer for one resource kind.
///
/// Consumers read through [`get_record`](Self::get_record) and
/// [`get_list`](Self::get_list) synchronously and call the `ensure_*`
/// methods to make data present; mutations go through
/// [`create`](Self::create)/[`update`](Self::update), after which the
/// caller invalidates whichever list keys the mutation affected.
pub struct FetchCoordinator<R: Resource, C> {
  remote: C,
  state: Mutex<CacheState<R>>,
}

impl<R: Resource, C: RemoteResourceClient<R>> FetchCoordinator<R, C> {
  pub fn new(remote: C) -> Self {
    Self {
      remote,
      state: Mutex::new(CacheState {
        entities: EntityStore::new(),
        lists: ListIndex::new(),
      }),
    }
  }

  fn lock(&self) -> Result<MutexGuard<'_, CacheState<R>>> {
    self.state.lock().map_err(|_| Error::LockPoisoned)
  }

  /// Make the record for `id` present, issuing at most one remote read no
  /// matter how many callers ask while it is in flight or fresh.
  pub async fn ensure_single(&self, id: &str) -> Result<EnsureOutcome> {
    let claim = {
      let mut state = self.lock()?;
      match state.entities.entry(id) {
        Some(entry) if entry.meta.is_fetching => Claim::Pending,
        Some(entry) if entry.record.is_some() && !entry.meta.did_invalidate => Claim::Cached,
        _ => {
          state.entities.begin_fetch(id);
          Claim::Fetch
        }
      }
    };

    match claim {
      Claim::Cached => {
        debug!(kind = R::kind(), id, "cache hit");
        Ok(EnsureOutcome::Cached)
      }
      Claim::Pending => {
        debug!(kind = R::kind(), id, "fetch already outstanding");
        Ok(EnsureOutcome::Pending)
      }
      Claim::Fetch => match self.remote.read(id).await {
        Ok(record) => {
          self.lock()?.entities.receive_success(record);
          Ok(EnsureOutcome::Fetched)
        }
        Err(err) => {
          // The flag must clear even on failure or the key would be stuck.
          self.lock()?.entities.receive_failure(id);
          warn!(kind = R::kind(), id, %err, "fetch failed");
          Err(err)
        }
      },
    }
  }

  /// Make the list for `key` present, with the same dedup guarantee.
  ///
  /// On success every returned record is written into the entity store
  /// before the list membership is marked fetched, so materializing right
  /// after never sees dangling ids.
  pub async fn ensure_list(&self, key: &ListKey) -> Result<EnsureOutcome> {
    let claim = {
      let mut state = self.lock()?;
      match state.lists.entry(key) {
        Some(entry) if entry.meta.is_fetching => Claim::Pending,
        Some(entry) if entry.meta.last_updated.is_some() && !entry.meta.did_invalidate => {
          Claim::Cached
        }
        _ => {
          state.lists.begin_fetch(key);
          Claim::Fetch
        }
      }
    };

    match claim {
      Claim::Cached => {
        debug!(kind = R::kind(), %key, "list cache hit");
        Ok(EnsureOutcome::Cached)
      }
      Claim::Pending => {
        debug!(kind = R::kind(), %key, "list fetch already outstanding");
        Ok(EnsureOutcome::Pending)
      }
      Claim::Fetch => match self.remote.list(key).await {
        Ok(records) => {
          let mut state = self.lock()?;
          let ids: Vec<String> = records.iter().map(|r| r.id().to_string()).collect();
          for record in records {
            state.entities.upsert_from_write(record);
          }
          state.lists.receive_success(key, ids);
          Ok(EnsureOutcome::Fetched)
        }
        Err(err) => {
          self.lock()?.lists.receive_failure(key);
          warn!(kind = R::kind(), %key, %err, "list fetch failed");
          Err(err)
        }
      },
    }
  }

  /// Create a record on the server and write it back into the cache.
  ///
  /// List membership is not touched; the caller invalidates every list key
  /// the new record may belong to.
  pub async fn create(&self, draft: &R::Draft) -> Result<R> {
    let record = self.remote.create(draft).await?;
    self.lock()?.entities.upsert_from_write(record.clone());
    debug!(kind = R::kind(), id = record.id(), "created");
    Ok(record)
  }

  /// Overwrite a record on the server (last-write-wins) and cache the
  /// server's version.
  pub async fn update(&self, record: &R) -> Result<R> {
    let saved = self.remote.update(record.id(), record).await?;
    self.lock()?.entities.upsert_from_write(saved.clone());
    debug!(kind = R::kind(), id = saved.id(), "updated");
    Ok(saved)
  }

  /// Last known record, fresh or stale. Synchronous, no side effects.
  pub fn get_record(&self, id: &str) -> Result<Option<R>> {
    Ok(self.lock()?.entities.get(id).cloned())
  }

  /// Materialized records for a list key, in membership order. Dangling ids
  /// are skipped; a never-fetched key yields an empty list.
  pub fn get_list(&self, key: &ListKey) -> Result<Vec<R>> {
    let state = self.lock()?;
    Ok(state.lists.materialize(key, &state.entities))
  }

  /// Mark a record stale so the next `ensure_single` refetches it.
  pub fn invalidate(&self, id: &str) -> Result<()> {
    self.lock()?.entities.invalidate(id);
    Ok(())
  }

  /// Mark a list membership stale so the next `ensure_list` refetches it.
  pub fn invalidate_list(&self, key: &ListKey) -> Result<()> {
    self.lock()?.lists.invalidate(key);
    Ok(())
  }

  /// Drop every cached record and list for this kind in one critical
  /// section.
  pub fn reset(&self) -> Result<()> {
    let mut state = self.lock()?;
    state.entities.clear();
    state.lists.clear();
    Ok(())
  }
}

impl<C: RemoteResourceClient<Task>> FetchCoordinator<Task, C> {
  /// Run one approval-workflow action against a task: compute the next
  /// legal state, persist it, and cache the server's version.
  ///
  /// Workflow failures happen before any network call. A status change
  /// never moves a task between flows, so no list key is invalidated here.
  pub async fn apply_task_action<S: AsRef<str>>(
    &self,
    task: &Task,
    action: TaskAction,
    actor_roles: &[S],
  ) -> Result<Task> {
    let next = workflow::transition(TaskState::from(task), action, actor_roles)?;
    let updated = Task {
      complete: next.complete,
      status: next.status,
      ..task.clone()
    };
    self.update(&updated).await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex as StdMutex};
  use std::time::Duration;

  use serde_json::Value;

  use super::*;
  use crate::resources::{Task, TaskDraft, TaskStatus};

  const NO_ROLES: &[&str] = &[];
  const ADMIN: &[&str] = &["admin"];

  fn task(id: &str, flow: &str) -> Task {
    Task {
      id: id.to_string(),
      name: format!("task {id}"),
      description: String::new(),
      complete: false,
      status: TaskStatus::Open,
      flow_id: flow.to_string(),
    }
  }

  fn flow_key(flow: &str) -> ListKey {
    ListKey::filtered(Task::BY_FLOW, flow)
  }

  /// Remote double backed by a record vector, with call counters and
  /// scriptable failures.
  #[derive(Clone)]
  struct MockRemote<R> {
    inner: Arc<MockInner<R>>,
  }

  struct MockInner<R> {
    records: StdMutex<Vec<R>>,
    next_created: StdMutex<Option<R>>,
    fail_reads: StdMutex<usize>,
    reads: AtomicUsize,
    lists: AtomicUsize,
    updates: AtomicUsize,
    delay: Option<Duration>,
  }

  impl<R: Resource> MockRemote<R> {
    fn new(records: Vec<R>) -> Self {
      Self::build(records, None)
    }

    fn with_delay(records: Vec<R>, delay: Duration) -> Self {
      Self::build(records, Some(delay))
    }

    fn build(records: Vec<R>, delay: Option<Duration>) -> Self {
      Self {
        inner: Arc::new(MockInner {
          records: StdMutex::new(records),
          next_created: StdMutex::new(None),
          fail_reads: StdMutex::new(0),
          reads: AtomicUsize::new(0),
          lists: AtomicUsize::new(0),
          updates: AtomicUsize::new(0),
          delay,
        }),
      }
    }

    fn reads(&self) -> usize {
      self.inner.reads.load(Ordering::SeqCst)
    }

    fn lists(&self) -> usize {
      self.inner.lists.load(Ordering::SeqCst)
    }

    fn updates(&self) -> usize {
      self.inner.updates.load(Ordering::SeqCst)
    }

    fn fail_next_reads(&self, n: usize) {
      *self.inner.fail_reads.lock().unwrap() = n;
    }

    fn stage_create(&self, record: R) {
      *self.inner.next_created.lock().unwrap() = Some(record);
    }

    fn take_read_failure(&self) -> bool {
      let mut remaining = self.inner.fail_reads.lock().unwrap();
      if *remaining > 0 {
        *remaining -= 1;
        true
      } else {
        false
      }
    }
  }

  impl<R: Resource> RemoteResourceClient<R> for MockRemote<R> {
    async fn read(&self, id: &str) -> Result<R> {
      self.inner.reads.fetch_add(1, Ordering::SeqCst);
      if let Some(delay) = self.inner.delay {
        tokio::time::sleep(delay).await;
      }
      if self.take_read_failure() {
        return Err(Error::Network("mock read failure".to_string()));
      }
      let records = self.inner.records.lock().unwrap();
      records
        .iter()
        .find(|r| r.id() == id)
        .cloned()
        .ok_or(Error::NotFound)
    }

    async fn list(&self, key: &ListKey) -> Result<Vec<R>> {
      self.inner.lists.fetch_add(1, Ordering::SeqCst);
      if let Some(delay) = self.inner.delay {
        tokio::time::sleep(delay).await;
      }
      let records = self.inner.records.lock().unwrap();
      let matching = match key {
        ListKey::All => records.clone(),
        ListKey::Filtered { field, value } => records
          .iter()
          .filter(|r| {
            serde_json::to_value(r)
              .ok()
              .and_then(|v| v.get(field).cloned())
              == Some(Value::String(value.clone()))
          })
          .cloned()
          .collect(),
      };
      Ok(matching)
    }

    async fn create(&self, _draft: &R::Draft) -> Result<R> {
      let record = self
        .inner
        .next_created
        .lock()
        .unwrap()
        .take()
        .expect("stage_create before calling create");
      self.inner.records.lock().unwrap().push(record.clone());
      Ok(record)
    }

    async fn update(&self, id: &str, record: &R) -> Result<R> {
      self.inner.updates.fetch_add(1, Ordering::SeqCst);
      let mut records = self.inner.records.lock().unwrap();
      match records.iter_mut().find(|r| r.id() == id) {
        Some(slot) => {
          *slot = record.clone();
          Ok(record.clone())
        }
        None => Err(Error::NotFound),
      }
    }
  }

  #[tokio::test]
  async fn concurrent_ensures_issue_one_read() {
    let remote = MockRemote::with_delay(vec![task("t1", "f1")], Duration::from_millis(20));
    let coordinator = FetchCoordinator::new(remote.clone());

    let (first, second) = tokio::join!(
      coordinator.ensure_single("t1"),
      coordinator.ensure_single("t1"),
    );

    assert_eq!(first.unwrap(), EnsureOutcome::Fetched);
    assert_eq!(second.unwrap(), EnsureOutcome::Pending);
    assert_eq!(remote.reads(), 1);

    // The pending caller converges by re-reading after resolution.
    assert_eq!(coordinator.get_record("t1").unwrap().unwrap().id, "t1");
  }

  #[tokio::test]
  async fn fresh_record_skips_the_network() {
    let remote = MockRemote::new(vec![task("t1", "f1")]);
    let coordinator = FetchCoordinator::new(remote.clone());

    assert_eq!(
      coordinator.ensure_single("t1").await.unwrap(),
      EnsureOutcome::Fetched
    );
    assert_eq!(
      coordinator.ensure_single("t1").await.unwrap(),
      EnsureOutcome::Cached
    );
    assert_eq!(remote.reads(), 1);
  }

  #[tokio::test]
  async fn invalidate_forces_a_refetch_even_when_recent() {
    let remote = MockRemote::new(vec![task("t1", "f1")]);
    let coordinator = FetchCoordinator::new(remote.clone());

    coordinator.ensure_single("t1").await.unwrap();
    coordinator.invalidate("t1").unwrap();

    assert_eq!(
      coordinator.ensure_single("t1").await.unwrap(),
      EnsureOutcome::Fetched
    );
    assert_eq!(remote.reads(), 2);
  }

  #[tokio::test]
  async fn failed_fetch_clears_the_flag_and_allows_retry() {
    let remote = MockRemote::new(vec![task("t1", "f1")]);
    remote.fail_next_reads(1);
    let coordinator = FetchCoordinator::new(remote.clone());

    let err = coordinator.ensure_single("t1").await.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
    assert!(coordinator.get_record("t1").unwrap().is_none());

    // Not stuck: the next ensure issues a new call.
    assert_eq!(
      coordinator.ensure_single("t1").await.unwrap(),
      EnsureOutcome::Fetched
    );
    assert_eq!(remote.reads(), 2);
  }

  #[tokio::test]
  async fn missing_id_stays_absent() {
    let remote = MockRemote::new(vec![]);
    let coordinator = FetchCoordinator::<Task, _>::new(remote.clone());

    let err = coordinator.ensure_single("ghost").await.unwrap_err();
    assert_eq!(err, Error::NotFound);
    assert!(coordinator.get_record("ghost").unwrap().is_none());
  }

  #[tokio::test]
  async fn list_fetch_populates_entities_before_membership() {
    let remote = MockRemote::new(vec![task("t1", "f1"), task("t2", "f1"), task("t3", "f2")]);
    let coordinator = FetchCoordinator::new(remote.clone());

    assert_eq!(
      coordinator.ensure_list(&flow_key("f1")).await.unwrap(),
      EnsureOutcome::Fetched
    );

    let listed = coordinator.get_list(&flow_key("f1")).unwrap();
    let ids: Vec<&str> = listed.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["t1", "t2"]);

    // The records themselves landed in the entity cache.
    assert!(coordinator.get_record("t2").unwrap().is_some());
    assert!(coordinator.get_record("t3").unwrap().is_none());

    assert_eq!(
      coordinator.ensure_list(&flow_key("f1")).await.unwrap(),
      EnsureOutcome::Cached
    );
    assert_eq!(remote.lists(), 1);
  }

  #[tokio::test]
  async fn concurrent_list_ensures_issue_one_call() {
    let remote = MockRemote::with_delay(vec![task("t1", "f1")], Duration::from_millis(20));
    let coordinator = FetchCoordinator::new(remote.clone());
    let key = flow_key("f1");

    let (first, second) = tokio::join!(coordinator.ensure_list(&key), coordinator.ensure_list(&key));
    assert_eq!(first.unwrap(), EnsureOutcome::Fetched);
    assert_eq!(second.unwrap(), EnsureOutcome::Pending);
    assert_eq!(remote.lists(), 1);
  }

  #[tokio::test]
  async fn created_record_is_invisible_to_lists_until_invalidated() {
    let remote = MockRemote::new(vec![task("t1", "f1")]);
    let coordinator = FetchCoordinator::new(remote.clone());
    let key = flow_key("f1");

    coordinator.ensure_list(&key).await.unwrap();

    remote.stage_create(task("t2", "f1"));
    let created = coordinator
      .create(&TaskDraft::new("f1", "second"))
      .await
      .unwrap();
    assert_eq!(created.id, "t2");

    // The record is cached, but the membership is still the pre-creation
    // snapshot until the caller invalidates the key.
    assert!(coordinator.get_record("t2").unwrap().is_some());
    let ids: Vec<String> = coordinator
      .get_list(&key)
      .unwrap()
      .into_iter()
      .map(|t| t.id)
      .collect();
    assert_eq!(ids, ["t1"]);

    coordinator.invalidate_list(&key).unwrap();
    assert_eq!(
      coordinator.ensure_list(&key).await.unwrap(),
      EnsureOutcome::Fetched
    );
    let ids: Vec<String> = coordinator
      .get_list(&key)
      .unwrap()
      .into_iter()
      .map(|t| t.id)
      .collect();
    assert_eq!(ids, ["t1", "t2"]);
  }

  #[tokio::test]
  async fn task_action_round_trip_through_the_cache() {
    let remote = MockRemote::new(vec![task("t1", "f1")]);
    let coordinator = FetchCoordinator::new(remote.clone());

    coordinator.ensure_single("t1").await.unwrap();
    let current = coordinator.get_record("t1").unwrap().unwrap();

    let checked = coordinator
      .apply_task_action(&current, TaskAction::MarkComplete, NO_ROLES)
      .await
      .unwrap();
    assert!(checked.complete);
    assert_eq!(checked.status, TaskStatus::AwaitingApproval);
    assert_eq!(
      coordinator.get_record("t1").unwrap().unwrap().status,
      TaskStatus::AwaitingApproval
    );

    let rejected = coordinator
      .apply_task_action(&checked, TaskAction::Reject, ADMIN)
      .await
      .unwrap();
    assert!(!rejected.complete);
    assert_eq!(rejected.status, TaskStatus::Open);
    assert_eq!(remote.updates(), 2);
  }

  #[tokio::test]
  async fn workflow_failures_never_touch_the_network() {
    let remote = MockRemote::new(vec![task("t1", "f1")]);
    let coordinator = FetchCoordinator::new(remote.clone());
    coordinator.ensure_single("t1").await.unwrap();
    let current = coordinator.get_record("t1").unwrap().unwrap();

    // Approving an open task is illegal; approving without the admin role
    // is unauthorized. Neither issues an update.
    let err = coordinator
      .apply_task_action(&current, TaskAction::Approve, ADMIN)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::IllegalTransition { .. }));

    let checked = coordinator
      .apply_task_action(&current, TaskAction::MarkComplete, NO_ROLES)
      .await
      .unwrap();
    let err = coordinator
      .apply_task_action(&checked, TaskAction::Approve, NO_ROLES)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    assert_eq!(remote.updates(), 1);
  }

  #[tokio::test]
  async fn reset_clears_records_and_lists() {
    let remote = MockRemote::new(vec![task("t1", "f1")]);
    let coordinator = FetchCoordinator::new(remote.clone());

    coordinator.ensure_single("t1").await.unwrap();
    coordinator.ensure_list(&flow_key("f1")).await.unwrap();
    coordinator.reset().unwrap();

    assert!(coordinator.get_record("t1").unwrap().is_none());
    assert!(coordinator.get_list(&flow_key("f1")).unwrap().is_empty());
    assert_eq!(
      coordinator.ensure_single("t1").await.unwrap(),
      EnsureOutcome::Fetched
    );
  }
}
