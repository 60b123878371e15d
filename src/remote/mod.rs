//! Remote read/write capability the mirror is built on.

mod http;

pub use http::HttpResourceClient;

use crate::error::Result;
use crate::resource::Resource;
use crate::store::ListKey;

/// Network collaborator for one resource kind.
///
/// Implementations must resolve every call exactly once, success or failure;
/// the fetch coordinator relies on that to clear its in-flight flags. No
/// retries here; callers decide whether to try again.
#[allow(async_fn_in_trait)]
pub trait RemoteResourceClient<R: Resource>: Send + Sync {
  /// Fetch a single record by id.
  async fn read(&self, id: &str) -> Result<R>;

  /// Fetch the records matching a list query, in server order.
  async fn list(&self, key: &ListKey) -> Result<Vec<R>>;

  /// Create a record from a draft and return the server's version of it.
  async fn create(&self, draft: &R::Draft) -> Result<R>;

  /// Overwrite a record (last-write-wins) and return the server's version.
  async fn update(&self, id: &str, record: &R) -> Result<R>;
}
