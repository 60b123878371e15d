//! The trait every mirrored resource kind implements.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A server-held record the mirror can cache.
///
/// Implementors provide their unique id plus the names the wire protocol
/// uses for the kind. Everything beyond the id is opaque to the cache.
pub trait Resource: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Payload type for creating a new record of this kind.
  type Draft: Serialize + Send + Sync;

  /// Unique identifier of this record.
  fn id(&self) -> &str;

  /// Singular kind name, used as the single-item envelope key (e.g. "task").
  fn kind() -> &'static str;

  /// Plural collection name, used in URLs and list envelopes (e.g. "tasks").
  fn collection() -> &'static str;
}
