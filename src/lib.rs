//! Client-side mirror of server-held flow/task resources.
//!
//! The mirror keeps a normalized cache of records and list memberships with
//! per-key fetch metadata, guarantees at most one outstanding remote call
//! per key, and enforces the multi-party task approval workflow before any
//! status change is persisted.

pub mod config;
pub mod error;
pub mod fetch;
pub mod mirror;
pub mod remote;
pub mod resource;
pub mod resources;
pub mod store;
pub mod workflow;

pub use error::{Error, Result};
pub use fetch::{EnsureOutcome, FetchCoordinator};
pub use mirror::Mirror;
pub use remote::{HttpResourceClient, RemoteResourceClient};
pub use resource::Resource;
pub use store::{EntityStore, FetchMeta, ListIndex, ListKey};
pub use workflow::{transition, TaskAction, TaskState};
