//! # Vigil Cluster
//!
//! Keeps violation levels consistent across server instances that share a
//! key-value store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  publish   ┌──────────────┐  CAS   ┌─────────────┐
//! │ ledger update│ ─────────► │ ClusterSync  │ ─────► │ ClusterStore│
//! └──────────────┘            │ writer/fetch │ ◄───── │ (shared KV) │
//!        ▲        fetch+merge └──────────────┘  get   └─────────────┘
//!        └──────────────────────────┘
//! ```
//!
//! Merging is last-writer-wins per (check, player) key, so any two
//! instances that exchanged their entries agree on the same value whatever
//! order the writes landed in.
//!
//! ## Failure Model
//!
//! The store is optional at runtime. Publishes are retried in the
//! background with exponential backoff; fetches that miss their deadline
//! return `None` and the caller continues with local state only.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod entry;
pub mod error;
pub mod store;
pub mod sync;

pub use config::SyncConfig;
pub use entry::{merge, ClusterEntry, ClusterKey};
pub use error::{StoreError, StoreResult, SyncError};
pub use store::{ClusterStore, MemoryClusterStore};
pub use sync::{ClusterSync, SyncStats};
