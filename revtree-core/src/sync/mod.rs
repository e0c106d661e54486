//! Reconciling the local revision tree with a remote copy.
//!
//! [`reconcile`] holds the pure tree arithmetic, [`service`] runs it on
//! background workers against any [`SyncTransport`].

pub mod dto;
pub mod local;
pub mod reconcile;
pub mod service;
pub mod transport;

pub use dto::{ProjectDto, ProjectUpdate, RevisionDto, RevisionPayload};
pub use local::StorageTransport;
pub use reconcile::{RemoteBranch, SyncPlan};
pub use service::{
    PullMode, SyncContext, SyncEvent, SyncKind, SyncOutcome, SyncService, SyncTarget,
};
pub use transport::{SyncTransport, TransportError, TransportResult};
