//! # revtree-server
//!
//! HTTP remote that stores revtree projects and revisions in SQLite, the
//! counterpart of the sync workers in `revtree-core`.

pub mod api;
pub mod server;

pub use api::{create_router, AppState};
pub use server::RevtreeServer;
