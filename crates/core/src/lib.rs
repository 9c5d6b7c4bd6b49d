//! branchview core library.
//!
//! Client-side logic for a git-like version-control service: the remote
//! gateway, session persistence, cascading navigation with stale-response
//! protection, the commit-graph model builder, and the merge workflow.

pub mod config;
pub mod db;
pub mod errors;
pub mod gateway;
pub mod graph;
pub mod merge;
pub mod models;
pub mod navigation;
pub mod session;

// Re-exports for convenience.
pub use config::ClientConfig;
pub use db::Database;
pub use errors::CoreError;
pub use gateway::{HttpGateway, RemoteGateway};
pub use graph::{GraphModel, GraphModelBuilder};
pub use merge::{MergeWorkflowCoordinator, Resolution};
pub use navigation::NavigationController;
pub use session::SessionStore;
