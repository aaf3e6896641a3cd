//! Scheduler layer for the server
//!
//! Background work that runs independently of requests. Currently the
//! reclamation of workspaces whose download never came.

pub mod sweeper;

pub use sweeper::WorkspaceSweeper;
