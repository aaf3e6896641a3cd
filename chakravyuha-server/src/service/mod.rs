//! Service Module
//!
//! Business logic layer of the server.
//! Services sit between the HTTP handlers and the workspace/process plumbing.

pub mod artifact;
pub mod job;

// Re-export for convenience
pub use artifact as artifact_service;
pub use job as job_service;
