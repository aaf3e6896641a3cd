//! Core domain types
//!
//! These types describe an obfuscation job and the files the external
//! toolchain is contracted to produce. They are shared between the server
//! (which drives jobs) and the client (which builds download links).

pub mod artifact;
pub mod job;
