//! Data Transfer Objects for the HTTP API
//!
//! Wire representations exchanged between the server and its clients.
//! Field names follow the camelCase convention of the public API.

pub mod health;
pub mod obfuscate;
