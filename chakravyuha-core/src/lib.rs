//! Chakravyuha Core
//!
//! Core types shared by the Chakravyuha obfuscation service and its clients.
//!
//! This crate contains:
//! - Domain types: jobs, their lifecycle state machine and the workspace artifact layout
//! - DTOs: request and response bodies of the HTTP API

pub mod domain;
pub mod dto;
