//! services/api/src/lib.rs
//!
//! Library entry point for the `api` service, exposing the modules the
//! binaries and integration tests build on.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
