//! Shared domain types for Conductor.
//!
//! This crate contains the declarative model the controller reconciles
//! (Application, ApplicationRevision, component manifests), the unstructured
//! platform `Object`, workflow step/status types, conditions, configuration,
//! events, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod application;
pub mod condition;
pub mod config;
pub mod error;
pub mod event;
pub mod labels;
pub mod object;
pub mod revision;
pub mod workflow;
