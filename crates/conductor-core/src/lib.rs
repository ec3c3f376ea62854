//! Business logic and port definitions for Conductor.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements, plus the two reconciliation subsystems built on them:
//! the Resource Assembler (`assemble`) and the Workflow Engine (`workflow`).
//! It depends only on `conductor-types` -- never on `conductor-infra` or any
//! storage crate.

pub mod apply;
pub mod assemble;
pub mod controller;
pub mod event;
pub mod hash;
pub mod repository;
pub mod revision;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
