//! Infrastructure layer for Conductor.
//!
//! Contains implementations of the ports defined in `conductor-core`:
//! in-memory object, application, and revision stores with resource
//! versions and optimistic concurrency, the direct-apply adapter, a static
//! component renderer, and TOML/YAML/JSON file loaders.

pub mod applier;
pub mod config;
pub mod loader;
pub mod renderer;
pub mod store;
