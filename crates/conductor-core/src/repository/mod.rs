//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (conductor-infra) implements. The core crate never depends on any
//! specific storage technology.
//!
//! All traits use native async fn in traits (Rust 2024 edition, no
//! async_trait macro), with blanket impls for `Arc<T>` so one adapter can be
//! shared by the assembler, the dispatcher, and the reconciler.

pub mod application;
pub mod object;
pub mod revision;

pub use application::ApplicationRepository;
pub use object::{ObjectReader, ObjectStore};
pub use revision::RevisionRepository;
