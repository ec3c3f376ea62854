//! In-memory stores.
//!
//! All three keep their data in `DashMap`s and clone values out on read, so
//! no map guard is ever held across an `.await`.

pub mod application;
pub mod object;
pub mod revision;

pub use application::InMemoryApplicationRepository;
pub use object::InMemoryObjectStore;
pub use revision::InMemoryRevisionRepository;
