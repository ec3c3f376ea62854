//! Event bus for controller progress notifications.
//!
//! Provides an `EventBus` that distributes `ControllerEvent` messages to all
//! subscribers via a `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::EventBus;
