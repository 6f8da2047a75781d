//! `safegate-middleware` – Telemetry plumbing
//!
//! Carries gateway state out to observers (dashboards, loggers) without
//! giving them any path back into the safety hooks.
//!
//! # Modules
//!
//! - [`bus`] – Topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, MAX_CAPACITY, Topic, TopicReceiver};
