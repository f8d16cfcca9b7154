//! In-memory booking and room-inventory core for a small hotel front
//! desk, persisted through a group-commit write-ahead log.
//!
//! [`engine::Engine`] owns all state. Outer surfaces drive it with the
//! command and query methods and wrap results in an [`api::Envelope`].

pub mod api;
pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod observability;
pub mod wal;
