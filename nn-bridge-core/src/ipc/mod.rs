//! Message types exchanged with the host adapter.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward control messages and outlet replies as JSON.

pub mod events;
