//! toolgate — a gateway between heterogeneous agent protocols and a fleet
//! of sandboxed tools.
//!
//! Raw bytes come in speaking one of six wire formats, get normalized to
//! one internal request shape, routed to the best-matching tool by
//! embedding similarity, and executed inside a pooled sandbox. Every
//! consequential decision lands on the audit stream as a compact,
//! low-read-time record.

pub mod audit;
pub mod config;
pub mod embedding;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod router;
pub mod sandbox;
pub mod secrets;
pub mod types;

pub use config::Config;
pub use error::Error;
pub use gateway::{Gateway, GatewayDeps, GatewayResponse};
