//! Minimal Chrome DevTools Protocol client
//!
//! Three layers: `transport` (process + WebSocket + command correlation),
//! `connection` (browser endpoint and per-target sessions), `types`
//! (hand-written serde types for the commands in use).

pub mod connection;
pub mod transport;
pub mod types;

pub use connection::{Connection, PageSession};
pub use transport::{launch_chrome, Transport};
pub use types::{BoxModel, MouseButton, MouseEventType};
