//! Outbound side of callbridge: the realtime provider's call-control REST API
//! and the per-call sideband WebSocket.
//!
//! Handlers depend on the [`CallControl`] trait; [`RealtimeClient`] is the
//! HTTP implementation used in production.

pub mod client;
pub mod control;
pub mod error;
pub mod sideband;

pub use client::{ClientConfig, RealtimeClient};
pub use control::CallControl;
pub use error::{ControlError, SidebandError};
