//! Core types and trait definitions for the callbridge call tracker.
//!
//! This crate has no HTTP or network dependencies.
//! The registry backend, the outbound call-control client and the server all
//! depend on it.

pub mod call;
pub mod error;
pub mod event;
pub mod profile;
pub mod store;

pub use error::{Error, Result};
