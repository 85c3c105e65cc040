//! The `CallStore` trait.
//!
//! Implemented by registry backends (e.g. `callbridge-store-memory`). The
//! server depends on this abstraction, not on a concrete backend, so tests can
//! run against a fresh instance each.

use std::future::Future;

use crate::call::{CallRecord, CallState};

/// Outcome of [`CallStore::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
  /// The record was new and has been stored.
  Inserted(CallRecord),
  /// A record with the same `call_id` already existed and was left as is.
  Existing(CallRecord),
}

impl Insertion {
  pub fn record(&self) -> &CallRecord {
    match self {
      Self::Inserted(r) | Self::Existing(r) => r,
    }
  }

  pub fn is_inserted(&self) -> bool { matches!(self, Self::Inserted(_)) }
}

/// Abstraction over the call registry.
///
/// Every method is a single atomic step: no implementation may leave a
/// record half-updated if the returned future is dropped.
pub trait CallStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Store `record` unless its `call_id` is already present.
  fn insert(
    &self,
    record: CallRecord,
  ) -> impl Future<Output = Result<Insertion, Self::Error>> + Send + '_;

  /// Retrieve a record by id. Returns `None` if not found.
  fn get<'a>(
    &'a self,
    call_id: &'a str,
  ) -> impl Future<Output = Result<Option<CallRecord>, Self::Error>> + Send + 'a;

  /// Overwrite the state of a record, regardless of its current state.
  ///
  /// Used after an explicit control operation succeeded upstream. Returns
  /// `None` if the record does not exist; no other field is touched.
  fn set_state<'a>(
    &'a self,
    call_id: &'a str,
    state: CallState,
  ) -> impl Future<Output = Result<Option<CallRecord>, Self::Error>> + Send + 'a;

  /// Move a record to `state` if the lifecycle allows it.
  ///
  /// Used for provider-driven updates. Returns `None` if the record does not
  /// exist and an error if the transition is not allowed.
  fn transition<'a>(
    &'a self,
    call_id: &'a str,
    state: CallState,
  ) -> impl Future<Output = Result<Option<CallRecord>, Self::Error>> + Send + 'a;

  /// Find the first record whose metadata maps `key` to `value`.
  fn find_by_metadata<'a>(
    &'a self,
    key: &'a str,
    value: &'a str,
  ) -> impl Future<Output = Result<Option<CallRecord>, Self::Error>> + Send + 'a;

  /// Point-in-time snapshot of all records, oldest first.
  fn list(
    &self,
  ) -> impl Future<Output = Result<Vec<CallRecord>, Self::Error>> + Send + '_;
}
