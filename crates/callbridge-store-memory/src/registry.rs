//! [`CallRegistry`]: the in-memory implementation of [`CallStore`].

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use callbridge_core::{
  Error, Result,
  call::{CallRecord, CallState},
  store::{CallStore, Insertion},
};

// ─── Registry ────────────────────────────────────────────────────────────────

/// Process-wide table of tracked calls, keyed by `call_id`.
///
/// Cloning is cheap: clones share the same table. Each operation takes the
/// lock once and never awaits while holding it.
#[derive(Clone, Default)]
pub struct CallRegistry {
  calls: Arc<RwLock<HashMap<String, CallRecord>>>,
}

impl CallRegistry {
  pub fn new() -> Self { Self::default() }

  /// Number of tracked calls, in any state.
  pub async fn len(&self) -> usize { self.calls.read().await.len() }

  pub async fn is_empty(&self) -> bool { self.calls.read().await.is_empty() }
}

impl CallStore for CallRegistry {
  type Error = Error;

  async fn insert(&self, record: CallRecord) -> Result<Insertion> {
    let mut calls = self.calls.write().await;
    if let Some(existing) = calls.get(&record.call_id) {
      return Ok(Insertion::Existing(existing.clone()));
    }
    tracing::debug!(call_id = %record.call_id, "registering call");
    calls.insert(record.call_id.clone(), record.clone());
    Ok(Insertion::Inserted(record))
  }

  async fn get(&self, call_id: &str) -> Result<Option<CallRecord>> {
    Ok(self.calls.read().await.get(call_id).cloned())
  }

  async fn set_state(
    &self,
    call_id: &str,
    state: CallState,
  ) -> Result<Option<CallRecord>> {
    let mut calls = self.calls.write().await;
    Ok(calls.get_mut(call_id).map(|record| {
      record.state = state;
      record.clone()
    }))
  }

  async fn transition(
    &self,
    call_id: &str,
    state: CallState,
  ) -> Result<Option<CallRecord>> {
    let mut calls = self.calls.write().await;
    let Some(record) = calls.get_mut(call_id) else {
      return Ok(None);
    };
    if !record.state.can_transition_to(state) {
      return Err(Error::InvalidTransition {
        call_id: call_id.to_string(),
        from:    record.state,
        to:      state,
      });
    }
    record.state = state;
    Ok(Some(record.clone()))
  }

  async fn find_by_metadata(
    &self,
    key: &str,
    value: &str,
  ) -> Result<Option<CallRecord>> {
    let calls = self.calls.read().await;
    Ok(
      calls
        .values()
        .filter(|r| r.metadata.get(key).is_some_and(|v| v == value))
        .min_by_key(|r| r.created_at)
        .cloned(),
    )
  }

  async fn list(&self) -> Result<Vec<CallRecord>> {
    let mut records: Vec<CallRecord> =
      self.calls.read().await.values().cloned().collect();
    records.sort_by(|a, b| {
      a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.call_id.cmp(&b.call_id))
    });
    Ok(records)
  }
}
