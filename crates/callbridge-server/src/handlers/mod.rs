pub mod calls;
pub mod openai;
pub mod status;
pub mod twilio;

use callbridge_core::call::CallRecord;
use serde_json::{Value, json};

/// Body returned by every successful control operation.
pub(crate) fn success(record: &CallRecord) -> Value {
  json!({ "success": true, "call": record })
}
