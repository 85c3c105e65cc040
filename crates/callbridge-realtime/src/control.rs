//! The `CallControl` trait.

use std::future::Future;

use callbridge_core::profile::BehaviorProfile;

use crate::ControlError;

/// Operations the call-control provider exposes for a SIP call.
///
/// Each method resolves once the provider has answered; an `Err` means the
/// provider rejected the request, the request timed out, or it never left
/// the process.
pub trait CallControl: Send + Sync {
  /// Accept an incoming call, starting a session with `profile`.
  fn accept<'a>(
    &'a self,
    call_id: &'a str,
    profile: &'a BehaviorProfile,
  ) -> impl Future<Output = Result<(), ControlError>> + Send + 'a;

  /// Transfer the call to `destination` with a SIP REFER.
  fn refer<'a>(
    &'a self,
    call_id: &'a str,
    destination: &'a str,
  ) -> impl Future<Output = Result<(), ControlError>> + Send + 'a;

  /// Decline the call, optionally with a specific SIP status code.
  fn reject<'a>(
    &'a self,
    call_id: &'a str,
    sip_status: Option<u16>,
  ) -> impl Future<Output = Result<(), ControlError>> + Send + 'a;

  /// End an established call.
  fn hangup<'a>(
    &'a self,
    call_id: &'a str,
  ) -> impl Future<Output = Result<(), ControlError>> + Send + 'a;
}
