// crates/decipipe-capture/src/observer.rs
// ============================================================================
// Module: Capture Observer
// Description: Optional hook for observability-infrastructure failures that
//              are otherwise silent by design.
// Purpose: Let integrators debug the SDK itself without weakening its
//          silent-by-default contract.
// Dependencies: none
// ============================================================================

//! ## Overview
//! The capture façade never lets its own failures reach the application.
//! That makes the SDK itself hard to debug, so [`CaptureObserver`] is an
//! optional escape hatch: its default implementation is a no-op, so
//! integrators who never set one see exactly the silent behavior the
//! contract requires.

/// Observes the capture SDK's own infrastructure failures.
///
/// All methods have no-op default implementations so implementors only
/// override what they care about.
pub trait CaptureObserver: Send + Sync {
    /// Called when the event buffer drops the oldest event to stay within
    /// `maxSize`.
    fn on_buffer_drop(&self) {}

    /// Called when a transport send ultimately fails after exhausting
    /// retries.
    fn on_transport_failure(&self, envelope_type: &'static str, batch_len: usize) {
        let _ = (envelope_type, batch_len);
    }
}

/// The default, silent observer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CaptureObserver for NoopObserver {}
