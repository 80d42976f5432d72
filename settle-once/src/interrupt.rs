//! Cooperative cancellation of event loop runs.
//!
//! An interrupt is a one-shot request: the run that observes it stops with
//! [`TerminationReason::Interrupted`](crate::TerminationReason::Interrupted) and clears it, so
//! the next run starts fresh. A request raised while no run is active stops the next run before
//! its first job.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// The event loop's side of an interrupt flag.
#[derive(Debug)]
pub struct InterruptToken {
  requested: Arc<AtomicBool>,
}

impl InterruptToken {
  /// A fresh token and the handle that raises it.
  pub fn new() -> (Self, InterruptHandle) {
    let requested = Arc::new(AtomicBool::new(false));
    (
      Self {
        requested: requested.clone(),
      },
      InterruptHandle { requested },
    )
  }

  /// Whether an interrupt is waiting, without consuming it.
  pub fn is_requested(&self) -> bool {
    self.requested.load(Ordering::Acquire)
  }

  /// Consumes a waiting interrupt. Returns whether one was waiting.
  pub fn take(&self) -> bool {
    self.requested.swap(false, Ordering::AcqRel)
  }
}

/// Raises an interrupt on its event loop, from a job or from another thread.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
  requested: Arc<AtomicBool>,
}

impl InterruptHandle {
  /// Stops the current run at the next job boundary, or the next run if none is active.
  pub fn interrupt(&self) {
    self.requested.store(true, Ordering::Release);
  }
}
