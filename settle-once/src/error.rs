use std::fmt::Display;

/// Errors produced by the event loop while running jobs.
///
/// Future outcomes never surface here: a failing handler rejects its derived future instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
  /// The run stopped before both queues were drained.
  #[error("{0}")]
  Termination(Termination),
}

/// A run of the event loop that was cut short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
  pub reason: TerminationReason,
  /// Jobs executed by the aborted run before it stopped.
  pub steps: u64,
}

impl Termination {
  pub fn new(reason: TerminationReason, steps: u64) -> Self {
    Self { reason, steps }
  }
}

impl Display for Termination {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{reason} after {steps} steps", reason = self.reason, steps = self.steps)
  }
}

/// The reason a run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
  OutOfFuel,
  Interrupted,
}

impl Display for TerminationReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TerminationReason::OutOfFuel => f.write_str("run terminated: out of fuel"),
      TerminationReason::Interrupted => f.write_str("run terminated: interrupted"),
    }
  }
}
