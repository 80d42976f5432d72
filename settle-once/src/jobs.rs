//! Jobs and the host integration seam.
//!
//! Futures never run their reactions themselves. Every reaction, adoption and timer callback is
//! packaged as a [`Job`] and handed to a [`HostHooks`] implementation, which decides when it
//! runs. [`EventLoop`](crate::EventLoop) is the bundled host; tests and embeddings may supply
//! their own.
//!
//! ## FIFO requirement
//!
//! Hosts MUST run reaction jobs in the order [`HostHooks::host_enqueue_reaction_job`] was called.
//! Reaction ordering between observers of the same future relies on it.

use std::fmt;

/// Identifies a future across its lifetime, for rejection tracking and logs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FutureId(u64);

impl FutureId {
  #[inline]
  pub const fn from_raw(raw: u64) -> Self {
    Self(raw)
  }

  #[inline]
  pub const fn to_raw(self) -> u64 {
    self.0
  }
}

impl fmt::Debug for FutureId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("FutureId").field(&self.0).finish()
  }
}

impl fmt::Display for FutureId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "future#{}", self.0)
  }
}

/// Identifies a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TimerId(u64);

impl TimerId {
  #[inline]
  pub const fn from_raw(raw: u64) -> Self {
    Self(raw)
  }

  #[inline]
  pub const fn to_raw(self) -> u64 {
    self.0
  }
}

/// A coarse classification of deferred work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
  /// Delivers a settled outcome to one registered reaction.
  Reaction,
  /// Subscribes a resolved-with-a-future future to the future it adopts.
  Adoption,
  /// A timer callback.
  Timer,
}

/// A parameterless unit of deferred work.
///
/// Jobs hold `Rc` state and are therefore bound to the thread that created them.
pub struct Job {
  kind: JobKind,
  run: Box<dyn FnOnce() + 'static>,
}

impl Job {
  /// Create a new job of `kind` backed by `run`.
  pub fn new(kind: JobKind, run: impl FnOnce() + 'static) -> Self {
    Self {
      kind,
      run: Box::new(run),
    }
  }

  #[inline]
  pub fn kind(&self) -> JobKind {
    self.kind
  }

  /// Run the job, consuming it.
  #[inline]
  pub fn run(self) {
    let Job { run, .. } = self;
    run()
  }
}

impl fmt::Debug for Job {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Job").field("kind", &self.kind).finish()
  }
}

/// The operation reported to [`HostHooks::host_rejection_tracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionOperation {
  /// A future rejected while nothing observed it.
  Reject,
  /// A reaction was attached to a future previously reported with `Reject`.
  Handle,
  /// A future reported with `Reject` was dropped while still unhandled. It can never be handled
  /// after this.
  Collect,
}

/// The scheduler capabilities a future needs.
///
/// Methods take `&self`: futures share their host through an `Rc` and enqueue work from inside
/// running jobs, so implementations use interior mutability.
pub trait HostHooks {
  /// Enqueue a reaction job on the high-priority FIFO queue.
  fn host_enqueue_reaction_job(&self, job: Job);

  /// Enqueue a job on the low-priority queue, to run once `delay` ticks have elapsed.
  fn host_enqueue_timer_job(&self, delay: u64, job: Job) -> TimerId;

  /// Rejection tracking hook.
  ///
  /// `Collect` is sent from the future record's destructor.
  ///
  /// The default implementation does nothing; an unobserved rejection is the producer's
  /// responsibility.
  fn host_rejection_tracker(&self, _future: FutureId, _operation: RejectionOperation) {}
}
