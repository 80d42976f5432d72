//! A deterministic, single-threaded event loop.
//!
//! Two queues with strict priority:
//! - the reaction queue ([`MicrotaskQueue`]), drained to exhaustion at every checkpoint, and
//! - the timer queue ([`TimerQueue`]), one task per turn, each followed by a checkpoint.
//!
//! Time is virtual. It only moves through [`EventLoop::run_next_task`],
//! [`EventLoop::run_until_idle`] and [`EventLoop::advance_by`].

use crate::combinators;
use crate::FutureId;
use crate::HostHooks;
use crate::InterruptHandle;
use crate::InterruptToken;
use crate::Job;
use crate::JobKind;
use crate::MicrotaskQueue;
use crate::PendingTimer;
use crate::RejectionHandleAction;
use crate::RejectionOperation;
use crate::RejectionTracker;
use crate::Resolver;
use crate::SchedulerError;
use crate::SettleOnceFuture;
use crate::Termination;
use crate::TerminationReason;
use crate::TimerId;
use crate::TimerQueue;
use serde::Deserialize;
use serde::Serialize;
use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;
use tracing::debug_span;
use tracing::trace;

/// Construction-time event loop options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopOptions {
  /// Maximum number of jobs a single run call may execute. `None` is unlimited.
  pub max_steps: Option<u64>,
  /// Record futures that reject while unobserved; see [`EventLoop::take_unhandled_rejections`].
  pub track_rejections: bool,
}

struct LoopShared {
  options: EventLoopOptions,
  microtasks: RefCell<MicrotaskQueue>,
  timers: RefCell<TimerQueue>,
  rejections: RefCell<RejectionTracker>,
  /// Reported rejections that were handled afterwards, oldest first.
  handled_rejections: RefCell<Vec<FutureId>>,
  running: Cell<bool>,
  interrupt: InterruptToken,
  interrupt_handle: InterruptHandle,
}

impl HostHooks for LoopShared {
  fn host_enqueue_reaction_job(&self, job: Job) {
    trace!(kind = ?job.kind(), "enqueue reaction job");
    self.microtasks.borrow_mut().enqueue(job);
  }

  fn host_enqueue_timer_job(&self, delay: u64, job: Job) -> TimerId {
    let timer = self.timers.borrow_mut().schedule(delay, job);
    debug!(timer = timer.id.to_raw(), due_at = timer.due_at, "timer scheduled");
    timer.id
  }

  fn host_rejection_tracker(&self, future: FutureId, operation: RejectionOperation) {
    if !self.options.track_rejections {
      return;
    }
    let mut tracker = self.rejections.borrow_mut();
    match operation {
      RejectionOperation::Reject => tracker.on_reject(future),
      RejectionOperation::Handle => {
        if let RejectionHandleAction::RejectionHandled { future } = tracker.on_handle(future) {
          self.handled_rejections.borrow_mut().push(future);
        }
      }
      RejectionOperation::Collect => tracker.on_collect(future),
    }
  }
}

impl LoopShared {
  fn begin_run(&self) -> Option<Run<'_>> {
    if self.running.replace(true) {
      trace!("run requested from inside a job; ignoring");
      return None;
    }
    Some(Run {
      shared: self,
      steps: 0,
    })
  }
}

/// One top-level run call. Holds the reentrancy flag and the fuel count.
struct Run<'a> {
  shared: &'a LoopShared,
  steps: u64,
}

impl Drop for Run<'_> {
  fn drop(&mut self) {
    self.shared.running.set(false);
  }
}

impl Run<'_> {
  fn terminate(&self, reason: TerminationReason) -> SchedulerError {
    debug!(%reason, steps = self.steps, "run terminated");
    SchedulerError::Termination(Termination::new(reason, self.steps))
  }

  /// Accounts for one job about to run.
  fn tick(&mut self) -> Result<(), SchedulerError> {
    self.check_interrupt()?;
    if let Some(max_steps) = self.shared.options.max_steps {
      if self.steps >= max_steps {
        return Err(self.terminate(TerminationReason::OutOfFuel));
      }
    }
    self.steps += 1;
    Ok(())
  }

  /// Consumes a waiting interrupt and ends the run with it.
  fn check_interrupt(&self) -> Result<(), SchedulerError> {
    if self.shared.interrupt.take() {
      return Err(self.terminate(TerminationReason::Interrupted));
    }
    Ok(())
  }

  fn drain_microtasks(&mut self) -> Result<(), SchedulerError> {
    if self.shared.microtasks.borrow().is_empty() {
      return Ok(());
    }
    let _span = debug_span!("microtask_checkpoint").entered();
    while !self.shared.microtasks.borrow().is_empty() {
      self.tick()?;
      let job = self.shared.microtasks.borrow_mut().pop_front();
      if let Some(job) = job {
        trace!(kind = ?job.kind(), "running job");
        job.run();
        self.check_interrupt()?;
      }
    }
    Ok(())
  }

  /// Runs the earliest timer (if due by `limit`) followed by a checkpoint.
  fn run_one_timer(&mut self, limit: Option<u64>) -> Result<bool, SchedulerError> {
    match (self.shared.timers.borrow().next_due(), limit) {
      (None, _) => return Ok(false),
      (Some(due), Some(limit)) if due > limit => return Ok(false),
      _ => {}
    }
    self.tick()?;
    let popped = match limit {
      Some(limit) => self.shared.timers.borrow_mut().pop_due(limit),
      None => self.shared.timers.borrow_mut().pop_next(),
    };
    let Some((timer, job)) = popped else {
      return Ok(false);
    };
    {
      let _span =
        debug_span!("timer_task", timer = timer.id.to_raw(), due_at = timer.due_at).entered();
      job.run();
    }
    self.check_interrupt()?;
    self.drain_microtasks()?;
    Ok(true)
  }
}

/// A cooperative scheduler and the bundled [`HostHooks`] implementation.
///
/// `EventLoop` is a cheap handle; clones share the same queues and may be captured by handlers to
/// schedule more work. Run methods called from inside a running job are no-ops.
#[derive(Clone)]
pub struct EventLoop {
  shared: Rc<LoopShared>,
}

impl Default for EventLoop {
  fn default() -> Self {
    Self::new(EventLoopOptions::default())
  }
}

impl EventLoop {
  pub fn new(options: EventLoopOptions) -> Self {
    let (interrupt, interrupt_handle) = InterruptToken::new();
    Self {
      shared: Rc::new(LoopShared {
        options,
        microtasks: RefCell::new(MicrotaskQueue::new()),
        timers: RefCell::new(TimerQueue::new()),
        rejections: RefCell::new(RejectionTracker::new()),
        handled_rejections: RefCell::new(Vec::new()),
        running: Cell::new(false),
        interrupt,
        interrupt_handle,
      }),
    }
  }

  pub fn options(&self) -> &EventLoopOptions {
    &self.shared.options
  }

  /// This loop as a host for futures.
  pub fn host(&self) -> Rc<dyn HostHooks> {
    self.shared.clone()
  }

  pub fn interrupt_handle(&self) -> InterruptHandle {
    self.shared.interrupt_handle.clone()
  }

  /// Current virtual time.
  pub fn now(&self) -> u64 {
    self.shared.timers.borrow().now()
  }

  /// Number of queued reaction jobs.
  pub fn pending_jobs(&self) -> usize {
    self.shared.microtasks.borrow().len()
  }

  pub fn pending_timers(&self) -> Vec<PendingTimer> {
    self.shared.timers.borrow().pending()
  }

  /// Whether both queues are empty.
  pub fn is_idle(&self) -> bool {
    self.shared.microtasks.borrow().is_empty() && self.shared.timers.borrow().is_empty()
  }

  /// Schedules `callback` to run `delay` ticks from now.
  pub fn set_timeout(&self, delay: u64, callback: impl FnOnce() + 'static) -> TimerId {
    self
      .shared
      .host_enqueue_timer_job(delay, Job::new(JobKind::Timer, callback))
  }

  /// Drains the reaction queue, including reactions enqueued while draining.
  ///
  /// Returns the number of jobs run; `Ok(0)` when called from inside a job.
  pub fn perform_microtask_checkpoint(&self) -> Result<u64, SchedulerError> {
    let Some(mut run) = self.shared.begin_run() else {
      return Ok(0);
    };
    run.drain_microtasks()?;
    Ok(run.steps)
  }

  /// Runs pending reactions, then the earliest timer (moving the clock to it) and the reactions
  /// it produced. Returns whether a timer ran.
  pub fn run_next_task(&self) -> Result<bool, SchedulerError> {
    let Some(mut run) = self.shared.begin_run() else {
      return Ok(false);
    };
    run.drain_microtasks()?;
    run.run_one_timer(None)
  }

  /// Runs until both queues are empty. Returns the number of jobs run.
  pub fn run_until_idle(&self) -> Result<u64, SchedulerError> {
    let Some(mut run) = self.shared.begin_run() else {
      return Ok(0);
    };
    run.drain_microtasks()?;
    while run.run_one_timer(None)? {}
    Ok(run.steps)
  }

  /// Moves the clock forward by `delta`, running only the timers due by then.
  pub fn advance_by(&self, delta: u64) -> Result<u64, SchedulerError> {
    let Some(mut run) = self.shared.begin_run() else {
      return Ok(0);
    };
    let target = self.now().saturating_add(delta);
    run.drain_microtasks()?;
    while run.run_one_timer(Some(target))? {}
    self.shared.timers.borrow_mut().advance_to(target);
    Ok(run.steps)
  }

  /// Drops every queued job and timer without running them.
  ///
  /// Futures waiting on discarded work stay pending. Returns how many entries were discarded.
  pub fn teardown(&self) -> usize {
    let microtasks = self.shared.microtasks.borrow_mut().clear();
    let timers = self.shared.timers.borrow_mut().clear();
    debug!(microtasks, timers, "event loop torn down");
    microtasks + timers
  }

  /// Drains futures that rejected with nothing attached and were not handled since.
  ///
  /// Always empty unless [`EventLoopOptions::track_rejections`] is set.
  pub fn take_unhandled_rejections(&self) -> Vec<FutureId> {
    self.shared.rejections.borrow_mut().drain_about_to_be_notified()
  }

  /// Drains futures that an earlier [`take_unhandled_rejections`](Self::take_unhandled_rejections)
  /// returned and that were handled afterwards.
  pub fn take_handled_rejections(&self) -> Vec<FutureId> {
    std::mem::take(&mut *self.shared.handled_rejections.borrow_mut())
  }

  /// Number of reported rejections whose future is still alive and unhandled.
  pub fn outstanding_rejections(&self) -> usize {
    self.shared.rejections.borrow().outstanding_len()
  }

  pub fn create<T, E, W>(&self, work: W) -> SettleOnceFuture<T, E>
  where
    T: Clone + 'static,
    E: Clone + 'static,
    W: FnOnce(Resolver<T, E>) -> Result<(), E>,
  {
    SettleOnceFuture::create(&self.host(), work)
  }

  pub fn pending<T, E>(&self) -> (SettleOnceFuture<T, E>, Resolver<T, E>)
  where
    T: Clone + 'static,
    E: Clone + 'static,
  {
    SettleOnceFuture::pending(&self.host())
  }

  pub fn resolved<T, E>(&self, value: T) -> SettleOnceFuture<T, E>
  where
    T: Clone + 'static,
    E: Clone + 'static,
  {
    SettleOnceFuture::resolved(&self.host(), value)
  }

  pub fn rejected<T, E>(&self, error: E) -> SettleOnceFuture<T, E>
  where
    T: Clone + 'static,
    E: Clone + 'static,
  {
    SettleOnceFuture::rejected(&self.host(), error)
  }

  /// A future fulfilled with `value` by a timer `delay` ticks from now.
  pub fn delay<T, E>(&self, delay: u64, value: T) -> SettleOnceFuture<T, E>
  where
    T: Clone + 'static,
    E: Clone + 'static,
  {
    let (future, resolver) = self.pending();
    self.set_timeout(delay, move || {
      resolver.fulfill(value);
    });
    future
  }

  /// Races `future` against a timer that rejects with `error` after `delay` ticks.
  ///
  /// Whichever settles first decides the result; the other's settlement is ignored.
  pub fn with_timeout<T, E>(
    &self,
    future: &SettleOnceFuture<T, E>,
    delay: u64,
    error: E,
  ) -> SettleOnceFuture<T, E>
  where
    T: Clone + 'static,
    E: Clone + 'static,
  {
    let (timeout, resolver) = self.pending();
    self.set_timeout(delay, move || {
      resolver.reject(error);
    });
    combinators::race(&self.host(), [future.clone(), timeout])
  }

  pub fn race<T, E, I>(&self, futures: I) -> SettleOnceFuture<T, E>
  where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator<Item = SettleOnceFuture<T, E>>,
  {
    combinators::race(&self.host(), futures)
  }

  pub fn all<T, E, I>(&self, futures: I) -> SettleOnceFuture<Vec<T>, E>
  where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator<Item = SettleOnceFuture<T, E>>,
  {
    combinators::all(&self.host(), futures)
  }
}
