//! The settle-once future record.
//!
//! A [`SettleOnceFuture`] starts `Pending` and moves to `Fulfilled` or `Rejected` exactly once.
//! Observers register reactions with [`SettleOnceFuture::on_settled`] and friends; every
//! registration returns a new derived future carrying the outcome of whichever handler ran.
//!
//! Reactions never run inside the call that settles or observes a future. Settlement takes the
//! reaction list out of the record under one borrow, releases it, then hands each reaction to the
//! host as a [`Job`]. Observing an already-settled future enqueues the reaction the same way.
//!
//! Futures hold a weak reference to their host. Once the host is dropped, settling still updates
//! the state but reactions are discarded.

use crate::FutureId;
use crate::HostHooks;
use crate::Job;
use crate::JobKind;
use crate::RejectionOperation;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::rc::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

static NEXT_FUTURE_ID: AtomicU64 = AtomicU64::new(1);

/// A success handler for [`SettleOnceFuture::on_settled`].
pub type OnSuccess<T, E> = Box<dyn FnOnce(T) -> Result<T, E>>;
/// A failure handler for [`SettleOnceFuture::on_settled`].
pub type OnFailure<T, E> = Box<dyn FnOnce(E) -> Result<T, E>>;

type Reaction<T, E> = Box<dyn FnOnce(Result<T, E>)>;

/// The observable state of a future.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FutureState<T, E> {
  Pending,
  Fulfilled(T),
  Rejected(E),
}

impl<T, E> FutureState<T, E> {
  pub fn is_pending(&self) -> bool {
    matches!(self, Self::Pending)
  }

  pub fn is_settled(&self) -> bool {
    !self.is_pending()
  }

  pub fn is_fulfilled(&self) -> bool {
    matches!(self, Self::Fulfilled(_))
  }

  pub fn is_rejected(&self) -> bool {
    matches!(self, Self::Rejected(_))
  }

  /// The settled outcome, or `None` while pending.
  pub fn into_result(self) -> Option<Result<T, E>> {
    match self {
      Self::Pending => None,
      Self::Fulfilled(value) => Some(Ok(value)),
      Self::Rejected(error) => Some(Err(error)),
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Fulfilled(_) => "fulfilled",
      Self::Rejected(_) => "rejected",
    }
  }
}

struct FutureInner<T, E> {
  id: FutureId,
  state: FutureState<T, E>,
  /// Set by the first `fulfill`/`reject`/`resolve_with`. Adoption sets it while the state is still
  /// pending.
  already_resolved: bool,
  /// Whether any reaction was ever attached.
  is_handled: bool,
  /// Reported to the host with `Reject` and not handled since.
  reported_unhandled: bool,
  reactions: Vec<Reaction<T, E>>,
  host: Weak<dyn HostHooks>,
}

impl<T, E> Drop for FutureInner<T, E> {
  fn drop(&mut self) {
    if self.reported_unhandled {
      track_rejection(&self.host, self.id, RejectionOperation::Collect);
    }
  }
}

/// A value that becomes available later and settles at most once.
pub struct SettleOnceFuture<T, E> {
  inner: Rc<RefCell<FutureInner<T, E>>>,
  host: Weak<dyn HostHooks>,
}

impl<T, E> Clone for SettleOnceFuture<T, E> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
      host: self.host.clone(),
    }
  }
}

impl<T, E> fmt::Debug for SettleOnceFuture<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.borrow();
    f.debug_struct("SettleOnceFuture")
      .field("id", &inner.id)
      .field("state", &inner.state.label())
      .field("reactions", &inner.reactions.len())
      .finish()
  }
}

/// The completion side of a future. Every clone settles the same future.
pub struct Resolver<T, E> {
  inner: Rc<RefCell<FutureInner<T, E>>>,
  host: Weak<dyn HostHooks>,
}

impl<T, E> Clone for Resolver<T, E> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
      host: self.host.clone(),
    }
  }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.borrow();
    f.debug_struct("Resolver")
      .field("id", &inner.id)
      .field("already_resolved", &inner.already_resolved)
      .finish()
  }
}

fn enqueue_reaction(host: &Weak<dyn HostHooks>, job: Job) {
  match host.upgrade() {
    Some(host) => host.host_enqueue_reaction_job(job),
    None => tracing::trace!(kind = ?job.kind(), "host dropped; discarding job"),
  }
}

fn track_rejection(host: &Weak<dyn HostHooks>, id: FutureId, operation: RejectionOperation) {
  if let Some(host) = host.upgrade() {
    host.host_rejection_tracker(id, operation);
  }
}

impl<T: Clone + 'static, E: Clone + 'static> Resolver<T, E> {
  /// Fulfills the future with `value`.
  ///
  /// Returns `false`, without any other effect, if the future was already resolved.
  pub fn fulfill(&self, value: T) -> bool {
    self.settle(Ok(value))
  }

  /// Rejects the future with `error`.
  ///
  /// Returns `false`, without any other effect, if the future was already resolved.
  pub fn reject(&self, error: E) -> bool {
    self.settle(Err(error))
  }

  /// Fulfills on `Ok`, rejects on `Err`.
  pub fn settle(&self, outcome: Result<T, E>) -> bool {
    {
      let mut inner = self.inner.borrow_mut();
      if inner.already_resolved {
        tracing::trace!(future = %inner.id, "settle ignored: already resolved");
        return false;
      }
      inner.already_resolved = true;
    }
    self.settle_unchecked(outcome)
  }

  /// Resolves the future with another future: once `other` settles, this future settles the same
  /// way.
  ///
  /// The resolver is locked immediately, so later `fulfill`/`reject` calls are ignored even while
  /// `other` is still pending. Subscription to `other` happens in an adoption job. A future
  /// resolved with itself is locked and stays pending forever; no job is enqueued for it.
  pub fn resolve_with(&self, other: SettleOnceFuture<T, E>) -> bool {
    let id = {
      let mut inner = self.inner.borrow_mut();
      if inner.already_resolved {
        tracing::trace!(future = %inner.id, "resolve_with ignored: already resolved");
        return false;
      }
      inner.already_resolved = true;
      if Rc::ptr_eq(&self.inner, &other.inner) {
        tracing::trace!(future = %inner.id, "resolved with itself; stays pending");
        return true;
      }
      inner.id
    };
    tracing::trace!(future = %id, adopts = %other.id(), "adopting");

    let target = self.clone();
    enqueue_reaction(
      &self.host,
      Job::new(JobKind::Adoption, move || {
        other.subscribe(Box::new(move |outcome| {
          target.settle_unchecked(outcome);
        }));
      }),
    );
    true
  }

  /// Whether the future already accepted a resolution.
  pub fn is_resolved(&self) -> bool {
    self.inner.borrow().already_resolved
  }

  /// Moves a pending future to its final state and dispatches its reactions.
  fn settle_unchecked(&self, outcome: Result<T, E>) -> bool {
    let (id, reactions, report_unhandled) = {
      let mut inner = self.inner.borrow_mut();
      if inner.state.is_settled() {
        return false;
      }
      inner.state = match &outcome {
        Ok(value) => FutureState::Fulfilled(value.clone()),
        Err(error) => FutureState::Rejected(error.clone()),
      };
      let report_unhandled = outcome.is_err() && !inner.is_handled;
      inner.reported_unhandled = report_unhandled;
      (inner.id, mem::take(&mut inner.reactions), report_unhandled)
    };

    tracing::trace!(
      future = %id,
      fulfilled = outcome.is_ok(),
      reactions = reactions.len(),
      "settled"
    );

    if report_unhandled {
      track_rejection(&self.host, id, RejectionOperation::Reject);
    }

    for reaction in reactions {
      let outcome = outcome.clone();
      enqueue_reaction(
        &self.host,
        Job::new(JobKind::Reaction, move || reaction(outcome)),
      );
    }
    true
  }
}

impl<T: Clone + 'static, E: Clone + 'static> SettleOnceFuture<T, E> {
  fn pending_in(host: Weak<dyn HostHooks>) -> (Self, Resolver<T, E>) {
    let id = FutureId::from_raw(NEXT_FUTURE_ID.fetch_add(1, Ordering::Relaxed));
    let inner = Rc::new(RefCell::new(FutureInner {
      id,
      state: FutureState::Pending,
      already_resolved: false,
      is_handled: false,
      reported_unhandled: false,
      reactions: Vec::new(),
      host: host.clone(),
    }));
    let future = Self {
      inner: inner.clone(),
      host: host.clone(),
    };
    (future, Resolver { inner, host })
  }

  /// Creates a pending future and its resolver without running any work.
  pub fn pending(host: &Rc<dyn HostHooks>) -> (Self, Resolver<T, E>) {
    Self::pending_in(Rc::downgrade(host))
  }

  /// Creates a future and runs `work` immediately with its resolver.
  ///
  /// An `Err` returned by `work` rejects the future, unless `work` already resolved it.
  pub fn create<W>(host: &Rc<dyn HostHooks>, work: W) -> Self
  where
    W: FnOnce(Resolver<T, E>) -> Result<(), E>,
  {
    let (future, resolver) = Self::pending(host);
    tracing::trace!(future = %future.id(), "running producer");
    if let Err(error) = work(resolver.clone()) {
      if resolver.reject(error) {
        tracing::trace!(future = %future.id(), "producer failed; rejected");
      }
    }
    future
  }

  /// An already-fulfilled future.
  pub fn resolved(host: &Rc<dyn HostHooks>, value: T) -> Self {
    let (future, resolver) = Self::pending(host);
    resolver.fulfill(value);
    future
  }

  /// An already-rejected future.
  pub fn rejected(host: &Rc<dyn HostHooks>, error: E) -> Self {
    let (future, resolver) = Self::pending(host);
    resolver.reject(error);
    future
  }

  pub fn id(&self) -> FutureId {
    self.inner.borrow().id
  }

  /// Snapshot of the current state.
  pub fn state(&self) -> FutureState<T, E> {
    self.inner.borrow().state.clone()
  }

  pub fn is_pending(&self) -> bool {
    self.inner.borrow().state.is_pending()
  }

  /// A new pending future on the same host.
  fn derive<U: Clone + 'static>(&self) -> (SettleOnceFuture<U, E>, Resolver<U, E>) {
    SettleOnceFuture::pending_in(self.host.clone())
  }

  /// Registers `reaction` to receive the outcome, always from a job.
  pub(crate) fn subscribe(&self, reaction: Reaction<T, E>) {
    let mut inner = self.inner.borrow_mut();
    let newly_handled = !inner.is_handled;
    inner.is_handled = true;

    let settled = match &inner.state {
      FutureState::Pending => None,
      FutureState::Fulfilled(value) => Some(Ok(value.clone())),
      FutureState::Rejected(error) => Some(Err(error.clone())),
    };
    let Some(outcome) = settled else {
      inner.reactions.push(reaction);
      return;
    };
    let id = inner.id;
    inner.reported_unhandled = false;
    drop(inner);

    if newly_handled && outcome.is_err() {
      track_rejection(&self.host, id, RejectionOperation::Handle);
    }
    enqueue_reaction(
      &self.host,
      Job::new(JobKind::Reaction, move || reaction(outcome)),
    );
  }

  /// Registers a pair of optional handlers and returns the derived future.
  ///
  /// The handler matching the outcome runs from a job. Its `Ok` fulfills the derived future and
  /// its `Err` rejects it. A missing handler passes the value or error through unchanged.
  pub fn on_settled(
    &self,
    on_success: Option<OnSuccess<T, E>>,
    on_failure: Option<OnFailure<T, E>>,
  ) -> Self {
    let (derived, resolver) = self.derive();
    self.subscribe(Box::new(move |outcome| {
      let next = match (outcome, on_success, on_failure) {
        (Ok(value), Some(on_success), _) => on_success(value),
        (Err(error), _, Some(on_failure)) => on_failure(error),
        (outcome, _, _) => outcome,
      };
      resolver.settle(next);
    }));
    derived
  }

  /// Maps a fulfillment through `on_success`, which may change the value type. Rejections pass
  /// through.
  pub fn then<U, S>(&self, on_success: S) -> SettleOnceFuture<U, E>
  where
    U: Clone + 'static,
    S: FnOnce(T) -> Result<U, E> + 'static,
  {
    let (derived, resolver) = self.derive();
    self.subscribe(Box::new(move |outcome| {
      resolver.settle(outcome.and_then(on_success));
    }));
    derived
  }

  /// Handles both outcomes into a new value type.
  pub fn then_or_else<U, S, F>(&self, on_success: S, on_failure: F) -> SettleOnceFuture<U, E>
  where
    U: Clone + 'static,
    S: FnOnce(T) -> Result<U, E> + 'static,
    F: FnOnce(E) -> Result<U, E> + 'static,
  {
    let (derived, resolver) = self.derive();
    self.subscribe(Box::new(move |outcome| {
      resolver.settle(match outcome {
        Ok(value) => on_success(value),
        Err(error) => on_failure(error),
      });
    }));
    derived
  }

  /// Recovers from a rejection. Fulfillments pass through.
  pub fn catch<F>(&self, on_failure: F) -> Self
  where
    F: FnOnce(E) -> Result<T, E> + 'static,
  {
    self.on_settled(None, Some(Box::new(on_failure)))
  }

  /// Runs `handler` on either outcome without observing it.
  ///
  /// The derived future carries the original outcome, unless `handler` fails, in which case it
  /// rejects with the handler's error.
  pub fn on_finally<H>(&self, handler: H) -> Self
  where
    H: FnOnce() -> Result<(), E> + 'static,
  {
    let (derived, resolver) = self.derive();
    self.subscribe(Box::new(move |outcome| {
      resolver.settle(handler().and(outcome));
    }));
    derived
  }

  /// Chains a fulfillment into another future; the derived future adopts its outcome.
  pub fn then_future<U, S>(&self, on_success: S) -> SettleOnceFuture<U, E>
  where
    U: Clone + 'static,
    S: FnOnce(T) -> SettleOnceFuture<U, E> + 'static,
  {
    let (derived, resolver) = self.derive();
    self.subscribe(Box::new(move |outcome| match outcome {
      Ok(value) => {
        resolver.resolve_with(on_success(value));
      }
      Err(error) => {
        resolver.reject(error);
      }
    }));
    derived
  }
}
