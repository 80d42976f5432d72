//! Bookkeeping for rejections nobody observed.
//!
//! Fed by [`HostHooks::host_rejection_tracker`](crate::HostHooks::host_rejection_tracker). The
//! tracker keeps two sets:
//! - the **about-to-be-notified** list: futures that rejected with no reactions and have not been
//!   reported yet, in rejection order, and
//! - the **outstanding** set: futures already reported that are still unhandled and still alive.
//!
//! A future leaves the outstanding set when it is handled or dropped, so the set only holds
//! rejections that can still be retracted. Nothing is logged; the host decides what to do with
//! drained ids.

use crate::FutureId;
use ahash::HashSet;
use ahash::HashSetExt;
use std::mem;

/// The action requested when a reported rejection becomes handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionHandleAction {
  /// No further action is required.
  None,
  /// `future` was already reported as unhandled; the host may want to retract that report.
  RejectionHandled { future: FutureId },
}

#[derive(Debug)]
pub struct RejectionTracker {
  about_to_be_notified: Vec<FutureId>,
  outstanding: HashSet<FutureId>,
  /// Entries of `about_to_be_notified` whose future was dropped before the drain.
  collected: HashSet<FutureId>,
}

impl Default for RejectionTracker {
  fn default() -> Self {
    Self::new()
  }
}

impl RejectionTracker {
  pub fn new() -> Self {
    Self {
      about_to_be_notified: Vec::new(),
      outstanding: HashSet::new(),
      collected: HashSet::new(),
    }
  }

  /// Called for [`RejectionOperation::Reject`](crate::RejectionOperation::Reject).
  pub fn on_reject(&mut self, future: FutureId) {
    self.about_to_be_notified.push(future);
  }

  /// Called for [`RejectionOperation::Handle`](crate::RejectionOperation::Handle).
  pub fn on_handle(&mut self, future: FutureId) -> RejectionHandleAction {
    if let Some(idx) = self
      .about_to_be_notified
      .iter()
      .position(|&entry| entry == future)
    {
      self.about_to_be_notified.remove(idx);
      return RejectionHandleAction::None;
    }
    if self.outstanding.remove(&future) {
      return RejectionHandleAction::RejectionHandled { future };
    }
    RejectionHandleAction::None
  }

  /// Called for [`RejectionOperation::Collect`](crate::RejectionOperation::Collect).
  ///
  /// A dropped future that was not reported yet is still reported by the next drain, but does not
  /// become outstanding.
  pub fn on_collect(&mut self, future: FutureId) {
    if self.outstanding.remove(&future) {
      return;
    }
    if self.about_to_be_notified.contains(&future) {
      self.collected.insert(future);
    }
  }

  /// Drains the about-to-be-notified list. Drained futures that are still alive move to the
  /// outstanding set.
  pub fn drain_about_to_be_notified(&mut self) -> Vec<FutureId> {
    let drained = mem::take(&mut self.about_to_be_notified);
    for &future in &drained {
      if !self.collected.remove(&future) {
        self.outstanding.insert(future);
      }
    }
    drained
  }

  /// Whether `future` was reported and is still unhandled.
  pub fn is_outstanding(&self, future: FutureId) -> bool {
    self.outstanding.contains(&future)
  }

  /// Number of reported futures that are still unhandled.
  pub fn outstanding_len(&self) -> usize {
    self.outstanding.len()
  }

  pub fn is_empty(&self) -> bool {
    self.about_to_be_notified.is_empty()
      && self.outstanding.is_empty()
      && self.collected.is_empty()
  }
}
