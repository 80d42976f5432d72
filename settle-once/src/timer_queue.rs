//! The low-priority, time-deferred task queue.
//!
//! Time is virtual: the clock only moves when the event loop is told to advance it or runs the
//! next timer. Timers due at the same instant run in scheduling order.

use crate::Job;
use crate::TimerId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct ScheduledTimer {
  id: TimerId,
  due_at: u64,
  order: u64,
  job: Job,
}

impl ScheduledTimer {
  fn key(&self) -> (u64, u64) {
    (self.due_at, self.order)
  }
}

impl PartialEq for ScheduledTimer {
  fn eq(&self, other: &Self) -> bool {
    self.key() == other.key()
  }
}

impl Eq for ScheduledTimer {}

impl PartialOrd for ScheduledTimer {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for ScheduledTimer {
  // Reversed: `BinaryHeap` is a max-heap and the earliest timer must pop first.
  fn cmp(&self, other: &Self) -> Ordering {
    other.key().cmp(&self.key())
  }
}

/// A timer waiting in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
  pub id: TimerId,
  pub due_at: u64,
  pub order: u64,
}

/// A virtual-clock timer queue.
#[derive(Default)]
pub struct TimerQueue {
  heap: BinaryHeap<ScheduledTimer>,
  now: u64,
  next_order: u64,
}

impl TimerQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Current virtual time.
  #[inline]
  pub fn now(&self) -> u64 {
    self.now
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.heap.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.heap.is_empty()
  }

  /// Schedules `job` to become due `delay` ticks from now.
  pub fn schedule(&mut self, delay: u64, job: Job) -> PendingTimer {
    let order = self.next_order;
    self.next_order += 1;
    let timer = PendingTimer {
      id: TimerId::from_raw(order),
      due_at: self.now.saturating_add(delay),
      order,
    };
    self.heap.push(ScheduledTimer {
      id: timer.id,
      due_at: timer.due_at,
      order: timer.order,
      job,
    });
    timer
  }

  /// Due time of the earliest timer.
  pub fn next_due(&self) -> Option<u64> {
    self.heap.peek().map(|timer| timer.due_at)
  }

  /// Pops the earliest timer regardless of due time, moving the clock forward to it if needed.
  pub fn pop_next(&mut self) -> Option<(PendingTimer, Job)> {
    let timer = self.heap.pop()?;
    self.now = self.now.max(timer.due_at);
    Some(Self::split(timer))
  }

  fn split(timer: ScheduledTimer) -> (PendingTimer, Job) {
    (
      PendingTimer {
        id: timer.id,
        due_at: timer.due_at,
        order: timer.order,
      },
      timer.job,
    )
  }

  /// Pops the earliest timer only if it is due at or before `limit`.
  ///
  /// The clock moves to the timer's due time (never backwards).
  pub fn pop_due(&mut self, limit: u64) -> Option<(PendingTimer, Job)> {
    if self.next_due()? > limit {
      return None;
    }
    self.pop_next()
  }

  /// Moves the clock to `target` without running anything. Never moves backwards.
  pub fn advance_to(&mut self, target: u64) {
    self.now = self.now.max(target);
  }

  /// Snapshot of queued timers, earliest first.
  pub fn pending(&self) -> Vec<PendingTimer> {
    let mut timers = self
      .heap
      .iter()
      .map(|timer| PendingTimer {
        id: timer.id,
        due_at: timer.due_at,
        order: timer.order,
      })
      .collect::<Vec<_>>();
    timers.sort_by_key(|timer| (timer.due_at, timer.order));
    timers
  }

  /// Drops all queued timers without running them, returning how many were discarded.
  pub fn clear(&mut self) -> usize {
    let discarded = self.heap.len();
    self.heap.clear();
    discarded
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::JobKind;

  fn noop() -> Job {
    Job::new(JobKind::Timer, || {})
  }

  #[test]
  fn pops_by_due_time_then_insertion_order() {
    let mut queue = TimerQueue::new();
    let late = queue.schedule(10, noop());
    let first = queue.schedule(5, noop());
    let second = queue.schedule(5, noop());

    let order: Vec<TimerId> = std::iter::from_fn(|| queue.pop_next().map(|(t, _)| t.id)).collect();
    assert_eq!(order, vec![first.id, second.id, late.id]);
    assert_eq!(queue.now(), 10);
  }

  #[test]
  fn pop_due_respects_limit_and_never_rewinds_clock() {
    let mut queue = TimerQueue::new();
    queue.advance_to(3);
    let timer = queue.schedule(4, noop());
    assert_eq!(timer.due_at, 7);

    assert!(queue.pop_due(6).is_none());
    queue.advance_to(9);
    let (popped, _) = queue.pop_due(9).unwrap();
    assert_eq!(popped.id, timer.id);
    assert_eq!(queue.now(), 9);
  }

  #[test]
  fn pending_lists_timers_earliest_first() {
    let mut queue = TimerQueue::new();
    queue.schedule(8, noop());
    queue.schedule(2, noop());
    let due: Vec<u64> = queue.pending().iter().map(|t| t.due_at).collect();
    assert_eq!(due, vec![2, 8]);
    assert_eq!(queue.clear(), 2);
    assert!(queue.is_empty());
  }

  #[test]
  fn popped_timer_carries_its_own_job() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let ran = Rc::new(RefCell::new(Vec::new()));
    let mut queue = TimerQueue::new();
    let mut ids = Vec::new();
    for delay in [6, 1] {
      let ran = ran.clone();
      let job = Job::new(JobKind::Timer, move || ran.borrow_mut().push(delay));
      ids.push(queue.schedule(delay, job));
    }

    let (timer, job) = queue.pop_next().unwrap();
    assert_eq!(timer, ids[1]);
    job.run();
    assert_eq!(*ran.borrow(), vec![1]);
    assert_eq!(queue.len(), 1);
  }
}
