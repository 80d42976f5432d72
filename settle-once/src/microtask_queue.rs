//! The high-priority reaction queue.
//!
//! A plain FIFO. Draining lives in [`EventLoop`](crate::EventLoop), which pops one job at a time
//! and releases the queue before running it so jobs can enqueue more reactions.

use crate::Job;
use std::collections::VecDeque;

/// A FIFO queue of reaction jobs.
#[derive(Debug, Default)]
pub struct MicrotaskQueue {
  queue: VecDeque<Job>,
}

impl MicrotaskQueue {
  #[inline]
  pub fn new() -> Self {
    Self::default()
  }

  /// Enqueues a job in FIFO order.
  #[inline]
  pub fn enqueue(&mut self, job: Job) {
    self.queue.push_back(job);
  }

  #[inline]
  pub fn pop_front(&mut self) -> Option<Job> {
    self.queue.pop_front()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.queue.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.queue.is_empty()
  }

  /// Drops all queued jobs without running them, returning how many were discarded.
  pub fn clear(&mut self) -> usize {
    let discarded = self.queue.len();
    self.queue.clear();
    discarded
  }
}
