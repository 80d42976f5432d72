//! Settle-once futures on a deterministic, single-threaded event loop.
//!
//! This crate provides:
//! - A settle-once future record ([`SettleOnceFuture`]) with its completion side ([`Resolver`])
//! - Chaining through derived futures ([`SettleOnceFuture::on_settled`],
//!   [`SettleOnceFuture::on_finally`] and friends) and combinators ([`race`], [`all`])
//! - A cooperative two-queue scheduler ([`EventLoop`]) on a virtual clock
//! - A host seam ([`HostHooks`]) for embeddings that schedule jobs themselves
//!
//! # Settlement and reactions
//!
//! A future settles at most once. Every later `fulfill`/`reject` is a silent no-op that returns
//! `false`. Reactions registered before or after settlement observe the same outcome, and always
//! from a job: never inside the call that settled or observed the future.
//!
//! A handler signals failure by returning `Err`. The error rejects the derived future and travels
//! down the chain until a failure handler returns `Ok`.
//!
//! # Scheduling
//!
//! The event loop has two queues with strict priority:
//! - **Reaction jobs** run in FIFO order and are drained to exhaustion at each checkpoint.
//! - **Timer tasks** run one per turn, ordered by due time on the virtual clock, each followed by
//!   a checkpoint.

mod combinators;
mod error;
mod event_loop;
mod future;
mod interrupt;
mod jobs;
mod microtask_queue;
mod rejection_tracker;
mod timer_queue;

pub use crate::combinators::all;
pub use crate::combinators::race;
pub use crate::error::SchedulerError;
pub use crate::error::Termination;
pub use crate::error::TerminationReason;
pub use crate::event_loop::EventLoop;
pub use crate::event_loop::EventLoopOptions;
pub use crate::future::FutureState;
pub use crate::future::OnFailure;
pub use crate::future::OnSuccess;
pub use crate::future::Resolver;
pub use crate::future::SettleOnceFuture;
pub use crate::interrupt::InterruptHandle;
pub use crate::interrupt::InterruptToken;
pub use crate::jobs::FutureId;
pub use crate::jobs::HostHooks;
pub use crate::jobs::Job;
pub use crate::jobs::JobKind;
pub use crate::jobs::RejectionOperation;
pub use crate::jobs::TimerId;
pub use crate::microtask_queue::MicrotaskQueue;
pub use crate::rejection_tracker::RejectionHandleAction;
pub use crate::rejection_tracker::RejectionTracker;
pub use crate::timer_queue::PendingTimer;
pub use crate::timer_queue::TimerQueue;
