use std::cell::RefCell;
use std::rc::Rc;

use settle_once::EventLoop;
use settle_once::EventLoopOptions;
use settle_once::FutureState;
use settle_once::SchedulerError;
use settle_once::SettleOnceFuture;
use settle_once::TerminationReason;

type Log = Rc<RefCell<Vec<&'static str>>>;

fn log() -> Log {
  Rc::new(RefCell::new(Vec::new()))
}

fn queue_reaction(event_loop: &EventLoop, log: &Log, entry: &'static str) {
  let sink = log.clone();
  let ready: SettleOnceFuture<(), String> = event_loop.resolved(());
  ready.then(move |()| {
    sink.borrow_mut().push(entry);
    Ok(())
  });
}

fn termination_reason(err: SchedulerError) -> TerminationReason {
  match err {
    SchedulerError::Termination(term) => term.reason,
  }
}

#[test]
fn reactions_drain_before_each_timer_task() {
  let event_loop = EventLoop::default();
  let seen = log();

  {
    let sink = seen.clone();
    event_loop.set_timeout(0, move || sink.borrow_mut().push("timer 1"));
  }
  queue_reaction(&event_loop, &seen, "reaction 1");
  {
    let sink = seen.clone();
    let inner = event_loop.clone();
    event_loop.set_timeout(0, move || {
      sink.borrow_mut().push("timer 2");
      queue_reaction(&inner, &sink, "reaction from timer 2");
    });
  }
  {
    let sink = seen.clone();
    event_loop.set_timeout(0, move || sink.borrow_mut().push("timer 3"));
  }

  event_loop.run_until_idle().unwrap();
  assert_eq!(
    *seen.borrow(),
    vec!["reaction 1", "timer 1", "timer 2", "reaction from timer 2", "timer 3"]
  );
  assert!(event_loop.is_idle());
}

#[test]
fn checkpoint_drains_reactions_enqueued_while_draining() {
  let event_loop = EventLoop::default();
  let future: SettleOnceFuture<i32, String> = event_loop.resolved(1);
  let end = future.then(|v| Ok(v + 1)).then(|v| Ok(v + 1)).then(|v| Ok(v + 1));

  let ran = event_loop.perform_microtask_checkpoint().unwrap();
  assert_eq!(ran, 3);
  assert_eq!(end.state(), FutureState::Fulfilled(4));
}

#[test]
fn checkpoint_leaves_timers_alone() {
  let event_loop = EventLoop::default();
  let timer: SettleOnceFuture<i32, String> = event_loop.delay(1, 1);

  assert_eq!(event_loop.perform_microtask_checkpoint().unwrap(), 0);
  assert!(timer.is_pending());
  assert_eq!(event_loop.pending_timers().len(), 1);
}

#[test]
fn virtual_clock_moves_only_when_driven() {
  let event_loop = EventLoop::default();
  let late: SettleOnceFuture<&'static str, String> = event_loop.delay(10, "late");
  let early: SettleOnceFuture<&'static str, String> = event_loop.delay(3, "early");

  assert_eq!(event_loop.now(), 0);
  assert!(event_loop.run_next_task().unwrap());
  assert_eq!(event_loop.now(), 3);
  assert_eq!(early.state(), FutureState::Fulfilled("early"));

  event_loop.advance_by(5).unwrap();
  assert_eq!(event_loop.now(), 8);
  assert!(late.is_pending());

  event_loop.advance_by(2).unwrap();
  assert_eq!(late.state(), FutureState::Fulfilled("late"));
  assert!(!event_loop.run_next_task().unwrap());
}

#[test]
fn timers_scheduled_during_advance_use_their_own_due_time() {
  let event_loop = EventLoop::default();
  let seen = log();

  let sink = seen.clone();
  let inner = event_loop.clone();
  event_loop.set_timeout(2, move || {
    sink.borrow_mut().push("at 2");
    let sink = sink.clone();
    inner.set_timeout(3, move || sink.borrow_mut().push("at 5"));
  });

  event_loop.advance_by(10).unwrap();
  assert_eq!(*seen.borrow(), vec!["at 2", "at 5"]);
  assert_eq!(event_loop.now(), 10);
}

#[test]
fn equal_due_times_run_in_scheduling_order() {
  let event_loop = EventLoop::default();
  let seen = log();
  for entry in ["first", "second", "third"] {
    let sink = seen.clone();
    event_loop.set_timeout(4, move || sink.borrow_mut().push(entry));
  }

  let pending = event_loop.pending_timers();
  assert!(pending.windows(2).all(|pair| pair[0].order < pair[1].order));
  event_loop.run_until_idle().unwrap();
  assert_eq!(*seen.borrow(), vec!["first", "second", "third"]);
}

#[test]
fn fuel_limits_a_single_run() {
  let event_loop = EventLoop::new(EventLoopOptions {
    max_steps: Some(2),
    ..Default::default()
  });
  let seen = log();
  for entry in ["a", "b", "c"] {
    queue_reaction(&event_loop, &seen, entry);
  }

  let err = event_loop.perform_microtask_checkpoint().unwrap_err();
  match &err {
    SchedulerError::Termination(term) => assert_eq!(term.steps, 2),
  }
  assert_eq!(termination_reason(err), TerminationReason::OutOfFuel);
  assert_eq!(*seen.borrow(), vec!["a", "b"]);

  assert_eq!(event_loop.perform_microtask_checkpoint().unwrap(), 1);
  assert_eq!(*seen.borrow(), vec!["a", "b", "c"]);
}

#[test]
fn interrupt_stops_before_the_next_job() {
  let event_loop = EventLoop::default();
  let seen = log();
  let handle = event_loop.interrupt_handle();

  {
    let sink = seen.clone();
    let ready: SettleOnceFuture<(), String> = event_loop.resolved(());
    ready.then(move |()| {
      sink.borrow_mut().push("interrupting");
      handle.interrupt();
      Ok(())
    });
  }
  queue_reaction(&event_loop, &seen, "after interrupt");

  let err = event_loop.run_until_idle().unwrap_err();
  assert_eq!(termination_reason(err), TerminationReason::Interrupted);
  assert_eq!(*seen.borrow(), vec!["interrupting"]);

  event_loop.run_until_idle().unwrap();
  assert_eq!(*seen.borrow(), vec!["interrupting", "after interrupt"]);
}

#[test]
fn interrupt_raised_by_the_last_job_ends_that_run() {
  let event_loop = EventLoop::default();
  let handle = event_loop.interrupt_handle();
  let ready: SettleOnceFuture<(), String> = event_loop.resolved(());
  ready.then(move |()| {
    handle.interrupt();
    Ok(())
  });

  let err = event_loop.run_until_idle().unwrap_err();
  match &err {
    SchedulerError::Termination(term) => assert_eq!(term.steps, 1),
  }
  assert_eq!(termination_reason(err), TerminationReason::Interrupted);
  assert!(event_loop.is_idle());

  let (source, resolver) = event_loop.pending::<i32, String>();
  let doubled = source.then(|value| Ok(value * 2));
  resolver.fulfill(21);
  assert_eq!(event_loop.run_until_idle().unwrap(), 1);
  assert_eq!(doubled.state().into_result(), Some(Ok(42)));
}

#[test]
fn interrupt_raised_by_a_timer_leaves_its_reactions_queued() {
  let event_loop = EventLoop::default();
  let seen = log();

  {
    let handle = event_loop.interrupt_handle();
    let inner = event_loop.clone();
    let sink = seen.clone();
    event_loop.set_timeout(3, move || {
      queue_reaction(&inner, &sink, "after timer");
      handle.interrupt();
    });
  }

  let err = event_loop.run_until_idle().unwrap_err();
  assert_eq!(termination_reason(err), TerminationReason::Interrupted);
  assert_eq!(event_loop.now(), 3);
  assert_eq!(event_loop.pending_jobs(), 1);
  assert!(seen.borrow().is_empty());

  assert_eq!(event_loop.run_until_idle().unwrap(), 1);
  assert_eq!(*seen.borrow(), vec!["after timer"]);
}

#[test]
fn fuel_runs_out_on_a_timer_task() {
  let event_loop = EventLoop::new(EventLoopOptions {
    max_steps: Some(1),
    ..Default::default()
  });
  let seen = log();
  queue_reaction(&event_loop, &seen, "reaction");
  {
    let sink = seen.clone();
    event_loop.set_timeout(5, move || sink.borrow_mut().push("timer"));
  }

  let err = event_loop.run_until_idle().unwrap_err();
  match &err {
    SchedulerError::Termination(term) => assert_eq!(term.steps, 1),
  }
  assert_eq!(termination_reason(err), TerminationReason::OutOfFuel);
  assert_eq!(*seen.borrow(), vec!["reaction"]);
  assert_eq!(event_loop.pending_timers().len(), 1);
  assert_eq!(event_loop.now(), 0);

  assert_eq!(event_loop.run_until_idle().unwrap(), 1);
  assert_eq!(*seen.borrow(), vec!["reaction", "timer"]);
  assert_eq!(event_loop.now(), 5);
}

#[test]
fn nested_run_calls_are_ignored() {
  let event_loop = EventLoop::default();
  let nested = Rc::new(RefCell::new(None));

  let inner = event_loop.clone();
  let sink = nested.clone();
  let ready: SettleOnceFuture<(), String> = event_loop.resolved(());
  ready.then(move |()| {
    *sink.borrow_mut() = Some(inner.perform_microtask_checkpoint());
    Ok(())
  });
  queue_reaction(&event_loop, &log(), "queued after");

  assert_eq!(event_loop.perform_microtask_checkpoint().unwrap(), 2);
  assert_eq!(*nested.borrow(), Some(Ok(0)));
}

#[test]
fn teardown_discards_queued_work() {
  let event_loop = EventLoop::default();
  let timer: SettleOnceFuture<i32, String> = event_loop.delay(5, 1);
  queue_reaction(&event_loop, &log(), "never");

  assert_eq!(event_loop.teardown(), 2);
  assert!(event_loop.is_idle());
  event_loop.run_until_idle().unwrap();
  assert!(timer.is_pending());
}

#[test]
fn options_deserialize_with_defaults() {
  let options: EventLoopOptions = serde_json::from_str(r#"{"max_steps": 50}"#).unwrap();
  assert_eq!(options.max_steps, Some(50));
  assert!(!options.track_rejections);

  let options: EventLoopOptions = serde_json::from_str("{}").unwrap();
  assert_eq!(options, EventLoopOptions::default());
}

#[test]
fn termination_displays_reason_and_steps() {
  let event_loop = EventLoop::new(EventLoopOptions {
    max_steps: Some(0),
    ..Default::default()
  });
  queue_reaction(&event_loop, &log(), "blocked");
  let err = event_loop.perform_microtask_checkpoint().unwrap_err();
  assert_eq!(err.to_string(), "run terminated: out of fuel after 0 steps");
}
