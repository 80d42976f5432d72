//! Futures derived from several inputs.

use crate::HostHooks;
use crate::SettleOnceFuture;
use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;

/// Settles like the first of `futures` to settle.
///
/// Later settlements reach the race future too, but are ignored because it has already settled.
/// With no inputs the result stays pending forever.
pub fn race<T, E, I>(host: &Rc<dyn HostHooks>, futures: I) -> SettleOnceFuture<T, E>
where
  T: Clone + 'static,
  E: Clone + 'static,
  I: IntoIterator<Item = SettleOnceFuture<T, E>>,
{
  let (race, resolver) = SettleOnceFuture::pending(host);
  for future in futures {
    let resolver = resolver.clone();
    future.subscribe(Box::new(move |outcome| {
      if !resolver.settle(outcome) {
        tracing::trace!("race already decided; ignoring late settlement");
      }
    }));
  }
  race
}

/// Fulfills with every value, in input order, once all of `futures` fulfill. Rejects with the
/// first rejection.
pub fn all<T, E, I>(host: &Rc<dyn HostHooks>, futures: I) -> SettleOnceFuture<Vec<T>, E>
where
  T: Clone + 'static,
  E: Clone + 'static,
  I: IntoIterator<Item = SettleOnceFuture<T, E>>,
{
  let futures: Vec<_> = futures.into_iter().collect();
  let (all, resolver) = SettleOnceFuture::pending(host);
  if futures.is_empty() {
    resolver.fulfill(Vec::new());
    return all;
  }

  let slots: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; futures.len()]));
  let remaining = Rc::new(Cell::new(futures.len()));
  for (index, future) in futures.into_iter().enumerate() {
    let resolver = resolver.clone();
    let slots = slots.clone();
    let remaining = remaining.clone();
    future.subscribe(Box::new(move |outcome| match outcome {
      Ok(value) => {
        slots.borrow_mut()[index] = Some(value);
        remaining.set(remaining.get() - 1);
        if remaining.get() == 0 {
          let values: Vec<T> = slots.borrow_mut().drain(..).flatten().collect();
          resolver.fulfill(values);
        }
      }
      Err(error) => {
        resolver.reject(error);
      }
    }));
  }
  all
}
