// src/queue.rs

//! The queue core: a bounded FIFO buffer coordinated with a single
//! role-homogeneous line of parked operations, driven through an executor.

use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};

use parking_lot::{Mutex, MutexGuard};

use crate::dispatch::{self, PopHandler, PushHandler};
use crate::error::{PopError, QueueError, TryPushError};
use crate::executor::{Executor, RunLoop};
use crate::pending::{PendingOps, PendingPop, PendingPush};
use crate::telemetry;
use crate::value_factory::{DefaultValue, ValueFactory};

const LOC_QUEUE: &str = "Queue";

/// A bounded, thread-safe, asynchronous FIFO queue.
///
/// Producers and consumers submit operations that complete asynchronously: a
/// completion handler is bound to its result and dispatched through the
/// queue's [`Executor`], never invoked on the initiator's stack. An insertion
/// against a full queue and an extraction against an empty one do not block;
/// they *park* until a counterpart operation, a cancellation, or closure
/// resolves them. Every parked operation receives exactly one completion.
///
/// A `limit` of zero builds a rendezvous queue: elements are handed from
/// pusher to popper without ever being observably buffered.
///
/// All operations take `&self` and are safe to call from any thread. Elements
/// are moved in and moved out; an element transferred by value is never
/// copied.
///
/// ```
/// use handoff::{Queue, RunLoop};
///
/// let ex = RunLoop::new();
/// let queue = Queue::new(ex.clone(), 8);
///
/// queue.async_push(7, |result| assert!(result.is_ok()));
/// queue.async_pop(|result| assert_eq!(result.unwrap(), 7));
///
/// ex.run();
/// assert!(queue.is_empty());
/// ```
pub struct Queue<T: Send + 'static, E: Executor = RunLoop> {
  state: Mutex<State<T>>,
  ex: E,
}

struct State<T> {
  buf: VecDeque<T>,
  limit: usize,
  pending: PendingOps<T>,
  closed: Option<QueueError>,
}

impl<T> State<T> {
  fn fresh(limit: usize) -> Self {
    State {
      buf: VecDeque::new(),
      limit,
      pending: PendingOps::new(),
      closed: None,
    }
  }

  // The queue's structural invariants. `assert_invariants` runs on every lock
  // acquisition and release; the buffer may exceed `limit` by one element
  // only *within* a locked section, while a parked push is being handed over.
  fn assert_invariants(&self) {
    debug_assert!(self.buf.len() <= self.limit);
    debug_assert!(self.buf.len() == self.limit || !self.pending.has_pushers());
    debug_assert!(self.buf.is_empty() || !self.pending.has_poppers());
    debug_assert!(self.closed.is_none() || self.pending.is_empty());
  }

  fn ready_push(&self) -> bool {
    self.buf.len() < self.limit || (self.limit == 0 && self.pending.has_poppers())
  }
}

// Lock wrapper that re-checks the invariants when released, pairing the check
// done on acquisition.
struct Locked<'a, T> {
  st: MutexGuard<'a, State<T>>,
}

impl<'a, T> Locked<'a, T> {
  fn new(st: MutexGuard<'a, State<T>>) -> Self {
    st.assert_invariants();
    Locked { st }
  }
}

impl<T> Deref for Locked<'_, T> {
  type Target = State<T>;

  fn deref(&self) -> &State<T> {
    &self.st
  }
}

impl<T> DerefMut for Locked<'_, T> {
  fn deref_mut(&mut self) -> &mut State<T> {
    &mut self.st
  }
}

impl<T> Drop for Locked<'_, T> {
  fn drop(&mut self) {
    self.st.assert_invariants();
  }
}

impl<T, E> Queue<T, E>
where
  T: Send + 'static,
  E: Executor,
{
  /// Creates a queue bounded at `limit` elements, dispatching completions on
  /// `ex`.
  ///
  /// `limit == 0` is legal and denotes a pure rendezvous queue: every push
  /// parks until a pop meets it, and vice versa.
  pub fn new(ex: E, limit: usize) -> Self {
    Queue {
      state: Mutex::new(State::fresh(limit)),
      ex,
    }
  }

  fn lock(&self) -> Locked<'_, T> {
    Locked::new(self.state.lock())
  }

  /// Asynchronously inserts `value`, completing `handler` through the
  /// executor once the element has been stored or the operation terminated.
  ///
  /// Completes with `Err(code)` immediately when the queue is closed. When
  /// the queue is full and no extraction is waiting, the operation parks;
  /// it then completes after enough extractions, or with
  /// [`QueueError::Cancelled`] if it is drained first.
  ///
  /// The handler is never invoked on the caller's stack.
  pub fn async_push<H>(&self, value: T, handler: H)
  where
    H: FnOnce(Result<(), QueueError>) + Send + 'static,
  {
    self.init_push(value, Box::new(handler));
  }

  /// Asynchronously extracts the oldest element.
  ///
  /// Equivalent to [`async_pop_with`](Queue::async_pop_with) with a
  /// [`DefaultValue`] fallback factory.
  pub fn async_pop<H>(&self, handler: H)
  where
    T: Default,
    H: FnOnce(Result<T, PopError<T>>) + Send + 'static,
  {
    self.init_pop(Box::new(DefaultValue), Box::new(handler));
  }

  /// Asynchronously extracts the oldest element, with an explicit fallback
  /// factory.
  ///
  /// Completes with `Ok(element)` once one is available, parking while the
  /// queue is empty and open. On cancellation or closure it completes with
  /// the condition code and `factory(code)` as the payload. On a closed
  /// queue, extraction keeps succeeding until the buffer drains.
  ///
  /// The handler is never invoked on the caller's stack; the factory runs
  /// where the handler runs.
  pub fn async_pop_with<F, H>(&self, factory: F, handler: H)
  where
    F: ValueFactory<T> + Send + 'static,
    H: FnOnce(Result<T, PopError<T>>) + Send + 'static,
  {
    self.init_pop(Box::new(factory), Box::new(handler));
  }

  /// Inserts `value` without parking.
  ///
  /// Succeeds exactly when an asynchronous push would have completed without
  /// parking. On failure the element is handed back. Never schedules a
  /// completion for the caller.
  pub fn try_push(&self, value: T) -> Result<(), TryPushError<T>> {
    let mut st = self.lock();

    if st.closed.is_some() {
      return Err(TryPushError::Closed(value));
    }
    if !st.ready_push() {
      return Err(TryPushError::Full(value));
    }

    st.buf.push_back(value);
    self.fire_one_popper(&mut st);
    Ok(())
  }

  /// Extracts the oldest element without parking.
  ///
  /// The only failure is [`QueueError::Empty`]: a closed queue keeps
  /// delivering elements until its buffer drains. A parked push counts as an
  /// available element: it is deposited and its completion scheduled, just
  /// as an asynchronous extraction would do.
  pub fn try_pop(&self) -> Result<T, QueueError> {
    let mut st = self.lock();

    self.fire_one_pusher(&mut st);

    match st.buf.pop_front() {
      Some(value) => Ok(value),
      None => Err(QueueError::Empty),
    }
  }

  /// Cancels the oldest parked push. Returns how many were cancelled (0 or 1).
  pub fn cancel_one_push(&self) -> usize {
    let mut st = self.lock();
    usize::from(self.abort_one_pusher(&mut st, QueueError::Cancelled))
  }

  /// Cancels every parked push, returning the count.
  ///
  /// A no-op returning 0 while pops are the waiting role: the two roles never
  /// coexist.
  pub fn cancel_push(&self) -> usize {
    let mut st = self.lock();
    if !st.pending.has_pushers() {
      return 0;
    }
    self.drain_pending(&mut st, QueueError::Cancelled)
  }

  /// Cancels the oldest parked pop. Returns how many were cancelled (0 or 1).
  pub fn cancel_one_pop(&self) -> usize {
    let mut st = self.lock();
    usize::from(self.abort_one_popper(&mut st, QueueError::Cancelled))
  }

  /// Cancels every parked pop, returning the count.
  pub fn cancel_pop(&self) -> usize {
    let mut st = self.lock();
    if !st.pending.has_poppers() {
      return 0;
    }
    self.drain_pending(&mut st, QueueError::Cancelled)
  }

  /// Cancels every parked operation of either role, returning the count.
  ///
  /// Each drained operation completes exactly once, with
  /// [`QueueError::Cancelled`].
  pub fn cancel(&self) -> usize {
    let mut st = self.lock();
    self.drain_pending(&mut st, QueueError::Cancelled)
  }

  /// Closes the queue with [`QueueError::Closed`].
  ///
  /// See [`close_with`](Queue::close_with).
  pub fn close(&self) -> bool {
    self.close_with(QueueError::Closed)
  }

  /// Closes the queue: records `code` as the close-state and terminates every
  /// parked operation with it.
  ///
  /// Subsequent pushes fail immediately with `code`. Pops keep delivering
  /// buffered elements and fail with `code` once the buffer drains. Returns
  /// `false` without effect if the queue is already closed; the close-state
  /// is sticky until [`reset`](Queue::reset).
  pub fn close_with(&self, code: QueueError) -> bool {
    let mut st = self.lock();
    if st.closed.is_some() {
      return false;
    }
    telemetry::log_event(None, LOC_QUEUE, "close", None);
    st.closed = Some(code);
    self.drain_pending(&mut st, code);
    true
  }

  /// Restores the queue to its freshly constructed state: drops all buffered
  /// elements, cancels every parked operation, and clears the close-state.
  pub fn reset(&self) {
    let mut st = self.lock();
    telemetry::log_event(None, LOC_QUEUE, "reset", None);
    st.buf.clear();
    self.drain_pending(&mut st, QueueError::Cancelled);
    st.closed = None;
  }

  /// Moves the queue's entire state (buffered elements, parked operations,
  /// close-state, and limit) into a new queue on the same executor, leaving
  /// `self` empty, open, and usable.
  ///
  /// Exclusive access already rules out concurrent initiators, so unlike the
  /// plain by-value move this needs no cross-queue coordination either; the
  /// parked operations travel with the state and complete from the new queue.
  pub fn take(&mut self) -> Queue<T, E> {
    let mut st = self.lock();
    let limit = st.limit;
    let taken = mem::replace(&mut *st, State::fresh(limit));
    drop(st);

    Queue {
      state: Mutex::new(taken),
      ex: self.ex.clone(),
    }
  }

  /// `true` when no element is buffered.
  pub fn is_empty(&self) -> bool {
    self.lock().buf.is_empty()
  }

  /// `true` when the buffer is at its limit.
  pub fn is_full(&self) -> bool {
    let st = self.lock();
    st.buf.len() >= st.limit
  }

  /// Number of buffered elements. Never exceeds [`limit`](Queue::limit).
  pub fn len(&self) -> usize {
    self.lock().buf.len()
  }

  /// The bound fixed at construction (0 for a rendezvous queue).
  pub fn limit(&self) -> usize {
    self.lock().limit
  }

  /// The close code, or `None` while the queue is open.
  pub fn close_state(&self) -> Option<QueueError> {
    self.lock().closed
  }

  /// `true` until [`close`](Queue::close) or [`close_with`](Queue::close_with)
  /// succeeds.
  pub fn is_open(&self) -> bool {
    self.lock().closed.is_none()
  }

  /// The executor completions are dispatched on.
  pub fn executor(&self) -> &E {
    &self.ex
  }

  // Push initiator. Locks once; all helpers below run under that lock.
  fn init_push(&self, value: T, handler: PushHandler) {
    let mut st = self.lock();

    if let Some(code) = st.closed {
      dispatch::complete_push(&self.ex, handler, Err(code));
      return;
    }

    if st.ready_push() {
      st.buf.push_back(value);
      dispatch::complete_push(&self.ex, handler, Ok(()));
      // A pop can only be parked against an empty buffer, so the element just
      // stored is the one it receives; at limit 0 the buffer returns to empty
      // before the lock is released.
      self.fire_one_popper(&mut st);
    } else {
      telemetry::increment_counter(LOC_QUEUE, "park_push");
      st.pending.park_push(PendingPush {
        value,
        handler,
        _work: self.ex.work(),
      });
    }
  }

  // Pop initiator.
  fn init_pop(&self, factory: Box<dyn ValueFactory<T> + Send>, handler: PopHandler<T>) {
    let mut st = self.lock();

    // A parked push is the oldest producer: let it deposit first so FIFO
    // order is preserved across park and unpark.
    if self.fire_one_pusher(&mut st) {
      debug_assert_eq!(st.buf.len(), st.limit + 1);
    }

    if let Some(value) = st.buf.pop_front() {
      dispatch::complete_pop(&self.ex, handler, Ok(value));
    } else if let Some(code) = st.closed {
      dispatch::fail_pop(&self.ex, handler, factory, code);
    } else {
      telemetry::increment_counter(LOC_QUEUE, "park_pop");
      st.pending.park_pop(PendingPop {
        handler,
        factory,
        _work: self.ex.work(),
      });
    }
  }

  // Fires the oldest parked push with success: its element enters the buffer
  // and its completion is scheduled. Returns whether a push was fired.
  fn fire_one_pusher(&self, st: &mut State<T>) -> bool {
    let Some(op) = st.pending.take_push() else {
      return false;
    };
    telemetry::increment_counter(LOC_QUEUE, "fire_push");
    st.buf.push_back(op.value);
    dispatch::complete_push(&self.ex, op.handler, Ok(()));
    true
  }

  // Fires the oldest parked pop with success, delivering the buffer front.
  fn fire_one_popper(&self, st: &mut State<T>) -> bool {
    let Some(op) = st.pending.take_pop() else {
      return false;
    };
    telemetry::increment_counter(LOC_QUEUE, "fire_pop");
    debug_assert_eq!(st.buf.len(), 1);
    let Some(value) = st.buf.pop_front() else {
      unreachable!("a pop was parked against a non-empty buffer")
    };
    dispatch::complete_pop(&self.ex, op.handler, Ok(value));
    true
  }

  // Terminates the oldest parked push with `code`, leaving the buffer alone.
  fn abort_one_pusher(&self, st: &mut State<T>, code: QueueError) -> bool {
    let Some(op) = st.pending.take_push() else {
      return false;
    };
    dispatch::complete_push(&self.ex, op.handler, Err(code));
    true
  }

  // Terminates the oldest parked pop with `code`; its factory supplies the
  // completion's payload.
  fn abort_one_popper(&self, st: &mut State<T>, code: QueueError) -> bool {
    let Some(op) = st.pending.take_pop() else {
      return false;
    };
    dispatch::fail_pop(&self.ex, op.handler, op.factory, code);
    true
  }

  // Terminates every parked operation with `code`. Only one of the two arms
  // ever fires for a given line; the count covers whichever role is present.
  fn drain_pending(&self, st: &mut State<T>, code: QueueError) -> usize {
    let mut drained = 0;
    while self.abort_one_pusher(st, code) || self.abort_one_popper(st, code) {
      drained += 1;
    }
    drained
  }
}

impl<T, E> fmt::Debug for Queue<T, E>
where
  T: Send + 'static,
  E: Executor,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let st = self.state.lock();
    f.debug_struct("Queue")
      .field("len", &st.buf.len())
      .field("limit", &st.limit)
      .field("pending", &st.pending)
      .field("closed", &st.closed)
      .finish()
  }
}

impl<T, E> Drop for Queue<T, E>
where
  T: Send + 'static,
  E: Executor,
{
  // A dying queue still owes every parked operation exactly one completion.
  fn drop(&mut self) {
    self.cancel();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  #[test]
  fn observers_on_a_fresh_queue() {
    let q: Queue<u32> = Queue::new(RunLoop::new(), 4);
    assert!(q.is_empty());
    assert!(!q.is_full());
    assert_eq!(q.len(), 0);
    assert_eq!(q.limit(), 4);
    assert!(q.is_open());
    assert_eq!(q.close_state(), None);
  }

  #[test]
  fn a_rendezvous_queue_is_always_full_and_empty() {
    let q: Queue<u32> = Queue::new(RunLoop::new(), 0);
    assert!(q.is_empty());
    assert!(q.is_full());
  }

  #[test]
  fn take_leaves_a_fresh_usable_queue() {
    let ex = RunLoop::new();
    let mut q = Queue::new(ex.clone(), 2);
    q.async_push(1, |_| {});
    q.async_push(2, |_| {});
    q.async_push(3, |_| {});

    let moved = q.take();
    assert_eq!(moved.len(), 2);
    assert_eq!(moved.limit(), 2);
    assert!(q.is_empty());
    assert!(q.is_open());
    assert_eq!(q.limit(), 2);

    // The parked push travelled with the state.
    assert_eq!(moved.cancel(), 1);
    assert_eq!(q.cancel(), 0);
    ex.run();
  }

  #[test]
  fn drop_completes_parked_operations() {
    let ex = RunLoop::new();
    let observed = Arc::new(AtomicUsize::new(0));
    {
      let q: Queue<u32> = Queue::new(ex.clone(), 0);
      for _ in 0..3 {
        let observed = Arc::clone(&observed);
        q.async_pop(move |result| {
          assert_eq!(result.unwrap_err().code, QueueError::Cancelled);
          observed.fetch_add(1, Ordering::SeqCst);
        });
      }
    }
    ex.run();
    assert_eq!(observed.load(Ordering::SeqCst), 3);
  }

  #[test]
  fn debug_reports_the_waiting_role() {
    let ex = RunLoop::new();
    let q: Queue<u32> = Queue::new(ex.clone(), 0);
    q.async_pop(|_| {});
    let rendered = format!("{:?}", q);
    assert!(rendered.contains("Poppers(1)"), "got: {}", rendered);
    q.cancel();
    ex.run();
  }
}
