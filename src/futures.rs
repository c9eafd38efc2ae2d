// src/futures.rs

//! Awaitable completion tokens.
//!
//! [`Queue::async_push`] and [`Queue::async_pop`] accept a callable; the
//! adaptors here wrap the same operations for callers that prefer to `.await`
//! the completion. A plain handler, a future, and an async fn all observe
//! the identical completion signature. The handler side fulfils a shared cell
//! and wakes the awaiting task, so the future resolves strictly after the
//! queue's executor has dispatched the completion.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::error::{PopError, QueueError};
use crate::executor::Executor;
use crate::queue::Queue;
use crate::value_factory::ValueFactory;

// Single-shot result cell shared between the completion handler and the
// awaiting task.
struct Cell<R> {
  slot: Mutex<CellState<R>>,
}

struct CellState<R> {
  result: Option<R>,
  waker: Option<Waker>,
}

impl<R> Cell<R> {
  fn new() -> Arc<Self> {
    Arc::new(Cell {
      slot: Mutex::new(CellState {
        result: None,
        waker: None,
      }),
    })
  }

  fn fulfil(&self, result: R) {
    let waker = {
      let mut slot = self.slot.lock();
      debug_assert!(slot.result.is_none(), "completion delivered twice");
      slot.result = Some(result);
      slot.waker.take()
    };
    if let Some(waker) = waker {
      waker.wake();
    }
  }

  fn poll_take(&self, cx: &mut Context<'_>) -> Poll<R> {
    let mut slot = self.slot.lock();
    match slot.result.take() {
      Some(result) => Poll::Ready(result),
      None => {
        slot.waker = Some(cx.waker().clone());
        Poll::Pending
      }
    }
  }

  fn is_fulfilled(&self) -> bool {
    self.slot.lock().result.is_some()
  }
}

/// Future returned by [`Queue::push`]; resolves once the push completes.
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct PushFuture {
  cell: Arc<Cell<Result<(), QueueError>>>,
}

impl Future for PushFuture {
  type Output = Result<(), QueueError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    self.cell.poll_take(cx)
  }
}

impl fmt::Debug for PushFuture {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PushFuture")
      .field("ready", &self.cell.is_fulfilled())
      .finish()
  }
}

/// Future returned by [`Queue::pop`] and [`Queue::pop_with`]; resolves with
/// the extracted element, or the condition code and fallback.
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct PopFuture<T: Send + 'static> {
  cell: Arc<Cell<Result<T, PopError<T>>>>,
}

impl<T: Send + 'static> Future for PopFuture<T> {
  type Output = Result<T, PopError<T>>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    self.cell.poll_take(cx)
  }
}

impl<T: Send + 'static> fmt::Debug for PopFuture<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PopFuture")
      .field("ready", &self.cell.is_fulfilled())
      .finish()
  }
}

impl<T, E> Queue<T, E>
where
  T: Send + 'static,
  E: Executor,
{
  /// Pushes `value`, returning a future that resolves once the element is
  /// stored or the operation is terminated.
  ///
  /// Dropping the future does not cancel the operation; the element is still
  /// delivered (use [`cancel_one_push`](Queue::cancel_one_push) to revoke a
  /// parked push).
  pub fn push(&self, value: T) -> PushFuture {
    let cell = Cell::new();
    let fulfil = Arc::clone(&cell);
    self.async_push(value, move |result| fulfil.fulfil(result));
    PushFuture { cell }
  }

  /// Pops an element, returning a future for the completion.
  ///
  /// Equivalent to [`pop_with`](Queue::pop_with) with a
  /// [`DefaultValue`](crate::DefaultValue) fallback factory.
  pub fn pop(&self) -> PopFuture<T>
  where
    T: Default,
  {
    let cell = Cell::new();
    let fulfil = Arc::clone(&cell);
    self.async_pop(move |result| fulfil.fulfil(result));
    PopFuture { cell }
  }

  /// Pops an element with an explicit fallback factory, returning a future
  /// for the completion.
  pub fn pop_with<F>(&self, factory: F) -> PopFuture<T>
  where
    F: ValueFactory<T> + Send + 'static,
  {
    let cell = Cell::new();
    let fulfil = Arc::clone(&cell);
    self.async_pop_with(factory, move |result| fulfil.fulfil(result));
    PopFuture { cell }
  }
}
