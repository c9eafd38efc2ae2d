// src/dispatch.rs

//! Completion dispatch.
//!
//! Handlers are never invoked on an initiator's stack: a completion is bound
//! to its arguments and posted, so user code observes the result strictly
//! after the initiator has released the queue lock. The executor's `post` is
//! also the happens-before edge between initiator and handler, which is why
//! the queue needs no memory barriers beyond its mutex.

use crate::error::{PopError, QueueError};
use crate::executor::Executor;
use crate::value_factory::ValueFactory;

/// Boxed push completion: receives the operation's condition code.
pub(crate) type PushHandler = Box<dyn FnOnce(Result<(), QueueError>) + Send>;

/// Boxed pop completion: receives the element, or the code plus a fallback.
pub(crate) type PopHandler<T> = Box<dyn FnOnce(Result<T, PopError<T>>) + Send>;

/// Schedules a push completion on `ex`. The handler has not run on return.
pub(crate) fn complete_push<E>(ex: &E, handler: PushHandler, result: Result<(), QueueError>)
where
  E: Executor,
{
  ex.post(Box::new(move || handler(result)));
}

/// Schedules a successful pop completion on `ex`, moving the element into the
/// bound task.
pub(crate) fn complete_pop<T, E>(ex: &E, handler: PopHandler<T>, result: Result<T, PopError<T>>)
where
  T: Send + 'static,
  E: Executor,
{
  ex.post(Box::new(move || handler(result)));
}

/// Schedules a failed pop completion on `ex`.
///
/// The fallback factory is user code, so it runs inside the posted task,
/// where the handler runs, rather than under the queue lock.
pub(crate) fn fail_pop<T, E>(
  ex: &E,
  handler: PopHandler<T>,
  mut factory: Box<dyn ValueFactory<T> + Send>,
  code: QueueError,
) where
  T: Send + 'static,
  E: Executor,
{
  ex.post(Box::new(move || {
    let fallback = factory.make(code);
    handler(Err(PopError { code, fallback }));
  }));
}
