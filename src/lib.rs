#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! Bounded, executor-driven asynchronous queue with completion handlers.
//!
//! A [`Queue`] mediates handoff of values between producers and consumers
//! whose completions run on an [`Executor`]. Operations never block and never
//! run a handler on the initiator's stack: a push against a full queue and a
//! pop against an empty one *park* until a counterpart operation, a
//! cancellation, or closure resolves them, and every completion is
//! dispatched through the executor.
//!
//! Key properties:
//!
//! - **Bounded.** The buffer never observably exceeds its limit; a limit of
//!   zero yields a rendezvous queue that hands elements straight from pusher
//!   to popper.
//! - **Exactly one completion.** Every accepted operation completes exactly
//!   once, with success, [`QueueError::Cancelled`], or the close code.
//! - **Move-only friendly.** Elements are moved in and moved out, never
//!   copied; completions for failed pops carry a fallback element built by a
//!   [`ValueFactory`].
//! - **Executor-agnostic.** The crate ships [`RunLoop`], a multi-threaded run
//!   loop with outstanding-work accounting, and (behind the `tokio` feature)
//!   an adapter posting onto a Tokio runtime.
//!
//! ```
//! use handoff::{Queue, QueueError, RunLoop};
//!
//! let ex = RunLoop::new();
//! let queue = Queue::new(ex.clone(), 4);
//!
//! // Callable completion tokens...
//! queue.async_push("hello", |result| assert!(result.is_ok()));
//!
//! // ...or awaitable ones; both observe the same completion signature.
//! let _pop = queue.pop_with(|_: QueueError| "");
//!
//! ex.run();
//! ```

pub mod error;
pub mod executor;
pub mod futures;
pub mod queue;
pub mod telemetry;
pub mod value_factory;

mod dispatch;
mod pending;

pub use error::{PopError, QueueError, TryPushError};
pub use executor::{Executor, RunLoop, Task, WorkGuard};
pub use futures::{PopFuture, PushFuture};
pub use queue::Queue;
pub use value_factory::{DefaultValue, ValueFactory};

#[cfg(feature = "tokio")]
pub use executor::TokioExecutor;
