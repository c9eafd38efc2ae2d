// src/executor.rs

//! The executor seam the queue dispatches completions through.
//!
//! The queue never runs a completion handler on the initiator's stack: every
//! completion is bound to its arguments and handed to [`Executor::post`]. A
//! parked operation additionally holds a [`WorkGuard`] so an executor with a
//! momentarily empty task queue does not conclude it is idle while the queue
//! still owes a completion.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// A unit of work submitted to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An opaque handle able to accept a callable for deferred execution on some
/// thread(s) it controls.
pub trait Executor: Clone + Send + Sync + 'static {
  /// Schedules `task` to run later.
  ///
  /// `post` must only enqueue: when it returns, `task` has not been invoked.
  fn post(&self, task: Task);

  /// Returns a token the executor counts as outstanding work.
  ///
  /// Executors without a notion of outstanding work may return
  /// [`WorkGuard::none`].
  fn work(&self) -> WorkGuard;
}

/// Keeps an executor's event loop alive while a queue operation is parked.
///
/// Dropping the guard releases the claim.
pub struct WorkGuard {
  keep: Option<Box<dyn Any + Send>>,
}

impl WorkGuard {
  /// Wraps an executor-specific token.
  pub fn new(token: impl Any + Send) -> Self {
    Self {
      keep: Some(Box::new(token)),
    }
  }

  /// A guard that claims nothing.
  pub fn none() -> Self {
    Self { keep: None }
  }
}

impl fmt::Debug for WorkGuard {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WorkGuard")
      .field("active", &self.keep.is_some())
      .finish()
  }
}

/// A multi-threaded run loop: the reference [`Executor`].
///
/// Tasks posted to the loop are executed by whichever threads are inside
/// [`run`](RunLoop::run). `run` returns once the task queue is empty *and* no
/// [`WorkGuard`] issued by this loop is alive, so its return means all queue
/// activity has drained.
///
/// ```
/// use handoff::{Executor, RunLoop};
///
/// let ex = RunLoop::new();
/// ex.post(Box::new(|| println!("deferred")));
/// assert_eq!(ex.run(), 1);
/// ```
#[derive(Clone)]
pub struct RunLoop {
  inner: Arc<LoopInner>,
}

struct LoopInner {
  tasks: Mutex<VecDeque<Task>>,
  idle: Condvar,
  outstanding: AtomicUsize,
}

impl RunLoop {
  /// Creates an empty loop.
  pub fn new() -> Self {
    Self {
      inner: Arc::new(LoopInner {
        tasks: Mutex::new(VecDeque::new()),
        idle: Condvar::new(),
        outstanding: AtomicUsize::new(0),
      }),
    }
  }

  /// Runs posted tasks on the calling thread until the loop is drained.
  ///
  /// Returns the number of tasks this call executed. Any number of threads
  /// may run the same loop concurrently; each task is executed exactly once.
  pub fn run(&self) -> usize {
    let mut executed = 0;
    let mut tasks = self.inner.tasks.lock();
    loop {
      if let Some(task) = tasks.pop_front() {
        drop(tasks);
        task();
        executed += 1;
        tasks = self.inner.tasks.lock();
        continue;
      }
      if self.inner.outstanding.load(Ordering::Acquire) == 0 {
        return executed;
      }
      self.inner.idle.wait(&mut tasks);
    }
  }
}

impl Default for RunLoop {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for RunLoop {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RunLoop")
      .field("queued", &self.inner.tasks.lock().len())
      .field("outstanding", &self.inner.outstanding.load(Ordering::Relaxed))
      .finish()
  }
}

impl Executor for RunLoop {
  fn post(&self, task: Task) {
    let mut tasks = self.inner.tasks.lock();
    tasks.push_back(task);
    self.inner.idle.notify_one();
  }

  fn work(&self) -> WorkGuard {
    self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
    WorkGuard::new(LoopWork {
      inner: Arc::clone(&self.inner),
    })
  }
}

struct LoopWork {
  inner: Arc<LoopInner>,
}

impl Drop for LoopWork {
  fn drop(&mut self) {
    // Taking the task lock before notifying closes the race against a runner
    // that has just observed an empty queue and is about to wait.
    let _tasks = self.inner.tasks.lock();
    if self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
      self.inner.idle.notify_all();
    }
  }
}

/// An [`Executor`] that posts completions onto a Tokio runtime.
///
/// Tokio keeps its runtime alive independently of queued work, so the guards
/// this adapter issues are inert.
#[cfg(feature = "tokio")]
#[derive(Clone, Debug)]
pub struct TokioExecutor {
  handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio")]
impl TokioExecutor {
  /// Wraps a runtime handle.
  pub fn new(handle: tokio::runtime::Handle) -> Self {
    Self { handle }
  }

  /// Captures the handle of the runtime the caller is on.
  ///
  /// # Panics
  ///
  /// Panics when called outside a Tokio runtime context.
  pub fn current() -> Self {
    Self {
      handle: tokio::runtime::Handle::current(),
    }
  }
}

#[cfg(feature = "tokio")]
impl Executor for TokioExecutor {
  fn post(&self, task: Task) {
    self.handle.spawn(async move { task() });
  }

  fn work(&self) -> WorkGuard {
    WorkGuard::none()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicBool;
  use std::thread;
  use std::time::Duration;

  #[test]
  fn run_returns_immediately_when_idle() {
    let ex = RunLoop::new();
    assert_eq!(ex.run(), 0);
  }

  #[test]
  fn post_defers_execution() {
    let ex = RunLoop::new();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    ex.post(Box::new(move || flag.store(true, Ordering::SeqCst)));
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(ex.run(), 1);
    assert!(ran.load(Ordering::SeqCst));
  }

  #[test]
  fn tasks_run_in_post_order_on_one_thread() {
    let ex = RunLoop::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..8 {
      let order = Arc::clone(&order);
      ex.post(Box::new(move || order.lock().push(i)));
    }
    ex.run();
    assert_eq!(*order.lock(), (0..8).collect::<Vec<_>>());
  }

  #[test]
  fn tasks_posted_from_tasks_are_executed() {
    let ex = RunLoop::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let inner_ex = ex.clone();
    let inner_hits = Arc::clone(&hits);
    ex.post(Box::new(move || {
      let hits = Arc::clone(&inner_hits);
      inner_ex.post(Box::new(move || {
        hits.fetch_add(1, Ordering::SeqCst);
      }));
      inner_hits.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(ex.run(), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn work_guard_keeps_run_alive() {
    let ex = RunLoop::new();
    let work = ex.work();

    let runner = {
      let ex = ex.clone();
      thread::spawn(move || ex.run())
    };

    // The runner has nothing to execute but must not return yet.
    thread::sleep(Duration::from_millis(100));
    assert!(!runner.is_finished());

    ex.post(Box::new(|| {}));
    drop(work);
    assert_eq!(runner.join().expect("runner panicked"), 1);
  }

  #[test]
  fn concurrent_runners_split_the_load() {
    let ex = RunLoop::new();
    let hits = Arc::new(AtomicUsize::new(0));
    for _ in 0..1000 {
      let hits = Arc::clone(&hits);
      ex.post(Box::new(move || {
        hits.fetch_add(1, Ordering::Relaxed);
      }));
    }

    let runners: Vec<_> = (0..4)
      .map(|_| {
        let ex = ex.clone();
        thread::spawn(move || ex.run())
      })
      .collect();
    let executed: usize = runners.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(executed, 1000);
    assert_eq!(hits.load(Ordering::Relaxed), 1000);
  }
}
