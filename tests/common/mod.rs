// Shared helpers for the queue integration tests.

use std::future::Future;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
use std::thread;

use handoff::RunLoop;

pub const POOL_THREADS: usize = 10;

/// Runs `ex` on `n` threads until it drains, like an I/O context thread pool.
pub fn run_pool(ex: &RunLoop, n: usize) {
  let handles: Vec<_> = (0..n)
    .map(|_| {
      let ex = ex.clone();
      thread::spawn(move || {
        ex.run();
      })
    })
    .collect();
  for handle in handles {
    handle.join().expect("runner thread panicked");
  }
}

fn noop_raw_waker() -> RawWaker {
  fn clone(_: *const ()) -> RawWaker {
    noop_raw_waker()
  }
  fn wake(_: *const ()) {}
  fn wake_by_ref(_: *const ()) {}
  fn drop(_: *const ()) {}

  static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop);
  RawWaker::new(std::ptr::null(), &VTABLE)
}

/// Extracts the output of a future that must already be complete.
pub fn resolved<F: Future>(future: F) -> F::Output {
  let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
  let mut cx = Context::from_waker(&waker);
  let mut future = Box::pin(future);
  match future.as_mut().poll(&mut cx) {
    Poll::Ready(output) => output,
    Poll::Pending => panic!("future has not resolved"),
  }
}
