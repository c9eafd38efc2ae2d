// src/telemetry.rs

//! Optional instrumentation of the queue's park/fire/cancel paths.
//!
//! Compiled out entirely unless the `handoff_telemetry` feature is enabled;
//! the disabled stubs are empty `#[inline(always)]` functions.

#[cfg(feature = "handoff_telemetry")]
pub mod enabled {
  //! Global event and counter collector.

  use std::collections::HashMap;
  use std::fmt;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::thread::{self, ThreadId};
  use std::time::Instant;

  static NEXT_SEQ: AtomicUsize = AtomicUsize::new(0);

  /// One recorded event.
  #[derive(Clone)]
  pub struct Event {
    /// Global sequence number, for ordering events with close timestamps.
    pub seq: usize,
    /// When the event was recorded.
    pub timestamp: Instant,
    /// OS thread the event was recorded on.
    pub thread_id: ThreadId,
    /// Element identifier, when the call site tracks one.
    pub item_id: Option<usize>,
    /// Code location, e.g. `"Queue"`.
    pub location: String,
    /// Event kind, e.g. `"park_push"`.
    pub kind: String,
    /// Optional free-form detail.
    pub message: Option<String>,
  }

  impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Event")
        .field("seq", &self.seq)
        .field("tid", &self.thread_id)
        .field("item", &self.item_id)
        .field("loc", &self.location)
        .field("kind", &self.kind)
        .field("msg", &self.message.as_deref().unwrap_or(""))
        .finish()
    }
  }

  type CounterKey = (String, String);

  struct Collector {
    events: Vec<Event>,
    counters: HashMap<CounterKey, usize>,
    start: Instant,
  }

  lazy_static::lazy_static! {
    static ref COLLECTOR: Mutex<Collector> = Mutex::new(Collector {
      events: Vec::new(),
      counters: HashMap::new(),
      start: Instant::now(),
    });
  }

  /// Records one event.
  pub fn log_event_fn(item_id: Option<usize>, location: &str, kind: &str, message: Option<String>) {
    let event = Event {
      seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
      timestamp: Instant::now(),
      thread_id: thread::current().id(),
      item_id,
      location: location.to_string(),
      kind: kind.to_string(),
      message,
    };
    if let Ok(mut collector) = COLLECTOR.lock() {
      collector.events.push(event);
    }
  }

  /// Bumps the named counter.
  pub fn increment_counter_fn(location: &'static str, counter: &str) {
    if let Ok(mut collector) = COLLECTOR.lock() {
      *collector
        .counters
        .entry((location.to_string(), counter.to_string()))
        .or_insert(0) += 1;
    }
  }

  /// Prints everything collected so far to stdout.
  pub fn print_report_fn() {
    let Ok(collector) = COLLECTOR.lock() else {
      return;
    };
    println!("--- handoff telemetry report ---");

    let mut events = collector.events.clone();
    events.sort_by_key(|e| e.seq);
    for event in &events {
      let offset = event.timestamp.duration_since(collector.start);
      println!(
        "  +{:<10.6}s [{:<5}] {:?} {}::{} {}",
        offset.as_secs_f64(),
        event.seq,
        event.thread_id,
        event.location,
        event.kind,
        event.message.as_deref().unwrap_or("")
      );
    }

    let mut counters: Vec<_> = collector.counters.iter().collect();
    counters.sort_by_key(|(key, _)| *key);
    for ((location, counter), count) in counters {
      println!("  {}::{} = {}", location, counter, count);
    }
    println!("--- end of report ---");
  }

  /// Clears events and counters and restarts the clock.
  pub fn clear_fn() {
    if let Ok(mut collector) = COLLECTOR.lock() {
      collector.events.clear();
      collector.counters.clear();
      collector.start = Instant::now();
    }
    NEXT_SEQ.store(0, Ordering::Relaxed);
  }
}

#[cfg(not(feature = "handoff_telemetry"))]
pub mod disabled {
  //! No-op stubs; everything optimizes away.

  /// Records one event (no-op).
  #[inline(always)]
  pub fn log_event_fn(
    _item_id: Option<usize>,
    _location: &'static str,
    _kind: &'static str,
    _message: Option<String>,
  ) {
  }

  /// Bumps the named counter (no-op).
  #[inline(always)]
  pub fn increment_counter_fn(_location: &'static str, _counter: &'static str) {}

  /// Prints the report (no-op).
  #[inline(always)]
  pub fn print_report_fn() {}

  /// Clears collected data (no-op).
  #[inline(always)]
  pub fn clear_fn() {}
}

#[cfg(feature = "handoff_telemetry")]
pub use enabled::{
  clear_fn as clear_telemetry, increment_counter_fn as increment_counter,
  log_event_fn as log_event, print_report_fn as print_report,
};

#[cfg(not(feature = "handoff_telemetry"))]
pub use disabled::{
  clear_fn as clear_telemetry, increment_counter_fn as increment_counter,
  log_event_fn as log_event, print_report_fn as print_report,
};
