// src/pending.rs

//! Parked operations.
//!
//! A queue holds at most one waiting line at a time: pushes park only against
//! a full buffer and pops only against an empty one, so both lines can never
//! be populated together. The list encodes that rule structurally instead of
//! tracking a role flag next to two deques: it is either idle, a FIFO of
//! pushers, or a FIFO of poppers.

use std::collections::VecDeque;
use std::fmt;

use crate::dispatch::{PopHandler, PushHandler};
use crate::executor::WorkGuard;
use crate::value_factory::ValueFactory;

/// A parked insertion: the element it carries, its completion, and the work
/// token keeping the executor alive until the operation resolves.
pub(crate) struct PendingPush<T> {
  pub(crate) value: T,
  pub(crate) handler: PushHandler,
  pub(crate) _work: WorkGuard,
}

/// A parked extraction: its completion, the fallback builder used on
/// cancellation or closure, and the work token.
pub(crate) struct PendingPop<T> {
  pub(crate) handler: PopHandler<T>,
  pub(crate) factory: Box<dyn ValueFactory<T> + Send>,
  pub(crate) _work: WorkGuard,
}

/// Role-homogeneous FIFO of parked operations.
///
/// The non-idle variants never hold an empty deque; draining the last entry
/// collapses the line back to [`PendingOps::Idle`].
pub(crate) enum PendingOps<T> {
  Idle,
  Pushers(VecDeque<PendingPush<T>>),
  Poppers(VecDeque<PendingPop<T>>),
}

impl<T> PendingOps<T> {
  pub(crate) fn new() -> Self {
    PendingOps::Idle
  }

  pub(crate) fn is_empty(&self) -> bool {
    matches!(self, PendingOps::Idle)
  }

  pub(crate) fn has_pushers(&self) -> bool {
    matches!(self, PendingOps::Pushers(_))
  }

  pub(crate) fn has_poppers(&self) -> bool {
    matches!(self, PendingOps::Poppers(_))
  }

  /// Appends a parked push. The line must not currently hold poppers.
  pub(crate) fn park_push(&mut self, op: PendingPush<T>) {
    match self {
      PendingOps::Idle => {
        let mut line = VecDeque::new();
        line.push_back(op);
        *self = PendingOps::Pushers(line);
      }
      PendingOps::Pushers(line) => line.push_back(op),
      PendingOps::Poppers(_) => unreachable!("parked a push while pops are waiting"),
    }
  }

  /// Appends a parked pop. The line must not currently hold pushers.
  pub(crate) fn park_pop(&mut self, op: PendingPop<T>) {
    match self {
      PendingOps::Idle => {
        let mut line = VecDeque::new();
        line.push_back(op);
        *self = PendingOps::Poppers(line);
      }
      PendingOps::Poppers(line) => line.push_back(op),
      PendingOps::Pushers(_) => unreachable!("parked a pop while pushes are waiting"),
    }
  }

  /// Removes the oldest parked push, if the line holds pushers.
  pub(crate) fn take_push(&mut self) -> Option<PendingPush<T>> {
    match self {
      PendingOps::Pushers(line) => {
        let op = line.pop_front();
        debug_assert!(op.is_some(), "a pusher line is never empty");
        if line.is_empty() {
          *self = PendingOps::Idle;
        }
        op
      }
      _ => None,
    }
  }

  /// Removes the oldest parked pop, if the line holds poppers.
  pub(crate) fn take_pop(&mut self) -> Option<PendingPop<T>> {
    match self {
      PendingOps::Poppers(line) => {
        let op = line.pop_front();
        debug_assert!(op.is_some(), "a popper line is never empty");
        if line.is_empty() {
          *self = PendingOps::Idle;
        }
        op
      }
      _ => None,
    }
  }
}

impl<T> fmt::Debug for PendingOps<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PendingOps::Idle => f.write_str("PendingOps::Idle"),
      PendingOps::Pushers(line) => write!(f, "PendingOps::Pushers({})", line.len()),
      PendingOps::Poppers(line) => write!(f, "PendingOps::Poppers({})", line.len()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value_factory::DefaultValue;

  fn push_op(value: i32) -> PendingPush<i32> {
    PendingPush {
      value,
      handler: Box::new(|_| {}),
      _work: WorkGuard::none(),
    }
  }

  fn pop_op() -> PendingPop<i32> {
    PendingPop {
      handler: Box::new(|_| {}),
      factory: Box::new(DefaultValue),
      _work: WorkGuard::none(),
    }
  }

  #[test]
  fn starts_idle() {
    let ops = PendingOps::<i32>::new();
    assert!(ops.is_empty());
    assert!(!ops.has_pushers());
    assert!(!ops.has_poppers());
  }

  #[test]
  fn pushers_drain_in_fifo_order() {
    let mut ops = PendingOps::new();
    ops.park_push(push_op(1));
    ops.park_push(push_op(2));
    ops.park_push(push_op(3));

    assert!(ops.has_pushers());

    assert_eq!(ops.take_push().map(|op| op.value), Some(1));
    assert_eq!(ops.take_push().map(|op| op.value), Some(2));
    assert_eq!(ops.take_push().map(|op| op.value), Some(3));
    assert!(ops.take_push().is_none());
    assert!(ops.is_empty());
  }

  #[test]
  fn draining_collapses_back_to_idle() {
    let mut ops = PendingOps::<i32>::new();
    ops.park_pop(pop_op());
    assert!(ops.has_poppers());

    assert!(ops.take_pop().is_some());
    assert!(ops.is_empty());

    // The line can now switch roles.
    ops.park_push(push_op(7));
    assert!(ops.has_pushers());
  }

  #[test]
  fn taking_the_absent_role_is_a_noop() {
    let mut ops = PendingOps::<i32>::new();
    ops.park_pop(pop_op());

    assert!(ops.take_push().is_none());
    assert!(ops.has_poppers());
    assert!(ops.take_pop().is_some());
  }

  #[test]
  #[should_panic(expected = "parked a pop while pushes are waiting")]
  fn mixing_roles_is_rejected() {
    let mut ops = PendingOps::new();
    ops.park_push(push_op(1));
    ops.park_pop(pop_op());
  }

  #[test]
  fn dropping_a_populated_line_discards_entries() {
    let mut ops = PendingOps::new();
    ops.park_push(push_op(1));
    ops.park_push(push_op(2));
    // Entries are disposed without their handlers firing.
    drop(ops);
  }
}
