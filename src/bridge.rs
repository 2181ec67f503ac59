// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Synchronous bridge over callback-completed requests.
//!
//! The accelerator API is fire-and-forget: a request is submitted together
//! with a callback, and the callback runs later on a driver-owned thread.
//! [`submit_and_wait`] turns that into a blocking call:
//!
//! 1. Create a waiter in the `Pending` state.
//! 2. Submit the request, moving a [`Completion`] into the driver.
//! 3. If submission fails, return [`QatError::Submission`] without waiting.
//! 4. Otherwise block on a condition variable until the completion fires.
//! 5. Return the request payload, or [`QatError::Operation`] with the
//!    status the completion recorded.
//!
//! # Ownership
//!
//! The waiter is reference counted, so a completion that arrives after the
//! caller gave up (timeout, unwinding) only finds an `Abandoned` slot and
//! discards its payload. The caller's stack is never touched after return.
//! [`Completion::complete`] consumes the completion, so at most one result
//! can be delivered per waiter.

use crate::error::{QatError, QatResult};
use crate::status::Status;
use scopeguard::ScopeGuard;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[cfg(feature = "async")]
use tokio::sync::oneshot;

/// What the waiter currently holds.
enum Slot<T> {
    /// Submitted, no completion yet.
    Pending,
    /// Completion delivered.
    Done(Status, T),
    /// The driver dropped the completion without firing it.
    Dropped,
    /// The caller stopped waiting.
    Abandoned,
    /// The result was consumed.
    Taken,
}

/// Per-call rendezvous between a caller thread and the completing thread.
struct Waiter<T> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
}

impl<T> Waiter<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an outcome. Returns the payload back if nobody is waiting.
    fn deliver(&self, outcome: Slot<T>) -> Option<Slot<T>> {
        let mut slot = self.lock();
        match *slot {
            Slot::Pending => {
                *slot = outcome;
                drop(slot);
                self.cond.notify_one();
                None
            }
            _ => Some(outcome),
        }
    }

    /// Stop waiting; a later completion is discarded.
    fn abandon(&self) {
        let mut slot = self.lock();
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Abandoned;
        }
    }

    fn wait(&self, op: &'static str, timeout: Option<Duration>) -> QatResult<T> {
        let deadline = timeout.map(|t| (Instant::now() + t, t));
        let mut slot = self.lock();
        loop {
            match std::mem::replace(&mut *slot, Slot::Taken) {
                Slot::Pending => *slot = Slot::Pending,
                Slot::Done(status, payload) => {
                    return if status.is_success() {
                        Ok(payload)
                    } else {
                        Err(QatError::Operation { op, status })
                    };
                }
                Slot::Dropped => {
                    log::error!("{}: completion dropped by driver without firing", op);
                    return Err(QatError::Operation {
                        op,
                        status: Status::Fail,
                    });
                }
                Slot::Abandoned | Slot::Taken => {
                    return Err(QatError::Operation {
                        op,
                        status: Status::Fail,
                    });
                }
            }

            slot = match deadline {
                None => self.cond.wait(slot).unwrap_or_else(PoisonError::into_inner),
                Some((deadline, timeout)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        log::warn!("{}: abandoning request after {:?}", op, timeout);
                        return Err(QatError::Timeout { op, timeout });
                    }
                    self.cond
                        .wait_timeout(slot, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

enum Notify<T> {
    Blocking(Arc<Waiter<T>>),
    #[cfg(feature = "async")]
    Async(oneshot::Sender<Slot<T>>),
}

/// Completion handle moved into the driver with each request.
///
/// Call [`Completion::complete`] exactly once when the request finishes.
/// Dropping a completion without firing it wakes the caller with a failure.
pub struct Completion<T> {
    notify: Option<Notify<T>>,
}

impl<T> Completion<T> {
    fn blocking(waiter: Arc<Waiter<T>>) -> Self {
        Self {
            notify: Some(Notify::Blocking(waiter)),
        }
    }

    #[cfg(feature = "async")]
    fn oneshot(sender: oneshot::Sender<Slot<T>>) -> Self {
        Self {
            notify: Some(Notify::Async(sender)),
        }
    }

    /// Deliver the result of the request and hand the payload back.
    pub fn complete(mut self, status: Status, payload: T) {
        if let Some(notify) = self.notify.take() {
            Self::send(notify, Slot::Done(status, payload));
        }
    }

    fn send(notify: Notify<T>, outcome: Slot<T>) {
        let rejected = match notify {
            Notify::Blocking(waiter) => waiter.deliver(outcome),
            #[cfg(feature = "async")]
            Notify::Async(sender) => sender.send(outcome).err(),
        };
        if rejected.is_some() {
            log::debug!("late completion discarded, caller no longer waiting");
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(notify) = self.notify.take() {
            Self::send(notify, Slot::Dropped);
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("armed", &self.notify.is_some())
            .finish()
    }
}

/// Submit a request and block until it completes.
///
/// `submit` receives the completion handle and must return the status of
/// the submission itself. A non-success status means the driver will never
/// fire the completion; this function then returns
/// [`QatError::Submission`] immediately.
///
/// With `timeout` set, a request that does not complete in time is
/// abandoned and [`QatError::Timeout`] is returned.
pub fn submit_and_wait<T, F>(op: &'static str, timeout: Option<Duration>, submit: F) -> QatResult<T>
where
    F: FnOnce(Completion<T>) -> Status,
{
    let waiter = Arc::new(Waiter::new());
    let pending = scopeguard::guard(Arc::clone(&waiter), |waiter| waiter.abandon());

    let status = submit(Completion::blocking(Arc::clone(&waiter)));
    if !status.is_success() {
        log::debug!("{}: submission rejected: {}", op, status);
        return Err(QatError::Submission { op, status });
    }

    let result = waiter.wait(op, timeout);
    if result.is_ok() {
        ScopeGuard::into_inner(pending);
    }
    result
}

/// Submit a request and await its completion.
///
/// Same contract as [`submit_and_wait`]. Dropping the returned future
/// abandons the request.
#[cfg(feature = "async")]
pub async fn submit_and_await<T, F>(op: &'static str, submit: F) -> QatResult<T>
where
    F: FnOnce(Completion<T>) -> Status,
{
    let (sender, receiver) = oneshot::channel();

    let status = submit(Completion::oneshot(sender));
    if !status.is_success() {
        log::debug!("{}: submission rejected: {}", op, status);
        return Err(QatError::Submission { op, status });
    }

    match receiver.await {
        Ok(Slot::Done(status, payload)) if status.is_success() => Ok(payload),
        Ok(Slot::Done(status, _)) => Err(QatError::Operation { op, status }),
        _ => {
            log::error!("{}: completion dropped by driver without firing", op);
            Err(QatError::Operation {
                op,
                status: Status::Fail,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_completion_on_other_thread() {
        let result = submit_and_wait("test", None, |done: Completion<u32>| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                done.complete(Status::Success, 42);
            });
            Status::Success
        });
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_completion_before_wait() {
        let result = submit_and_wait("test", None, |done: Completion<&str>| {
            done.complete(Status::Success, "inline");
            Status::Success
        });
        assert_eq!(result.unwrap(), "inline");
    }

    #[test]
    fn test_failed_completion_is_operation_error() {
        let result = submit_and_wait("test", None, |done: Completion<()>| {
            thread::spawn(move || done.complete(Status::Fatal, ()));
            Status::Success
        });
        assert!(matches!(
            result,
            Err(QatError::Operation {
                op: "test",
                status: Status::Fatal
            })
        ));
    }

    #[test]
    fn test_submission_failure_skips_wait() {
        let start = Instant::now();
        let result = submit_and_wait("test", None, |done: Completion<()>| {
            drop(done);
            Status::Retry
        });
        assert!(matches!(
            result,
            Err(QatError::Submission {
                status: Status::Retry,
                ..
            })
        ));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_dropped_completion_does_not_hang() {
        let result = submit_and_wait("test", None, |done: Completion<()>| {
            thread::spawn(move || drop(done));
            Status::Success
        });
        assert!(matches!(
            result,
            Err(QatError::Operation {
                status: Status::Fail,
                ..
            })
        ));
    }

    #[test]
    fn test_timeout_abandons_late_completion() {
        let (tx, rx) = std::sync::mpsc::channel();
        let timeout = Some(Duration::from_millis(20));
        let result = submit_and_wait("test", timeout, |done: Completion<Vec<u8>>| {
            tx.send(done).unwrap();
            Status::Success
        });
        assert!(matches!(result, Err(QatError::Timeout { op: "test", .. })));

        // A late completion must be harmless.
        let done = rx.recv().unwrap();
        done.complete(Status::Success, vec![1, 2, 3]);
    }

    #[cfg(feature = "async")]
    #[test]
    fn test_async_completion() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let result = runtime.block_on(submit_and_await("test", |done: Completion<u8>| {
            thread::spawn(move || done.complete(Status::Success, 7));
            Status::Success
        }));
        assert_eq!(result.unwrap(), 7);
    }
}
