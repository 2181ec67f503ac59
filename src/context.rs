// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Process context: session and memory-subsystem lifecycle.
//!
//! The QAT user-space library keeps two pieces of process-wide state: the
//! session registered with `icp_sal_userStart` and the `usdm` DMA allocator.
//! [`QatContext`] owns both explicitly and is passed to every component, so
//! the start-before-use and stop-after-last-use rules are checked here
//! instead of being left to global state.
//!
//! ```text
//! Uninitialized --(session + memory up)--> Ready --(first teardown)--> ShuttingDown --> Closed
//! ```
//!
//! Once any teardown has happened the context cannot be brought back up.

use crate::driver::{Driver, RawInstance};
use crate::error::{QatError, QatResult};
use crate::instance::Instance;
use crate::memory::{DmaBuffer, MemoryPool, MemoryState};
use crate::resolver::InstanceResolver;
use crate::status::Status;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle of a [`QatContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Session and/or memory not brought up yet.
    Uninitialized,
    /// Session running and memory initialized.
    Ready,
    /// Partially torn down.
    ShuttingDown,
    /// Fully torn down. Terminal.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    NotStarted,
    Running,
    Stopped,
}

struct Shared {
    driver: Arc<dyn Driver>,
    session: Mutex<SessionState>,
    memory: Arc<MemoryPool>,
    started: Mutex<HashSet<RawInstance>>,
}

/// Explicit process context shared by all components.
///
/// Cloning is cheap; clones refer to the same session and memory subsystem.
#[derive(Clone)]
pub struct QatContext {
    shared: Arc<Shared>,
}

impl QatContext {
    /// Create a context over `driver`. Nothing is started yet.
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self::from_arc(Arc::new(driver))
    }

    /// Create a context over a shared driver.
    pub fn from_arc(driver: Arc<dyn Driver>) -> Self {
        let memory = MemoryPool::new(Arc::clone(&driver));
        Self {
            shared: Arc::new(Shared {
                driver,
                session: Mutex::new(SessionState::NotStarted),
                memory,
                started: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// The underlying driver.
    pub fn driver(&self) -> &dyn Driver {
        self.shared.driver.as_ref()
    }

    /// The DMA memory pool.
    pub fn memory(&self) -> &Arc<MemoryPool> {
        &self.shared.memory
    }

    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.shared
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle_of(session: SessionState, memory: MemoryState) -> Lifecycle {
        let session_up = session == SessionState::Running;
        let memory_up = memory == MemoryState::Ready;
        let torn_down = session == SessionState::Stopped || memory == MemoryState::Destroyed;

        if session_up && memory_up {
            Lifecycle::Ready
        } else if !torn_down {
            Lifecycle::Uninitialized
        } else if session_up || memory_up {
            Lifecycle::ShuttingDown
        } else {
            Lifecycle::Closed
        }
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        let session = *self.session();
        Self::lifecycle_of(session, self.shared.memory.state())
    }

    /// Returns true while a session is registered.
    pub fn is_session_running(&self) -> bool {
        *self.session() == SessionState::Running
    }

    /// Number of instances currently started.
    pub fn started_instances(&self) -> usize {
        self.started().len()
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Register this process with the accelerator under `process_name`.
    ///
    /// `process_name` selects the section of the QAT configuration file
    /// (for example `"SSL"`).
    ///
    /// # Errors
    ///
    /// Returns [`QatError::Session`] if a session is already running, the
    /// context is shutting down, the name contains a NUL byte, or the driver
    /// rejects the registration.
    pub fn start_session(&self, process_name: &str) -> QatResult<()> {
        let mut session = self.session();
        let lifecycle = Self::lifecycle_of(*session, self.shared.memory.state());
        if *session != SessionState::NotStarted
            || matches!(lifecycle, Lifecycle::ShuttingDown | Lifecycle::Closed)
        {
            log::error!(
                "start_session: session {:?}, context {:?}",
                *session,
                lifecycle
            );
            return Err(QatError::Session {
                op: "start_session",
                status: Status::Fail,
            });
        }

        if process_name.contains('\0') {
            return Err(QatError::Session {
                op: "start_session",
                status: Status::InvalidParam,
            });
        }

        let status = self.driver().start_session(process_name);
        if !status.is_success() {
            log::error!("Error starting QAT session {:?}: {}", process_name, status);
            return Err(QatError::Session {
                op: "start_session",
                status,
            });
        }

        *session = SessionState::Running;
        log::info!(
            "{}: session started for process {:?}",
            self.driver().name(),
            process_name
        );
        Ok(())
    }

    /// Deregister this process.
    ///
    /// # Errors
    ///
    /// Returns [`QatError::Session`] if no session is running, an instance is
    /// still started ([`Status::Resource`]), or the driver reports failure.
    /// A driver failure still marks the session as stopped, since nothing
    /// more can be done with it.
    pub fn stop_session(&self) -> QatResult<()> {
        let mut session = self.session();
        if *session != SessionState::Running {
            log::warn!("stop_session: no session running ({:?})", *session);
            return Err(QatError::Session {
                op: "stop_session",
                status: Status::Fail,
            });
        }

        let started = self.started_instances();
        if started > 0 {
            log::error!("stop_session: {} instance(s) still started", started);
            return Err(QatError::Session {
                op: "stop_session",
                status: Status::Resource,
            });
        }

        let status = self.driver().stop_session();
        *session = SessionState::Stopped;
        if !status.is_success() {
            log::error!("Error stopping QAT session: {}", status);
            return Err(QatError::Session {
                op: "stop_session",
                status,
            });
        }

        log::info!("{}: session stopped", self.driver().name());
        Ok(())
    }

    /// Fail with [`QatError::Session`] unless a session is running.
    pub(crate) fn ensure_session(&self, op: &'static str) -> QatResult<()> {
        if self.is_session_running() {
            Ok(())
        } else {
            Err(QatError::Session {
                op,
                status: Status::Fail,
            })
        }
    }

    /// Run `f` while holding the session lock, provided a session is running.
    ///
    /// Used by instance start so that the started-instance count and the
    /// session state change atomically with respect to `stop_session`.
    pub(crate) fn with_session<R>(
        &self,
        op: &'static str,
        f: impl FnOnce() -> QatResult<R>,
    ) -> QatResult<R> {
        let session = self.session();
        if *session != SessionState::Running {
            return Err(QatError::Session {
                op,
                status: Status::Fail,
            });
        }
        let result = f();
        drop(session);
        result
    }

    fn started(&self) -> MutexGuard<'_, HashSet<RawInstance>> {
        self.shared
            .started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `raw` as started. Returns false if it already is, possibly
    /// through another [`Instance`] wrapping the same handle.
    pub(crate) fn claim_instance(&self, raw: RawInstance) -> bool {
        self.started().insert(raw)
    }

    pub(crate) fn release_instance(&self, raw: RawInstance) {
        self.started().remove(&raw);
    }

    // ------------------------------------------------------------------
    // Memory subsystem
    // ------------------------------------------------------------------

    /// Prepare the DMA allocator.
    ///
    /// # Errors
    ///
    /// Returns [`QatError::ResourceInit`] if the allocator cannot be
    /// prepared, is already initialized, or the context is shutting down.
    pub fn init_memory(&self) -> QatResult<()> {
        let session = self.session();
        let lifecycle = Self::lifecycle_of(*session, self.shared.memory.state());
        if matches!(lifecycle, Lifecycle::ShuttingDown | Lifecycle::Closed) {
            log::error!("init_memory: context is {:?}", lifecycle);
            return Err(QatError::ResourceInit {
                op: "init_memory",
                status: Status::Fail,
            });
        }
        self.shared.memory.init()
    }

    /// Release the DMA allocator.
    ///
    /// Best-effort: logs and does nothing if memory is not initialized or
    /// DMA buffers are still alive.
    pub fn destroy_memory(&self) {
        self.shared.memory.destroy();
    }

    /// Allocate a zero-filled DMA buffer.
    pub fn alloc_buffer(&self, len: usize) -> QatResult<DmaBuffer> {
        self.shared.memory.alloc(len)
    }

    /// Allocate a DMA buffer holding a copy of `data`.
    pub fn alloc_buffer_from(&self, data: &[u8]) -> QatResult<DmaBuffer> {
        self.shared.memory.alloc_from(data)
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Resolve the first generic crypto instance with default settings.
    ///
    /// See [`InstanceResolver`] for the selection policy. Each call returns
    /// a new [`Instance`]; wrappers of the same handle share one started
    /// state, so only one of them can start it.
    pub fn get_instance(&self) -> QatResult<Instance> {
        InstanceResolver::new(self).get_instance()
    }
}

impl std::fmt::Debug for QatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QatContext")
            .field("driver", &self.driver().name())
            .field("lifecycle", &self.lifecycle())
            .field("started_instances", &self.started_instances())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimDriver, SimFault};

    #[test]
    fn test_lifecycle_transitions() {
        let ctx = QatContext::new(SimDriver::new());
        assert_eq!(ctx.lifecycle(), Lifecycle::Uninitialized);

        ctx.start_session("SSL").unwrap();
        assert_eq!(ctx.lifecycle(), Lifecycle::Uninitialized);

        ctx.init_memory().unwrap();
        assert_eq!(ctx.lifecycle(), Lifecycle::Ready);

        ctx.stop_session().unwrap();
        assert_eq!(ctx.lifecycle(), Lifecycle::ShuttingDown);

        ctx.destroy_memory();
        assert_eq!(ctx.lifecycle(), Lifecycle::Closed);
    }

    #[test]
    fn test_closed_context_cannot_restart() {
        let ctx = QatContext::new(SimDriver::new());
        ctx.start_session("SSL").unwrap();
        ctx.init_memory().unwrap();
        ctx.stop_session().unwrap();
        ctx.destroy_memory();

        assert!(matches!(
            ctx.start_session("SSL"),
            Err(QatError::Session { .. })
        ));
        assert!(matches!(
            ctx.init_memory(),
            Err(QatError::ResourceInit { .. })
        ));
    }

    #[test]
    fn test_double_start_session_rejected() {
        let ctx = QatContext::new(SimDriver::new());
        ctx.start_session("SSL").unwrap();
        let err = ctx.start_session("SSL").unwrap_err();
        assert!(matches!(
            err,
            QatError::Session {
                op: "start_session",
                status: Status::Fail
            }
        ));
    }

    #[test]
    fn test_start_session_driver_failure() {
        let driver = SimDriver::new();
        driver.inject(SimFault::StartSession, Status::Fail);
        let ctx = QatContext::new(driver);
        assert!(matches!(
            ctx.start_session("SSL"),
            Err(QatError::Session {
                status: Status::Fail,
                ..
            })
        ));
        assert!(!ctx.is_session_running());
    }

    #[test]
    fn test_nul_in_process_name() {
        let ctx = QatContext::new(SimDriver::new());
        assert!(matches!(
            ctx.start_session("SS\0L"),
            Err(QatError::Session {
                status: Status::InvalidParam,
                ..
            })
        ));
    }

    #[test]
    fn test_stop_session_without_start() {
        let ctx = QatContext::new(SimDriver::new());
        assert!(matches!(
            ctx.stop_session(),
            Err(QatError::Session {
                op: "stop_session",
                ..
            })
        ));
    }

    #[test]
    fn test_stop_session_reports_driver_failure() {
        let driver = SimDriver::new();
        driver.inject(SimFault::StopSession, Status::Fail);
        let ctx = QatContext::new(driver);
        ctx.start_session("SSL").unwrap();
        assert!(ctx.stop_session().is_err());
        assert!(!ctx.is_session_running());
    }

    #[test]
    fn test_stop_session_refused_while_instance_started() {
        let ctx = QatContext::new(SimDriver::new());
        ctx.start_session("SSL").unwrap();
        let instance = ctx.get_instance().unwrap();
        instance.start().unwrap();

        assert!(matches!(
            ctx.stop_session(),
            Err(QatError::Session {
                status: Status::Resource,
                ..
            })
        ));
        assert!(ctx.is_session_running());

        instance.stop().unwrap();
        ctx.stop_session().unwrap();
    }

    #[test]
    fn test_get_instance_before_session() {
        let ctx = QatContext::new(SimDriver::new());
        assert!(matches!(
            ctx.get_instance(),
            Err(QatError::Session {
                op: "get_instance",
                ..
            })
        ));
    }
}
