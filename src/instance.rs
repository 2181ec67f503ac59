// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Instance lifecycle.
//!
//! An [`Instance`] moves through `Selected → Started → Stopped`. Operations
//! are accepted only while it is started and address translation has been
//! registered. Transitions are serialized by an internal lock; operations
//! run concurrently.

use crate::context::QatContext;
use crate::driver::RawInstance;
use crate::error::{QatError, QatResult};
use crate::service::ServiceType;
use crate::status::Status;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default time to wait for a completion before abandoning a request.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle state of an [`Instance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Resolved but not started.
    Selected,
    /// Started; `translation` tells whether address translation is set.
    Started { translation: bool },
    /// Stopped. Terminal.
    Stopped,
}

/// A crypto instance selected by the resolver.
pub struct Instance {
    ctx: QatContext,
    raw: RawInstance,
    service: ServiceType,
    state: Mutex<InstanceState>,
    in_flight: AtomicUsize,
    timeout: Option<Duration>,
}

/// Marks one operation in flight; released on drop.
pub(crate) struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Instance {
    pub(crate) fn new(ctx: QatContext, raw: RawInstance, service: ServiceType) -> Self {
        Self {
            ctx,
            raw,
            service,
            state: Mutex::new(InstanceState::Selected),
            in_flight: AtomicUsize::new(0),
            timeout: Some(DEFAULT_COMPLETION_TIMEOUT),
        }
    }

    /// The raw driver handle.
    pub fn raw(&self) -> RawInstance {
        self.raw
    }

    /// Service type this instance was resolved for.
    pub fn service_type(&self) -> ServiceType {
        self.service
    }

    /// The owning context.
    pub fn context(&self) -> &QatContext {
        &self.ctx
    }

    /// Current lifecycle state.
    pub fn state(&self) -> InstanceState {
        *self.lock()
    }

    /// Number of operations currently waiting for completion.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Completion timeout applied to blocking operations.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Set the completion timeout. `None` waits forever.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn lock(&self) -> MutexGuard<'_, InstanceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Activate the instance.
    ///
    /// # Errors
    ///
    /// Returns [`QatError::Session`] if no session is running, and
    /// [`QatError::InstanceLifecycle`] if the instance is not in the
    /// `Selected` state or the driver fails.
    pub fn start(&self) -> QatResult<()> {
        let mut state = self.lock();
        if *state != InstanceState::Selected {
            log::error!("start_instance {}: invalid state {:?}", self.raw, *state);
            return Err(QatError::InstanceLifecycle {
                op: "start_instance",
                status: Status::Fail,
            });
        }

        self.ctx.with_session("start_instance", || {
            if !self.ctx.claim_instance(self.raw) {
                log::error!("start_instance {}: already started elsewhere", self.raw);
                return Err(QatError::InstanceLifecycle {
                    op: "start_instance",
                    status: Status::Fail,
                });
            }
            let status = self.ctx.driver().start_instance(self.raw);
            if !status.is_success() {
                log::error!("Error starting instance {}: {}", self.raw, status);
                self.ctx.release_instance(self.raw);
                return Err(QatError::InstanceLifecycle {
                    op: "start_instance",
                    status,
                });
            }
            Ok(())
        })?;

        *state = InstanceState::Started { translation: false };
        log::debug!("instance {} started", self.raw);
        Ok(())
    }

    /// Deactivate the instance. It cannot be restarted.
    ///
    /// # Errors
    ///
    /// Returns [`QatError::InstanceLifecycle`] if the instance is not
    /// started, operations are still in flight ([`Status::Retry`]), or the
    /// driver fails. A driver failure still leaves the instance stopped.
    pub fn stop(&self) -> QatResult<()> {
        let mut state = self.lock();
        if !matches!(*state, InstanceState::Started { .. }) {
            log::error!("stop_instance {}: invalid state {:?}", self.raw, *state);
            return Err(QatError::InstanceLifecycle {
                op: "stop_instance",
                status: Status::Fail,
            });
        }

        let in_flight = self.in_flight();
        if in_flight > 0 {
            log::warn!(
                "stop_instance {}: {} operation(s) in flight",
                self.raw,
                in_flight
            );
            return Err(QatError::InstanceLifecycle {
                op: "stop_instance",
                status: Status::Retry,
            });
        }

        let status = self.ctx.driver().stop_instance(self.raw);
        *state = InstanceState::Stopped;
        self.ctx.release_instance(self.raw);
        if !status.is_success() {
            log::error!("Error stopping instance {}: {}", self.raw, status);
            return Err(QatError::InstanceLifecycle {
                op: "stop_instance",
                status,
            });
        }

        log::debug!("instance {} stopped", self.raw);
        Ok(())
    }

    /// Register the memory subsystem's virtual-to-physical translation.
    ///
    /// Required once, after [`Instance::start`] and before the first
    /// operation.
    ///
    /// # Errors
    ///
    /// Returns [`QatError::AddressTranslation`] if the instance is not
    /// started or the driver rejects the registration.
    pub fn set_address_translation(&self) -> QatResult<()> {
        let mut state = self.lock();
        if !matches!(*state, InstanceState::Started { .. }) {
            log::error!(
                "set_address_translation {}: invalid state {:?}",
                self.raw,
                *state
            );
            return Err(QatError::AddressTranslation {
                op: "set_address_translation",
                status: Status::Fail,
            });
        }

        let driver = self.ctx.driver();
        let status = driver.set_address_translation(self.raw, driver.virt_to_phys_fn());
        if !status.is_success() {
            log::error!(
                "Error setting address translation on {}: {}",
                self.raw,
                status
            );
            return Err(QatError::AddressTranslation {
                op: "set_address_translation",
                status,
            });
        }

        *state = InstanceState::Started { translation: true };
        Ok(())
    }

    /// Admit one operation, or explain why the instance cannot take it.
    pub(crate) fn begin(&self, op: &'static str) -> QatResult<InFlight<'_>> {
        let state = self.lock();
        match *state {
            InstanceState::Started { translation: true } => {
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                Ok(InFlight {
                    counter: &self.in_flight,
                })
            }
            InstanceState::Started { translation: false } => {
                Err(QatError::AddressTranslation {
                    op,
                    status: Status::Fail,
                })
            }
            InstanceState::Selected | InstanceState::Stopped => {
                Err(QatError::InstanceLifecycle {
                    op,
                    status: Status::Fail,
                })
            }
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("raw", &self.raw)
            .field("service", &self.service)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if matches!(self.state(), InstanceState::Started { .. }) {
            log::warn!("instance {} dropped while started, stopping", self.raw);
            if let Err(e) = self.stop() {
                log::error!("stop on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimDriver, SimFault};
    use std::sync::Arc;

    fn selected(driver: &Arc<SimDriver>) -> Instance {
        let ctx = QatContext::from_arc(driver.clone());
        ctx.start_session("SSL").unwrap();
        ctx.init_memory().unwrap();
        ctx.get_instance().unwrap()
    }

    #[test]
    fn test_start_translate_stop() {
        let driver = Arc::new(SimDriver::new());
        let instance = selected(&driver);
        assert_eq!(instance.state(), InstanceState::Selected);

        instance.start().unwrap();
        assert_eq!(
            instance.state(),
            InstanceState::Started { translation: false }
        );
        assert_eq!(instance.context().started_instances(), 1);

        instance.set_address_translation().unwrap();
        assert_eq!(
            instance.state(),
            InstanceState::Started { translation: true }
        );

        instance.stop().unwrap();
        assert_eq!(instance.state(), InstanceState::Stopped);
        assert_eq!(instance.context().started_instances(), 0);
    }

    #[test]
    fn test_translation_before_start_rejected() {
        let driver = Arc::new(SimDriver::new());
        let instance = selected(&driver);
        assert!(matches!(
            instance.set_address_translation(),
            Err(QatError::AddressTranslation {
                status: Status::Fail,
                ..
            })
        ));
    }

    #[test]
    fn test_translation_rejected_by_driver() {
        let driver = Arc::new(SimDriver::new());
        driver.inject(SimFault::AddressTranslation, Status::InvalidParam);
        let instance = selected(&driver);
        instance.start().unwrap();
        assert!(matches!(
            instance.set_address_translation(),
            Err(QatError::AddressTranslation {
                status: Status::InvalidParam,
                ..
            })
        ));
    }

    #[test]
    fn test_start_failure() {
        let driver = Arc::new(SimDriver::new());
        driver.inject(SimFault::StartInstance, Status::Resource);
        let instance = selected(&driver);
        assert!(matches!(
            instance.start(),
            Err(QatError::InstanceLifecycle {
                op: "start_instance",
                status: Status::Resource
            })
        ));
        assert_eq!(instance.state(), InstanceState::Selected);
        assert_eq!(instance.context().started_instances(), 0);
    }

    #[test]
    fn test_no_restart_after_stop() {
        let driver = Arc::new(SimDriver::new());
        let instance = selected(&driver);
        instance.start().unwrap();
        instance.stop().unwrap();
        assert!(instance.start().is_err());
        assert!(instance.stop().is_err());
    }

    #[test]
    fn test_operation_requires_started_instance() {
        let driver = Arc::new(SimDriver::new());
        let instance = selected(&driver);
        assert!(matches!(
            instance.begin("eddsa_sign"),
            Err(QatError::InstanceLifecycle { .. })
        ));

        instance.start().unwrap();
        assert!(matches!(
            instance.begin("eddsa_sign"),
            Err(QatError::AddressTranslation { .. })
        ));
    }

    #[test]
    fn test_stop_refused_while_in_flight() {
        let driver = Arc::new(SimDriver::new());
        let instance = selected(&driver);
        instance.start().unwrap();
        instance.set_address_translation().unwrap();

        let op = instance.begin("eddsa_sign").unwrap();
        assert!(matches!(
            instance.stop(),
            Err(QatError::InstanceLifecycle {
                status: Status::Retry,
                ..
            })
        ));
        drop(op);
        instance.stop().unwrap();
    }

    #[test]
    fn test_second_wrapper_cannot_start_same_handle() {
        let driver = Arc::new(SimDriver::new());
        let first = selected(&driver);
        let second = first.context().get_instance().unwrap();
        assert_eq!(first.raw(), second.raw());

        first.start().unwrap();
        assert!(matches!(
            second.start(),
            Err(QatError::InstanceLifecycle {
                op: "start_instance",
                status: Status::Fail
            })
        ));
        assert_eq!(second.state(), InstanceState::Selected);
        assert_eq!(driver.call_log().iter().filter(|c| **c == "start_instance").count(), 1);

        first.stop().unwrap();
        assert_eq!(first.context().started_instances(), 0);
    }

    #[test]
    fn test_drop_stops_started_instance() {
        let driver = Arc::new(SimDriver::new());
        let instance = selected(&driver);
        let ctx = instance.context().clone();
        instance.start().unwrap();
        drop(instance);
        assert_eq!(ctx.started_instances(), 0);
        assert_eq!(driver.started_instance_count(), 0);
    }
}
