// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Instance discovery and selection.
//!
//! # Selection policy
//!
//! 1. Count instances of the primary service type (generic crypto by
//!    default).
//! 2. If there are none, count once more at the broader service type. The
//!    fallback only widens, so a generic query never yields a symmetric-only
//!    instance.
//! 3. Clamp the count to `max_instances`.
//! 4. Fetch exactly that many handles and pick the first one.

use crate::context::QatContext;
use crate::driver::RawInstance;
use crate::error::{QatError, QatResult};
use crate::instance::Instance;
use crate::service::ServiceType;

/// Upper bound on the number of instance handles fetched at once.
pub const MAX_INSTANCES: usize = 1024;

/// Instances found by a discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Service type the handles were fetched for.
    pub service: ServiceType,
    /// Instance handles, in driver order.
    pub handles: Vec<RawInstance>,
}

/// Discovers instances and selects one.
#[derive(Debug, Clone)]
pub struct InstanceResolver<'a> {
    ctx: &'a QatContext,
    service: ServiceType,
    max_instances: usize,
}

impl<'a> InstanceResolver<'a> {
    /// Resolver for generic crypto instances with the default clamp.
    pub fn new(ctx: &'a QatContext) -> Self {
        Self {
            ctx,
            service: ServiceType::Crypto,
            max_instances: MAX_INSTANCES,
        }
    }

    /// Set the primary service type to query.
    pub fn with_service_type(mut self, service: ServiceType) -> Self {
        self.service = service;
        self
    }

    /// Set the maximum number of handles to fetch (at least 1).
    pub fn with_max_instances(mut self, max_instances: usize) -> Self {
        self.max_instances = max_instances.max(1);
        self
    }

    fn count(&self, service: ServiceType) -> QatResult<u16> {
        let mut count = 0u16;
        let status = self.ctx.driver().num_instances(service, &mut count);
        if !status.is_success() {
            log::error!("Error while counting {} instances: {}", service, status);
            return Err(QatError::InstanceQuery {
                op: "num_instances",
                status,
            });
        }
        log::debug!("{} instance(s) for {}", count, service);
        Ok(count)
    }

    /// Fetch the handles of all usable instances, up to `max_instances`.
    ///
    /// # Errors
    ///
    /// - [`QatError::Session`] if no session is running
    /// - [`QatError::InstanceQuery`] if counting or fetching fails
    /// - [`QatError::NoInstance`] if no instance is available
    pub fn discover_instances(&self) -> QatResult<Discovery> {
        self.ctx.ensure_session("get_instance")?;

        let mut service = self.service;
        let mut count = self.count(service)?;
        if count == 0 {
            let broader = service.broadened();
            log::debug!("no {} instances, retrying at {}", service, broader);
            service = broader;
            count = self.count(service)?;
        }

        let count = usize::from(count).min(self.max_instances);
        if count == 0 {
            log::error!("No crypto instances found.");
            return Err(QatError::NoInstance { op: "get_instance" });
        }

        let mut handles = vec![RawInstance::NULL; count];
        let status = self.ctx.driver().get_instances(service, &mut handles);
        if !status.is_success() {
            log::error!("Error while getting {} instances: {}", service, status);
            return Err(QatError::InstanceQuery {
                op: "get_instances",
                status,
            });
        }

        Ok(Discovery { service, handles })
    }

    /// Select the first available instance.
    ///
    /// # Errors
    ///
    /// Same as [`InstanceResolver::discover_instances`]; a null first handle
    /// is reported as [`QatError::InstanceQuery`].
    pub fn get_instance(&self) -> QatResult<Instance> {
        let discovery = self.discover_instances()?;
        let raw = discovery.handles[0];
        if raw.is_null() {
            log::error!("driver returned a null instance handle");
            return Err(QatError::InstanceQuery {
                op: "get_instances",
                status: crate::status::Status::Fail,
            });
        }

        log::info!(
            "selected instance {} of {} ({})",
            raw,
            discovery.handles.len(),
            discovery.service
        );
        Ok(Instance::new(self.ctx.clone(), raw, discovery.service))
    }
}
