// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! High-level QAT engine API.

use crate::config::QatConfig;
use crate::context::QatContext;
use crate::crypto::{SHA512_LEN, SIGNATURE_LEN};
use crate::driver::Driver;
use crate::error::{QatError, QatResult};
use crate::instance::{Instance, InstanceState};
use crate::resolver::InstanceResolver;
use std::sync::Arc;

/// High-level QAT engine providing blocking access to accelerator
/// operations.
///
/// `QatEngine` brings up the memory subsystem and session, selects and
/// starts one crypto instance, and registers address translation. Dropping
/// it tears everything down in reverse order: stop instance, stop session,
/// destroy memory.
///
/// The engine is `Sync`; share it between threads to issue operations
/// concurrently.
///
/// # Example
///
/// ```rust,no_run
/// use qat_rust::{QatConfig, QatEngine, QatError};
///
/// fn main() -> Result<(), QatError> {
///     let engine = QatEngine::open(&QatConfig::default())?;
///
///     let digest = engine.hash_sha512(b"Hello, QAT!")?;
///     let signature = engine.eddsa_sign(&[0u8; 32], &digest)?;
///     println!("signature: {:02x?}", &signature[..8]);
///
///     Ok(())
/// }
/// ```
pub struct QatEngine {
    ctx: QatContext,
    instance: Option<Instance>,
}

impl QatEngine {
    /// Open the engine on QAT hardware.
    ///
    /// # Platform Behavior
    ///
    /// - **Linux** with the `qat-hw` feature: uses `libqat` / `libusdm`
    /// - otherwise: returns [`QatError::PlatformNotSupported`]; use
    ///   [`QatEngine::open_with`] and a [`SimDriver`](crate::SimDriver)
    ///
    /// # Errors
    ///
    /// Any error from the bring-up sequence; see [`QatEngine::open_with`].
    #[cfg(all(target_os = "linux", feature = "qat-hw"))]
    pub fn open(config: &QatConfig) -> QatResult<Self> {
        Self::open_with(Arc::new(crate::hw::QatHwDriver::new()), config)
    }

    /// Hardware access needs Linux and the `qat-hw` feature.
    #[cfg(not(all(target_os = "linux", feature = "qat-hw")))]
    pub fn open(_config: &QatConfig) -> QatResult<Self> {
        Err(QatError::PlatformNotSupported)
    }

    /// Open the engine over an explicit driver.
    ///
    /// Runs memory init, session start, instance resolution, instance start
    /// and address translation. If any step fails, the steps already done
    /// are undone before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`QatError::ResourceInit`] if the memory subsystem fails
    /// - [`QatError::Session`] if the session cannot be started
    /// - [`QatError::InstanceQuery`] / [`QatError::NoInstance`] from discovery
    /// - [`QatError::InstanceLifecycle`] if the instance cannot be started
    /// - [`QatError::AddressTranslation`] if translation is rejected
    pub fn open_with(driver: Arc<dyn Driver>, config: &QatConfig) -> QatResult<Self> {
        log::info!("opening QAT engine on {}", driver.name());
        let ctx = QatContext::from_arc(driver);

        ctx.init_memory()?;
        let memory_guard = scopeguard::guard(ctx.clone(), |ctx| ctx.destroy_memory());

        ctx.start_session(&config.process_name)?;
        let session_guard = scopeguard::guard(ctx.clone(), |ctx| {
            if let Err(e) = ctx.stop_session() {
                log::error!("rollback: {}", e);
            }
        });

        // A failure below drops `instance` first, which stops it.
        let mut instance = InstanceResolver::new(&ctx)
            .with_service_type(config.service_type)
            .with_max_instances(config.max_instances)
            .get_instance()?;
        instance.set_timeout(config.completion_timeout);
        instance.start()?;
        instance.set_address_translation()?;

        scopeguard::ScopeGuard::into_inner(session_guard);
        scopeguard::ScopeGuard::into_inner(memory_guard);

        log::info!("QAT engine ready on instance {}", instance.raw());
        Ok(Self {
            ctx,
            instance: Some(instance),
        })
    }

    /// The process context.
    pub fn context(&self) -> &QatContext {
        &self.ctx
    }

    /// The started instance.
    ///
    /// # Errors
    ///
    /// [`QatError::InstanceLifecycle`] after [`QatEngine::close`].
    pub fn instance(&self) -> QatResult<&Instance> {
        self.instance.as_ref().ok_or(QatError::InstanceLifecycle {
            op: "instance",
            status: crate::status::Status::Fail,
        })
    }

    /// Sign `digest` with `private_key`.
    pub fn eddsa_sign(&self, private_key: &[u8], digest: &[u8]) -> QatResult<[u8; SIGNATURE_LEN]> {
        self.instance()?.eddsa_sign(private_key, digest)
    }

    /// Verify `signature` over `digest` with `public_key`.
    pub fn eddsa_verify(
        &self,
        public_key: &[u8],
        digest: &[u8],
        signature: &[u8],
    ) -> QatResult<bool> {
        self.instance()?.eddsa_verify(public_key, digest, signature)
    }

    /// SHA-512 digest of `message`.
    pub fn hash_sha512(&self, message: &[u8]) -> QatResult<[u8; SHA512_LEN]> {
        self.instance()?.hash_sha512(message)
    }

    /// Async variant of [`QatEngine::eddsa_sign`].
    #[cfg(feature = "async")]
    pub async fn eddsa_sign_async(
        &self,
        private_key: &[u8],
        digest: &[u8],
    ) -> QatResult<[u8; SIGNATURE_LEN]> {
        self.instance()?.eddsa_sign_async(private_key, digest).await
    }

    /// Tear down in order and report the first failure.
    ///
    /// All steps run even if an earlier one fails. Memory teardown is
    /// skipped (and logged) while timed-out requests still hold buffers.
    pub fn close(mut self) -> QatResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> QatResult<()> {
        let mut first_err = None;

        if let Some(instance) = self.instance.take() {
            if matches!(instance.state(), InstanceState::Started { .. }) {
                if let Err(e) = instance.stop() {
                    log::error!("shutdown: {}", e);
                    first_err.get_or_insert(e);
                }
            }
        }
        if self.ctx.is_session_running() {
            if let Err(e) = self.ctx.stop_session() {
                log::error!("shutdown: {}", e);
                first_err.get_or_insert(e);
            }
        }
        self.ctx.destroy_memory();

        log::info!("QAT engine closed ({:?})", self.ctx.lifecycle());
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for QatEngine {
    fn drop(&mut self) {
        if self.instance.is_some() {
            let _ = self.shutdown();
        }
    }
}

impl std::fmt::Debug for QatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QatEngine")
            .field("ctx", &self.ctx)
            .field("instance", &self.instance)
            .finish()
    }
}
