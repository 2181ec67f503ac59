// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! # Intel QAT (QuickAssist Technology) Rust Bindings
//!
//! This crate provides a synchronous Rust facade over Intel's QuickAssist
//! crypto offload engine. The accelerator completes requests through
//! callbacks on its own threads; this crate turns each request into a
//! blocking call.
//!
//! ## Supported Operations
//!
//! - EdDSA (Ed25519) signing
//! - EdDSA verification (simulated backend)
//! - SHA-512 hashing (simulated backend)
//!
//! ## Lifecycle
//!
//! ```text
//! init_memory -> start_session -> get_instance -> start -> set_address_translation
//!     -> operations (any thread) ->
//! stop instance -> stop_session -> destroy_memory
//! ```
//!
//! [`QatEngine`] runs the whole sequence and undoes it on drop. The
//! individual steps are available on [`QatContext`] and [`Instance`].
//!
//! ## Backends
//!
//! | Backend       | Feature  | Platform | Notes                                |
//! |---------------|----------|----------|--------------------------------------|
//! | `QatHwDriver` | `qat-hw` | Linux    | links `libqat`, `libusdm`            |
//! | `SimDriver`   | always   | any      | software, for tests and development  |
//!
//! ## Example
//!
//! ```rust
//! use qat_rust::{QatConfig, QatEngine, QatError, SimDriver};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), QatError> {
//!     let engine = QatEngine::open_with(Arc::new(SimDriver::new()), &QatConfig::default())?;
//!
//!     let digest = engine.hash_sha512(b"Hello, QAT!")?;
//!     let signature = engine.eddsa_sign(&[0u8; 32], &digest)?;
//!     assert_eq!(signature.len(), 64);
//!
//!     engine.close()
//! }
//! ```
//!
//! ## Requirements (hardware backend)
//!
//! - Intel QAT 4xxx (or later) device bound to the `qat_4xxx` driver
//! - `qatlib` built and installed; `QATLIB_BUILD` pointing at its build tree
//! - A `[SSL]` (or custom) section in the QAT configuration

pub mod bridge;
pub mod config;
pub mod context;
pub mod crypto;
pub mod driver;
pub mod engine;
pub mod error;
#[cfg(all(target_os = "linux", feature = "qat-hw"))]
pub mod hw;
pub mod instance;
pub mod memory;
pub mod resolver;
pub mod service;
pub mod sim;
pub mod status;

// Re-exports for convenient access
pub use bridge::{submit_and_wait, Completion};
#[cfg(feature = "async")]
pub use bridge::submit_and_await;
pub use config::QatConfig;
pub use context::{Lifecycle, QatContext};
pub use crypto::{PRIVATE_KEY_LEN, PUBLIC_KEY_LEN, SHA512_LEN, SIGNATURE_LEN};
pub use driver::{Driver, RawInstance};
pub use engine::QatEngine;
pub use error::{QatError, QatResult};
#[cfg(all(target_os = "linux", feature = "qat-hw"))]
pub use hw::QatHwDriver;
pub use instance::{Instance, InstanceState};
pub use memory::{DmaBuffer, MemoryPool};
pub use resolver::{InstanceResolver, MAX_INSTANCES};
pub use service::{ServiceFlags, ServiceType};
pub use sim::{SimDriver, SimFault};
pub use status::Status;
