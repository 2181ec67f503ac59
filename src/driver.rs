// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Boundary with the accelerator subsystem.
//!
//! [`Driver`] lists every capability this crate needs from the QAT user-space
//! library. [`crate::hw::QatHwDriver`] implements it on top of `libqat` and
//! `libusdm`; [`crate::sim::SimDriver`] implements it in software.
//!
//! # Completion contract
//!
//! The asynchronous methods (`eddsa_sign`, `eddsa_verify`, `hash_sha512`)
//! take ownership of a request and a [`Completion`]. When the method returns
//! [`Status::Success`] the driver must eventually call
//! [`Completion::complete`] exactly once, from any thread, handing the
//! request back. When it returns anything else the completion must never
//! fire; dropping it is the correct way to discard it.

use crate::bridge::Completion;
use crate::memory::DmaBuffer;
use crate::service::ServiceType;
use crate::status::Status;
use std::ffi::c_void;

/// Virtual-to-physical translation function registered with an instance.
///
/// Matches `CpaVirtualToPhysical` from `cpa.h`.
pub type VirtToPhys = unsafe extern "C" fn(*mut c_void) -> u64;

/// Opaque accelerator instance handle (`CpaInstanceHandle`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawInstance(usize);

impl RawInstance {
    /// The null handle.
    pub const NULL: RawInstance = RawInstance(0);

    /// Wrap a raw handle value.
    #[inline]
    pub const fn from_raw(value: usize) -> Self {
        Self(value)
    }

    /// Wrap a C handle pointer.
    #[inline]
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    /// Raw handle value.
    #[inline]
    pub const fn as_raw(self) -> usize {
        self.0
    }

    /// Handle as a C pointer.
    #[inline]
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    /// Returns true for the null handle.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for RawInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// EdDSA signature request.
#[derive(Debug)]
pub struct SignRequest {
    /// 32-byte private key.
    pub private_key: DmaBuffer,
    /// Message digest to sign.
    pub digest: DmaBuffer,
    /// 64-byte output, written by the driver before completion.
    pub signature: DmaBuffer,
}

/// EdDSA verification request.
#[derive(Debug)]
pub struct VerifyRequest {
    /// 32-byte public key.
    pub public_key: DmaBuffer,
    /// Message digest that was signed.
    pub digest: DmaBuffer,
    /// 64-byte signature to check.
    pub signature: DmaBuffer,
    /// Verification outcome, written by the driver before completion.
    pub verified: bool,
}

/// SHA-512 hash request.
#[derive(Debug)]
pub struct HashRequest {
    /// Input message; only the first `message_len` bytes are hashed.
    pub message: DmaBuffer,
    /// Message length. May be zero; `message` is never empty.
    pub message_len: usize,
    /// 64-byte output digest, written by the driver before completion.
    pub digest: DmaBuffer,
}

/// Capabilities required from the accelerator subsystem.
///
/// Every method reports a [`Status`]; this crate only distinguishes success
/// from failure, except for a zero instance count.
pub trait Driver: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Register the process under `process_name` (`icp_sal_userStart`).
    fn start_session(&self, process_name: &str) -> Status;

    /// Deregister the process (`icp_sal_userStop`).
    fn stop_session(&self) -> Status;

    /// Prepare the DMA allocator (`qaeMemInit`).
    fn mem_init(&self) -> Status;

    /// Release the DMA allocator (`qaeMemDestroy`).
    fn mem_destroy(&self);

    /// Allocate `len` bytes of DMA-capable memory. Returns null on failure.
    fn mem_alloc(&self, len: usize) -> *mut u8;

    /// Free memory obtained from [`Driver::mem_alloc`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `mem_alloc` on this driver with the same `len`
    /// and must not be used afterwards.
    unsafe fn mem_free(&self, ptr: *mut u8, len: usize);

    /// Translation function for memory obtained from [`Driver::mem_alloc`].
    fn virt_to_phys_fn(&self) -> VirtToPhys;

    /// Number of instances for `service` (`cpaGetNumInstances`).
    fn num_instances(&self, service: ServiceType, count: &mut u16) -> Status;

    /// Fill `out` with `out.len()` instance handles (`cpaGetInstances`).
    fn get_instances(&self, service: ServiceType, out: &mut [RawInstance]) -> Status;

    /// Start an instance (`cpaCyStartInstance`).
    fn start_instance(&self, instance: RawInstance) -> Status;

    /// Stop an instance (`cpaCyStopInstance`).
    fn stop_instance(&self, instance: RawInstance) -> Status;

    /// Register address translation (`cpaCySetAddressTranslation`).
    fn set_address_translation(&self, instance: RawInstance, translate: VirtToPhys) -> Status;

    /// Submit an EdDSA signature request.
    fn eddsa_sign(
        &self,
        instance: RawInstance,
        request: SignRequest,
        done: Completion<SignRequest>,
    ) -> Status;

    /// Submit an EdDSA verification request.
    fn eddsa_verify(
        &self,
        instance: RawInstance,
        request: VerifyRequest,
        done: Completion<VerifyRequest>,
    ) -> Status;

    /// Submit a SHA-512 hash request.
    fn hash_sha512(
        &self,
        instance: RawInstance,
        request: HashRequest,
        done: Completion<HashRequest>,
    ) -> Status;
}
