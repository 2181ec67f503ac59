// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Hardware backend over the QAT user-space libraries.
//!
//! Links against `libqat`, `libusdm` and the EdDSA sample library (see
//! `build.rs`). The sample `edDsaSign` entry point blocks until the
//! accelerator answers, so requests are run on a worker thread and
//! completed from there.
//!
//! Verification and hashing have no sample entry point and report
//! [`Status::Unsupported`] at submission.

use crate::bridge::Completion;
use crate::driver::{Driver, HashRequest, RawInstance, SignRequest, VerifyRequest, VirtToPhys};
use crate::service::ServiceType;
use crate::status::Status;
use libc::{c_char, c_int};
use std::ffi::{c_void, CString};
use std::thread;

/// NUMA node used for DMA allocations.
const DMA_NUMA_NODE: c_int = 0;

/// Physical alignment of DMA allocations.
const DMA_ALIGN: usize = 64;

// `CpaStatus` is `Int32`, `Cpa16U` is `u16`, `CpaInstanceHandle` is `void *`
// and `CpaAccelerationServiceType` is a C enum (`u32`).
extern "C" {
    // icp_sal_user.h
    fn icp_sal_userStart(process_name: *const c_char) -> i32;
    fn icp_sal_userStop() -> i32;

    // qae_mem.h (libusdm_drv)
    fn qaeMemInit() -> i32;
    fn qaeMemDestroy();
    fn qaeMemAllocNUMA(size: usize, node: c_int, phys_alignment: usize) -> *mut c_void;
    fn qaeMemFreeNUMA(ptr: *mut *mut c_void);
    fn qaeVirtToPhysNUMA(virt: *mut c_void) -> u64;

    // cpa.h
    fn cpaGetNumInstances(service: u32, num_instances: *mut u16) -> i32;
    fn cpaGetInstances(service: u32, num_instances: u16, instances: *mut *mut c_void) -> i32;

    // cpa_cy_common.h
    fn cpaCyStartInstance(instance: *mut c_void) -> i32;
    fn cpaCyStopInstance(instance: *mut c_void) -> i32;
    fn cpaCySetAddressTranslation(instance: *mut c_void, translate: VirtToPhys) -> i32;

    // qat/cpa_eddsa_sample.h
    fn edDsaSign(
        private_key: *mut u8,
        message_hash: *mut u8,
        signature: *mut u8,
        instance: *mut c_void,
    ) -> i32;
}

/// Driver backed by QAT hardware.
#[derive(Debug, Default)]
pub struct QatHwDriver {
    _private: (),
}

impl QatHwDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Driver for QatHwDriver {
    fn name(&self) -> &'static str {
        "qat-hw"
    }

    fn start_session(&self, process_name: &str) -> Status {
        let Ok(name) = CString::new(process_name) else {
            return Status::InvalidParam;
        };
        // SAFETY: name is a valid NUL-terminated string for the call.
        Status::from(unsafe { icp_sal_userStart(name.as_ptr()) })
    }

    fn stop_session(&self) -> Status {
        // SAFETY: no arguments; the library checks its own state.
        Status::from(unsafe { icp_sal_userStop() })
    }

    fn mem_init(&self) -> Status {
        // SAFETY: no arguments.
        Status::from(unsafe { qaeMemInit() })
    }

    fn mem_destroy(&self) {
        // SAFETY: callers only destroy after every buffer was freed.
        unsafe { qaeMemDestroy() }
    }

    fn mem_alloc(&self, len: usize) -> *mut u8 {
        // SAFETY: returns null on failure.
        unsafe { qaeMemAllocNUMA(len, DMA_NUMA_NODE, DMA_ALIGN) as *mut u8 }
    }

    unsafe fn mem_free(&self, ptr: *mut u8, _len: usize) {
        let mut ptr = ptr as *mut c_void;
        // SAFETY: caller guarantees ptr came from mem_alloc.
        unsafe { qaeMemFreeNUMA(&mut ptr) }
    }

    fn virt_to_phys_fn(&self) -> VirtToPhys {
        qaeVirtToPhysNUMA
    }

    fn num_instances(&self, service: ServiceType, count: &mut u16) -> Status {
        // SAFETY: count is a valid out-pointer.
        Status::from(unsafe { cpaGetNumInstances(service.as_raw(), count) })
    }

    fn get_instances(&self, service: ServiceType, out: &mut [RawInstance]) -> Status {
        let Ok(num) = u16::try_from(out.len()) else {
            return Status::InvalidParam;
        };
        let mut handles = vec![std::ptr::null_mut::<c_void>(); out.len()];
        // SAFETY: handles has room for `num` entries.
        let status = Status::from(unsafe {
            cpaGetInstances(service.as_raw(), num, handles.as_mut_ptr())
        });
        if status.is_success() {
            for (slot, handle) in out.iter_mut().zip(handles) {
                *slot = RawInstance::from_ptr(handle);
            }
        }
        status
    }

    fn start_instance(&self, instance: RawInstance) -> Status {
        // SAFETY: handle was produced by cpaGetInstances.
        Status::from(unsafe { cpaCyStartInstance(instance.as_ptr()) })
    }

    fn stop_instance(&self, instance: RawInstance) -> Status {
        // SAFETY: handle was produced by cpaGetInstances.
        Status::from(unsafe { cpaCyStopInstance(instance.as_ptr()) })
    }

    fn set_address_translation(&self, instance: RawInstance, translate: VirtToPhys) -> Status {
        // SAFETY: handle was produced by cpaGetInstances.
        Status::from(unsafe { cpaCySetAddressTranslation(instance.as_ptr(), translate) })
    }

    fn eddsa_sign(
        &self,
        instance: RawInstance,
        request: SignRequest,
        done: Completion<SignRequest>,
    ) -> Status {
        let spawned = thread::Builder::new()
            .name("qat-eddsa-sign".to_string())
            .spawn(move || {
                let mut request = request;
                // SAFETY: all three buffers are DMA memory owned by the
                // request, which outlives the call.
                let status = Status::from(unsafe {
                    edDsaSign(
                        request.private_key.as_mut_ptr(),
                        request.digest.as_mut_ptr(),
                        request.signature.as_mut_ptr(),
                        instance.as_ptr(),
                    )
                });
                done.complete(status, request);
            });

        match spawned {
            Ok(_) => Status::Success,
            Err(e) => {
                log::error!("cannot spawn sign worker: {}", e);
                Status::Resource
            }
        }
    }

    fn eddsa_verify(
        &self,
        _instance: RawInstance,
        _request: VerifyRequest,
        _done: Completion<VerifyRequest>,
    ) -> Status {
        Status::Unsupported
    }

    fn hash_sha512(
        &self,
        _instance: RawInstance,
        _request: HashRequest,
        _done: Completion<HashRequest>,
    ) -> Status {
        Status::Unsupported
    }
}
