// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Software-simulated accelerator.
//!
//! [`SimDriver`] implements [`Driver`] without hardware. It behaves like the
//! QAT user-space library where it matters to this crate:
//!
//! - instances must be discovered inside a session, started, and given an
//!   address translation function before they accept requests
//! - completions run on a different thread than the submitter, after a
//!   configurable (optionally randomized) delay
//! - every capability can be made to fail with a chosen status
//!
//! SHA-512 is computed in software with `sha2`. The default signer is not a
//! real signature scheme: it hashes key and digest together, and the
//! verifier treats the public key as equal to the private key. Install a
//! custom signer with [`SimDriver::with_signer`] when exact output matters.

use crate::bridge::Completion;
use crate::crypto::SIGNATURE_LEN;
use crate::driver::{Driver, HashRequest, RawInstance, SignRequest, VerifyRequest, VirtToPhys};
use crate::service::ServiceType;
use crate::status::Status;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha512};
use std::alloc::{self, Layout};
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Alignment of simulated DMA allocations.
const SIM_DMA_ALIGN: usize = 64;

/// Offset added to virtual addresses to form simulated physical addresses.
const SIM_PHYS_OFFSET: u64 = 0x8000_0000_0000;

/// Spacing between simulated instance handles.
const SIM_HANDLE_STRIDE: usize = 0x100;

type Signer = dyn Fn(&[u8], &[u8]) -> [u8; SIGNATURE_LEN] + Send + Sync;
type Verifier = dyn Fn(&[u8], &[u8], &[u8]) -> bool + Send + Sync;

/// Capability that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimFault {
    /// `start_session` returns the injected status.
    StartSession,
    /// `stop_session` returns the injected status.
    StopSession,
    /// `mem_init` returns the injected status.
    MemInit,
    /// `num_instances` returns the injected status.
    NumInstances,
    /// `get_instances` returns the injected status.
    GetInstances,
    /// `start_instance` returns the injected status.
    StartInstance,
    /// `stop_instance` returns the injected status.
    StopInstance,
    /// `set_address_translation` returns the injected status.
    AddressTranslation,
    /// Request submission returns the injected status synchronously.
    Submit,
    /// Requests are accepted but complete with the injected status.
    Complete,
}

#[derive(Default)]
struct SimState {
    session: bool,
    memory: bool,
    faults: HashMap<SimFault, Status>,
    started: HashSet<RawInstance>,
    translated: HashSet<RawInstance>,
    queries: HashMap<ServiceType, u32>,
    fetches: Vec<(ServiceType, usize)>,
    calls: Vec<&'static str>,
    submissions: usize,
}

/// Completion bookkeeping shared with worker threads.
#[derive(Default)]
struct Progress {
    pending: Mutex<usize>,
    idle: Condvar,
    completions: AtomicUsize,
}

impl Progress {
    fn begin(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn finish(&self) {
        self.completions.fetch_add(1, Ordering::AcqRel);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Simulated QAT accelerator.
pub struct SimDriver {
    counts: HashMap<ServiceType, u16>,
    delay: (Duration, Duration),
    signer: Arc<Signer>,
    verifier: Arc<Verifier>,
    state: Mutex<SimState>,
    progress: Arc<Progress>,
    live_allocations: AtomicUsize,
    rng: Mutex<StdRng>,
}

/// Default signer: SHA-512 over key and digest.
fn sim_sign(private_key: &[u8], digest: &[u8]) -> [u8; SIGNATURE_LEN] {
    let mut hasher = Sha512::new();
    hasher.update(private_key);
    hasher.update(digest);
    let mut signature = [0u8; SIGNATURE_LEN];
    signature.copy_from_slice(&hasher.finalize());
    signature
}

/// Default verifier: the public key stands in for the private key.
fn sim_verify(public_key: &[u8], digest: &[u8], signature: &[u8]) -> bool {
    sim_sign(public_key, digest).as_slice() == signature
}

/// Physical address of simulated DMA memory.
extern "C" fn sim_virt_to_phys(virt: *mut c_void) -> u64 {
    if virt.is_null() {
        0
    } else {
        (virt as usize as u64).wrapping_add(SIM_PHYS_OFFSET)
    }
}

impl SimDriver {
    /// Simulator with one generic crypto instance and sub-millisecond
    /// completion delays.
    pub fn new() -> Self {
        Self {
            counts: HashMap::from([(ServiceType::Crypto, 1)]),
            delay: (Duration::ZERO, Duration::from_millis(1)),
            signer: Arc::new(sim_sign),
            verifier: Arc::new(sim_verify),
            state: Mutex::new(SimState::default()),
            progress: Arc::new(Progress::default()),
            live_allocations: AtomicUsize::new(0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Draw completion delays from a fixed seed, so a run can be repeated.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Report `count` instances for `service`.
    pub fn with_instances(mut self, service: ServiceType, count: u16) -> Self {
        self.counts.insert(service, count);
        self
    }

    /// Complete each request after a delay drawn uniformly from `min..=max`.
    pub fn with_completion_delay(mut self, min: Duration, max: Duration) -> Self {
        self.delay = (min, max.max(min));
        self
    }

    /// Replace the signature function.
    pub fn with_signer<F>(mut self, signer: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> [u8; SIGNATURE_LEN] + Send + Sync + 'static,
    {
        self.signer = Arc::new(signer);
        self
    }

    /// Replace the verification function.
    pub fn with_verifier<F>(mut self, verifier: F) -> Self
    where
        F: Fn(&[u8], &[u8], &[u8]) -> bool + Send + Sync + 'static,
    {
        self.verifier = Arc::new(verifier);
        self
    }

    /// Make `fault` fail with `status` until cleared.
    pub fn inject(&self, fault: SimFault, status: Status) {
        self.lock().faults.insert(fault, status);
    }

    /// Remove an injected fault.
    pub fn clear(&self, fault: SimFault) {
        self.lock().faults.remove(&fault);
    }

    /// How often the instance count for `service` was queried.
    pub fn count_queries(&self, service: ServiceType) -> u32 {
        self.lock().queries.get(&service).copied().unwrap_or(0)
    }

    /// `(service, count)` of every handle fetch, in call order.
    pub fn fetch_requests(&self) -> Vec<(ServiceType, usize)> {
        self.lock().fetches.clone()
    }

    /// Names of the driver calls made so far, in order.
    pub fn call_log(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    /// Requests submitted, including refused ones.
    pub fn submissions(&self) -> usize {
        self.lock().submissions
    }

    /// Completions fired.
    pub fn completions(&self) -> usize {
        self.progress.completions.load(Ordering::Acquire)
    }

    /// Instances currently started.
    pub fn started_instance_count(&self) -> usize {
        self.lock().started.len()
    }

    /// DMA allocations not yet freed.
    pub fn live_allocations(&self) -> usize {
        self.live_allocations.load(Ordering::Acquire)
    }

    /// Block until every accepted request has completed.
    pub fn wait_idle(&self) {
        let mut pending = self
            .progress
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            pending = self
                .progress
                .idle
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call and return the injected status, if any.
    fn enter(&self, state: &mut SimState, call: &'static str, fault: SimFault) -> Option<Status> {
        state.calls.push(call);
        state.faults.get(&fault).copied()
    }

    fn handle(service: ServiceType, index: usize) -> RawInstance {
        let base = (service.as_raw() as usize + 1) << 24;
        RawInstance::from_raw(base + (index + 1) * SIM_HANDLE_STRIDE)
    }

    fn is_known(&self, instance: RawInstance) -> bool {
        self.counts.iter().any(|(&service, &count)| {
            (0..usize::from(count)).any(|i| Self::handle(service, i) == instance)
        })
    }

    fn next_delay(&self) -> Duration {
        let (min, max) = self.delay;
        if max <= min {
            return min;
        }
        let span = u64::try_from((max - min).as_nanos()).unwrap_or(u64::MAX);
        let offset = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..=span);
        min + Duration::from_nanos(offset)
    }

    /// Accept a request and complete it on a worker thread.
    fn submit<T, W>(
        &self,
        call: &'static str,
        instance: RawInstance,
        request: T,
        done: Completion<T>,
        work: W,
    ) -> Status
    where
        T: Send + 'static,
        W: FnOnce(&mut T) + Send + 'static,
    {
        let outcome = {
            let mut state = self.lock();
            state.submissions += 1;
            if let Some(status) = self.enter(&mut state, call, SimFault::Submit) {
                return status;
            }
            if !state.started.contains(&instance) || !state.translated.contains(&instance) {
                log::debug!("sim: {} on unusable instance {}", call, instance);
                return Status::InvalidParam;
            }
            state
                .faults
                .get(&SimFault::Complete)
                .copied()
                .unwrap_or(Status::Success)
        };

        let delay = self.next_delay();
        let progress = Arc::clone(&self.progress);
        progress.begin();
        thread::spawn(move || {
            thread::sleep(delay);
            let mut request = request;
            if outcome.is_success() {
                work(&mut request);
            }
            done.complete(outcome, request);
            progress.finish();
        });
        Status::Success
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDriver")
            .field("counts", &self.counts)
            .field("delay", &self.delay)
            .finish()
    }
}

impl Driver for SimDriver {
    fn name(&self) -> &'static str {
        "qat-sim"
    }

    fn start_session(&self, _process_name: &str) -> Status {
        let mut state = self.lock();
        if let Some(status) = self.enter(&mut state, "start_session", SimFault::StartSession) {
            return status;
        }
        if state.session {
            return Status::Fail;
        }
        state.session = true;
        Status::Success
    }

    fn stop_session(&self) -> Status {
        let mut state = self.lock();
        if let Some(status) = self.enter(&mut state, "stop_session", SimFault::StopSession) {
            state.session = false;
            return status;
        }
        if !state.session {
            return Status::Fail;
        }
        state.session = false;
        Status::Success
    }

    fn mem_init(&self) -> Status {
        let mut state = self.lock();
        if let Some(status) = self.enter(&mut state, "mem_init", SimFault::MemInit) {
            return status;
        }
        state.memory = true;
        Status::Success
    }

    fn mem_destroy(&self) {
        let mut state = self.lock();
        state.calls.push("mem_destroy");
        state.memory = false;
    }

    fn mem_alloc(&self, len: usize) -> *mut u8 {
        if !self.lock().memory {
            return std::ptr::null_mut();
        }
        let Ok(layout) = Layout::from_size_align(len, SIM_DMA_ALIGN) else {
            return std::ptr::null_mut();
        };
        if layout.size() == 0 {
            return std::ptr::null_mut();
        }
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if !ptr.is_null() {
            self.live_allocations.fetch_add(1, Ordering::AcqRel);
        }
        ptr
    }

    unsafe fn mem_free(&self, ptr: *mut u8, len: usize) {
        if ptr.is_null() {
            return;
        }
        if let Ok(layout) = Layout::from_size_align(len, SIM_DMA_ALIGN) {
            // SAFETY: caller guarantees ptr came from mem_alloc with this len.
            unsafe { alloc::dealloc(ptr, layout) };
            self.live_allocations.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn virt_to_phys_fn(&self) -> VirtToPhys {
        sim_virt_to_phys
    }

    fn num_instances(&self, service: ServiceType, count: &mut u16) -> Status {
        let mut state = self.lock();
        if let Some(status) = self.enter(&mut state, "num_instances", SimFault::NumInstances) {
            return status;
        }
        if !state.session {
            return Status::Fail;
        }
        *state.queries.entry(service).or_default() += 1;
        *count = self.counts.get(&service).copied().unwrap_or(0);
        Status::Success
    }

    fn get_instances(&self, service: ServiceType, out: &mut [RawInstance]) -> Status {
        let mut state = self.lock();
        state.fetches.push((service, out.len()));
        if let Some(status) = self.enter(&mut state, "get_instances", SimFault::GetInstances) {
            return status;
        }
        if !state.session {
            return Status::Fail;
        }
        let available = usize::from(self.counts.get(&service).copied().unwrap_or(0));
        if out.len() > available {
            return Status::InvalidParam;
        }
        for (index, slot) in out.iter_mut().enumerate() {
            *slot = Self::handle(service, index);
        }
        Status::Success
    }

    fn start_instance(&self, instance: RawInstance) -> Status {
        let mut state = self.lock();
        if let Some(status) = self.enter(&mut state, "start_instance", SimFault::StartInstance) {
            return status;
        }
        if !state.session || !self.is_known(instance) {
            return Status::InvalidParam;
        }
        if !state.started.insert(instance) {
            return Status::Fail;
        }
        Status::Success
    }

    fn stop_instance(&self, instance: RawInstance) -> Status {
        let mut state = self.lock();
        let injected = self.enter(&mut state, "stop_instance", SimFault::StopInstance);
        state.translated.remove(&instance);
        let was_started = state.started.remove(&instance);
        match injected {
            Some(status) => status,
            None if was_started => Status::Success,
            None => Status::Fail,
        }
    }

    fn set_address_translation(&self, instance: RawInstance, translate: VirtToPhys) -> Status {
        let mut state = self.lock();
        if let Some(status) = self.enter(
            &mut state,
            "set_address_translation",
            SimFault::AddressTranslation,
        ) {
            return status;
        }
        if !state.started.contains(&instance) {
            return Status::Fail;
        }
        // SAFETY: the translation function accepts null and returns 0 for it.
        let _ = unsafe { translate(std::ptr::null_mut()) };
        state.translated.insert(instance);
        Status::Success
    }

    fn eddsa_sign(
        &self,
        instance: RawInstance,
        request: SignRequest,
        done: Completion<SignRequest>,
    ) -> Status {
        let signer = Arc::clone(&self.signer);
        self.submit("eddsa_sign", instance, request, done, move |req| {
            let signature = signer(req.private_key.as_slice(), req.digest.as_slice());
            req.signature.as_mut_slice().copy_from_slice(&signature);
        })
    }

    fn eddsa_verify(
        &self,
        instance: RawInstance,
        request: VerifyRequest,
        done: Completion<VerifyRequest>,
    ) -> Status {
        let verifier = Arc::clone(&self.verifier);
        self.submit("eddsa_verify", instance, request, done, move |req| {
            req.verified = verifier(
                req.public_key.as_slice(),
                req.digest.as_slice(),
                req.signature.as_slice(),
            );
        })
    }

    fn hash_sha512(
        &self,
        instance: RawInstance,
        request: HashRequest,
        done: Completion<HashRequest>,
    ) -> Status {
        self.submit("hash_sha512", instance, request, done, |req| {
            let digest = Sha512::digest(&req.message.as_slice()[..req.message_len]);
            req.digest.as_mut_slice().copy_from_slice(&digest);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_distinct_per_service() {
        let a = SimDriver::handle(ServiceType::Crypto, 0);
        let b = SimDriver::handle(ServiceType::Crypto, 1);
        let c = SimDriver::handle(ServiceType::CryptoSym, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_null());
    }

    #[test]
    fn test_num_instances_requires_session() {
        let driver = SimDriver::new();
        let mut count = 0;
        assert_eq!(
            driver.num_instances(ServiceType::Crypto, &mut count),
            Status::Fail
        );
        assert_eq!(driver.start_session("SSL"), Status::Success);
        assert_eq!(
            driver.num_instances(ServiceType::Crypto, &mut count),
            Status::Success
        );
        assert_eq!(count, 1);
    }

    #[test]
    fn test_alloc_requires_memory_init() {
        let driver = SimDriver::new();
        assert!(driver.mem_alloc(32).is_null());
        assert_eq!(driver.mem_init(), Status::Success);
        let ptr = driver.mem_alloc(32);
        assert!(!ptr.is_null());
        assert_eq!(driver.live_allocations(), 1);
        unsafe { driver.mem_free(ptr, 32) };
        assert_eq!(driver.live_allocations(), 0);
    }

    #[test]
    fn test_virt_to_phys() {
        assert_eq!(sim_virt_to_phys(std::ptr::null_mut()), 0);
        let addr = 0x1000usize as *mut c_void;
        assert_eq!(sim_virt_to_phys(addr), 0x1000 + SIM_PHYS_OFFSET);
    }

    #[test]
    fn test_delay_within_bounds() {
        let driver = SimDriver::new()
            .with_completion_delay(Duration::from_millis(2), Duration::from_millis(5));
        for _ in 0..100 {
            let delay = driver.next_delay();
            assert!(delay >= Duration::from_millis(2));
            assert!(delay <= Duration::from_millis(5));
        }
    }

    #[test]
    fn test_seeded_delays_repeat() {
        let delays = |seed| {
            let driver = SimDriver::new()
                .with_completion_delay(Duration::ZERO, Duration::from_millis(10))
                .with_seed(seed);
            (0..32).map(|_| driver.next_delay()).collect::<Vec<_>>()
        };
        assert_eq!(delays(7), delays(7));
        assert_ne!(delays(7), delays(8));
    }

    #[test]
    fn test_fixed_delay() {
        let driver = SimDriver::new()
            .with_completion_delay(Duration::from_millis(3), Duration::from_millis(3));
        assert_eq!(driver.next_delay(), Duration::from_millis(3));
    }

    #[test]
    fn test_injected_fault_and_clear() {
        let driver = SimDriver::new();
        driver.inject(SimFault::StartSession, Status::Restarting);
        assert_eq!(driver.start_session("SSL"), Status::Restarting);
        driver.clear(SimFault::StartSession);
        assert_eq!(driver.start_session("SSL"), Status::Success);
        assert_eq!(driver.call_log(), vec!["start_session", "start_session"]);
    }
}
