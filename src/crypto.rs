// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Blocking crypto operations on a started instance.
//!
//! Each operation validates its arguments, stages them into DMA buffers,
//! submits the request through the driver and waits for the completion
//! with [`submit_and_wait`].

use crate::bridge::submit_and_wait;
use crate::driver::{HashRequest, SignRequest, VerifyRequest};
use crate::error::{QatError, QatResult};
use crate::instance::Instance;

#[cfg(feature = "async")]
use crate::bridge::submit_and_await;

/// EdDSA (Ed25519) private key length in bytes.
pub const PRIVATE_KEY_LEN: usize = 32;

/// EdDSA (Ed25519) public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// EdDSA (Ed25519) signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Largest message digest accepted for signing (SHA-512 output).
pub const MAX_DIGEST_LEN: usize = 64;

/// SHA-512 digest length in bytes.
pub const SHA512_LEN: usize = 64;

fn check_len(buf: &[u8], expected: usize) -> QatResult<()> {
    if buf.len() != expected {
        return Err(QatError::BufferSizeMismatch {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn check_digest(digest: &[u8]) -> QatResult<()> {
    if digest.is_empty() || digest.len() > MAX_DIGEST_LEN {
        return Err(QatError::InvalidArgument(format!(
            "digest length {} not in 1..={}",
            digest.len(),
            MAX_DIGEST_LEN
        )));
    }
    Ok(())
}

fn to_array<const N: usize>(buf: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[..N]);
    out
}

impl Instance {
    fn sign_request(&self, private_key: &[u8], digest: &[u8]) -> QatResult<SignRequest> {
        check_len(private_key, PRIVATE_KEY_LEN)?;
        check_digest(digest)?;
        let memory = self.context().memory();
        Ok(SignRequest {
            private_key: memory.alloc_from(private_key)?,
            digest: memory.alloc_from(digest)?,
            signature: memory.alloc(SIGNATURE_LEN)?,
        })
    }

    /// Sign `digest` with `private_key` on the accelerator.
    ///
    /// Blocks until the signature is available or the completion timeout
    /// expires.
    ///
    /// # Errors
    ///
    /// - [`QatError::BufferSizeMismatch`] / [`QatError::InvalidArgument`]
    ///   for malformed input
    /// - [`QatError::Submission`] if the driver refuses the request
    /// - [`QatError::Operation`] if the request completes with a failure
    /// - [`QatError::Timeout`] if no completion arrives in time
    pub fn eddsa_sign(&self, private_key: &[u8], digest: &[u8]) -> QatResult<[u8; SIGNATURE_LEN]> {
        let _op = self.begin("eddsa_sign")?;
        let request = self.sign_request(private_key, digest)?;
        let driver = self.context().driver();
        let raw = self.raw();

        let done = submit_and_wait("eddsa_sign", self.timeout(), |completion| {
            driver.eddsa_sign(raw, request, completion)
        })?;
        Ok(to_array(done.signature.as_slice()))
    }

    /// Check an EdDSA `signature` over `digest` against `public_key`.
    ///
    /// Returns `Ok(false)` for a well-formed request whose signature does
    /// not verify.
    pub fn eddsa_verify(
        &self,
        public_key: &[u8],
        digest: &[u8],
        signature: &[u8],
    ) -> QatResult<bool> {
        check_len(public_key, PUBLIC_KEY_LEN)?;
        check_len(signature, SIGNATURE_LEN)?;
        check_digest(digest)?;

        let _op = self.begin("eddsa_verify")?;
        let memory = self.context().memory();
        let request = VerifyRequest {
            public_key: memory.alloc_from(public_key)?,
            digest: memory.alloc_from(digest)?,
            signature: memory.alloc_from(signature)?,
            verified: false,
        };
        let driver = self.context().driver();
        let raw = self.raw();

        let done = submit_and_wait("eddsa_verify", self.timeout(), |completion| {
            driver.eddsa_verify(raw, request, completion)
        })?;
        Ok(done.verified)
    }

    /// Compute the SHA-512 digest of `message` on the accelerator.
    ///
    /// An empty message is staged in a one-byte buffer with length zero.
    pub fn hash_sha512(&self, message: &[u8]) -> QatResult<[u8; SHA512_LEN]> {
        let _op = self.begin("hash_sha512")?;
        let memory = self.context().memory();
        let staged = if message.is_empty() {
            memory.alloc(1)?
        } else {
            memory.alloc_from(message)?
        };
        let request = HashRequest {
            message: staged,
            message_len: message.len(),
            digest: memory.alloc(SHA512_LEN)?,
        };
        let driver = self.context().driver();
        let raw = self.raw();

        let done = submit_and_wait("hash_sha512", self.timeout(), |completion| {
            driver.hash_sha512(raw, request, completion)
        })?;
        Ok(to_array(done.digest.as_slice()))
    }

    /// Async variant of [`Instance::eddsa_sign`].
    ///
    /// No timeout is applied; wrap the future in the runtime's timeout if
    /// needed. Dropping the future abandons the request.
    #[cfg(feature = "async")]
    pub async fn eddsa_sign_async(
        &self,
        private_key: &[u8],
        digest: &[u8],
    ) -> QatResult<[u8; SIGNATURE_LEN]> {
        let _op = self.begin("eddsa_sign")?;
        let request = self.sign_request(private_key, digest)?;
        let driver = self.context().driver();
        let raw = self.raw();

        let done = submit_and_await("eddsa_sign", |completion| {
            driver.eddsa_sign(raw, request, completion)
        })
        .await?;
        Ok(to_array(done.signature.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QatContext;
    use crate::sim::{SimDriver, SimFault};
    use crate::status::Status;
    use std::sync::Arc;
    use std::time::Duration;

    fn ready(driver: &Arc<SimDriver>) -> Instance {
        let ctx = QatContext::from_arc(driver.clone());
        ctx.start_session("SSL").unwrap();
        ctx.init_memory().unwrap();
        let instance = ctx.get_instance().unwrap();
        instance.start().unwrap();
        instance.set_address_translation().unwrap();
        instance
    }

    #[test]
    fn test_sign_returns_responder_output() {
        let driver = Arc::new(SimDriver::new().with_signer(|_, _| [0x5A; SIGNATURE_LEN]));
        let instance = ready(&driver);
        let signature = instance.eddsa_sign(&[0u8; 32], &[0xAB; 32]).unwrap();
        assert_eq!(signature, [0x5A; SIGNATURE_LEN]);
        assert_eq!(instance.in_flight(), 0);
    }

    #[test]
    fn test_sign_then_verify() {
        let driver = Arc::new(SimDriver::new());
        let instance = ready(&driver);
        let key = [7u8; 32];
        let digest = [1u8; 64];

        let signature = instance.eddsa_sign(&key, &digest).unwrap();
        assert!(instance.eddsa_verify(&key, &digest, &signature).unwrap());

        let mut forged = signature;
        forged[0] ^= 0xFF;
        assert!(!instance.eddsa_verify(&key, &digest, &forged).unwrap());
    }

    #[test]
    fn test_hash_sha512_abc() {
        let driver = Arc::new(SimDriver::new());
        let instance = ready(&driver);
        let digest = instance.hash_sha512(b"abc").unwrap();
        // FIPS 180-2 test vector.
        assert_eq!(&digest[..8], &[0xdd, 0xaf, 0x35, 0xa1, 0x93, 0x61, 0x7a, 0xba]);
    }

    #[test]
    fn test_hash_sha512_empty_message() {
        let driver = Arc::new(SimDriver::new());
        let instance = ready(&driver);
        let digest = instance.hash_sha512(b"").unwrap();
        // SHA-512 of the empty string.
        assert_eq!(&digest[..8], &[0xcf, 0x83, 0xe1, 0x35, 0x7e, 0xef, 0xb8, 0xbd]);
        assert_eq!(&digest[56..], &[0xa5, 0x38, 0x32, 0x7a, 0xf9, 0x27, 0xda, 0x3e]);
        assert_eq!(driver.submissions(), 1);
    }

    #[test]
    fn test_rejects_bad_lengths() {
        let driver = Arc::new(SimDriver::new());
        let instance = ready(&driver);

        assert!(matches!(
            instance.eddsa_sign(&[0u8; 31], &[0u8; 32]),
            Err(QatError::BufferSizeMismatch {
                expected: 32,
                actual: 31
            })
        ));
        assert!(matches!(
            instance.eddsa_sign(&[0u8; 32], &[]),
            Err(QatError::InvalidArgument(_))
        ));
        assert!(matches!(
            instance.eddsa_sign(&[0u8; 32], &[0u8; 65]),
            Err(QatError::InvalidArgument(_))
        ));
        assert!(matches!(
            instance.eddsa_verify(&[0u8; 32], &[0u8; 32], &[0u8; 63]),
            Err(QatError::BufferSizeMismatch { .. })
        ));
        assert_eq!(driver.submissions(), 0);
    }

    #[test]
    fn test_submission_failure_leaves_instance_usable() {
        let driver = Arc::new(SimDriver::new());
        let instance = ready(&driver);

        driver.inject(SimFault::Submit, Status::Retry);
        assert!(matches!(
            instance.eddsa_sign(&[0u8; 32], &[0u8; 32]),
            Err(QatError::Submission {
                op: "eddsa_sign",
                status: Status::Retry
            })
        ));
        assert_eq!(driver.completions(), 0);

        driver.clear(SimFault::Submit);
        assert!(instance.eddsa_sign(&[0u8; 32], &[0u8; 32]).is_ok());
        assert_eq!(driver.completions(), 1);
    }

    #[test]
    fn test_failed_completion_is_operation_error() {
        let driver = Arc::new(SimDriver::new());
        let instance = ready(&driver);
        driver.inject(SimFault::Complete, Status::Fatal);
        assert!(matches!(
            instance.hash_sha512(b"abc"),
            Err(QatError::Operation {
                op: "hash_sha512",
                status: Status::Fatal
            })
        ));
    }

    #[test]
    fn test_timeout_keeps_memory_alive_until_late_completion() {
        let driver = Arc::new(
            SimDriver::new()
                .with_completion_delay(Duration::from_millis(200), Duration::from_millis(200)),
        );
        let mut instance = ready(&driver);
        instance.set_timeout(Some(Duration::from_millis(10)));

        assert!(matches!(
            instance.eddsa_sign(&[0u8; 32], &[0u8; 32]),
            Err(QatError::Timeout { .. })
        ));

        // The driver still owns the request buffers.
        let ctx = instance.context().clone();
        assert!(ctx.memory().live_buffers() > 0);

        driver.wait_idle();
        assert_eq!(ctx.memory().live_buffers(), 0);
    }

    #[test]
    fn test_operation_without_memory() {
        let driver = Arc::new(SimDriver::new());
        let ctx = QatContext::from_arc(driver.clone());
        ctx.start_session("SSL").unwrap();
        let instance = ctx.get_instance().unwrap();
        instance.start().unwrap();
        instance.set_address_translation().unwrap();

        assert!(matches!(
            instance.eddsa_sign(&[0u8; 32], &[0u8; 32]),
            Err(QatError::ResourceInit { .. })
        ));
    }

    #[cfg(feature = "async")]
    #[test]
    fn test_sign_async() {
        let driver = Arc::new(SimDriver::new().with_signer(|_, _| [0x11; SIGNATURE_LEN]));
        let instance = ready(&driver);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let signature = runtime
            .block_on(instance.eddsa_sign_async(&[0u8; 32], &[0xAB; 32]))
            .unwrap();
        assert_eq!(signature, [0x11; SIGNATURE_LEN]);
    }
}
