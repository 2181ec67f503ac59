// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Error types for QAT operations.

use crate::status::Status;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during QAT operations.
///
/// Every accelerator-facing variant carries the name of the failing
/// operation and the status code the subsystem reported, so callers can log
/// it and decide on a retry policy. This crate never retries on its own.
#[derive(Debug, Error)]
pub enum QatError {
    /// The DMA memory subsystem could not be prepared.
    #[error("{op}: memory subsystem init failed: {status}")]
    ResourceInit { op: &'static str, status: Status },

    /// Session registration or deregistration failed.
    #[error("{op}: session error: {status}")]
    Session { op: &'static str, status: Status },

    /// No crypto instance is available.
    #[error("{op}: no crypto instances found")]
    NoInstance { op: &'static str },

    /// Counting or fetching instances failed.
    #[error("{op}: instance query failed: {status}")]
    InstanceQuery { op: &'static str, status: Status },

    /// Starting or stopping an instance failed, or the instance is in the
    /// wrong state for the requested call.
    #[error("{op}: instance lifecycle error: {status}")]
    InstanceLifecycle { op: &'static str, status: Status },

    /// Address translation registration was rejected.
    #[error("{op}: address translation rejected: {status}")]
    AddressTranslation { op: &'static str, status: Status },

    /// The request was refused synchronously; no completion will follow.
    #[error("{op}: submission failed: {status}")]
    Submission { op: &'static str, status: Status },

    /// The request completed with a failure status.
    #[error("{op}: operation failed: {status}")]
    Operation { op: &'static str, status: Status },

    /// No completion arrived within the configured timeout.
    #[error("{op}: no completion after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },

    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Buffer size mismatch.
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Platform not supported.
    #[error("platform not supported: QAT requires Linux with the qat driver")]
    PlatformNotSupported,
}

impl QatError {
    /// Status code reported by the accelerator, if the error carries one.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::ResourceInit { status, .. }
            | Self::Session { status, .. }
            | Self::InstanceQuery { status, .. }
            | Self::InstanceLifecycle { status, .. }
            | Self::AddressTranslation { status, .. }
            | Self::Submission { status, .. }
            | Self::Operation { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Name of the operation that failed, if known.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            Self::ResourceInit { op, .. }
            | Self::Session { op, .. }
            | Self::NoInstance { op }
            | Self::InstanceQuery { op, .. }
            | Self::InstanceLifecycle { op, .. }
            | Self::AddressTranslation { op, .. }
            | Self::Submission { op, .. }
            | Self::Operation { op, .. }
            | Self::Timeout { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Returns true for failures scoped to a single bridged call. The
    /// instance stays usable after these.
    pub fn is_per_operation(&self) -> bool {
        matches!(
            self,
            Self::Submission { .. }
                | Self::Operation { .. }
                | Self::Timeout { .. }
                | Self::InvalidArgument(_)
                | Self::BufferSizeMismatch { .. }
        )
    }
}

/// Result type alias for QAT operations.
pub type QatResult<T> = Result<T, QatError>;
