// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Accelerator status codes.
//!
//! These values match the `CpaStatus` definitions in the QAT API header
//! `cpa.h`. This crate only branches on success vs. non-success; the
//! remaining variants exist so that errors can be logged meaningfully.

/// Raw `CPA_STATUS_SUCCESS`.
pub const CPA_STATUS_SUCCESS: i32 = 0;
/// Raw `CPA_STATUS_FAIL`.
pub const CPA_STATUS_FAIL: i32 = -1;
/// Raw `CPA_STATUS_RETRY`.
pub const CPA_STATUS_RETRY: i32 = -2;
/// Raw `CPA_STATUS_RESOURCE`.
pub const CPA_STATUS_RESOURCE: i32 = -3;
/// Raw `CPA_STATUS_INVALID_PARAM`.
pub const CPA_STATUS_INVALID_PARAM: i32 = -4;
/// Raw `CPA_STATUS_FATAL`.
pub const CPA_STATUS_FATAL: i32 = -5;
/// Raw `CPA_STATUS_UNSUPPORTED`.
pub const CPA_STATUS_UNSUPPORTED: i32 = -6;
/// Raw `CPA_STATUS_RESTARTING`.
pub const CPA_STATUS_RESTARTING: i32 = -7;

/// Status reported by the accelerator subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Call completed successfully.
    Success,
    /// Generic failure.
    Fail,
    /// Resource temporarily unavailable, the caller may retry.
    Retry,
    /// Out of memory or other resource.
    Resource,
    /// A parameter was rejected.
    InvalidParam,
    /// Unrecoverable device error.
    Fatal,
    /// Operation not supported by this instance.
    Unsupported,
    /// Device is restarting.
    Restarting,
    /// Any code not listed above.
    Unknown(i32),
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        match code {
            CPA_STATUS_SUCCESS => Self::Success,
            CPA_STATUS_FAIL => Self::Fail,
            CPA_STATUS_RETRY => Self::Retry,
            CPA_STATUS_RESOURCE => Self::Resource,
            CPA_STATUS_INVALID_PARAM => Self::InvalidParam,
            CPA_STATUS_FATAL => Self::Fatal,
            CPA_STATUS_UNSUPPORTED => Self::Unsupported,
            CPA_STATUS_RESTARTING => Self::Restarting,
            other => Self::Unknown(other),
        }
    }
}

impl Status {
    /// Returns the raw `CpaStatus` value.
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => CPA_STATUS_SUCCESS,
            Self::Fail => CPA_STATUS_FAIL,
            Self::Retry => CPA_STATUS_RETRY,
            Self::Resource => CPA_STATUS_RESOURCE,
            Self::InvalidParam => CPA_STATUS_INVALID_PARAM,
            Self::Fatal => CPA_STATUS_FATAL,
            Self::Unsupported => CPA_STATUS_UNSUPPORTED,
            Self::Restarting => CPA_STATUS_RESTARTING,
            Self::Unknown(code) => code,
        }
    }

    /// Returns true if this status indicates success.
    #[inline]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Converts the status into a `Result`, keeping the failing status.
    #[inline]
    pub fn ok(self) -> Result<(), Status> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Returns a human-readable name for the status.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
            Self::Retry => "RETRY",
            Self::Resource => "RESOURCE",
            Self::InvalidParam => "INVALID_PARAM",
            Self::Fatal => "FATAL",
            Self::Unsupported => "UNSUPPORTED",
            Self::Restarting => "RESTARTING",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_raw() {
        assert_eq!(Status::from(0), Status::Success);
        assert_eq!(Status::from(-1), Status::Fail);
        assert_eq!(Status::from(-2), Status::Retry);
        assert_eq!(Status::from(-3), Status::Resource);
        assert_eq!(Status::from(-6), Status::Unsupported);
        assert_eq!(Status::from(-42), Status::Unknown(-42));
    }

    #[test]
    fn test_status_code_matches_raw() {
        for code in [0, -1, -2, -3, -4, -5, -6, -7, 17] {
            assert_eq!(Status::from(code).code(), code);
        }
    }

    #[test]
    fn test_status_ok() {
        assert!(Status::Success.ok().is_ok());
        assert_eq!(Status::Retry.ok(), Err(Status::Retry));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", Status::Success), "SUCCESS (0)");
        assert_eq!(format!("{}", Status::Resource), "RESOURCE (-3)");
        assert_eq!(format!("{}", Status::Unknown(9)), "UNKNOWN (9)");
    }
}
