// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Accelerator service types.
//!
//! The raw values match `CpaAccelerationServiceType` in `cpa.h`.

use bitflags::bitflags;

bitflags! {
    /// Capability classes an instance (or a service-type query) covers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ServiceFlags: u32 {
        /// Symmetric crypto (ciphers, hashes).
        const SYMMETRIC = 1 << 0;
        /// Asymmetric crypto (RSA, ECDSA, EdDSA).
        const ASYMMETRIC = 1 << 1;
    }
}

/// Category of accelerator capability used when querying instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ServiceType {
    /// Generic crypto, a superset of the symmetric and asymmetric services.
    Crypto = 0,
    /// Asymmetric crypto only.
    CryptoAsym = 6,
    /// Symmetric crypto only.
    CryptoSym = 7,
}

impl ServiceType {
    /// Returns the raw `CpaAccelerationServiceType` value.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Capability classes covered by this service type.
    pub const fn flags(self) -> ServiceFlags {
        match self {
            Self::Crypto => ServiceFlags::SYMMETRIC.union(ServiceFlags::ASYMMETRIC),
            Self::CryptoAsym => ServiceFlags::ASYMMETRIC,
            Self::CryptoSym => ServiceFlags::SYMMETRIC,
        }
    }

    /// Returns true if every capability of `other` is covered by `self`.
    pub const fn subsumes(self, other: ServiceType) -> bool {
        self.flags().contains(other.flags())
    }

    /// The broader service type to query when this one yields no instances.
    ///
    /// Fallback only ever widens: narrow types map to [`ServiceType::Crypto`]
    /// and `Crypto` maps to itself.
    pub const fn broadened(self) -> ServiceType {
        Self::Crypto
    }

    /// Returns a human-readable name for the service type.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Crypto => "CRYPTO",
            Self::CryptoAsym => "CRYPTO_ASYM",
            Self::CryptoSym => "CRYPTO_SYM",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_raw())
    }
}
