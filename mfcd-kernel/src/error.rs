// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed kernel-call failures.

use nix::errno::Errno;

/// A failed kernel control-option call.
///
/// Carries the operation name, the kernel `errno`, and a short human
/// description, per the contract in the kernel engine adapter's design:
/// every error surfaced by this crate names what it was trying to do and
/// why the kernel refused.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("{operation} failed: {errno} ({description})")]
pub struct KernelError {
    pub operation: &'static str,
    pub errno: Errno,
    pub description: &'static str,
}

impl KernelError {
    pub(crate) fn new(operation: &'static str, errno: Errno, description: &'static str) -> Self {
        KernelError {
            operation,
            errno,
            description,
        }
    }

    /// True if this failure means "another process already owns the
    /// multicast router in this network namespace" (fatal at startup).
    #[must_use]
    pub fn is_engine_conflict(&self) -> bool {
        self.errno == Errno::EADDRINUSE
    }

    /// True if this failure means the caller lacks `CAP_NET_ADMIN`.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.errno == Errno::EPERM
    }

    /// True for `del_vif`/`del_mfc` failures that mean "already gone" and
    /// may be treated as success by cleanup/unwind paths.
    #[must_use]
    pub fn is_already_absent(&self) -> bool {
        matches!(self.errno, Errno::EADDRNOTAVAIL | Errno::ENOENT)
    }
}
