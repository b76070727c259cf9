// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The kernel engine adapter: the one place this daemon speaks directly to
//! the kernel's multicast routing API.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::os::fd::{FromRawFd, OwnedFd};

use nix::sys::socket::setsockopt;
use nix::{setsockopt_impl, sockopt_impl};
use tracing::{debug, trace, warn};

use crate::error::KernelError;
use crate::records::{MfcCtl, VifCtl};

/// Option numbers at `IPPROTO_IP` level for the kernel's multicast routing
/// API. These are deliberately declared locally rather than pulled from
/// `libc`: they belong to a narrow, rarely-bound part of the kernel ABI, and
/// this crate must not depend on a particular `libc` version having bound
/// them.
const MRT_BASE: libc::c_int = 200;
const MRT_INIT: libc::c_int = MRT_BASE;
const MRT_DONE: libc::c_int = MRT_BASE + 1;
const MRT_ADD_VIF: libc::c_int = MRT_BASE + 2;
const MRT_DEL_VIF: libc::c_int = MRT_BASE + 3;
const MRT_ADD_MFC: libc::c_int = MRT_BASE + 4;
const MRT_DEL_MFC: libc::c_int = MRT_BASE + 5;

sockopt_impl!(MrtInit, SetOnly, libc::IPPROTO_IP, MRT_INIT, libc::c_int);
sockopt_impl!(MrtDone, SetOnly, libc::IPPROTO_IP, MRT_DONE, libc::c_int);
sockopt_impl!(MrtAddVif, SetOnly, libc::IPPROTO_IP, MRT_ADD_VIF, VifCtl);
sockopt_impl!(MrtDelVif, SetOnly, libc::IPPROTO_IP, MRT_DEL_VIF, VifCtl);
sockopt_impl!(MrtAddMfc, SetOnly, libc::IPPROTO_IP, MRT_ADD_MFC, MfcCtl);
sockopt_impl!(MrtDelMfc, SetOnly, libc::IPPROTO_IP, MRT_DEL_MFC, MfcCtl);

/// The narrow capability the transactional controller depends on: add/
/// remove a VIF, add/remove an MFC entry, and release the engine on
/// shutdown. Expressed as a trait so the controller can be exercised
/// against a fake implementation in tests without root or a real kernel.
pub trait MulticastEngine {
    /// Releases the in-kernel multicast router. Idempotent; safe to call
    /// more than once and on abnormal shutdown paths.
    fn close(&mut self) -> Result<(), KernelError>;

    fn add_vif(&self, vifi: u8, ifindex: u32) -> Result<(), KernelError>;

    /// `EADDRNOTAVAIL` ("already gone") is the caller's to treat as success
    /// during cleanup; this method surfaces it as-is.
    fn del_vif(&self, vifi: u8, ifindex: u32) -> Result<(), KernelError>;

    fn add_mfc(
        &self,
        origin: Ipv4Addr,
        group: Ipv4Addr,
        parent_vifi: u8,
        outputs: &BTreeSet<u8>,
    ) -> Result<(), KernelError>;

    /// `ENOENT` ("already gone") is the caller's to treat as success during
    /// cleanup; this method surfaces it as-is.
    fn del_mfc(&self, origin: Ipv4Addr, group: Ipv4Addr) -> Result<(), KernelError>;
}

/// The real adapter: a single raw IGMP socket holding the kernel's
/// "multicast router is initialized" state for this network namespace.
#[derive(Debug)]
pub struct KernelEngine {
    sock: Option<OwnedFd>,
}

impl KernelEngine {
    /// Opens a raw IPv4/IGMP socket and issues `MRT_INIT`.
    ///
    /// Fails with [`KernelError::is_engine_conflict`] true if another
    /// process in this namespace already owns the router, or
    /// [`KernelError::is_permission_denied`] true without `CAP_NET_ADMIN`.
    pub fn open() -> Result<Self, KernelError> {
        // SAFETY: a plain `socket(2)` call; the raw fd is immediately
        // checked and wrapped in an `OwnedFd` on success.
        let raw = unsafe { libc::socket(libc::AF_INET, libc::SOCK_RAW, libc::IPPROTO_IGMP) };
        let fd = nix::errno::Errno::result(raw).map_err(|errno| {
            KernelError::new("socket(AF_INET, SOCK_RAW, IPPROTO_IGMP)", errno, "open")
        })?;
        // SAFETY: `raw` was just checked to be a valid, freshly-opened fd
        // that nothing else owns.
        let sock = unsafe { OwnedFd::from_raw_fd(fd) };

        setsockopt(&sock, MrtInit, &1i32)
            .map_err(|errno| KernelError::new("MRT_INIT", errno, "initialize multicast router"))?;
        debug!("multicast router initialized");
        Ok(KernelEngine { sock: Some(sock) })
    }
}

impl MulticastEngine for KernelEngine {
    fn close(&mut self) -> Result<(), KernelError> {
        let Some(sock) = self.sock.take() else {
            trace!("close() called on already-closed engine; idempotent no-op");
            return Ok(());
        };
        let result = setsockopt(&sock, MrtDone, &1i32)
            .map_err(|errno| KernelError::new("MRT_DONE", errno, "finalize multicast router"));
        // The fd closes when `sock` drops here regardless of the MRT_DONE result.
        if let Err(ref e) = result {
            warn!("MRT_DONE failed during close: {e}");
        }
        result
    }

    fn add_vif(&self, vifi: u8, ifindex: u32) -> Result<(), KernelError> {
        let Some(sock) = &self.sock else {
            return Err(KernelError::new(
                "MRT_ADD_VIF",
                nix::errno::Errno::EBADF,
                "engine is closed",
            ));
        };
        let record = VifCtl::new(vifi, ifindex);
        setsockopt(sock, MrtAddVif, &record).map_err(|errno| {
            KernelError::new("MRT_ADD_VIF", errno, "add virtual interface")
        })?;
        trace!(vifi, ifindex, "MRT_ADD_VIF succeeded");
        Ok(())
    }

    fn del_vif(&self, vifi: u8, ifindex: u32) -> Result<(), KernelError> {
        let Some(sock) = &self.sock else {
            return Err(KernelError::new(
                "MRT_DEL_VIF",
                nix::errno::Errno::EBADF,
                "engine is closed",
            ));
        };
        let record = VifCtl::new(vifi, ifindex);
        setsockopt(sock, MrtDelVif, &record).map_err(|errno| {
            KernelError::new("MRT_DEL_VIF", errno, "remove virtual interface")
        })?;
        trace!(vifi, ifindex, "MRT_DEL_VIF succeeded");
        Ok(())
    }

    fn add_mfc(
        &self,
        origin: Ipv4Addr,
        group: Ipv4Addr,
        parent_vifi: u8,
        outputs: &BTreeSet<u8>,
    ) -> Result<(), KernelError> {
        let Some(sock) = &self.sock else {
            return Err(KernelError::new(
                "MRT_ADD_MFC",
                nix::errno::Errno::EBADF,
                "engine is closed",
            ));
        };
        let record = MfcCtl::new(origin, group, parent_vifi, outputs.iter().copied());
        setsockopt(sock, MrtAddMfc, &record)
            .map_err(|errno| KernelError::new("MRT_ADD_MFC", errno, "add MFC entry"))?;
        trace!(%origin, %group, parent_vifi, "MRT_ADD_MFC succeeded");
        Ok(())
    }

    fn del_mfc(&self, origin: Ipv4Addr, group: Ipv4Addr) -> Result<(), KernelError> {
        let Some(sock) = &self.sock else {
            return Err(KernelError::new(
                "MRT_DEL_MFC",
                nix::errno::Errno::EBADF,
                "engine is closed",
            ));
        };
        let record = MfcCtl::new(origin, group, 0, std::iter::empty());
        setsockopt(sock, MrtDelMfc, &record)
            .map_err(|errno| KernelError::new("MRT_DEL_MFC", errno, "remove MFC entry"))?;
        trace!(%origin, %group, "MRT_DEL_MFC succeeded");
        Ok(())
    }
}

impl Drop for KernelEngine {
    fn drop(&mut self) {
        if self.sock.is_some() {
            let _ = self.close();
        }
    }
}
