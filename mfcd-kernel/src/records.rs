// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bit-exact layouts for the kernel's multicast routing control records.
//!
//! These mirror `struct vifctl` and `struct mfcctl` from the kernel's
//! `linux/mroute.h`. The layouts are pinned by byte offset rather than
//! trusted to compiler struct-layout rules, because they cross an FFI
//! boundary into a kernel that expects one specific binary shape.

use std::net::Ipv4Addr;

/// "identify VIF by kernel ifindex, not by local IPv4 address" flag bit.
pub const VIFF_USE_IFINDEX: u8 = 0x08;

/// Number of VIF slots the kernel's MFC table supports.
pub const MAXVIFS: usize = 32;

/// VIF control record (16 bytes), passed to `add_vif`/`del_vif`.
///
/// <div class=warning>
///
/// This struct crosses directly into a `setsockopt` call. Only add fields
/// that preserve the exact byte layout documented at each field.
///
/// </div>
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct VifCtl {
    /// offset 0, size 2: VIF index.
    pub vifi: u16,
    /// offset 2, size 1: control flags ([`VIFF_USE_IFINDEX`] is the only one we set).
    pub flags: u8,
    /// offset 3, size 1: TTL threshold. Unused by this daemon; always 0.
    pub threshold: u8,
    /// offset 4, size 4: rate limit. Unused by this daemon; always 0.
    pub rate_limit: u32,
    /// offset 8, size 4: union of local IPv4 address or ifindex. We always
    /// set [`VIFF_USE_IFINDEX`], so this always holds an ifindex.
    pub lcl_or_ifindex: u32,
    /// offset 12, size 4: remote IPv4 address. Unused by this daemon; always 0.
    pub remote: u32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<VifCtl>(), 16);

impl VifCtl {
    #[must_use]
    pub fn new(vifi: u8, ifindex: u32) -> Self {
        VifCtl {
            vifi: u16::from(vifi),
            flags: VIFF_USE_IFINDEX,
            threshold: 0,
            rate_limit: 0,
            lcl_or_ifindex: ifindex,
            remote: 0,
        }
    }
}

/// MFC control record (60 bytes), passed to `add_mfc`/`del_mfc`.
///
/// The two-byte `_pad` field at offset 42 is load-bearing: without it the
/// kernel reads its own written-back counters (offsets 44–59) at the wrong
/// position and either rejects the entry or corrupts it. It exists only
/// because `parent` (2 bytes) plus `ttls` (32 bytes) leaves the next `u32`
/// field short of 4-byte alignment.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct MfcCtl {
    /// offset 0, size 4: source address, network byte order.
    pub origin: [u8; 4],
    /// offset 4, size 4: group address, network byte order.
    pub group: [u8; 4],
    /// offset 8, size 2: input (parent) VIF index.
    pub parent: u16,
    /// offset 10, size 32: per-VIF TTL threshold. Index *i* is 1 if VIF *i*
    /// is an output of this entry, 0 otherwise (0 means "do not forward").
    pub ttls: [u8; MAXVIFS],
    /// offset 42, size 2: alignment padding. See struct doc comment.
    _pad: [u8; 2],
    /// offset 44, size 4: kernel-written packet count.
    pub pkt_cnt: u32,
    /// offset 48, size 4: kernel-written byte count.
    pub byte_cnt: u32,
    /// offset 52, size 4: kernel-written wrong-input-interface count.
    pub wrong_if: u32,
    /// offset 56, size 4: kernel-written expiry.
    pub expire: u32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<MfcCtl>(), 60);

impl MfcCtl {
    /// Builds a fresh control record for `add_mfc`/`del_mfc`.
    ///
    /// `outputs` is an iterator over the VIF indices that should forward
    /// this (origin, group) flow; all other slots are set to 0 ("do not
    /// forward").
    #[must_use]
    pub fn new(
        origin: Ipv4Addr,
        group: Ipv4Addr,
        parent: u8,
        outputs: impl IntoIterator<Item = u8>,
    ) -> Self {
        let mut ttls = [0u8; MAXVIFS];
        for vifi in outputs {
            ttls[vifi as usize] = 1;
        }
        MfcCtl {
            origin: origin.octets(),
            group: group.octets(),
            parent: u16::from(parent),
            ttls,
            _pad: [0; 2],
            pkt_cnt: 0,
            byte_cnt: 0,
            wrong_if: 0,
            expire: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vifctl_is_sixteen_bytes() {
        assert_eq!(core::mem::size_of::<VifCtl>(), 16);
    }

    #[test]
    fn mfcctl_is_sixty_bytes() {
        assert_eq!(core::mem::size_of::<MfcCtl>(), 60);
    }

    #[test]
    fn mfcctl_pad_offset_is_forty_two() {
        assert_eq!(core::mem::offset_of!(MfcCtl, _pad), 42);
    }

    #[test]
    fn outputs_set_exactly_the_requested_vifs() {
        let rec = MfcCtl::new(
            Ipv4Addr::new(10, 0, 1, 10),
            Ipv4Addr::new(239, 10, 20, 30),
            0,
            [1u8, 3],
        );
        assert_eq!(rec.ttls[0], 0);
        assert_eq!(rec.ttls[1], 1);
        assert_eq!(rec.ttls[2], 0);
        assert_eq!(rec.ttls[3], 1);
        assert_eq!(rec.origin, [10, 0, 1, 10]);
        assert_eq!(rec.group, [239, 10, 20, 30]);
    }
}
