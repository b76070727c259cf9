// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bijection between interface names and the kernel's small VIF index
//! space, with reference counting so a fan-out of many rules through the
//! same physical interface only costs one VIF.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use mfcd_kernel::MulticastEngine;
use tracing::{debug, warn};

use crate::interfaces::{InterfaceName, InterfaceResolutionError};

/// How a name is turned into a kernel ifindex. A plain `fn` pointer rather
/// than a trait: resolution needs no state of its own, and a pointer lets
/// tests swap in a fake mapping (via a capture-free closure) without a
/// second generic parameter threaded through [`VifRegistry`] and
/// [`crate::controller::Controller`].
pub type ResolveFn = fn(&InterfaceName) -> Result<u32, InterfaceResolutionError>;

fn resolve_via_os(name: &InterfaceName) -> Result<u32, InterfaceResolutionError> {
    name.resolve()
}

/// The number of VIF slots the kernel's `struct vif_device vif_table[MAXVIFS]`
/// provides, mirrored from `mfcd_kernel::records::MAXVIFS`.
pub const MAXVIFS: usize = mfcd_kernel::records::MAXVIFS;

/// One interface currently bound to a VIF slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub vifi: u8,
    pub ifindex: u32,
    pub ref_count: u32,
}

/// Errors raised while acquiring or releasing a VIF binding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("interface {0} could not be resolved to an ifindex")]
    UnresolvedInterface(InterfaceName, #[source] InterfaceResolutionError),
    #[error("no free VIF slots remain (all {MAXVIFS} are in use)")]
    SlotsExhausted,
    #[error("{0}")]
    Kernel(#[from] mfcd_kernel::KernelError),
}

/// Tracks which interfaces are currently bound to which VIF slots, how many
/// rules reference each binding, and which of the 32 kernel slots remain
/// free.
///
/// A fresh registry starts with every slot free; `acquire` hands out the
/// lowest-numbered free slot, matching the reference daemon's "first fit"
/// allocation strategy.
#[derive(Debug)]
pub struct VifRegistry {
    bindings: IndexMap<InterfaceName, Binding>,
    used_slots: BTreeSet<u8>,
    resolve: ResolveFn,
}

impl Default for VifRegistry {
    fn default() -> Self {
        VifRegistry::new()
    }
}

impl VifRegistry {
    #[must_use]
    pub fn new() -> Self {
        VifRegistry::with_resolver(resolve_via_os)
    }

    /// Builds a registry that resolves interface names through `resolve`
    /// instead of the OS. Production code has no reason to call this
    /// directly; it exists so tests can exercise the acquire/release
    /// bookkeeping against interface names that don't need to exist on the
    /// test host.
    #[must_use]
    pub fn with_resolver(resolve: ResolveFn) -> Self {
        VifRegistry {
            bindings: IndexMap::new(),
            used_slots: BTreeSet::new(),
            resolve,
        }
    }

    /// Returns the binding for `name` if one already exists, without
    /// touching the kernel or its reference count.
    #[must_use]
    pub fn get(&self, name: &InterfaceName) -> Option<&Binding> {
        self.bindings.get(name)
    }

    #[must_use]
    pub fn bindings(&self) -> &IndexMap<InterfaceName, Binding> {
        &self.bindings
    }

    fn lowest_free_slot(&self) -> Option<u8> {
        (0..MAXVIFS as u8).find(|slot| !self.used_slots.contains(slot))
    }

    /// Ensures `name` is bound to a VIF, creating the binding (and issuing
    /// `MRT_ADD_VIF`) if this is the first reference, and incrementing the
    /// reference count either way.
    ///
    /// On any failure the registry is left exactly as it was before the
    /// call: no partial state is recorded.
    pub fn acquire<E: MulticastEngine>(
        &mut self,
        engine: &E,
        name: &InterfaceName,
    ) -> Result<u8, RegistryError> {
        if let Some(binding) = self.bindings.get_mut(name) {
            binding.ref_count += 1;
            debug!(%name, vifi = binding.vifi, ref_count = binding.ref_count, "VIF reference added");
            return Ok(binding.vifi);
        }

        let ifindex = (self.resolve)(name)
            .map_err(|e| RegistryError::UnresolvedInterface(name.clone(), e))?;
        let vifi = self.lowest_free_slot().ok_or(RegistryError::SlotsExhausted)?;

        engine.add_vif(vifi, ifindex)?;
        self.used_slots.insert(vifi);
        self.bindings.insert(
            name.clone(),
            Binding {
                vifi,
                ifindex,
                ref_count: 1,
            },
        );
        debug!(%name, vifi, ifindex, "VIF bound");
        Ok(vifi)
    }

    /// Drops one reference to `name`'s binding, releasing the VIF slot (and
    /// issuing `MRT_DEL_VIF`) once the reference count reaches zero.
    ///
    /// Kernel failures during the final `MRT_DEL_VIF` are logged but never
    /// returned: the binding is removed from the registry regardless, since
    /// a VIF the kernel has forgotten about (interface torn down under us)
    /// must not wedge the slot forever.
    pub fn release<E: MulticastEngine>(&mut self, engine: &E, name: &InterfaceName) {
        let Some(binding) = self.bindings.get_mut(name) else {
            warn!(%name, "release() called for an interface with no binding; ignoring");
            return;
        };
        binding.ref_count = binding.ref_count.saturating_sub(1);
        if binding.ref_count > 0 {
            debug!(%name, ref_count = binding.ref_count, "VIF reference dropped");
            return;
        }

        let Binding { vifi, ifindex, .. } = *binding;
        if let Err(e) = engine.del_vif(vifi, ifindex) {
            if e.is_already_absent() {
                debug!(%name, vifi, "MRT_DEL_VIF: kernel had already forgotten this VIF");
            } else {
                warn!(%name, vifi, "MRT_DEL_VIF failed during release: {e}");
            }
        }
        self.bindings.shift_remove(name);
        self.used_slots.remove(&vifi);
        debug!(%name, vifi, "VIF released");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::net::Ipv4Addr;

    use mfcd_kernel::KernelError;

    use super::*;

    /// A fake `MulticastEngine` that records calls and can be told to fail
    /// specific VIF operations, so the registry's bookkeeping can be tested
    /// without a real kernel.
    #[derive(Default)]
    struct FakeEngine {
        vifs: RefCell<BTreeMap<u8, u32>>,
        fail_add_vif: RefCell<bool>,
    }

    impl FakeEngine {
        fn failing_add_vif() -> Self {
            FakeEngine {
                fail_add_vif: RefCell::new(true),
                ..Default::default()
            }
        }
    }

    impl MulticastEngine for FakeEngine {
        fn close(&mut self) -> Result<(), KernelError> {
            Ok(())
        }

        fn add_vif(&self, vifi: u8, ifindex: u32) -> Result<(), KernelError> {
            if *self.fail_add_vif.borrow() {
                return Err(KernelError {
                    operation: "MRT_ADD_VIF",
                    errno: nix::errno::Errno::EINVAL,
                    description: "fake failure",
                });
            }
            self.vifs.borrow_mut().insert(vifi, ifindex);
            Ok(())
        }

        fn del_vif(&self, vifi: u8, _ifindex: u32) -> Result<(), KernelError> {
            self.vifs.borrow_mut().remove(&vifi);
            Ok(())
        }

        fn add_mfc(
            &self,
            _origin: Ipv4Addr,
            _group: Ipv4Addr,
            _parent_vifi: u8,
            _outputs: &BTreeSet<u8>,
        ) -> Result<(), KernelError> {
            Ok(())
        }

        fn del_mfc(&self, _origin: Ipv4Addr, _group: Ipv4Addr) -> Result<(), KernelError> {
            Ok(())
        }
    }

    fn name(s: &str) -> InterfaceName {
        InterfaceName::try_from(s.to_owned()).unwrap()
    }

    /// A resolver that hands out a deterministic, distinct ifindex per name
    /// so tests can exercise the registry's bijection without needing real
    /// interfaces on the test host. Names starting with `no-such` fail,
    /// mirroring a name the OS doesn't recognize.
    fn fake_resolve(name: &InterfaceName) -> Result<u32, InterfaceResolutionError> {
        if name.as_str().starts_with("no-such") {
            return Err(InterfaceResolutionError {
                name: name.clone(),
                errno: nix::errno::Errno::ENODEV,
            });
        }
        let ifindex = name
            .as_str()
            .bytes()
            .fold(1u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)))
            .max(1);
        Ok(ifindex)
    }

    fn registry() -> VifRegistry {
        VifRegistry::with_resolver(fake_resolve)
    }

    #[test]
    fn acquire_allocates_lowest_free_slot() {
        let mut registry = registry();
        registry.used_slots.insert(0);
        registry.used_slots.insert(1);
        assert_eq!(registry.lowest_free_slot(), Some(2));
    }

    #[test]
    fn acquire_increments_ref_count_on_repeat_acquire() {
        let engine = FakeEngine::default();
        let mut registry = registry();
        let iface = name("veth-in");
        let vifi = registry.acquire(&engine, &iface).expect("first acquire");
        registry.acquire(&engine, &iface).expect("second acquire");
        assert_eq!(registry.get(&iface).unwrap().ref_count, 2);
        assert_eq!(registry.get(&iface).unwrap().vifi, vifi);
    }

    #[test]
    fn release_removes_binding_once_ref_count_hits_zero() {
        let engine = FakeEngine::default();
        let mut registry = registry();
        let iface = name("veth-in");
        registry.acquire(&engine, &iface).unwrap();
        registry.release(&engine, &iface);
        assert!(registry.get(&iface).is_none());
        assert!(registry.lowest_free_slot() == Some(0));
    }

    #[test]
    fn release_decrements_without_removing_while_refs_remain() {
        let engine = FakeEngine::default();
        let mut registry = registry();
        let iface = name("veth-in");
        registry.acquire(&engine, &iface).unwrap();
        registry.acquire(&engine, &iface).unwrap();
        registry.release(&engine, &iface);
        assert_eq!(registry.get(&iface).unwrap().ref_count, 1);
    }

    #[test]
    fn acquire_leaves_no_partial_state_on_kernel_failure() {
        let engine = FakeEngine::failing_add_vif();
        let mut registry = registry();
        let iface = name("veth-in");
        let err = registry.acquire(&engine, &iface);
        assert!(err.is_err());
        assert!(registry.get(&iface).is_none());
        assert_eq!(registry.lowest_free_slot(), Some(0));
    }

    #[test]
    fn acquire_fails_with_unresolved_interface_for_nonexistent_name() {
        let engine = FakeEngine::default();
        let mut registry = registry();
        let iface = name("no-such-iface-xyz");
        assert!(matches!(
            registry.acquire(&engine, &iface),
            Err(RegistryError::UnresolvedInterface(_, _))
        ));
    }

    #[test]
    fn lowest_free_allocation_reuses_a_released_slot() {
        let engine = FakeEngine::default();
        let mut registry = registry();
        let a = name("veth-a");
        let b = name("veth-b");
        let c = name("veth-c");
        let d = name("veth-d");
        registry.acquire(&engine, &a).unwrap();
        let b_vifi = registry.acquire(&engine, &b).unwrap();
        registry.acquire(&engine, &c).unwrap();
        registry.release(&engine, &b);
        let d_vifi = registry.acquire(&engine, &d).unwrap();
        assert_eq!(d_vifi, b_vifi);
    }
}
