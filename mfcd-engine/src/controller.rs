// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The transactional controller: the only place that turns a wire request
//! into a sequence of VIF acquisitions and a kernel MFC add/delete,
//! unwinding everything it acquired if any step fails.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use mfcd_kernel::{KernelError, MulticastEngine};
use mfcd_protocol::{AddMfcPayload, BindingView, DelMfcPayload, PersistedRule, ShowPayload};
use tracing::{info, warn};

use crate::interfaces::InterfaceName;
use crate::registry::{RegistryError, VifRegistry};
use crate::rules::{Rule, RuleStore, RuleStoreError};

/// Errors a request may fail with, already shaped for direct use as a
/// `Response::err` message.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("invalid address {0:?}: {1}")]
    InvalidAddress(String, std::net::AddrParseError),
    #[error("invalid interface name: {0}")]
    InvalidInterface(#[from] crate::interfaces::IllegalInterfaceName),
    #[error("group {0} is not a multicast address (must be in 224.0.0.0/4)")]
    GroupNotMulticast(Ipv4Addr),
    #[error("group address must not be the wildcard address 0.0.0.0")]
    WildcardGroup,
    #[error("oifs must not be empty")]
    EmptyOifs,
    #[error("input interface {0} must not also appear in oifs")]
    IifInOifs(InterfaceName),
    #[error("a rule for ({0}, {1}) already exists")]
    DuplicateRule(Ipv4Addr, Ipv4Addr),
    #[error("no rule for ({0}, {1})")]
    RuleNotFound(Ipv4Addr, Ipv4Addr),
    #[error("{0}")]
    Vif(#[from] RegistryError),
    #[error("{0}")]
    Kernel(#[from] KernelError),
}

impl From<RuleStoreError> for ControllerError {
    fn from(value: RuleStoreError) -> Self {
        match value {
            RuleStoreError::Duplicate(s, g) => ControllerError::DuplicateRule(s, g),
            RuleStoreError::NotFound(s, g) => ControllerError::RuleNotFound(s, g),
        }
    }
}

impl ControllerError {
    /// Which of §7's error categories this failure belongs to. Used for
    /// logging at the dispatch boundary; the wire response itself only
    /// ever carries the human-readable `message`, never this tag.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            ControllerError::InvalidAddress(..)
            | ControllerError::InvalidInterface(_)
            | ControllerError::GroupNotMulticast(_)
            | ControllerError::WildcardGroup
            | ControllerError::EmptyOifs
            | ControllerError::IifInOifs(_)
            | ControllerError::DuplicateRule(..)
            | ControllerError::RuleNotFound(..) => "VALIDATION",
            ControllerError::Vif(RegistryError::SlotsExhausted) => "RESOURCE_EXHAUSTED",
            ControllerError::Vif(RegistryError::UnresolvedInterface(..)) => "INTERFACE_UNKNOWN",
            ControllerError::Vif(RegistryError::Kernel(_)) | ControllerError::Kernel(_) => {
                "KERNEL"
            }
        }
    }
}

fn parse_ipv4(field: &str) -> Result<Ipv4Addr, ControllerError> {
    field
        .parse()
        .map_err(|e| ControllerError::InvalidAddress(field.to_owned(), e))
}

fn parse_iface(field: &str) -> Result<InterfaceName, ControllerError> {
    Ok(InterfaceName::try_from(field.to_owned())?)
}

/// Owns the live kernel engine, the VIF registry, and the active rule set,
/// and drives every mutation through the acquire-then-program-then-commit
/// sequence described by the daemon's forwarding model. A failure at any
/// step releases every VIF this call acquired, in reverse order, before
/// returning the error: no partial rule is ever left active.
pub struct Controller<E: MulticastEngine> {
    engine: E,
    registry: VifRegistry,
    rules: RuleStore,
}

impl<E: MulticastEngine> Controller<E> {
    #[must_use]
    pub fn new(engine: E) -> Self {
        Controller::with_registry(engine, VifRegistry::new())
    }

    /// Builds a controller against an already-constructed [`VifRegistry`].
    /// Production code has no reason to call this over [`Controller::new`];
    /// it exists so tests can inject a registry with a fake interface
    /// resolver (see [`VifRegistry::with_resolver`]).
    #[must_use]
    pub fn with_registry(engine: E, registry: VifRegistry) -> Self {
        Controller {
            engine,
            registry,
            rules: RuleStore::new(),
        }
    }

    /// Validates and installs one `ADD_MFC` rule.
    pub fn add_rule(&mut self, request: AddMfcPayload) -> Result<(), ControllerError> {
        let source = parse_ipv4(&request.source)?;
        let group = parse_ipv4(&request.group)?;
        let iif = parse_iface(&request.iif)?;
        let mut oifs = Vec::with_capacity(request.oifs.len());
        for raw in &request.oifs {
            let name = parse_iface(raw)?;
            if !oifs.contains(&name) {
                oifs.push(name);
            }
        }

        if oifs.is_empty() {
            return Err(ControllerError::EmptyOifs);
        }
        if group == Ipv4Addr::UNSPECIFIED {
            return Err(ControllerError::WildcardGroup);
        }
        if !group.is_multicast() {
            return Err(ControllerError::GroupNotMulticast(group));
        }
        if oifs.contains(&iif) {
            return Err(ControllerError::IifInOifs(iif));
        }

        if self.rules.get(source, group).is_some() {
            return Err(ControllerError::DuplicateRule(source, group));
        }

        let mut acquired: Vec<InterfaceName> = Vec::with_capacity(1 + oifs.len());
        let result = self.acquire_all(&iif, &oifs, &mut acquired);
        let (parent_vifi, output_vifis) = match result {
            Ok(pair) => pair,
            Err(e) => {
                self.unwind(&acquired);
                return Err(e);
            }
        };

        if let Err(e) = self
            .engine
            .add_mfc(source, group, parent_vifi, &output_vifis)
        {
            self.unwind(&acquired);
            return Err(ControllerError::Kernel(e));
        }

        self.rules
            .insert(Rule {
                source,
                group,
                iif,
                oifs,
            })
            .expect("duplicate already rejected above");
        info!(%source, %group, "MFC rule installed");
        Ok(())
    }

    fn acquire_all(
        &mut self,
        iif: &InterfaceName,
        oifs: &[InterfaceName],
        acquired: &mut Vec<InterfaceName>,
    ) -> Result<(u8, BTreeSet<u8>), ControllerError> {
        let parent_vifi = self.registry.acquire(&self.engine, iif)?;
        acquired.push(iif.clone());

        let mut output_vifis = BTreeSet::new();
        for oif in oifs {
            let vifi = self.registry.acquire(&self.engine, oif)?;
            acquired.push(oif.clone());
            output_vifis.insert(vifi);
        }
        Ok((parent_vifi, output_vifis))
    }

    /// Releases every VIF reference acquired during a failed `add_rule`
    /// call, in reverse order (LIFO), undoing exactly what was done.
    fn unwind(&mut self, acquired: &[InterfaceName]) {
        for name in acquired.iter().rev() {
            self.registry.release(&self.engine, name);
        }
    }

    /// Removes a `(source, group)` rule: clears the kernel MFC entry, then
    /// removes the rule from the store and releases the VIF references it
    /// held. A genuine kernel failure (anything but "already gone") leaves
    /// the kernel and store unchanged and is returned to the caller; only
    /// `del_mfc`'s own success or "already absent" result lets step 3/4
    /// (store removal, VIF release) proceed.
    pub fn delete_rule(&mut self, request: DelMfcPayload) -> Result<(), ControllerError> {
        let source = parse_ipv4(&request.source)?;
        let group = parse_ipv4(&request.group)?;

        if self.rules.get(source, group).is_none() {
            return Err(ControllerError::RuleNotFound(source, group));
        }

        if let Err(e) = self.engine.del_mfc(source, group) {
            if e.is_already_absent() {
                tracing::debug!(%source, %group, "MRT_DEL_MFC: kernel had already forgotten this entry");
            } else {
                return Err(ControllerError::Kernel(e));
            }
        }

        let rule = self
            .rules
            .remove(source, group)
            .expect("rule presence just confirmed above");
        self.registry.release(&self.engine, &rule.iif);
        for oif in &rule.oifs {
            self.registry.release(&self.engine, oif);
        }
        info!(%source, %group, "MFC rule removed");
        Ok(())
    }

    /// Builds the `SHOW` response payload from current VIF bindings and
    /// active rules.
    #[must_use]
    pub fn show(&self) -> ShowPayload {
        let vif_map = self
            .registry
            .bindings()
            .iter()
            .map(|(name, binding)| {
                (
                    name.to_string(),
                    BindingView {
                        vifi: binding.vifi,
                        ifindex: binding.ifindex,
                        ref_count: binding.ref_count,
                    },
                )
            })
            .collect();
        let mfc_rules = self
            .rules
            .iter()
            .map(|rule| PersistedRule {
                source: rule.source.to_string(),
                group: rule.group.to_string(),
                iif: rule.iif.to_string(),
                oifs: rule.oifs.iter().map(InterfaceName::to_string).collect(),
            })
            .collect();
        ShowPayload {
            vif_map,
            mfc_rules,
        }
    }

    /// Re-installs persisted rules at startup. A rule that fails to
    /// re-apply (stale interface name, exhausted slots) is logged and
    /// skipped rather than aborting the whole replay: a daemon that cannot
    /// restore routing for one torn-down interface should still serve the
    /// rules it can.
    pub fn replay(&mut self, rules: Vec<PersistedRule>) {
        for rule in rules {
            let key = format!("{} -> {}", rule.source, rule.group);
            let payload = AddMfcPayload {
                source: rule.source,
                group: rule.group,
                iif: rule.iif,
                oifs: rule.oifs,
            };
            if let Err(e) = self.add_rule(payload) {
                warn!("failed to replay persisted rule {key}: {e}");
            }
        }
    }

    /// Returns the current active rule set in persisted-state shape, for
    /// writing to the state file.
    #[must_use]
    pub fn persisted_rules(&self) -> Vec<PersistedRule> {
        self.rules
            .iter()
            .map(|rule| PersistedRule {
                source: rule.source.to_string(),
                group: rule.group.to_string(),
                iif: rule.iif.to_string(),
                oifs: rule.oifs.iter().map(InterfaceName::to_string).collect(),
            })
            .collect()
    }

    /// Releases the kernel engine. Failures are logged, not returned: by
    /// the time the daemon calls this it is already exiting.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.engine.close() {
            warn!("engine close failed during shutdown: {e}");
        }
    }
}
