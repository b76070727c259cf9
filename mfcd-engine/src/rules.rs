// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The set of active `(source, group)` forwarding rules, each remembering
//! the interface names it was built from so it can be torn down again.

use std::net::Ipv4Addr;

use indexmap::IndexMap;

use crate::interfaces::InterfaceName;

/// One active forwarding rule: a `(source, group)` pair, the interface it
/// arrives on, and the interfaces it fans out to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub source: Ipv4Addr,
    pub group: Ipv4Addr,
    pub iif: InterfaceName,
    pub oifs: Vec<InterfaceName>,
}

/// Errors raised by [`RuleStore`] bookkeeping. These are caller-programming
/// errors (double add, delete of the absent): the controller maps them to
/// `ControllerError` variants carrying the same keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RuleStoreError {
    #[error("a rule for ({0}, {1}) already exists")]
    Duplicate(Ipv4Addr, Ipv4Addr),
    #[error("no rule for ({0}, {1})")]
    NotFound(Ipv4Addr, Ipv4Addr),
}

/// Active rules keyed by `(source, group)`, in the order they were added.
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: IndexMap<(Ipv4Addr, Ipv4Addr), Rule>,
}

impl RuleStore {
    #[must_use]
    pub fn new() -> Self {
        RuleStore::default()
    }

    #[must_use]
    pub fn get(&self, source: Ipv4Addr, group: Ipv4Addr) -> Option<&Rule> {
        self.rules.get(&(source, group))
    }

    pub fn insert(&mut self, rule: Rule) -> Result<(), RuleStoreError> {
        let key = (rule.source, rule.group);
        if self.rules.contains_key(&key) {
            return Err(RuleStoreError::Duplicate(key.0, key.1));
        }
        self.rules.insert(key, rule);
        Ok(())
    }

    pub fn remove(&mut self, source: Ipv4Addr, group: Ipv4Addr) -> Result<Rule, RuleStoreError> {
        self.rules
            .shift_remove(&(source, group))
            .ok_or(RuleStoreError::NotFound(source, group))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
