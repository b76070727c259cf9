// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The forwarding-rule business logic: VIF lifecycle, the active rule set,
//! the transactional controller that ties them to the kernel engine, and
//! state-file persistence.
//!
//! This crate never opens a socket of its own kind: [`mfcd-server`] drives
//! it from the control socket, and the `mfcd` binary drives it at startup
//! (replaying persisted rules) and shutdown (saving them back out).

pub mod controller;
pub mod interfaces;
pub mod persistence;
pub mod registry;
pub mod rules;

pub use controller::{Controller, ControllerError};
pub use interfaces::{IllegalInterfaceName, InterfaceName, InterfaceResolutionError};
pub use persistence::PersistenceError;
pub use registry::{Binding, RegistryError, ResolveFn, VifRegistry, MAXVIFS};
pub use rules::{Rule, RuleStore, RuleStoreError};
