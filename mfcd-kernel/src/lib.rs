// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The kernel engine adapter for `mfcd`.
//!
//! This crate is the only place in the daemon that touches the kernel's
//! multicast routing API directly. It hides the `setsockopt` struct layout,
//! byte ordering, and errno mapping behind five operations: `open`,
//! `close`, `add_vif`, `del_vif`, `add_mfc`, `del_mfc`.

mod adapter;
mod error;
pub mod records;

pub use adapter::{KernelEngine, MulticastEngine};
pub use error::KernelError;
