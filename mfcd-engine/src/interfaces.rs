// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A validated interface name and the syscall that resolves it to a kernel
//! ifindex.

use std::fmt::{Display, Formatter};

use nix::net::if_::if_nametoindex;

const MAX_INTERFACE_NAME_LEN: usize = 15;

/// A string which has been checked to be a legal linux network interface
/// name: non-empty, ASCII, no interior NUL, only alphanumeric and `.`, `-`,
/// `_`, and at most 15 bytes (the kernel's `IFNAMSIZ` minus the trailing
/// NUL it adds itself).
#[repr(transparent)]
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct InterfaceName(String);

impl Display for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl InterfaceName {
    pub const MAX_LEN: usize = MAX_INTERFACE_NAME_LEN;

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve this interface name to its current kernel ifindex.
    ///
    /// The ifindex is never cached on `InterfaceName` itself: interfaces can
    /// be torn down and recreated, changing their ifindex, between any two
    /// calls.
    pub fn resolve(&self) -> Result<u32, InterfaceResolutionError> {
        if_nametoindex(self.0.as_str()).map_err(|errno| InterfaceResolutionError {
            name: self.clone(),
            errno,
        })
    }
}

/// Errors which may occur when validating a `String` as an `InterfaceName`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalInterfaceName {
    #[error("interface name must not be empty")]
    Empty,
    #[error("interface name {0:?} contains an interior NUL character")]
    InteriorNul(String),
    #[error("interface name {0:?} is not ASCII")]
    NotAscii(String),
    #[error("interface name {0:?} contains illegal characters (only alphanumeric ASCII and .-_ are permitted)")]
    IllegalCharacters(String),
    #[error("interface name {0:?} is longer than {} bytes", InterfaceName::MAX_LEN)]
    TooLong(String),
}

impl TryFrom<String> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        const LEGAL_PUNCT: [char; 3] = ['.', '-', '_'];
        if value.is_empty() {
            return Err(IllegalInterfaceName::Empty);
        }
        if value.contains('\0') {
            return Err(IllegalInterfaceName::InteriorNul(value));
        }
        if !value.is_ascii() {
            return Err(IllegalInterfaceName::NotAscii(value));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || LEGAL_PUNCT.contains(&c))
        {
            return Err(IllegalInterfaceName::IllegalCharacters(value));
        }
        if value.len() > InterfaceName::MAX_LEN {
            return Err(IllegalInterfaceName::TooLong(value));
        }
        Ok(InterfaceName(value))
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        InterfaceName::try_from(value.to_owned())
    }
}

impl From<InterfaceName> for String {
    fn from(value: InterfaceName) -> Self {
        value.0
    }
}

/// The kernel rejected `if_nametoindex` for a validated interface name,
/// almost always because the interface does not currently exist.
#[derive(Debug, Clone, thiserror::Error)]
#[error("interface {name} could not be resolved to an ifindex: {errno}")]
pub struct InterfaceResolutionError {
    pub name: InterfaceName,
    pub errno: nix::errno::Errno,
}
