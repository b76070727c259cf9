// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Wire and on-disk data model shared by the daemon and its client.
//!
//! Everything in this crate is plain data: no sockets, no kernel calls, no
//! control flow. [`mfcd-server`](../mfcd_server/index.html) speaks these
//! types over the control socket; [`mfcd-engine`](../mfcd_engine/index.html)
//! speaks them when saving and loading the persisted rule set.

mod request;
mod response;
mod state;

pub use request::{AddMfcPayload, DelMfcPayload, Request};
pub use response::{BindingView, Response, ShowPayload, Status};
pub use state::{PersistedRule, PersistedState};
