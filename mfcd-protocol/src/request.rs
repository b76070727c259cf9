// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use serde::{Deserialize, Serialize};

fn default_source() -> String {
    "0.0.0.0".to_owned()
}

/// `ADD_MFC` payload: `{source, group, iif, oifs}`. `source` defaults to
/// the wildcard address when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMfcPayload {
    #[serde(default = "default_source")]
    pub source: String,
    pub group: String,
    pub iif: String,
    pub oifs: Vec<String>,
}

/// `DEL_MFC` payload: `{source, group}`. `source` defaults to the wildcard
/// address when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelMfcPayload {
    #[serde(default = "default_source")]
    pub source: String,
    pub group: String,
}

/// A single request sent over the control socket: `{"action": A, "payload": P}`.
///
/// Serialized/deserialized adjacently-tagged on `action`/`payload` so the
/// wire shape matches the protocol exactly; `Show` carries no payload and
/// so emits no `payload` key at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload")]
pub enum Request {
    #[serde(rename = "ADD_MFC")]
    AddMfc(AddMfcPayload),
    #[serde(rename = "DEL_MFC")]
    DelMfc(DelMfcPayload),
    #[serde(rename = "SHOW")]
    Show,
}
