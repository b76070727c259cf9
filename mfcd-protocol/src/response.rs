// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::state::PersistedRule;

/// `{"status": "success"|"error"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// One entry of `SHOW`'s `vif_map`: `{vifi, ifindex, ref_count}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingView {
    pub vifi: u8,
    pub ifindex: u32,
    pub ref_count: u32,
}

/// `SHOW`'s response payload: bindings keyed by interface name, plus the
/// ordered rule list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ShowPayload {
    pub vif_map: IndexMap<String, BindingView>,
    pub mfc_rules: Vec<PersistedRule>,
}

/// `{"status": ..., "message"?: ..., "payload"?: ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payload: Option<ShowPayload>,
}

impl Response {
    #[must_use]
    pub fn ok(payload: Option<ShowPayload>) -> Self {
        Response {
            status: Status::Success,
            message: None,
            payload,
        }
    }

    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Response {
            status: Status::Error,
            message: Some(message.into()),
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_without_payload_omits_payload_key() {
        let resp = Response::ok(None);
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"status":"success"}"#);
    }

    #[test]
    fn error_has_lowercase_status_and_message() {
        let resp = Response::err("invalid group IP");
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"status":"error","message":"invalid group IP"}"#);
    }
}
