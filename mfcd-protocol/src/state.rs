// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use serde::{Deserialize, Serialize};

/// One rule as it appears in `SHOW`'s `mfc_rules` array and in the
/// persisted state file: `{source, group, iif, oifs}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRule {
    pub source: String,
    pub group: String,
    pub iif: String,
    pub oifs: Vec<String>,
}

/// The persisted state file's top-level shape: `{"mfc_rules": [...]}`.
///
/// VIF bindings are deliberately not part of this structure: they are
/// rebuilt by replaying `mfc_rules` through the controller at startup,
/// not carried across restarts as their own artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PersistedState {
    pub mfc_rules: Vec<PersistedRule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let state = PersistedState {
            mfc_rules: vec![PersistedRule {
                source: "10.0.1.10".to_owned(),
                group: "239.10.20.30".to_owned(),
                iif: "veth-in".to_owned(),
                oifs: vec!["veth-out".to_owned()],
            }],
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: PersistedState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn missing_file_shape_is_an_empty_rule_list_by_default() {
        let state = PersistedState::default();
        assert!(state.mfc_rules.is_empty());
    }
}
