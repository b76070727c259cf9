// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Loading and atomically saving the persisted rule set.

use std::io;
use std::path::Path;

use mfcd_protocol::PersistedState;
use tracing::{info, warn};

/// Errors saving the state file. Loading never fails: see [`load`].
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Loads the persisted rule set from `path`.
///
/// Fails open, per the persistence design: a missing file means a fresh
/// install with nothing to restore, and a present-but-unparsable file is
/// logged and treated the same way, rather than propagated as an error that
/// would keep the daemon from starting. The daemon still holds the kernel's
/// `MRT_INIT` state regardless of whether its bookkeeping file was
/// readable, so refusing to start over a broken state file would be worse
/// than starting with no rules.
#[must_use]
pub fn load(path: &Path) -> PersistedState {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no persisted state file; starting empty");
            return PersistedState::default();
        }
        Err(e) => {
            warn!(path = %path.display(), "failed to read state file, starting empty: {e}");
            return PersistedState::default();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(state) => state,
        Err(e) => {
            warn!(path = %path.display(), "failed to parse state file, starting empty: {e}");
            PersistedState::default()
        }
    }
}

/// Atomically overwrites `path` with `state`'s JSON encoding: writes to a
/// temporary file in the same directory, then renames it into place, so a
/// crash mid-write never leaves a truncated or partially-written state
/// file for the next startup to trip over.
pub fn save(path: &Path, state: &PersistedState) -> Result<(), PersistenceError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| PersistenceError::Write {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::to_writer_pretty(&mut tmp, state).map_err(|source| PersistenceError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    tmp.persist(path).map_err(|e| PersistenceError::Write {
        path: path.display().to_string(),
        source: e.error,
    })?;
    Ok(())
}

/// Saves `state`, logging (rather than propagating) a failure. Used on
/// shutdown paths where the daemon is exiting regardless and a failed save
/// should not prevent the rest of teardown from running.
pub fn save_best_effort(path: &Path, state: &PersistedState) {
    if let Err(e) = save(path, state) {
        warn!("failed to persist state to {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use mfcd_protocol::PersistedRule;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn load_missing_file_returns_empty_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = load(&path);
        assert!(state.mfc_rules.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = PersistedState {
            mfc_rules: vec![PersistedRule {
                source: "10.0.0.1".to_owned(),
                group: "239.1.1.1".to_owned(),
                iif: "veth-in".to_owned(),
                oifs: vec!["veth-out".to_owned()],
            }],
        };
        save(&path, &state).unwrap();
        let loaded = load(&path);
        assert_eq!(loaded, state);
    }

    #[test]
    fn load_fails_open_on_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(load(&path).mfc_rules.is_empty());
    }
}
