// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Loads `mfcd`'s INI-shaped configuration file into a plain options
//! struct.
//!
//! The file holds exactly three keys, all under an (optional) `[daemon]`
//! section: `socket_path`, `state_file`, `socket_group`. A missing file, a
//! missing section, or individual missing keys all fall back to documented
//! defaults rather than failing the daemon's startup — the process
//! interface (`mfcd` binary) is the one place a truly fatal configuration
//! problem (e.g. a socket bind failure) gets to stop the daemon.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Default path to `mfcd`'s control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/mfc_daemon.sock";
/// Default path to the persisted rule-set file.
pub const DEFAULT_STATE_FILE: &str = "/var/lib/mfc_daemon/state.json";
/// Default group allowed to read/write the control socket.
pub const DEFAULT_SOCKET_GROUP: &str = "root";

const SECTION: &str = "daemon";

/// `mfcd`'s resolved runtime configuration: the three knobs the daemon's
/// process interface exposes (§6), nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub state_file: PathBuf,
    pub socket_group: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            socket_group: DEFAULT_SOCKET_GROUP.to_owned(),
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from `path`, falling back to
    /// [`DaemonConfig::default`] for anything the file doesn't specify.
    ///
    /// A missing file is silent (a fresh install with no config file is the
    /// common case, not a warning-worthy one). A present-but-unparsable
    /// file is logged and treated as if absent: a broken config file must
    /// not prevent the daemon from starting with sensible defaults.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let ini = match ini::Ini::load_from_file(path) {
            Ok(ini) => ini,
            Err(ini::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return DaemonConfig::default();
            }
            Err(e) => {
                warn!(path = %path.display(), "failed to parse config file, using defaults: {e}");
                return DaemonConfig::default();
            }
        };

        let defaults = DaemonConfig::default();
        let section = ini.section(Some(SECTION));
        let get = |key: &str, default: &str| -> String {
            section
                .and_then(|s| s.get(key))
                .map(str::to_owned)
                .unwrap_or_else(|| default.to_owned())
        };

        DaemonConfig {
            socket_path: PathBuf::from(get(
                "socket_path",
                &defaults.socket_path.display().to_string(),
            )),
            state_file: PathBuf::from(get(
                "state_file",
                &defaults.state_file.display().to_string(),
            )),
            socket_group: get("socket_group", &defaults.socket_group),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = DaemonConfig::load(Path::new("/no/such/path/mfc_daemon.conf"));
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn loads_all_three_keys_from_the_daemon_section() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[daemon]\nsocket_path = /tmp/mfc.sock\nstate_file = /tmp/mfc.json\nsocket_group = netadmin\n"
        )
        .unwrap();
        let config = DaemonConfig::load(file.path());
        assert_eq!(config.socket_path, Path::new("/tmp/mfc.sock"));
        assert_eq!(config.state_file, Path::new("/tmp/mfc.json"));
        assert_eq!(config.socket_group, "netadmin");
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[daemon]\nsocket_path = /tmp/only-this.sock\n").unwrap();
        let config = DaemonConfig::load(file.path());
        assert_eq!(config.socket_path, Path::new("/tmp/only-this.sock"));
        assert_eq!(config.state_file, DaemonConfig::default().state_file);
        assert_eq!(config.socket_group, DaemonConfig::default().socket_group);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not valid ini [[[").unwrap();
        let config = DaemonConfig::load(file.path());
        assert_eq!(config, DaemonConfig::default());
    }
}
