// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The control-plane server: owns the local control socket, dispatches one
//! request per connection to the transactional controller, and drives
//! orderly shutdown.
//!
//! This is a deliberately synchronous, single-threaded accept loop (§5 of
//! the daemon's design forbids concurrent mutation of the controller's
//! state): one client is served start-to-finish — including every kernel
//! call its request triggers — before the next connection is accepted.

use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::fd::AsFd;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mfcd_engine::Controller;
use mfcd_kernel::MulticastEngine;
use mfcd_protocol::{Request, Response};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::unistd::{Gid, chown};
use tracing::{debug, error, info, warn};

/// Maximum size of a single request, per the control socket protocol (§6):
/// one JSON object, framed by connection close, read in a single `recv`.
const MAX_REQUEST_BYTES: usize = 4096;

/// How long the accept loop waits for a connection before re-checking the
/// shutdown flag. Bounds worst-case shutdown latency to roughly one of
/// these windows plus however long any in-flight request takes to finish.
const ACCEPT_POLL_TIMEOUT_MS: u16 = 500;

/// Errors that can occur while standing up the control socket. All are
/// fatal at startup (§7: "failure to bind the control socket" is one of
/// the two startup-fatal conditions).
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to remove stale socket at {path}: {source}")]
    RemoveStale {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to bind control socket at {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("socket group {group:?} does not exist")]
    UnknownGroup { group: String },
    #[error("failed to set ownership of {path}: {source}")]
    Chown {
        path: String,
        #[source]
        source: nix::Error,
    },
    #[error("failed to set permissions of {path}: {source}")]
    Chmod {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Removes any stale socket file, binds a fresh one at `socket_path`, sets
/// its owning group to `socket_group` and mode `rw-rw----`, and starts
/// listening.
pub fn bind_socket(socket_path: &Path, socket_group: &str) -> Result<UnixListener, ServerError> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path).map_err(|source| ServerError::RemoveStale {
            path: socket_path.display().to_string(),
            source,
        })?;
    }

    let listener = UnixListener::bind(socket_path).map_err(|source| ServerError::Bind {
        path: socket_path.display().to_string(),
        source,
    })?;

    let group = nix::unistd::Group::from_name(socket_group)
        .map_err(|source| ServerError::Chown {
            path: socket_path.display().to_string(),
            source,
        })?
        .ok_or_else(|| ServerError::UnknownGroup {
            group: socket_group.to_owned(),
        })?;
    chown(socket_path, None, Some(Gid::from_raw(group.gid.as_raw()))).map_err(|source| {
        ServerError::Chown {
            path: socket_path.display().to_string(),
            source,
        }
    })?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o660)).map_err(
        |source| ServerError::Chmod {
            path: socket_path.display().to_string(),
            source,
        },
    )?;

    info!(path = %socket_path.display(), group = socket_group, "control socket bound");
    Ok(listener)
}

/// Removes the socket file at `socket_path`, logging (not failing) on
/// error: this runs during shutdown, when the daemon is exiting regardless.
pub fn unlink_socket(socket_path: &Path) {
    if let Err(e) = std::fs::remove_file(socket_path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %socket_path.display(), "failed to remove control socket: {e}");
        }
    }
}

/// Runs the accept loop until `shutdown` is observed set, serving one
/// connection at a time through `controller`.
pub fn run<E: MulticastEngine>(
    listener: &UnixListener,
    controller: &mut Controller<E>,
    shutdown: &AtomicBool,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("accept loop observed shutdown flag; exiting");
            return;
        }

        match wait_for_connection(listener) {
            Ok(true) => match listener.accept() {
                Ok((stream, _addr)) => handle_connection(stream, controller),
                Err(e) => warn!("accept() failed: {e}"),
            },
            Ok(false) => continue,
            Err(e) => {
                warn!("poll() on control socket failed: {e}");
                std::thread::sleep(Duration::from_millis(u64::from(ACCEPT_POLL_TIMEOUT_MS)));
            }
        }
    }
}

/// Waits up to [`ACCEPT_POLL_TIMEOUT_MS`] for the listener to become
/// readable. Returns `Ok(true)` if a connection is ready to accept,
/// `Ok(false)` on a timeout (the normal case, used to re-check shutdown).
fn wait_for_connection(listener: &UnixListener) -> nix::Result<bool> {
    let mut fds = [PollFd::new(listener.as_fd(), PollFlags::POLLIN)];
    let ready = poll(&mut fds, PollTimeout::from(ACCEPT_POLL_TIMEOUT_MS))?;
    Ok(ready > 0)
}

/// Reads one request, dispatches it, writes the response, and closes the
/// connection — the complete lifecycle of a single client (§4.6).
fn handle_connection<E: MulticastEngine>(mut stream: UnixStream, controller: &mut Controller<E>) {
    let mut buf = [0u8; MAX_REQUEST_BYTES];
    let n = match stream.read(&mut buf) {
        Ok(0) => {
            debug!("client disconnected without sending a request");
            return;
        }
        Ok(n) => n,
        Err(e) => {
            warn!("failed to read request: {e}");
            return;
        }
    };

    let response = match serde_json::from_slice::<Request>(&buf[..n]) {
        Ok(request) => dispatch(controller, request),
        Err(e) => {
            debug!("rejected malformed request: {e}");
            Response::err(format!("malformed request: {e}"))
        }
    };

    let body = match serde_json::to_vec(&response) {
        Ok(body) => body,
        Err(e) => {
            error!("failed to serialize response: {e}");
            return;
        }
    };
    if let Err(e) = stream.write_all(&body) {
        warn!("failed to write response: {e}");
        return;
    }
    let _ = stream.shutdown(Shutdown::Both);
}

/// Turns one validated wire request into a controller call and a wire
/// response.
fn dispatch<E: MulticastEngine>(controller: &mut Controller<E>, request: Request) -> Response {
    match request {
        Request::AddMfc(payload) => match controller.add_rule(payload) {
            Ok(()) => Response::ok(None),
            Err(e) => {
                debug!(category = e.category(), "ADD_MFC rejected: {e}");
                Response::err(e.to_string())
            }
        },
        Request::DelMfc(payload) => match controller.delete_rule(payload) {
            Ok(()) => Response::ok(None),
            Err(e) => {
                debug!(category = e.category(), "DEL_MFC rejected: {e}");
                Response::err(e.to_string())
            }
        },
        Request::Show => Response::ok(Some(controller.show())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;

    use mfcd_kernel::KernelError;
    use mfcd_protocol::{AddMfcPayload, DelMfcPayload, Status};

    use super::*;

    #[derive(Default)]
    struct FakeEngine;

    impl MulticastEngine for FakeEngine {
        fn close(&mut self) -> Result<(), KernelError> {
            Ok(())
        }
        fn add_vif(&self, _vifi: u8, _ifindex: u32) -> Result<(), KernelError> {
            Ok(())
        }
        fn del_vif(&self, _vifi: u8, _ifindex: u32) -> Result<(), KernelError> {
            Ok(())
        }
        fn add_mfc(
            &self,
            _origin: Ipv4Addr,
            _group: Ipv4Addr,
            _parent_vifi: u8,
            _outputs: &BTreeSet<u8>,
        ) -> Result<(), KernelError> {
            Ok(())
        }
        fn del_mfc(&self, _origin: Ipv4Addr, _group: Ipv4Addr) -> Result<(), KernelError> {
            Ok(())
        }
    }

    #[test]
    fn show_dispatches_to_an_empty_controller() {
        let mut controller = Controller::new(FakeEngine);
        let response = dispatch(&mut controller, Request::Show);
        assert_eq!(response.status, Status::Success);
        assert!(response.payload.unwrap().mfc_rules.is_empty());
    }

    #[test]
    fn del_mfc_on_unknown_rule_is_an_error_response() {
        let mut controller = Controller::new(FakeEngine);
        let response = dispatch(
            &mut controller,
            Request::DelMfc(DelMfcPayload {
                source: "0.0.0.0".to_owned(),
                group: "239.1.1.1".to_owned(),
            }),
        );
        assert_eq!(response.status, Status::Error);
    }

    #[test]
    fn add_mfc_with_invalid_group_is_an_error_response() {
        let mut controller = Controller::new(FakeEngine);
        let response = dispatch(
            &mut controller,
            Request::AddMfc(AddMfcPayload {
                source: "0.0.0.0".to_owned(),
                group: "239.1.1.256".to_owned(),
                iif: "veth-in".to_owned(),
                oifs: vec!["veth-out".to_owned()],
            }),
        );
        assert_eq!(response.status, Status::Error);
        assert!(response.message.unwrap().to_lowercase().contains("invalid"));
    }
}
