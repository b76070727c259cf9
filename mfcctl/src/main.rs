// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `mfcctl`: a thin client for `mfcd`'s control socket.
//!
//! Builds one of the three wire requests from its arguments, connects to
//! the daemon's socket, writes the request, reads the response (the
//! protocol is framed by connection close — see §6), and pretty-prints it.
//! Out of scope for the daemon itself (§1), but included here so the crate
//! is exercisable end-to-end without a second, separately-maintained tool.

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mfcd_protocol::{AddMfcPayload, DelMfcPayload, Request, Status};

#[derive(Debug, Parser)]
#[command(name = "mfcctl", about = "Control client for mfcd")]
struct Cli {
    /// Path to mfcd's control socket.
    #[arg(long, default_value = mfcd_config::DEFAULT_SOCKET_PATH)]
    socket_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage MFC rules.
    Mfc {
        #[command(subcommand)]
        action: MfcAction,
    },
    /// Show current VIF bindings and active rules.
    Show,
}

#[derive(Debug, Subcommand)]
enum MfcAction {
    /// Add an MFC rule.
    Add {
        /// Source IP address (defaults to the wildcard source).
        #[arg(long, default_value = "0.0.0.0")]
        source: String,
        /// Multicast group IP address.
        #[arg(long)]
        group: String,
        /// Incoming interface name.
        #[arg(long)]
        iif: String,
        /// Comma-separated list of outgoing interfaces.
        #[arg(long, value_delimiter = ',')]
        oifs: Vec<String>,
    },
    /// Delete an MFC rule.
    Del {
        /// Source IP address (defaults to the wildcard source).
        #[arg(long, default_value = "0.0.0.0")]
        source: String,
        /// Multicast group IP address.
        #[arg(long)]
        group: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let request = match cli.command {
        Command::Mfc {
            action: MfcAction::Add {
                source,
                group,
                iif,
                oifs,
            },
        } => Request::AddMfc(AddMfcPayload {
            source,
            group,
            iif,
            oifs,
        }),
        Command::Mfc {
            action: MfcAction::Del { source, group },
        } => Request::DelMfc(DelMfcPayload { source, group }),
        Command::Show => Request::Show,
    };

    match send(&cli.socket_path, &request) {
        Ok(response) => {
            let printed = serde_json::to_string_pretty(&response)
                .unwrap_or_else(|_| "{\"status\":\"error\"}".to_owned());
            println!("{printed}");
            if response.status == Status::Error {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn send(
    socket_path: &std::path::Path,
    request: &Request,
) -> Result<mfcd_protocol::Response, String> {
    let mut stream = UnixStream::connect(socket_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::ConnectionRefused {
            format!(
                "Error: connection to daemon at {} refused. Is it running?",
                socket_path.display()
            )
        } else {
            format!("Error: could not connect to {}: {e}", socket_path.display())
        }
    })?;

    let body = serde_json::to_vec(request).map_err(|e| format!("Error: {e}"))?;
    stream
        .write_all(&body)
        .map_err(|e| format!("Error: failed to send request: {e}"))?;
    stream
        .shutdown(Shutdown::Write)
        .map_err(|e| format!("Error: {e}"))?;

    let mut buf = Vec::new();
    stream
        .read_to_end(&mut buf)
        .map_err(|e| format!("Error: failed to read response: {e}"))?;
    if buf.is_empty() {
        return Err("Error: daemon closed the connection without a response".to_owned());
    }
    serde_json::from_slice(&buf).map_err(|e| format!("Error: malformed response: {e}"))
}
