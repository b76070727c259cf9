// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `mfcd`: the multicast forwarding control-plane daemon's process
//! entrypoint.
//!
//! Startup sequence (§7: only two conditions are fatal here — the kernel
//! engine singleton conflict and a control-socket bind failure):
//!
//! 1. Parse arguments, load configuration.
//! 2. Verify `CAP_NET_ADMIN`; exit nonzero if absent.
//! 3. Open the kernel engine (`MRT_INIT`); fatal on conflict/permission.
//! 4. Replay the persisted rule set through the controller.
//! 5. Bind the control socket; fatal on failure.
//! 6. Install a signal handler, run the accept loop until asked to stop.
//! 7. Unlink the socket, persist current rules, release the kernel engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use mfcd_config::DaemonConfig;
use mfcd_engine::Controller;
use mfcd_kernel::KernelEngine;
use mfcd_protocol::PersistedState;
use tracing::{error, info, warn};

/// Default location of `mfcd`'s INI-shaped configuration file.
const DEFAULT_CONFIG_PATH: &str = "/etc/mfc_daemon.conf";

#[derive(Debug, Parser)]
#[command(name = "mfcd", about = "Multicast forwarding control-plane daemon")]
struct Args {
    /// Path to the INI-shaped configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if !has_net_admin() {
        error!("mfcd must be run with CAP_NET_ADMIN (typically as root)");
        std::process::exit(1);
    }

    let config = DaemonConfig::load(&args.config);
    info!(
        socket_path = %config.socket_path.display(),
        state_file = %config.state_file.display(),
        socket_group = %config.socket_group,
        "loaded configuration"
    );

    if let Some(dir) = config.state_file.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create state directory {}", dir.display()))?;
        }
    }

    let engine = KernelEngine::open().map_err(|e| {
        anyhow::anyhow!(
            "failed to initialize the kernel multicast router (another mfcd instance \
             already running in this network namespace?): {e}"
        )
    })?;
    let mut controller = Controller::new(engine);

    let persisted = mfcd_engine::persistence::load(&config.state_file);
    info!(count = persisted.mfc_rules.len(), "replaying persisted rules");
    controller.replay(persisted.mfc_rules);

    let listener = mfcd_server::bind_socket(&config.socket_path, &config.socket_group)
        .context("failed to bind control socket")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("termination signal received");
            shutdown.store(true, Ordering::Relaxed);
        })
        .context("failed to install signal handler")?;
    }

    info!("mfcd ready");
    mfcd_server::run(&listener, &mut controller, &shutdown);

    info!("shutting down");
    mfcd_server::unlink_socket(&config.socket_path);
    let state = PersistedState {
        mfc_rules: controller.persisted_rules(),
    };
    mfcd_engine::persistence::save_best_effort(&config.state_file, &state);
    controller.shutdown();

    Ok(())
}

fn has_net_admin() -> bool {
    match caps::has_cap(None, caps::CapSet::Effective, caps::Capability::CAP_NET_ADMIN) {
        Ok(has) => has,
        Err(e) => {
            warn!("failed to query CAP_NET_ADMIN, assuming absent: {e}");
            false
        }
    }
}
