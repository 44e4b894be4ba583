// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// Control CLI (spec §4.6, §4.7, §6.3, §6.5): signals the capture daemon to
// enable/disable/toggle capture, and polls its status file to confirm.
// Ported in behavior from `original_source/clipmenu/src/clipctl.c`.

use std::fs;
use std::io::Read;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use clipmenu::config::Config;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Action {
    Enable,
    Disable,
    Toggle,
    Status,
}

/// Control the clipmenu capture daemon.
#[derive(Parser)]
#[command(name = "clipctl")]
struct Cli {
    #[arg(value_enum)]
    action: Action,
}

const DAEMON_NAME: &str = "clipmenud";
const POLL_START_MS: u64 = 1;
const POLL_MAX_TOTAL_MS: u64 = 1000;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = Config::load().context("resolving configuration")?;

    match cli.action {
        Action::Status => {
            let enabled = read_status(&cfg)?;
            println!("{}", if enabled { "enabled" } else { "disabled" });
            Ok(())
        }
        Action::Enable => transition(&cfg, Signal::SIGUSR2, true),
        Action::Disable => transition(&cfg, Signal::SIGUSR1, false),
        Action::Toggle => {
            let currently_enabled = read_status(&cfg)?;
            if currently_enabled {
                transition(&cfg, Signal::SIGUSR1, false)
            } else {
                transition(&cfg, Signal::SIGUSR2, true)
            }
        }
    }
}

fn transition(cfg: &Config, signal: Signal, want_enabled: bool) -> Result<()> {
    let pid = find_daemon_pid().context("scanning for clipmenud")?;
    let pid = pid.ok_or_else(|| anyhow::anyhow!("clipmenud is not running"))?;

    signal::kill(pid, signal).context("signaling clipmenud")?;

    let mut delay_ms = POLL_START_MS;
    let mut waited_ms = 0u64;
    loop {
        if read_status(cfg).unwrap_or(!want_enabled) == want_enabled {
            return Ok(());
        }
        if waited_ms >= POLL_MAX_TOTAL_MS {
            bail!("timed out waiting for clipmenud to confirm");
        }
        std::thread::sleep(Duration::from_millis(delay_ms));
        waited_ms += delay_ms;
        delay_ms *= 2;
    }
}

fn read_status(cfg: &Config) -> Result<bool> {
    let mut buf = [0u8; 1];
    let mut f = fs::File::open(cfg.status_file_path()).context("reading clipmenud status file")?;
    f.read_exact(&mut buf)?;
    Ok(buf[0] == b'1')
}

/// Scan `/proc/*/comm` for the daemon's executable name (spec §6.5).
/// Zero matches -> `Ok(None)`; multiple matches is fatal (`EXIST`).
fn find_daemon_pid() -> Result<Option<Pid>> {
    let mut found = Vec::new();
    for entry in fs::read_dir("/proc")? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(pid_str) = name.to_str() else { continue };
        let Ok(pid) = pid_str.parse::<i32>() else { continue };

        let comm_path = entry.path().join("comm");
        let Ok(comm) = fs::read_to_string(&comm_path) else { continue };
        if comm.trim() == DAEMON_NAME {
            found.push(Pid::from_raw(pid));
        }
    }

    match found.len() {
        0 => Ok(None),
        1 => Ok(Some(found[0])),
        _ => bail!("multiple clipmenud instances detected"),
    }
}
