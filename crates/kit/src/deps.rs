//! Host dependency preflight.
//!
//! Runs before the first prompt: the renderer itself may be among the
//! missing tools, so this check talks over plain stdin/stdout and offers
//! to install the mapped apt packages.

use std::io::Write;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use tracing::debug;

use crate::common_opts::FirmwareOpts;
use crate::qemu::QEMU_BIN;

pub const REQUIRED_TOOLS: &[&str] = &[QEMU_BIN, "qemu-img", "dialog"];

// Sentinel for a missing OVMF code file; not a tool on PATH.
const OVMF_DEP: &str = "ovmf";

fn is_executable(path: &Utf8Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Search the directories of a PATH-style string for an executable.
fn find_in_path(tool: &str, path: &str) -> Option<Utf8PathBuf> {
    path.split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Utf8Path::new(dir).join(tool))
        .find(|candidate| is_executable(candidate))
}

/// Map a missing dependency to the apt package providing it.
fn apt_package(missing: &str) -> &str {
    if missing == OVMF_DEP {
        "ovmf"
    } else if missing.starts_with("qemu") {
        "qemu-system-x86"
    } else {
        missing
    }
}

fn missing_dependencies(path: &str, firmware: &FirmwareOpts) -> Vec<&'static str> {
    let mut missing: Vec<&'static str> = REQUIRED_TOOLS
        .iter()
        .copied()
        .filter(|tool| find_in_path(tool, path).is_none())
        .collect();
    if !firmware.ovmf_code.exists() {
        missing.push(OVMF_DEP);
    }
    missing
}

fn stdin_confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("Reading answer from stdin")?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

/// Wrapper to run apt through sudo, inheriting the terminal.
fn run_apt(args: &[&str]) -> Result<()> {
    debug!("Running: sudo apt {args:?}");
    let status = Command::new("sudo")
        .arg("apt")
        .args(args)
        .status()
        .context("Failed to execute sudo apt")?;
    if !status.success() {
        return Err(eyre!("apt {} failed", args.first().unwrap_or(&"")));
    }
    Ok(())
}

/// Verify the host tools and firmware files this session needs, offering
/// to install anything missing. Declining is a hard error; nothing else
/// can run without the tools.
pub fn preflight(firmware: &FirmwareOpts) -> Result<()> {
    let path = std::env::var("PATH").unwrap_or_default();
    let missing = missing_dependencies(&path, firmware);
    if missing.is_empty() {
        debug!("all host dependencies present");
        return Ok(());
    }

    println!("Missing dependencies: {}", missing.join(", "));
    if !stdin_confirm("Install them with apt now? [y/N] ")? {
        return Err(eyre!("Cannot proceed without: {}", missing.join(", ")));
    }

    let mut packages: Vec<&str> = missing.iter().map(|m| apt_package(m)).collect();
    packages.sort_unstable();
    packages.dedup();
    println!("Installing: {}", packages.join(" "));
    run_apt(&["update"])?;
    let mut install_args = vec!["install", "-y"];
    install_args.extend(&packages);
    run_apt(&install_args)?;
    Ok(())
}
