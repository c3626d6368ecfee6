//! Interactive provisioning session.
//!
//! Sequences the prompts that gather a [`ProvisioningSelections`], hands
//! them to the invocation builder, then executes the resulting plan:
//! filesystem effects first, QEMU launch second. Cancelling the medium or
//! storage selection ends the session neutrally with nothing changed;
//! later failures are hard errors.

use std::str::FromStr;

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use tracing::debug;

use crate::browse::{self, FsLister};
use crate::common_opts::{FirmwareOpts, VmOpts};
use crate::dialog::Dialog;
use crate::qemu::{
    self, Effect, ExistingArtifacts, FirmwareMode, OperatingMode, ProvisioningSelections,
    VmArtifactPaths, QEMU_BIN,
};
use crate::qemu_img;

/// How the medium and storage paths are picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Picker {
    /// Menu-driven browser with one row per directory entry
    Menu,
    /// dialog's built-in fselect/dselect boxes
    Fselect,
}

/// Options for one interactive provisioning session
#[derive(Parser, Debug)]
pub struct SessionOpts {
    /// Directory where browsing starts; defaults to the home directory
    #[clap(long)]
    pub start_dir: Option<Utf8PathBuf>,

    #[clap(long, value_enum, default_value = "menu", help = "Path selection style")]
    pub picker: Picker,

    #[clap(flatten)]
    pub vm: VmOpts,

    #[clap(flatten)]
    pub firmware: FirmwareOpts,
}

/// How the session ended when it did not fail.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The operator backed out before anything was changed.
    Cancelled,
}

/// Run the whole interactive flow: gather selections, plan, execute.
pub fn run(opts: &SessionOpts) -> Result<Outcome> {
    let dialog = Dialog::new();
    let lister = FsLister;
    let start = opts
        .start_dir
        .clone()
        .unwrap_or_else(browse::home_dir_or_root);

    let medium = match opts.picker {
        Picker::Menu => browse::browse(&dialog, &lister, &start, false, "Select install medium")?,
        Picker::Fselect => dialog.file_select("Select install medium", &start)?,
    };
    let Some(medium) = medium else {
        return Ok(Outcome::Cancelled);
    };
    if !medium.is_file() {
        return Err(eyre!("Invalid install medium path: {medium}"));
    }

    let storage_dir = match opts.picker {
        Picker::Menu => browse::browse(&dialog, &lister, &start, true, "Select storage directory")?,
        Picker::Fselect => dialog.dir_select("Select storage directory", &start)?,
    };
    let Some(storage_dir) = storage_dir else {
        return Ok(Outcome::Cancelled);
    };
    std::fs::create_dir_all(&storage_dir)
        .with_context(|| format!("Creating storage directory {storage_dir}"))?;

    let uefi = dialog.confirm(
        "Boot emulation mode",
        "Choose the boot mode for the machine:\n\nUEFI for a modern machine, BIOS for a legacy one",
        "UEFI",
        "BIOS",
    )?;
    let firmware = if uefi {
        FirmwareMode::Uefi
    } else {
        FirmwareMode::Bios
    };

    let mode_rows = vec![
        ("install".to_string(), "Install from the selected medium".to_string()),
        ("run".to_string(), "Run the installed machine from disk".to_string()),
    ];
    let Some(mode_tag) = dialog.menu("Action", "Select action:", &mode_rows, 15, 60)? else {
        return Err(eyre!("No action selected"));
    };
    let mode = OperatingMode::from_str(&mode_tag)
        .map_err(|_| eyre!("Unknown action tag: {mode_tag}"))?;

    let selections = ProvisioningSelections {
        medium,
        storage_dir,
        firmware,
        mode,
    };
    debug!("selections: {selections:?}");

    let artifacts = VmArtifactPaths::derive(&selections.storage_dir, &selections.medium, firmware);
    let existing = ExistingArtifacts::probe(&artifacts);

    if mode == OperatingMode::Install && existing.disk_exists {
        let overwrite = dialog.confirm(
            "Disk exists",
            &format!("Disk {} already exists. Overwrite?", artifacts.disk),
            "Yes",
            "No",
        )?;
        if !overwrite {
            return Err(eyre!(
                "Aborted; existing disk image {} left untouched",
                artifacts.disk
            ));
        }
    }

    let plan = qemu::build_plan(&selections, &opts.firmware, &opts.vm, existing)?;

    println!("Starting {mode} mode ({firmware})");
    apply_effects(&plan.effects)?;
    launch_qemu(&plan.args)?;

    if mode == OperatingMode::Install {
        let boot_now = dialog.confirm(
            "Install complete",
            "Installation finished. Boot the machine from the new virtual disk now?",
            "Yes",
            "No",
        )?;
        if boot_now {
            println!("Restarting from the virtual disk");
            launch_qemu(&qemu::run_args_from_install(&plan.args))?;
        }
    }

    Ok(Outcome::Completed)
}

/// Apply the plan's filesystem effects in listed order.
///
/// A disk whose removal was scheduled together with its re-creation is one
/// destructive unit: when creation fails after the removal already
/// happened, the error says so explicitly instead of leaving the operator
/// to discover the old image is gone.
fn apply_effects(effects: &[Effect]) -> Result<()> {
    let mut removed: Vec<&Utf8PathBuf> = Vec::new();
    for effect in effects {
        debug!("applying effect: {effect:?}");
        match effect {
            Effect::RemoveFile(path) => {
                std::fs::remove_file(path).with_context(|| format!("Removing {path}"))?;
                removed.push(path);
            }
            Effect::CreateDiskImage { path, size } => {
                let created = qemu_img::create(path, size);
                if created.is_err() && removed.contains(&path) {
                    return created.with_context(|| {
                        format!("The previous disk image at {path} was already removed and cannot be recovered")
                    });
                }
                created?;
                let info = qemu_img::info(path)?;
                println!(
                    "Created {} image at {path} ({} bytes virtual)",
                    info.format, info.virtual_size
                );
            }
            Effect::CopyFirmwareVars { template, dest } => {
                std::fs::copy(template, dest)
                    .with_context(|| format!("Copying firmware variables {template} -> {dest}"))?;
            }
        }
    }
    Ok(())
}

/// Launch QEMU synchronously, inheriting the terminal and display. A
/// non-zero exit or a spawn failure surfaces the full attempted argument
/// list for diagnosis.
fn launch_qemu(args: &[String]) -> Result<()> {
    println!("Launching: {QEMU_BIN} {}", args.join(" "));
    let status = std::process::Command::new(QEMU_BIN)
        .args(args)
        .status()
        .with_context(|| format!("Failed to launch {QEMU_BIN} {}", args.join(" ")))?;
    if !status.success() {
        return Err(eyre!(
            "{QEMU_BIN} exited with {status}; args: {}",
            args.join(" ")
        ));
    }
    Ok(())
}
