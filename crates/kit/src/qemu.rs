//! QEMU invocation planning.
//!
//! Decision logic here is pure: given the operator's selections and a
//! snapshot of the on-disk artifacts, derive the exact argument list plus
//! the ordered filesystem effects the session runner must apply first.
//! Nothing in this module touches the filesystem, which keeps the mapping
//! from selections to effects testable without disk state.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use color_eyre::Result;

use crate::common_opts::{FirmwareOpts, VmOpts};

pub const QEMU_BIN: &str = "qemu-system-x86_64";

/// Boot firmware emulated for the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum FirmwareMode {
    /// Legacy boot; no extra firmware files involved.
    #[strum(serialize = "BIOS")]
    Bios,
    /// Modern boot; needs the OVMF code file and a per-machine writable
    /// variable store.
    #[strum(serialize = "UEFI")]
    Uefi,
}

/// What this session does with the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum OperatingMode {
    /// Boot the install medium and create the disk image.
    #[strum(serialize = "install")]
    Install,
    /// Boot an already-installed disk image.
    #[strum(serialize = "run")]
    Run,
}

/// Everything gathered interactively before planning. Immutable once
/// constructed; a cancellation on the way here aborts with no side effects.
#[derive(Debug, Clone)]
pub struct ProvisioningSelections {
    pub medium: Utf8PathBuf,
    pub storage_dir: Utf8PathBuf,
    pub firmware: FirmwareMode,
    pub mode: OperatingMode,
}

/// On-disk artifact locations, derived deterministically so a later "run"
/// session finds what "install" created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmArtifactPaths {
    pub disk: Utf8PathBuf,
    pub vars: Utf8PathBuf,
}

impl VmArtifactPaths {
    /// Pure function of the storage directory, the medium basename
    /// (extension stripped), and the firmware mode. UEFI disks carry a
    /// `.uefi` infix so both firmware flavors of one medium can coexist.
    pub fn derive(storage_dir: &Utf8Path, medium: &Utf8Path, firmware: FirmwareMode) -> Self {
        let base = medium
            .file_stem()
            .unwrap_or_else(|| medium.file_name().unwrap_or(medium.as_str()));
        let disk_name = match firmware {
            FirmwareMode::Bios => format!("{base}.qcow2"),
            FirmwareMode::Uefi => format!("{base}.uefi.qcow2"),
        };
        Self {
            disk: storage_dir.join(disk_name),
            vars: storage_dir.join(format!("OVMF_VARS_{base}.fd")),
        }
    }
}

/// Snapshot of artifact existence, probed once before planning.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistingArtifacts {
    pub disk_exists: bool,
    pub vars_exists: bool,
}

impl ExistingArtifacts {
    pub fn probe(paths: &VmArtifactPaths) -> Self {
        Self {
            disk_exists: paths.disk.exists(),
            vars_exists: paths.vars.exists(),
        }
    }
}

/// A filesystem mutation the runner must apply before launching QEMU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RemoveFile(Utf8PathBuf),
    CreateDiskImage { path: Utf8PathBuf, size: String },
    CopyFirmwareVars { template: Utf8PathBuf, dest: Utf8PathBuf },
}

/// Ordered QEMU arguments plus the ordered effects they depend on. Built
/// once per session, consumed once by the runner.
#[derive(Debug, Clone)]
pub struct InvocationPlan {
    pub args: Vec<String>,
    pub effects: Vec<Effect>,
}

fn base_args(disk: &Utf8Path, vm: &VmOpts) -> Vec<String> {
    vec![
        "-enable-kvm".into(),
        "-m".into(),
        vm.memory.to_string(),
        "-smp".into(),
        vm.vcpus.to_string(),
        "-cpu".into(),
        "host".into(),
        "-drive".into(),
        format!("file={disk},format=qcow2,if=virtio"),
        "-netdev".into(),
        "user,id=net0".into(),
        "-device".into(),
        "virtio-net-pci,netdev=net0".into(),
        "-display".into(),
        "gtk".into(),
    ]
}

fn pflash_args(code: &Utf8Path, vars: &Utf8Path) -> Vec<String> {
    vec![
        "-drive".into(),
        format!("if=pflash,format=raw,readonly=on,file={code}"),
        "-drive".into(),
        format!("if=pflash,format=raw,file={vars}"),
    ]
}

/// Map the selections plus artifact state to an [`InvocationPlan`].
///
/// Overwriting an existing disk image must already have been confirmed by
/// the caller; in run mode a missing disk image aborts before any argument
/// is produced.
pub fn build_plan(
    selections: &ProvisioningSelections,
    firmware: &FirmwareOpts,
    vm: &VmOpts,
    existing: ExistingArtifacts,
) -> Result<InvocationPlan> {
    let artifacts = VmArtifactPaths::derive(&selections.storage_dir, &selections.medium, selections.firmware);

    if selections.mode == OperatingMode::Run && !existing.disk_exists {
        return Err(eyre!(
            "Disk image not found: {}. Run install first.",
            artifacts.disk
        ));
    }

    let mut args = base_args(&artifacts.disk, vm);
    if selections.firmware == FirmwareMode::Uefi {
        args.extend(pflash_args(&firmware.ovmf_code, &artifacts.vars));
    }

    let mut effects = Vec::new();
    match selections.mode {
        OperatingMode::Install => {
            if existing.disk_exists {
                effects.push(Effect::RemoveFile(artifacts.disk.clone()));
            }
            effects.push(Effect::CreateDiskImage {
                path: artifacts.disk.clone(),
                size: vm.disk_size.clone(),
            });
            if selections.firmware == FirmwareMode::Uefi {
                if existing.vars_exists {
                    effects.push(Effect::RemoveFile(artifacts.vars.clone()));
                }
                effects.push(Effect::CopyFirmwareVars {
                    template: firmware.ovmf_vars_template.clone(),
                    dest: artifacts.vars.clone(),
                });
            }
            args.push("-cdrom".into());
            args.push(selections.medium.to_string());
            args.push("-boot".into());
            args.push("order=d".into());
        }
        OperatingMode::Run => {
            args.push("-boot".into());
            args.push("order=c".into());
        }
    }

    Ok(InvocationPlan { args, effects })
}

/// Derive the run-mode argument list from a completed install-mode one:
/// drop `-cdrom` (with the medium path) and the `-boot order=d` pair, then
/// boot from the primary disk.
pub fn run_args_from_install(install_args: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(install_args.len());
    let mut skip_value = false;
    for arg in install_args {
        if skip_value {
            skip_value = false;
            continue;
        }
        match arg.as_str() {
            "-cdrom" | "-boot" => skip_value = true,
            _ => args.push(arg.clone()),
        }
    }
    args.push("-boot".into());
    args.push("order=c".into());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn selections(firmware: FirmwareMode, mode: OperatingMode) -> ProvisioningSelections {
        ProvisioningSelections {
            medium: "/media/ubuntu-24.04.iso".into(),
            storage_dir: "/vms/ubuntu".into(),
            firmware,
            mode,
        }
    }

    fn firmware_opts() -> FirmwareOpts {
        FirmwareOpts {
            ovmf_code: "/usr/share/OVMF/OVMF_CODE_4M.fd".into(),
            ovmf_vars_template: "/usr/share/OVMF/OVMF_VARS_4M.fd".into(),
        }
    }

    fn vm_opts() -> VmOpts {
        VmOpts {
            memory: 2048,
            vcpus: 4,
            disk_size: "20G".into(),
        }
    }

    #[test]
    fn test_artifact_paths_bios() {
        let paths = VmArtifactPaths::derive(
            Utf8Path::new("/vms/ubuntu"),
            Utf8Path::new("/media/ubuntu-24.04.iso"),
            FirmwareMode::Bios,
        );
        assert_eq!(paths.disk, Utf8PathBuf::from("/vms/ubuntu/ubuntu-24.04.qcow2"));
    }

    #[test]
    fn test_artifact_paths_uefi() {
        let paths = VmArtifactPaths::derive(
            Utf8Path::new("/vms/ubuntu"),
            Utf8Path::new("/media/ubuntu-24.04.iso"),
            FirmwareMode::Uefi,
        );
        assert_eq!(
            paths.disk,
            Utf8PathBuf::from("/vms/ubuntu/ubuntu-24.04.uefi.qcow2")
        );
        assert_eq!(
            paths.vars,
            Utf8PathBuf::from("/vms/ubuntu/OVMF_VARS_ubuntu-24.04.fd")
        );
    }

    #[test]
    fn test_artifact_paths_deterministic() {
        let derive = || {
            VmArtifactPaths::derive(
                Utf8Path::new("/vms"),
                Utf8Path::new("/isos/debian-13.iso"),
                FirmwareMode::Uefi,
            )
        };
        assert_eq!(derive(), derive());
    }

    #[test]
    fn test_bios_install_plan() -> Result<()> {
        let plan = build_plan(
            &selections(FirmwareMode::Bios, OperatingMode::Install),
            &firmware_opts(),
            &vm_opts(),
            ExistingArtifacts::default(),
        )?;

        assert!(!plan.args.iter().any(|a| a.contains("pflash")));
        assert!(plan.args.contains(&"-cdrom".to_string()));
        assert!(plan.args.contains(&"/media/ubuntu-24.04.iso".to_string()));
        assert!(plan.args.contains(&"order=d".to_string()));
        assert!(plan
            .args
            .contains(&"file=/vms/ubuntu/ubuntu-24.04.qcow2,format=qcow2,if=virtio".to_string()));
        assert_eq!(
            plan.effects,
            vec![Effect::CreateDiskImage {
                path: "/vms/ubuntu/ubuntu-24.04.qcow2".into(),
                size: "20G".into(),
            }]
        );
        Ok(())
    }

    #[test]
    fn test_uefi_install_plan() -> Result<()> {
        let plan = build_plan(
            &selections(FirmwareMode::Uefi, OperatingMode::Install),
            &firmware_opts(),
            &vm_opts(),
            ExistingArtifacts::default(),
        )?;

        let pflash: Vec<&String> = plan.args.iter().filter(|a| a.contains("pflash")).collect();
        assert_eq!(pflash.len(), 2);
        assert!(pflash[0].contains("readonly=on"));
        assert!(pflash[0].contains("/usr/share/OVMF/OVMF_CODE_4M.fd"));
        assert!(pflash[1].contains("/vms/ubuntu/OVMF_VARS_ubuntu-24.04.fd"));
        assert!(!pflash[1].contains("readonly"));
        assert!(plan.effects.contains(&Effect::CopyFirmwareVars {
            template: "/usr/share/OVMF/OVMF_VARS_4M.fd".into(),
            dest: "/vms/ubuntu/OVMF_VARS_ubuntu-24.04.fd".into(),
        }));
        Ok(())
    }

    #[test]
    fn test_install_over_existing_artifacts_removes_them_first() -> Result<()> {
        let plan = build_plan(
            &selections(FirmwareMode::Uefi, OperatingMode::Install),
            &firmware_opts(),
            &vm_opts(),
            ExistingArtifacts {
                disk_exists: true,
                vars_exists: true,
            },
        )?;
        assert_eq!(
            plan.effects,
            vec![
                Effect::RemoveFile("/vms/ubuntu/ubuntu-24.04.uefi.qcow2".into()),
                Effect::CreateDiskImage {
                    path: "/vms/ubuntu/ubuntu-24.04.uefi.qcow2".into(),
                    size: "20G".into(),
                },
                Effect::RemoveFile("/vms/ubuntu/OVMF_VARS_ubuntu-24.04.fd".into()),
                Effect::CopyFirmwareVars {
                    template: "/usr/share/OVMF/OVMF_VARS_4M.fd".into(),
                    dest: "/vms/ubuntu/OVMF_VARS_ubuntu-24.04.fd".into(),
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_run_without_disk_is_an_error() {
        let result = build_plan(
            &selections(FirmwareMode::Bios, OperatingMode::Run),
            &firmware_opts(),
            &vm_opts(),
            ExistingArtifacts::default(),
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Run install first"));
        assert!(err.contains("/vms/ubuntu/ubuntu-24.04.qcow2"));
    }

    #[test]
    fn test_run_plan_boots_from_disk_with_no_effects() -> Result<()> {
        let plan = build_plan(
            &selections(FirmwareMode::Bios, OperatingMode::Run),
            &firmware_opts(),
            &vm_opts(),
            ExistingArtifacts {
                disk_exists: true,
                vars_exists: false,
            },
        )?;
        assert!(plan.effects.is_empty());
        assert!(plan.args.contains(&"order=c".to_string()));
        assert!(!plan.args.contains(&"-cdrom".to_string()));
        Ok(())
    }

    #[test]
    fn test_run_args_derived_from_install_args() -> Result<()> {
        let install = build_plan(
            &selections(FirmwareMode::Uefi, OperatingMode::Install),
            &firmware_opts(),
            &vm_opts(),
            ExistingArtifacts::default(),
        )?;
        let derived = run_args_from_install(&install.args);

        assert!(!derived.contains(&"-cdrom".to_string()));
        assert!(!derived.contains(&"/media/ubuntu-24.04.iso".to_string()));
        assert!(!derived.contains(&"order=d".to_string()));
        assert_eq!(derived.iter().filter(|a| *a == "-boot").count(), 1);
        assert_eq!(derived.iter().filter(|a| *a == "order=c").count(), 1);

        // Identical to a plan built directly for run mode.
        let run = build_plan(
            &selections(FirmwareMode::Uefi, OperatingMode::Run),
            &firmware_opts(),
            &vm_opts(),
            ExistingArtifacts {
                disk_exists: true,
                vars_exists: true,
            },
        )?;
        assert_eq!(derived, run.args);
        Ok(())
    }

    #[test]
    fn test_mode_tags_round_trip() {
        assert_eq!(OperatingMode::from_str("install").unwrap(), OperatingMode::Install);
        assert_eq!(OperatingMode::from_str("run").unwrap(), OperatingMode::Run);
        assert_eq!(FirmwareMode::Uefi.to_string(), "UEFI");
        assert_eq!(FirmwareMode::Bios.to_string(), "BIOS");
    }
}
