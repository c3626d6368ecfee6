//! Common CLI options shared across the provisioning flow

use camino::Utf8PathBuf;
use clap::Parser;

pub const DEFAULT_MEMORY_MB: u32 = 2048;
pub const DEFAULT_VCPUS: u32 = 4;
pub const DEFAULT_INSTALL_DISK_SIZE: &str = "20G";

/// Debian install locations for the OVMF firmware files.
pub const DEFAULT_OVMF_CODE: &str = "/usr/share/OVMF/OVMF_CODE_4M.fd";
pub const DEFAULT_OVMF_VARS_TEMPLATE: &str = "/usr/share/OVMF/OVMF_VARS_4M.fd";

/// Guest sizing options
#[derive(Parser, Debug, Clone)]
pub struct VmOpts {
    #[clap(long, default_value_t = DEFAULT_MEMORY_MB, help = "Guest memory size in MiB")]
    pub memory: u32,

    #[clap(long, default_value_t = DEFAULT_VCPUS, help = "Number of vCPUs")]
    pub vcpus: u32,

    #[clap(
        long,
        default_value = DEFAULT_INSTALL_DISK_SIZE,
        help = "Size of the disk image created at install time (qemu-img syntax, e.g. 20G)"
    )]
    pub disk_size: String,
}

/// UEFI firmware file locations, overridable per environment
#[derive(Parser, Debug, Clone)]
pub struct FirmwareOpts {
    #[clap(
        long,
        env = "SPINVM_OVMF_CODE",
        default_value = DEFAULT_OVMF_CODE,
        help = "UEFI firmware code file (attached as read-only pflash)"
    )]
    pub ovmf_code: Utf8PathBuf,

    #[clap(
        long,
        env = "SPINVM_OVMF_VARS_TEMPLATE",
        default_value = DEFAULT_OVMF_VARS_TEMPLATE,
        help = "UEFI variable store template copied next to each disk image"
    )]
    pub ovmf_vars_template: Utf8PathBuf,
}
