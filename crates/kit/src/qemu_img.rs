//! Disk image plumbing via `qemu-img`.

use std::process::Command;

use camino::Utf8Path;
use color_eyre::eyre::Context;
use color_eyre::Result;
use serde::Deserialize;

use crate::command_run::CommandRun;

/// Subset of `qemu-img info --output=json` we care about.
#[derive(Debug, Deserialize)]
pub struct ImageInfo {
    pub format: String,
    #[serde(rename = "virtual-size")]
    pub virtual_size: u64,
}

/// Create a qcow2 image of the given size (qemu-img syntax, e.g. "20G").
pub fn create(path: &Utf8Path, size: &str) -> Result<()> {
    Command::new("qemu-img")
        .args(["create", "-f", "qcow2", path.as_str(), size])
        .run()
        .with_context(|| format!("Creating disk image {path}"))
}

pub fn info(path: &Utf8Path) -> Result<ImageInfo> {
    Command::new("qemu-img")
        .args(["info", "--output=json", path.as_str()])
        .run_and_parse_json()
        .with_context(|| format!("Inspecting disk image {path}"))
}
