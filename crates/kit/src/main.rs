//! spinvm - an interactive provisioning front-end for local QEMU virtual machines

use clap::Parser;
use color_eyre::{Report, Result};

mod browse;
mod command_run;
mod common_opts;
mod deps;
mod dialog;
mod qemu;
mod qemu_img;
mod session;

/// Pick an install medium, a storage directory, and a firmware mode, then
/// install a guest OS or boot an already-installed disk image under QEMU.
///
/// Disk images and UEFI variable stores are named deterministically from
/// the medium and the storage directory, so a later "run" session finds
/// exactly what "install" created.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Skip the host dependency preflight
    #[clap(long)]
    skip_deps_check: bool,

    #[clap(flatten)]
    session: session::SessionOpts,
}

/// Install and configure the tracing/logging system.
///
/// Structured logging with environment-based filtering, error layer
/// integration, and console output formatting. Filtered by the RUST_LOG
/// environment variable, defaulting to 'info'.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let format = fmt::format().without_time().with_target(false).compact();

    let fmt_layer = fmt::layer()
        .event_format(format)
        .with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let cli = Cli::parse();
    if !cli.skip_deps_check {
        deps::preflight(&cli.session.firmware)?;
    }

    match session::run(&cli.session)? {
        session::Outcome::Completed => {}
        session::Outcome::Cancelled => {
            println!("Aborted; nothing was changed.");
        }
    }
    tracing::debug!("exiting");
    std::process::exit(0)
}
