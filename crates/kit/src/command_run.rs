use std::io::{Read, Seek};
use std::process::Command;

use color_eyre::eyre::{Context, Result, eyre};

/// Helpers intended for [`std::process::Command`].
///
/// Child stderr goes to an unlinked temporary file so a failure report can
/// quote the trailing output without the child writing over our terminal.
pub trait CommandRun {
    /// Execute the child process, returning an error (quoting the tail of
    /// its stderr) if it exits unsuccessfully.
    fn run(&mut self) -> Result<()>;

    /// Execute the child process and capture its stdout as a string.
    fn run_get_string(&mut self) -> Result<String>;

    /// Execute the child process, parsing its stdout as JSON.
    fn run_and_parse_json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T>;
}

// Quote only the trailing stderr bytes to avoid pathological error messages.
const MAX_STDERR_BYTES: u64 = 1024;

fn stderr_tail(mut f: std::fs::File) -> String {
    let size = f.metadata().map(|m| m.len()).unwrap_or(0);
    let take = size.min(MAX_STDERR_BYTES);
    let mut buf = Vec::with_capacity(take as usize);
    let r = f
        .seek(std::io::SeekFrom::End(-(take as i64)))
        .and_then(|_| f.read_to_end(&mut buf));
    match r {
        Ok(_) => String::from_utf8_lossy(&buf).into_owned(),
        Err(e) => {
            tracing::warn!("failed to read child stderr: {e}");
            "<failed to read stderr>".into()
        }
    }
}

impl CommandRun for Command {
    fn run(&mut self) -> Result<()> {
        let stderr = tempfile::tempfile()?;
        self.stderr(stderr.try_clone()?);
        tracing::trace!("exec: {self:?}");
        let status = self.status()?;
        if status.success() {
            return Ok(());
        }
        Err(eyre!("Subprocess failed: {status:?}\n{}", stderr_tail(stderr)))
    }

    fn run_get_string(&mut self) -> Result<String> {
        let mut stdout = tempfile::tempfile()?;
        self.stdout(stdout.try_clone()?);
        self.run()?;
        stdout.seek(std::io::SeekFrom::Start(0)).context("seek")?;
        let mut s = String::new();
        stdout.read_to_string(&mut s)?;
        Ok(s)
    }

    fn run_and_parse_json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        let output = self.run_get_string()?;
        serde_json::from_str(&output).map_err(Into::into)
    }
}
