//! Typed wrapper around the `dialog(1)` modal renderer.
//!
//! dialog draws its boxes on the controlling terminal and reports the
//! selected value on stderr; exit code 0 signals acceptance, anything else
//! cancellation. Every operation here maps cancellation to a value
//! (`Ok(None)`, or `false` for [`Dialog::confirm`]) rather than an error:
//! the only `Err` this module produces is a failure to launch the renderer
//! itself.

use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use color_eyre::Result;
use tracing::trace;

/// Branding line rendered along the bottom of every box.
pub const BACKTITLE: &str = "spinvm - interactive VM provisioning";

// Box geometry, matching what dialog renders comfortably on an 80x25
// terminal.
const BOX_HEIGHT: &str = "10";
const BOX_WIDTH: &str = "60";
const SELECT_HEIGHT: &str = "15";
const SELECT_WIDTH: &str = "70";

/// Handle on the external modal renderer.
pub struct Dialog {
    backtitle: String,
}

impl Default for Dialog {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialog {
    pub fn new() -> Self {
        Self {
            backtitle: BACKTITLE.to_string(),
        }
    }

    /// Run dialog with the given mode arguments, blocking until the
    /// operator answers. Returns the value printed on the renderer's
    /// stderr, or `None` on cancellation.
    fn invoke<I, S>(&self, args: I) -> Result<Option<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new("dialog");
        cmd.arg("--backtitle").arg(&self.backtitle);
        cmd.args(args);
        // The UI itself is drawn on the inherited terminal; only the
        // selected value travels over stderr.
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped());
        trace!("exec: {cmd:?}");
        let child = cmd.spawn().context("Failed to launch dialog")?;
        let output = child
            .wait_with_output()
            .context("Failed to wait for dialog")?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    /// Free-text input with a prefilled default.
    #[allow(dead_code)]
    pub fn input_box(&self, title: &str, prompt: &str, default: &str) -> Result<Option<String>> {
        self.invoke([
            "--title", title, "--inputbox", prompt, BOX_HEIGHT, BOX_WIDTH, default,
        ])
    }

    /// dialog's built-in file selection box.
    pub fn file_select(&self, title: &str, start: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
        let picked = self.invoke([
            "--title",
            title,
            "--fselect",
            start.as_str(),
            SELECT_HEIGHT,
            SELECT_WIDTH,
        ])?;
        Ok(picked.map(Utf8PathBuf::from))
    }

    /// dialog's built-in directory selection box.
    pub fn dir_select(&self, title: &str, start: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
        let picked = self.invoke([
            "--title",
            title,
            "--dselect",
            start.as_str(),
            SELECT_HEIGHT,
            SELECT_WIDTH,
        ])?;
        Ok(picked.map(Utf8PathBuf::from))
    }

    /// Single-choice menu over ordered `(tag, label)` rows; returns the
    /// selected tag.
    pub fn menu(
        &self,
        title: &str,
        prompt: &str,
        choices: &[(String, String)],
        height: u32,
        width: u32,
    ) -> Result<Option<String>> {
        let mut args: Vec<String> = vec![
            "--title".into(),
            title.into(),
            "--menu".into(),
            prompt.into(),
            height.to_string(),
            width.to_string(),
            choices.len().to_string(),
        ];
        for (tag, label) in choices {
            args.push(tag.clone());
            args.push(label.clone());
        }
        self.invoke(args)
    }

    /// Binary question with custom button labels. Cancellation (escape)
    /// collapses into `false`.
    pub fn confirm(
        &self,
        title: &str,
        prompt: &str,
        yes_label: &str,
        no_label: &str,
    ) -> Result<bool> {
        let answer = self.invoke([
            "--title", title, "--yes-label", yes_label, "--no-label", no_label, "--yesno", prompt,
            BOX_HEIGHT, BOX_WIDTH,
        ])?;
        Ok(answer.is_some())
    }

    /// Blocking notice the operator must acknowledge.
    pub fn message(&self, title: &str, text: &str) -> Result<()> {
        self.invoke(["--title", title, "--msgbox", text, BOX_HEIGHT, BOX_WIDTH])?;
        Ok(())
    }
}
