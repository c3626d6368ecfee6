//! Menu-driven filesystem browser.
//!
//! Resolves a single file or directory through repeated menu prompts. The
//! navigation logic is a pure transition function over [`BrowseState`] fed
//! by an injectable [`ListDir`] provider, so it can be exercised without a
//! terminal or a real filesystem; only the thin driver loop in [`browse`]
//! talks to the renderer.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use color_eyre::Result;
use tracing::debug;

use crate::dialog::Dialog;

/// One row of the browse menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseChoice {
    /// Terminate on the directory currently listed (directory mode only).
    SelectHere,
    /// Step to the parent directory.
    Parent,
    Directory(String),
    File(String),
}

/// Directory and file names under one path, unsorted.
#[derive(Debug, Default)]
pub struct DirListing {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

/// Directory listing provider, injectable for tests.
pub trait ListDir {
    fn list(&self, path: &Utf8Path) -> std::io::Result<DirListing>;
}

/// Production provider over the real filesystem. Symlinks are followed;
/// entries that are neither directories nor regular files are skipped.
pub struct FsLister;

impl ListDir for FsLister {
    fn list(&self, path: &Utf8Path) -> std::io::Result<DirListing> {
        let mut listing = DirListing::default();
        for entry in path.read_dir_utf8()? {
            let entry = entry?;
            let target = entry.path();
            if target.is_dir() {
                listing.dirs.push(entry.file_name().to_string());
            } else if target.is_file() {
                listing.files.push(entry.file_name().to_string());
            }
        }
        Ok(listing)
    }
}

/// Navigation state between prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseState {
    Browsing(Utf8PathBuf),
    Selected(Utf8PathBuf),
    Cancelled,
}

/// Ordered menu rows for one listing: marker rows first, then directories,
/// then files, each group sorted lexicographically.
pub fn build_choices(listing: &DirListing, select_dir: bool) -> Vec<BrowseChoice> {
    let mut choices = Vec::with_capacity(listing.dirs.len() + listing.files.len() + 2);
    if select_dir {
        choices.push(BrowseChoice::SelectHere);
    }
    choices.push(BrowseChoice::Parent);
    let mut dirs = listing.dirs.clone();
    dirs.sort();
    choices.extend(dirs.into_iter().map(BrowseChoice::Directory));
    let mut files = listing.files.clone();
    files.sort();
    choices.extend(files.into_iter().map(BrowseChoice::File));
    choices
}

/// Pure transition function: what the operator picked at `current` decides
/// the next state. `None` is the renderer's cancellation signal.
pub fn step(current: &Utf8Path, choice: Option<&BrowseChoice>, select_dir: bool) -> BrowseState {
    let Some(choice) = choice else {
        return BrowseState::Cancelled;
    };
    match choice {
        BrowseChoice::SelectHere => BrowseState::Selected(current.to_owned()),
        BrowseChoice::Parent => BrowseState::Browsing(parent_of(current)),
        BrowseChoice::Directory(name) => BrowseState::Browsing(current.join(name)),
        // A file row in directory mode is not a valid selection; stay put
        // and redisplay.
        BrowseChoice::File(_) if select_dir => BrowseState::Browsing(current.to_owned()),
        BrowseChoice::File(name) => BrowseState::Selected(current.join(name)),
    }
}

/// Parent directory; the filesystem root is its own parent, so "go up" at
/// `/` lists `/` again.
fn parent_of(path: &Utf8Path) -> Utf8PathBuf {
    path.parent().unwrap_or(path).to_owned()
}

// Menu tags at the dialog boundary. Directories carry a trailing slash so
// they read as such in the menu; selections are mapped back to the typed
// choice by row position, never by re-parsing the tag.
fn menu_row(choice: &BrowseChoice) -> (String, String) {
    match choice {
        BrowseChoice::SelectHere => (".".into(), "--> SELECT THIS DIRECTORY <--".into()),
        BrowseChoice::Parent => ("..".into(), "../ (go up)".into()),
        BrowseChoice::Directory(name) => (format!("{name}/"), "(dir)".into()),
        BrowseChoice::File(name) => (name.clone(), "(file)".into()),
    }
}

/// Home directory, or the filesystem root when it cannot be determined.
pub(crate) fn home_dir_or_root() -> Utf8PathBuf {
    dirs::home_dir()
        .and_then(|home| Utf8PathBuf::from_path_buf(home).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("/"))
}

/// Absolute starting directory: the configured path when it denotes a
/// readable directory, the home directory otherwise.
fn normalize_start(start: &Utf8Path) -> Utf8PathBuf {
    if let Ok(abs) = start.canonicalize_utf8() {
        if abs.is_dir() {
            return abs;
        }
    }
    home_dir_or_root()
}

/// Drive the browser until the operator selects a path or cancels.
///
/// Permission failures while listing never terminate the session: a
/// blocking notice is shown and the browser steps up one directory.
pub fn browse(
    dialog: &Dialog,
    lister: &dyn ListDir,
    start: &Utf8Path,
    select_dir: bool,
    title: &str,
) -> Result<Option<Utf8PathBuf>> {
    let mut current = normalize_start(start);
    debug!("browsing from {current} (select_dir={select_dir})");
    loop {
        let listing = match lister.list(&current) {
            Ok(listing) => listing,
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                dialog.message("Error", &format!("Permission denied: {current}"))?;
                current = parent_of(&current);
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Listing directory {current}"));
            }
        };

        let choices = build_choices(&listing, select_dir);
        let rows: Vec<(String, String)> = choices.iter().map(menu_row).collect();
        let intent = if select_dir { "directory" } else { "file" };
        let prompt = format!("Current path: {current}\nSelect a {intent}:");

        let picked = dialog.menu(title, &prompt, &rows, 20, 75)?;
        let choice = picked
            .as_deref()
            .and_then(|tag| rows.iter().position(|(t, _)| t == tag))
            .map(|idx| &choices[idx]);
        if picked.is_some() && choice.is_none() {
            // Tag we did not put on the menu; redisplay.
            continue;
        }

        match step(&current, choice, select_dir) {
            BrowseState::Browsing(next) => current = next,
            BrowseState::Selected(path) => return Ok(Some(path)),
            BrowseState::Cancelled => return Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(dirs: &[&str], files: &[&str]) -> DirListing {
        DirListing {
            dirs: dirs.iter().map(|s| s.to_string()).collect(),
            files: files.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_choice_ordering() {
        let choices = build_choices(&listing(&["zeta", "alpha"], &["b.iso", "a.iso"]), true);
        assert_eq!(
            choices,
            vec![
                BrowseChoice::SelectHere,
                BrowseChoice::Parent,
                BrowseChoice::Directory("alpha".into()),
                BrowseChoice::Directory("zeta".into()),
                BrowseChoice::File("a.iso".into()),
                BrowseChoice::File("b.iso".into()),
            ]
        );
    }

    #[test]
    fn test_no_select_here_in_file_mode() {
        let choices = build_choices(&listing(&["d"], &["f"]), false);
        assert_eq!(choices[0], BrowseChoice::Parent);
        assert!(!choices.contains(&BrowseChoice::SelectHere));
    }

    #[test]
    fn test_step_descend_and_select() {
        let current = Utf8Path::new("/srv/isos");
        let next = step(current, Some(&BrowseChoice::Directory("ubuntu".into())), false);
        assert_eq!(next, BrowseState::Browsing("/srv/isos/ubuntu".into()));

        let done = step(current, Some(&BrowseChoice::File("noble.iso".into())), false);
        assert_eq!(done, BrowseState::Selected("/srv/isos/noble.iso".into()));
    }

    #[test]
    fn test_step_file_ignored_in_directory_mode() {
        let current = Utf8Path::new("/srv");
        let next = step(current, Some(&BrowseChoice::File("stray.iso".into())), true);
        assert_eq!(next, BrowseState::Browsing(current.to_owned()));
    }

    #[test]
    fn test_step_select_here() {
        let current = Utf8Path::new("/var/vms");
        let next = step(current, Some(&BrowseChoice::SelectHere), true);
        assert_eq!(next, BrowseState::Selected(current.to_owned()));
    }

    #[test]
    fn test_step_parent_of_root_stays_at_root() {
        let next = step(Utf8Path::new("/"), Some(&BrowseChoice::Parent), false);
        assert_eq!(next, BrowseState::Browsing("/".into()));
    }

    #[test]
    fn test_step_cancellation() {
        assert_eq!(step(Utf8Path::new("/tmp"), None, false), BrowseState::Cancelled);
    }

    #[test]
    fn test_fs_lister_partitions_dirs_and_files() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = Utf8Path::from_path(tmp.path()).unwrap();
        std::fs::create_dir(root.join("sub"))?;
        std::fs::write(root.join("disk.qcow2"), b"")?;

        let listing = FsLister.list(root)?;
        assert_eq!(listing.dirs, vec!["sub".to_string()]);
        assert_eq!(listing.files, vec!["disk.qcow2".to_string()]);
        Ok(())
    }
}
