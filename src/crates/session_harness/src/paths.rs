use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};

/// Fixed layout of the scratch tree used by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchLayout {
    root: PathBuf,
}

impl ScratchLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Prebuilt repository simulating a package source.
    pub fn fixture_repo(&self) -> PathBuf {
        self.root.join("repos").join("fixture")
    }

    /// Directory each example starts in.
    pub fn app_root(&self) -> PathBuf {
        self.root.join("app")
    }

    pub fn home(&self) -> PathBuf {
        self.root.join("home")
    }

    /// Packages installed into the simulated system location.
    pub fn installed_packages(&self) -> PathBuf {
        self.root.join("installed").join("system")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

/// Remove a directory tree, treating an already missing tree as success.
pub fn remove_tree(path: &Path) -> HarnessResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(HarnessError::fixture(path, format!("remove: {err}"))),
    }
}

/// Remove and recreate an empty directory.
pub fn recreate_dir(path: &Path) -> HarnessResult<()> {
    remove_tree(path)?;
    fs::create_dir_all(path).map_err(|err| HarnessError::fixture(path, format!("create: {err}")))
}

/// Reject roots containing characters outside `[A-Za-z0-9_/.-]`.
pub fn check_root(path: &Path) -> HarnessResult<()> {
    let text = path.to_string_lossy();
    let allowed = |c: char| {
        c.is_ascii_alphanumeric()
            || matches!(c, '_' | '/' | '.' | '-')
            // drive prefixes and separators
            || (cfg!(windows) && matches!(c, '\\' | ':'))
    };
    match text.chars().find(|c| !allowed(*c)) {
        Some(character) => Err(HarnessError::UnsupportedRoot {
            path: path.to_path_buf(),
            character,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_in_scratch_dir() {
        let layout = ScratchLayout::new("/suite/tmp");
        assert_eq!(layout.fixture_repo(), PathBuf::from("/suite/tmp/repos/fixture"));
        assert_eq!(layout.app_root(), PathBuf::from("/suite/tmp/app"));
        assert_eq!(layout.installed_packages(), PathBuf::from("/suite/tmp/installed/system"));
        assert_eq!(layout.log_dir(), PathBuf::from("/suite/tmp/logs"));
    }

    #[test]
    fn special_characters_in_root_are_rejected() {
        assert!(check_root(Path::new("/home/dev/bundler-2.0/suite")).is_ok());
        let err = check_root(Path::new("/home/dev/my project")).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::UnsupportedRoot { character: ' ', .. }
        ));
    }

    #[test]
    fn recreate_dir_empties_existing_tree() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("installed");
        fs::create_dir_all(dir.join("gem-1.0")).expect("seed");

        recreate_dir(&dir).expect("recreate");
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).expect("read").count(), 0);
        remove_tree(&temp.path().join("missing")).expect("missing is fine");
    }
}
