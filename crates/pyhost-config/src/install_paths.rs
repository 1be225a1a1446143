//! Platform-specific layout of a Python installation root
//!
//! Windows installations keep the executable and DLL at the root, with
//! `Scripts` and `Lib\site-packages` beside them. Unix prefixes use `bin` and
//! `lib/python3.X/site-packages`.

use std::path::{Path, PathBuf};

/// The name of the library directory ("Lib" on Windows, "lib" on Unix)
#[cfg(windows)]
pub const PYTHON_LIB_DIR: &str = "Lib";
#[cfg(not(windows))]
pub const PYTHON_LIB_DIR: &str = "lib";

/// The name of the scripts directory ("Scripts" on Windows, "bin" on Unix)
#[cfg(windows)]
pub const PYTHON_BIN_DIR: &str = "Scripts";
#[cfg(not(windows))]
pub const PYTHON_BIN_DIR: &str = "bin";

pub const SITE_PACKAGES: &str = "site-packages";

/// Candidate executable names, relative to the installation root
#[cfg(windows)]
const PYTHON_EXE_CANDIDATES: &[&str] = &["python.exe"];
#[cfg(not(windows))]
const PYTHON_EXE_CANDIDATES: &[&str] = &["bin/python3", "bin/python"];

/// Executables directory of an installation (root/Scripts or root/bin)
pub fn scripts_dir(root: &Path) -> PathBuf {
    root.join(PYTHON_BIN_DIR)
}

/// Site-packages directory for an installation
///
/// - **Windows**: `root\Lib\site-packages`
/// - **Unix/macOS**: `root/lib/python{series}/site-packages`
///
/// `series` is the release series as written in directory names, "3.12".
///
/// The directory is computed, not checked: the interpreter tolerates a
/// missing entry on its search path.
#[cfg(windows)]
pub fn site_packages_dir(root: &Path, _series: &str) -> PathBuf {
    root.join(PYTHON_LIB_DIR).join(SITE_PACKAGES)
}

#[cfg(not(windows))]
pub fn site_packages_dir(root: &Path, series: &str) -> PathBuf {
    root.join(PYTHON_LIB_DIR)
        .join(format!("python{}", series))
        .join(SITE_PACKAGES)
}

/// Locate the interpreter executable of an installation
///
/// Checks the installation root first, then falls back to a versioned
/// executable on `PATH` (e.g. `python3.12`).
pub fn python_executable(root: &Path, series: &str) -> Option<PathBuf> {
    PYTHON_EXE_CANDIDATES
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|candidate| candidate.is_file())
        .or_else(|| which::which(format!("python{}", series)).ok())
}
