//! Locating a CPython installation the tests can embed

use pyhost_bridge::python_loader::library_candidates;
use pyhost_bridge::InstallationTarget;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

pub struct Installation {
    pub root: PathBuf,
    pub version: String,
}

pub fn discover_installation() -> Option<Installation> {
    let output = Command::new("python3")
        .args([
            "-c",
            "import sys; print(sys.version_info[0]); print(sys.version_info[1]); print(sys.base_prefix)",
        ])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8(output.stdout).ok()?;
    let mut lines = stdout.lines();
    let major = lines.next()?.trim().to_string();
    let minor = lines.next()?.trim().to_string();
    let root = PathBuf::from(lines.next()?.trim());
    let version = format!("{}.{}", major, minor);

    let target = InstallationTarget::resolve(&root, Some(&version)).ok()?;
    if !library_candidates(&target).iter().any(|path| path.is_file()) {
        return None;
    }
    Some(Installation { root, version })
}

pub fn write_script(dir: &TempDir, name: &str, source: &str) -> Option<String> {
    let path = dir.path().join(name);
    std::fs::write(&path, source).ok()?;
    Some(path.to_string_lossy().into_owned())
}
