//! Process environment for the embedded interpreter
//!
//! The interpreter reads `PYTHONHOME` and `PYTHONPATH` while it initializes, and
//! the loader resolves dependent DLLs through `PATH`. All three are installed
//! for the current process only, before the library is loaded.

use crate::errors::BridgeError;
use crate::version::InstallationTarget;
use pyhost_config::install_paths::{scripts_dir, site_packages_dir};
use pyhost_logger as logger;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

/// The environment entries installed before initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentPlan {
    pub path: OsString,
    pub python_home: PathBuf,
    pub python_path: PathBuf,
}

impl EnvironmentPlan {
    /// Compute the plan from the target, prepending to the inherited search path
    pub fn for_target(
        target: &InstallationTarget,
        inherited_path: Option<OsString>,
    ) -> Result<Self, BridgeError> {
        let root = target.root();
        let version = target.version();
        let site_packages = site_packages_dir(root, &version.to_string());

        let mut entries = vec![root.to_path_buf(), scripts_dir(root), site_packages.clone()];
        if let Some(existing) = inherited_path {
            if !existing.is_empty() {
                entries.extend(env::split_paths(&existing));
            }
        }
        let path = env::join_paths(entries).map_err(|e| {
            BridgeError::Configuration(format!(
                "Installation root {} cannot be placed on PATH: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self {
            path,
            python_home: root.to_path_buf(),
            python_path: site_packages,
        })
    }

    /// Compute the plan against the current process `PATH`
    pub fn from_process(target: &InstallationTarget) -> Result<Self, BridgeError> {
        Self::for_target(target, env::var_os("PATH"))
    }

    /// Install the plan into the current process environment
    pub fn apply(&self) {
        env::set_var("PATH", &self.path);
        env::set_var("PYTHONHOME", &self.python_home);
        env::set_var("PYTHONPATH", &self.python_path);
        logger::debug(&format!(
            "Set PYTHONHOME={} PYTHONPATH={}",
            self.python_home.display(),
            self.python_path.display()
        ));
    }
}
