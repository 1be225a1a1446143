//! Host operations that run code in the interpreter

use crate::errors::BridgeError;
use crate::initialization::PythonHost;
use crate::interpreter_lock::with_interpreter;
use crate::scope::{self, ModuleTarget};
use pyhost_logger as logger;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use std::fs;
use std::time::Instant;

mod file;
mod script;

impl PythonHost {
    /// Import a module by name so later scripts find it in `sys.modules`
    pub fn import_module(&self, name: &str) -> Result<(), BridgeError> {
        with_interpreter(|py| {
            let start = Instant::now();
            scope::import(py, name)?;
            logger::debug(&format!("Imported {} in {:?}", name, start.elapsed()));
            Ok(())
        })
    }

    /// Append a directory to the module search path
    pub fn set_path(&self, path: &str) -> Result<(), BridgeError> {
        with_interpreter(|py| scope::append_search_path(py, path))
    }

    /// Snapshot of the interpreter's `sys.path`
    pub fn sys_path(&self) -> Result<Vec<String>, BridgeError> {
        with_interpreter(|py| {
            let sys = PyModule::import(py, "sys")?;
            Ok(sys.getattr("path")?.extract::<Vec<String>>()?)
        })
    }

    /// Pick up packages installed after the interpreter started
    pub fn refresh_imports(&self) -> Result<(), BridgeError> {
        with_interpreter(|py| {
            let importlib = scope::import(py, "importlib")?;
            importlib.call_method0("invalidate_caches")?;
            let site = scope::import(py, "site")?;
            importlib.call_method1("reload", (site,))?;
            logger::debug("Import caches invalidated and site reloaded");
            Ok(())
        })
    }

    /// Run `source` in a fresh scope named `scope_name`
    pub fn execute(&self, source: &str, scope_name: Option<&str>) -> Result<(), BridgeError> {
        with_interpreter(|py| scope::execute(py, source, scope_name))
    }

    /// Run inline source, or the script at `source_or_path` when `is_file` is set
    ///
    /// A script's directory is appended to `sys.path` so its sibling modules
    /// import, and it runs in a scope named after its module.
    pub fn run_file(&self, source_or_path: &str, is_file: bool) -> Result<(), BridgeError> {
        if !is_file {
            return self.execute(source_or_path, None);
        }

        let target = ModuleTarget::from_path(source_or_path)?;
        let source = fs::read_to_string(&target.file)?;
        logger::debug(&format!("Running script {}", target.file.display()));

        with_interpreter(|py| {
            scope::append_search_path(py, &target.search_entry())?;
            scope::execute(py, &source, Some(&target.module_name))
        })
    }
}

fn require_function_name(function: &str) -> Result<(), BridgeError> {
    if function.trim().is_empty() {
        return Err(BridgeError::Configuration(
            "Function name should not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_function_name_is_rejected() {
        assert!(matches!(
            require_function_name("  "),
            Err(BridgeError::Configuration(_))
        ));
        assert!(require_function_name("main").is_ok());
    }
}
