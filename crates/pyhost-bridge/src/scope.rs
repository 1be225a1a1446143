//! Isolated execution scopes
//!
//! A scope is a fresh globals dictionary. Nothing defined in one scope is
//! visible to another unless it is imported explicitly with
//! [`Scope::import_scope`], and every scope is released when its call returns.

use crate::errors::BridgeError;
use crate::marshal::{self, ForeignObject, TabularParameters};
use pyhost_logger as logger;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyModule, PyTuple};
use std::path::{Path, PathBuf};

/// Name the definition scope is imported under in the parameter scope
pub const DEFINITION_ALIAS: &str = "ds";

const ANONYMOUS_SCOPE: &str = "<scope>";

pub struct Scope<'py> {
    name: String,
    globals: Bound<'py, PyDict>,
}

impl<'py> Scope<'py> {
    pub fn new(py: Python<'py>, name: &str) -> Result<Self, BridgeError> {
        let globals = PyDict::new(py);
        globals.set_item("__builtins__", PyModule::import(py, "builtins")?)?;
        globals.set_item("__name__", name)?;
        Ok(Self {
            name: name.to_string(),
            globals,
        })
    }

    pub fn anonymous(py: Python<'py>) -> Result<Self, BridgeError> {
        Self::new(py, ANONYMOUS_SCOPE)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compile `source`, then execute it in this scope
    pub fn exec(&self, source: &str) -> Result<(), BridgeError> {
        let py = self.globals.py();
        let code = compile(py, source, &self.name)?;
        let builtins = PyModule::import(py, "builtins")?;
        builtins
            .getattr("exec")?
            .call1((code, &self.globals))
            .map_err(|e| BridgeError::Execution {
                scope: self.name.clone(),
                message: describe_error(py, &e),
            })?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Option<Bound<'py, PyAny>>, BridgeError> {
        Ok(self.globals.get_item(name)?)
    }

    /// Bind `other`'s names into this scope as a module object named `alias`
    pub fn import_scope(&self, other: &Scope<'py>, alias: &str) -> Result<(), BridgeError> {
        let py = self.globals.py();
        let module = PyModule::new(py, alias)?;
        let namespace = module.dict();
        for (key, value) in other.globals.iter() {
            let key_name: String = key.extract()?;
            if is_dunder(&key_name) {
                continue;
            }
            namespace.set_item(key, value)?;
        }
        self.globals.set_item(alias, module)?;
        Ok(())
    }

    /// Call `alias.function(*args)` where `alias` was bound by `import_scope`
    pub fn call(
        &self,
        alias: &str,
        function: &str,
        args: Bound<'py, PyTuple>,
    ) -> Result<ForeignObject<'py>, BridgeError> {
        let py = self.globals.py();
        let namespace = self.get(alias)?.ok_or_else(|| BridgeError::Execution {
            scope: self.name.clone(),
            message: format!("name '{}' is not defined", alias),
        })?;
        let callable = namespace
            .getattr(function)
            .map_err(|e| BridgeError::Execution {
                scope: self.name.clone(),
                message: describe_error(py, &e),
            })?;
        callable
            .call1(args)
            .map(ForeignObject::new)
            .map_err(|e| BridgeError::Execution {
                scope: self.name.clone(),
                message: describe_error(py, &e),
            })
    }
}

/// Compile source as a module body; syntax problems surface as `Compilation`
pub fn compile<'py>(
    py: Python<'py>,
    source: &str,
    scope_name: &str,
) -> Result<Bound<'py, PyAny>, BridgeError> {
    let builtins = PyModule::import(py, "builtins")?;
    builtins
        .getattr("compile")?
        .call1((source, scope_name, "exec"))
        .map_err(|e| BridgeError::Compilation {
            scope: scope_name.to_string(),
            message: describe_error(py, &e),
        })
}

/// Run `source` in a fresh scope that is discarded afterwards
pub fn execute(py: Python<'_>, source: &str, scope_name: Option<&str>) -> Result<(), BridgeError> {
    let scope = match scope_name {
        Some(name) => Scope::new(py, name)?,
        None => Scope::anonymous(py)?,
    };
    logger::debug(&format!("Executing source in scope '{}'", scope.name()));
    scope.exec(source)
}

/// Define `definition` in one scope, then call `function` from a second scope
///
/// The second scope sees the first only through [`DEFINITION_ALIAS`]. The
/// arguments are the first row of `params`, passed positionally.
pub fn execute_named_function<'py>(
    py: Python<'py>,
    definition: &str,
    function: &str,
    params: Option<&TabularParameters>,
) -> Result<ForeignObject<'py>, BridgeError> {
    let definitions = Scope::new(py, "<definition>")?;
    definitions.exec(definition)?;

    let call_scope = Scope::new(py, "<call>")?;
    call_scope.import_scope(&definitions, DEFINITION_ALIAS)?;

    let args = marshal::call_args(py, params)?;
    logger::debug(&format!(
        "Calling {}.{} with {} argument(s)",
        DEFINITION_ALIAS,
        function,
        args.len()
    ));
    call_scope.call(DEFINITION_ALIAS, function, args)
}

/// Append an entry to the interpreter's module search path
///
/// Entries are never deduplicated; repeated calls keep growing `sys.path`.
pub fn append_search_path(py: Python<'_>, entry: &str) -> Result<(), BridgeError> {
    let sys = PyModule::import(py, "sys")?;
    sys.getattr("path")?.call_method1("append", (entry,))?;
    logger::debug(&format!("Appended to sys.path: {}", entry));
    Ok(())
}

/// Import a module, keeping the Python traceback in the error
pub fn import<'py>(py: Python<'py>, module: &str) -> Result<Bound<'py, PyModule>, BridgeError> {
    PyModule::import(py, module)
        .map_err(|e| BridgeError::Import(module.to_string(), describe_error(py, &e)))
}

/// Render a Python exception with its traceback
pub(crate) fn describe_error(py: Python<'_>, err: &PyErr) -> String {
    let formatted = (|| -> PyResult<String> {
        let traceback = PyModule::import(py, "traceback")?;
        let lines = traceback.call_method1(
            "format_exception",
            (err.get_type(py), err.value(py), err.traceback(py)),
        )?;
        Ok(lines.extract::<Vec<String>>()?.concat())
    })();
    match formatted {
        Ok(text) if !text.trim().is_empty() => text.trim_end().to_string(),
        _ => err.to_string(),
    }
}

/// A script file resolved into a search-path directory and a module name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleTarget {
    pub file: PathBuf,
    pub directory: PathBuf,
    pub module_name: String,
}

impl ModuleTarget {
    pub fn from_path(path: &str) -> Result<Self, BridgeError> {
        if path.is_empty() {
            return Err(BridgeError::Configuration(
                "Path should not be empty".to_string(),
            ));
        }
        if !path.ends_with(".py") {
            return Err(BridgeError::Configuration(format!(
                "Invalid path or the path doesn't contain the file name (.py): {}",
                path
            )));
        }

        let file = expand_home(path);
        if file.extension().and_then(|ext| ext.to_str()) != Some("py") {
            return Err(BridgeError::Configuration(format!(
                "No module name in path: {}",
                path
            )));
        }
        let module_name = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| {
                BridgeError::Configuration(format!("No module name in path: {}", path))
            })?;
        let directory = file.parent().map(Path::to_path_buf).unwrap_or_default();

        Ok(Self {
            file,
            directory,
            module_name,
        })
    }

    /// The `sys.path` entry for the file's directory; empty means the working directory
    pub fn search_entry(&self) -> String {
        self.directory.to_string_lossy().into_owned()
    }
}

/// `__name__`-style interpreter names; `__helper` is an ordinary binding
fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

fn expand_home(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\"))
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
