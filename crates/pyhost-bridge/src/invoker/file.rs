use super::require_function_name;
use crate::errors::BridgeError;
use crate::initialization::PythonHost;
use crate::interpreter_lock::with_interpreter;
use crate::marshal::{self, ForeignObject, HostType, TabularParameters};
use crate::scope::{self, describe_error, ModuleTarget};
use pyhost_logger as logger;
use pyo3::prelude::*;
use std::time::Instant;

impl PythonHost {
    /// Import the script at `path` as a module and call `function` from it
    ///
    /// The script's directory is appended to `sys.path` on every call.
    pub fn get_text_from_file<T: HostType>(
        &self,
        path: &str,
        function: &str,
        params: Option<&TabularParameters>,
    ) -> Result<T, BridgeError> {
        let target = ModuleTarget::from_path(path)?;
        require_function_name(function)?;
        if let Some(table) = params {
            table.argument_row()?;
        }

        with_interpreter(|py| {
            scope::append_search_path(py, &target.search_entry())?;

            logger::debug(&format!("Importing module: {}", target.module_name));
            let module = scope::import(py, &target.module_name)?;
            let callable = module
                .getattr(function)
                .map_err(|e| BridgeError::Execution {
                    scope: target.module_name.clone(),
                    message: describe_error(py, &e),
                })?;

            let args = marshal::call_args(py, params)?;
            let call_start = Instant::now();
            let result = callable
                .call1(args)
                .map(ForeignObject::new)
                .map_err(|e| BridgeError::Execution {
                    scope: target.module_name.clone(),
                    message: describe_error(py, &e),
                })?;
            logger::debug(&format!(
                "{}.{} returned {} in {:?}",
                target.module_name,
                function,
                result.type_name(),
                call_start.elapsed()
            ));
            result.to_host::<T>()
        })
    }
}
