use super::require_function_name;
use crate::errors::BridgeError;
use crate::initialization::PythonHost;
use crate::interpreter_lock::with_interpreter;
use crate::marshal::{HostType, TabularParameters};
use crate::scope;
use pyhost_logger as logger;
use std::time::Instant;

impl PythonHost {
    /// Define `source`, call `function` from it with the first parameter row,
    /// and convert the result to `T`
    pub fn get_text_from_script<T: HostType>(
        &self,
        source: &str,
        function: &str,
        params: Option<&TabularParameters>,
    ) -> Result<T, BridgeError> {
        if source.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "Script source should not be empty".to_string(),
            ));
        }
        require_function_name(function)?;
        if let Some(table) = params {
            table.argument_row()?;
        }

        with_interpreter(|py| {
            let call_start = Instant::now();
            let result = scope::execute_named_function(py, source, function, params)?;
            logger::debug(&format!(
                "Script function '{}' returned {} in {:?}",
                function,
                result.type_name(),
                call_start.elapsed()
            ));
            result.to_host::<T>()
        })
    }
}
