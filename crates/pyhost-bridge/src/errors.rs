use pyhost_config::ConfigError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while embedding or calling into the interpreter
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Python library {expected} not found in {}", root.display())]
    LibraryNotFound { root: PathBuf, expected: String },

    #[error("Unable to load library: {0}")]
    LibraryLoad(String),

    #[error("Failed to initialize Python interpreter: {0}")]
    InterpreterInit(String),

    #[error("Python interpreter is already initialized in this process")]
    AlreadyInitialized,

    #[error("Python interpreter is not initialized")]
    NotInitialized,

    #[error("Interpreter lock is already held by this thread")]
    Reentrant,

    #[error("Failed to compile '{scope}': {message}")]
    Compilation { scope: String, message: String },

    #[error("Execution failed in '{scope}': {message}")]
    Execution { scope: String, message: String },

    #[error("Failed to import module '{0}': {1}")]
    Import(String, String),

    #[error("Cannot convert Python '{found}' to {target}")]
    InvalidCast { target: &'static str, found: String },

    #[error("Cannot marshal parameter: {0}")]
    Marshal(String),

    #[error("Unable to initialise pip, please check the installation at {}: {message}", root.display())]
    Bootstrap { root: PathBuf, message: String },

    #[error("Python error: {0}")]
    Python(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Generic conversion from PyErr to BridgeError.
///
/// NOTE: This conversion loses the Python traceback. Script-level failures go
/// through `scope::describe_error` instead so callers see where the error was
/// raised.
impl From<pyo3::PyErr> for BridgeError {
    fn from(err: pyo3::PyErr) -> Self {
        BridgeError::Python(format!("{}", err))
    }
}
