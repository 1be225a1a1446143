//! Embedded CPython host
//!
//! Loads a CPython shared library from an installation root at a chosen
//! version, initializes it once per process, and runs scripts or script files
//! in isolated scopes. Arguments go in as a table of host values; results come
//! back as one of a closed set of host types.
//!
//! All interpreter work is serialized by a single process-wide lock.

pub mod bootstrap;
pub mod environment;
pub mod errors;
pub mod initialization;
pub mod interpreter_lock;
pub mod invoker;
pub mod marshal;
pub mod python_loader;
pub mod scope;
pub mod version;

pub use errors::BridgeError;
pub use initialization::{InterpreterInfo, PythonHost};
pub use marshal::{ColumnType, ForeignObject, HostType, HostValue, TabularParameters};
pub use pyhost_config::HostConfig;
pub use version::{InstallationTarget, PythonVersion};
