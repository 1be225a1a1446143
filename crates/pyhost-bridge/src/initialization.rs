//! Interpreter initialization and host lifecycle
//!
//! Construction performs, in order:
//! 1. Resolve the installation target (root + version)
//! 2. Install PATH / PYTHONHOME / PYTHONPATH for this process
//! 3. Load the versioned Python shared library
//! 4. Initialize the interpreter and check that it reports ready
//!
//! The interpreter can be initialized once per process. Closing the host
//! releases the library handle; the interpreter's own state is not finalized.

use crate::environment::EnvironmentPlan;
use crate::errors::BridgeError;
use crate::interpreter_lock::InterpreterGuard;
use crate::python_loader::PythonLibrary;
use crate::version::{InstallationTarget, PythonVersion};
use once_cell::sync::OnceCell;
use pyhost_config::HostConfig;
use pyhost_logger as logger;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What initialized the process-wide interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterInfo {
    pub version: PythonVersion,
    pub library: PathBuf,
    /// Full version string reported by the engine
    pub engine_version: String,
}

static INTERPRETER: OnceCell<InterpreterInfo> = OnceCell::new();

/// Handle to the embedded interpreter
///
/// There is at most one per process. Every operation takes the process-wide
/// interpreter lock, so the host can be shared freely between threads.
pub struct PythonHost {
    target: InstallationTarget,
    config: HostConfig,
    library: Option<PythonLibrary>,
}

impl PythonHost {
    /// Embed the interpreter installed at `root`
    ///
    /// `version` is "MAJOR.MINOR[...]"; when absent it is read from the root
    /// path (e.g. `C:\Python312`).
    pub fn new(root: impl Into<PathBuf>, version: Option<&str>) -> Result<Self, BridgeError> {
        let mut config = HostConfig::new(root);
        config.python_version = version.map(str::to_string);
        Self::from_config(&config)
    }

    pub fn from_config(config: &HostConfig) -> Result<Self, BridgeError> {
        let start_time = Instant::now();
        let _guard = InterpreterGuard::acquire()?;

        if INTERPRETER.get().is_some() {
            return Err(BridgeError::AlreadyInitialized);
        }

        let target = InstallationTarget::resolve(
            &config.installation_root,
            config.python_version.as_deref(),
        )?;
        logger::info(&format!(
            "Embedding Python {} from {}",
            target.version(),
            target.root().display()
        ));

        EnvironmentPlan::from_process(&target)?.apply();

        let library = PythonLibrary::locate_and_load(&target)?;
        let info = initialize(&target, library.path())?;
        logger::debug(&format!("Interpreter ready: {}", info.engine_version));

        let host = Self {
            target,
            config: config.clone(),
            library: Some(library),
        };

        if config.log_python || logger::get_log_python() {
            if let Err(e) = Python::attach(configure_python_logging) {
                logger::warn(&format!("Python logging configuration failed: {}", e));
            }
        }

        logger::debug(&format!(
            "Total host initialization took: {:?}",
            start_time.elapsed()
        ));
        Ok(host)
    }

    pub fn target(&self) -> &InstallationTarget {
        &self.target
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Path of the loaded library, until the host is closed
    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_ref().map(PythonLibrary::path)
    }

    /// Whether this process has an initialized interpreter
    pub fn is_initialized() -> bool {
        INTERPRETER.get().is_some() && engine_reports_ready()
    }

    /// Details of the interpreter initialized in this process, if any
    pub fn interpreter_info() -> Option<&'static InterpreterInfo> {
        INTERPRETER.get()
    }

    /// Release the native library handle
    pub fn close(mut self) {
        self.release_library();
    }

    fn release_library(&mut self) {
        if let Some(library) = self.library.take() {
            logger::debug(&format!(
                "Releasing Python library: {}",
                library.path().display()
            ));
            drop(library);
        }
    }
}

impl Drop for PythonHost {
    fn drop(&mut self) {
        self.release_library();
    }
}

impl std::fmt::Debug for PythonHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythonHost")
            .field("target", &self.target)
            .field("library", &self.library)
            .finish()
    }
}

pub(crate) fn interpreter_ready() -> bool {
    INTERPRETER.get().is_some()
}

fn initialize(
    target: &InstallationTarget,
    library: &Path,
) -> Result<&'static InterpreterInfo, BridgeError> {
    let pyo3_start = Instant::now();
    pyo3::Python::initialize();
    logger::debug(&format!(
        "pyo3::Python::initialize took: {:?}",
        pyo3_start.elapsed()
    ));

    if !engine_reports_ready() {
        return Err(BridgeError::InterpreterInit(
            "Python not initialized after initialize call".to_string(),
        ));
    }

    let (engine, engine_version) = Python::attach(|py| {
        let info = py.version_info();
        (
            PythonVersion::new(u32::from(info.major), u32::from(info.minor)),
            py.version().to_string(),
        )
    });

    if !target.version().matches(engine) {
        logger::warn(&format!(
            "Python version mismatch: requested {}, but the interpreter reports {}",
            target.version(),
            engine
        ));
    }

    INTERPRETER
        .set(InterpreterInfo {
            version: target.version(),
            library: library.to_path_buf(),
            engine_version,
        })
        .map_err(|_| BridgeError::AlreadyInitialized)?;
    INTERPRETER.get().ok_or_else(|| {
        BridgeError::InterpreterInit("interpreter state was not recorded".to_string())
    })
}

#[expect(unsafe_code, reason = "Py_IsInitialized is an FFI call")]
fn engine_reports_ready() -> bool {
    // SAFETY: Py_IsInitialized may be called at any time, before or after
    // initialization, without holding the GIL.
    unsafe { pyo3::ffi::Py_IsInitialized() != 0 }
}

/// Route the interpreter's `logging` records into the host log file
fn configure_python_logging(py: Python<'_>) -> Result<(), BridgeError> {
    let Some(log_file) = logger::get_log_path() else {
        logger::debug("Host log file not initialized; Python logging left unchanged");
        return Ok(());
    };
    let level = logger::verbosity_to_python_level();

    // Format to match the host logger: [YYYY-MM-DD HH:MM:SS] [PYTHON] LEVEL message
    let logging = PyModule::import(py, "logging")?;
    let handler = logging
        .getattr("FileHandler")?
        .call1((log_file.to_string_lossy().into_owned(),))?;
    let formatter = logging.getattr("Formatter")?.call1((
        "[%(asctime)s] [PYTHON] %(levelname)s %(message)s",
        "%Y-%m-%d %H:%M:%S",
    ))?;
    handler.call_method1("setFormatter", (formatter,))?;

    let root_logger = logging.call_method0("getLogger")?;
    root_logger.call_method1("addHandler", (handler,))?;
    root_logger.call_method1("setLevel", (level,))?;

    logger::debug(&format!(
        "Python logging forwarded to {} at level {}",
        log_file.display(),
        level
    ));
    Ok(())
}
