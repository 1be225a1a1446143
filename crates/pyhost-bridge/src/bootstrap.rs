//! Bootstrapping pip into the embedded installation
//!
//! When `pip` is not importable, the installation's own executable runs the
//! bootstrap script (normally `get-pip.py`) from the installation root. The
//! interpreter lock stays held for the whole wait, with the GIL released.

use crate::errors::BridgeError;
use crate::initialization::PythonHost;
use crate::interpreter_lock::with_interpreter;
use crate::version::InstallationTarget;
use pyhost_config::install_paths::python_executable;
use pyhost_config::HostConfig;
use pyhost_logger as logger;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use std::io::{self, Read};
use std::process::{Child, Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

impl PythonHost {
    /// Make sure `pip` is importable, running the bootstrap script if needed
    ///
    /// The import is retried once after the script, whether it succeeded,
    /// failed or timed out.
    pub fn init_pip(&self) -> Result<bool, BridgeError> {
        let target = self.target();
        let config = self.config();

        with_interpreter(|py| {
            if pip_importable(py) {
                logger::debug("pip is already importable");
                return Ok(true);
            }

            logger::step(&format!(
                "Bootstrapping pip into {}",
                target.root().display()
            ));
            let script_result = py.detach(|| run_bootstrap_script(target, config));
            if let Err(reason) = &script_result {
                logger::warn(&format!("Bootstrap script did not complete: {}", reason));
            }

            let importlib = PyModule::import(py, "importlib")?;
            importlib.call_method0("invalidate_caches")?;
            if pip_importable(py) {
                logger::success("pip installed");
                return Ok(true);
            }

            let message = match script_result {
                Ok(()) => {
                    "pip is still not importable after running the bootstrap script".to_string()
                }
                Err(reason) => format!("pip is still not importable: {}", reason),
            };
            logger::error(&message);
            Err(BridgeError::Bootstrap {
                root: target.root().to_path_buf(),
                message,
            })
        })
    }
}

fn pip_importable(py: Python<'_>) -> bool {
    PyModule::import(py, "pip").is_ok()
}

/// Run the bootstrap script to completion, reporting why it did not succeed
fn run_bootstrap_script(target: &InstallationTarget, config: &HostConfig) -> Result<(), String> {
    let root = target.root();
    let series = target.version().to_string();
    let python = python_executable(root, &series)
        .ok_or_else(|| format!("no Python {} executable found", series))?;
    let script = root.join(&config.bootstrap_script);
    if !script.is_file() {
        return Err(format!("bootstrap script not found: {}", script.display()));
    }

    let mut cmd = Command::new(&python);
    cmd.arg(&script)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    logger::debug(&format!("Running: {:?}", cmd));

    let child = cmd
        .spawn()
        .map_err(|e| format!("failed to start {}: {}", python.display(), e))?;

    let command_name = format!("{} {}", python.display(), config.bootstrap_script);
    let timeout = config.bootstrap_timeout();
    logger::spinner_start(&format!("Running {}", config.bootstrap_script));

    let outcome = match wait_with_timeout(child, timeout) {
        Ok(outcome) => outcome,
        Err(e) => {
            logger::spinner_stop();
            return Err(format!("waiting for {} failed: {}", config.bootstrap_script, e));
        }
    };

    match outcome {
        WaitOutcome::Exited(output) => {
            logger::capture_output(&command_name, &output);
            if output.status.success() {
                logger::spinner_success(&format!("{} finished", config.bootstrap_script));
                Ok(())
            } else {
                logger::spinner_error(&format!("{} failed", config.bootstrap_script));
                Err(format!(
                    "{} exited with {}",
                    config.bootstrap_script, output.status
                ))
            }
        }
        WaitOutcome::TimedOut { stdout, stderr } => {
            logger::capture_streams(&command_name, None, &stdout, &stderr);
            logger::spinner_error(&format!("{} timed out", config.bootstrap_script));
            Err(format!(
                "{} did not finish within {:?}",
                config.bootstrap_script, timeout
            ))
        }
    }
}

#[derive(Debug)]
enum WaitOutcome {
    Exited(Output),
    /// The child was killed; whatever it wrote before that
    TimedOut { stdout: Vec<u8>, stderr: Vec<u8> },
}

/// Wait for `child`, killing it once `timeout` has passed
///
/// Both pipes are drained on their own threads so a chatty child cannot block
/// on a full pipe.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> io::Result<WaitOutcome> {
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + timeout;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if Instant::now() >= deadline {
            logger::warn(&format!(
                "Child process {} exceeded {:?}; killing it",
                child.id(),
                timeout
            ));
            child.kill()?;
            child.wait()?;
            break None;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);
    Ok(match status {
        Some(status) => WaitOutcome::Exited(Output {
            status,
            stdout,
            stderr,
        }),
        None => WaitOutcome::TimedOut { stdout, stderr },
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buffer) {
                logger::debug(&format!("Stopped reading child output: {}", e));
            }
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
