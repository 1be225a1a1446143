use colored::Colorize;
use indicatif::ProgressBar;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

static LOG_FILE: Mutex<Option<PathBuf>> = Mutex::new(None);
static VERBOSITY: Mutex<u8> = Mutex::new(0);
static LOG_PYTHON: Mutex<bool> = Mutex::new(false);
static NO_STDOUT: Mutex<bool> = Mutex::new(false);
static SPINNER: Mutex<Option<ProgressBar>> = Mutex::new(None);

const LOG_FILE_NAME: &str = "pyhost.log";

/// Get the current verbosity level for use by other modules (e.g., the bridge)
pub fn get_verbosity() -> u8 {
    VERBOSITY.lock().ok().map(|v| *v).unwrap_or(0)
}

/// Get whether embedded Python logging is forwarded to the log file
pub fn get_log_python() -> bool {
    LOG_PYTHON.lock().ok().map(|v| *v).unwrap_or(false)
}

/// Set whether embedded Python logging is forwarded to the log file
pub fn set_log_python(enabled: bool) {
    if let Ok(mut v) = LOG_PYTHON.lock() {
        *v = enabled;
    }
}

/// Get whether console echo is disabled
pub fn get_no_stdout() -> bool {
    NO_STDOUT.lock().ok().map(|v| *v).unwrap_or(false)
}

/// Set whether console echo is disabled
pub fn set_no_stdout(disabled: bool) {
    if let Ok(mut v) = NO_STDOUT.lock() {
        *v = disabled;
    }
}

/// Convert verbosity level to a Python `logging` level name
/// 0 = warning, 1 = info (-v), 2+ = debug (-vv)
pub fn verbosity_to_python_level() -> &'static str {
    match get_verbosity() {
        0 => "WARNING",
        1 => "INFO",
        _ => "DEBUG",
    }
}

/// Initialize the logger with verbosity level, writing to the default log file
pub fn init_with_verbosity(verbosity: u8, log_python: bool, no_stdout: bool) -> Result<(), String> {
    let config_dir = get_config_dir()?;
    init_with_log_file(&config_dir.join(LOG_FILE_NAME), verbosity, log_python, no_stdout)
}

/// Initialize the logger with an explicit log file path
pub fn init_with_log_file(
    log_file: &Path,
    verbosity: u8,
    log_python: bool,
    no_stdout: bool,
) -> Result<(), String> {
    if let Ok(mut v) = VERBOSITY.lock() {
        *v = verbosity;
    }
    set_log_python(log_python);
    set_no_stdout(no_stdout);

    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create log directory: {}", e))?;
    }

    // Truncate log file on each run (overwrite instead of append)
    if log_file.exists() {
        let _ = fs::remove_file(log_file);
    }

    let mut log_file_guard = LOG_FILE
        .lock()
        .map_err(|_| "Log file lock poisoned".to_string())?;
    *log_file_guard = Some(log_file.to_path_buf());

    Ok(())
}

/// Get the config directory path
fn get_config_dir() -> Result<PathBuf, String> {
    #[cfg(not(target_os = "windows"))]
    let config_dir = dirs::home_dir()
        .ok_or("Could not determine home directory")?
        .join(".config")
        .join("pyhost");

    #[cfg(target_os = "windows")]
    let config_dir = dirs::config_dir()
        .ok_or("Could not determine config directory")?
        .join("pyhost");

    Ok(config_dir)
}

fn write_to_log(message: &str) {
    write_to_log_with_source(message, "HOST")
}

fn write_to_log_with_source(message: &str, source: &str) {
    if let Ok(log_file_guard) = LOG_FILE.lock() {
        if let Some(ref log_path) = *log_file_guard {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(log_path) {
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                let _ = writeln!(file, "[{}] [{}] {}", timestamp, source, message);
            }
        }
    }
}

fn echo(line: std::fmt::Arguments<'_>) {
    if !get_no_stdout() {
        eprintln!("{}", line);
    }
}

/// Log an informational message (to console if verbose >= 1, always to file)
pub fn info(message: &str) {
    write_to_log(&format!("INFO {}", message));
    if get_verbosity() >= 1 {
        echo(format_args!("{}", message));
    }
}

/// Log a debug message (to console if verbose >= 1, always to file)
pub fn debug(message: &str) {
    write_to_log(&format!("DEBUG {}", message));
    if get_verbosity() >= 1 {
        echo(format_args!("{} {}", "DEBUG:".blue().bold(), message));
    }
}

/// Log a warning message (to both file and console)
pub fn warn(message: &str) {
    write_to_log(&format!("WARN {}", message));
    echo(format_args!("{} {}", "warning:".yellow().bold(), message));
}

/// Log an error message (to both file and console)
pub fn error(message: &str) {
    write_to_log(&format!("ERROR {}", message));
    echo(format_args!("{} {}", "Error:".red().bold(), message));
}

/// Log a success message
pub fn success(message: &str) {
    write_to_log(&format!("SUCCESS {}", message));
    let check = "\u{2714}".green().bold();
    echo(format_args!("{} {}", check, message));
}

/// Log a step message (to console only at -vv)
pub fn step(message: &str) {
    if get_verbosity() >= 2 {
        echo(format_args!("TRACE: {}", message));
    }
    write_to_log(&format!("STEP: {}", message));
}

/// Capture child process output into the log file
pub fn capture_output(command_name: &str, output: &std::process::Output) {
    capture_streams(
        command_name,
        output.status.code(),
        &output.stdout,
        &output.stderr,
    );
}

/// Same as [`capture_output`], for callers that collected the streams themselves
pub fn capture_streams(command_name: &str, exit_code: Option<i32>, stdout: &[u8], stderr: &[u8]) {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    write_to_log(&format!(
        "COMMAND: {} (exit code: {:?})",
        command_name, exit_code
    ));

    if !stdout.is_empty() {
        write_to_log_with_source(&format!("  STDOUT:\n{}", stdout), "CHILD");
    }

    if !stderr.is_empty() {
        write_to_log_with_source(&format!("  STDERR:\n{}", stderr), "CHILD");
    }
}

/// Get the log file path, once initialized
pub fn get_log_path() -> Option<PathBuf> {
    LOG_FILE.lock().ok().and_then(|guard| guard.clone())
}

/// Start a spinner with the given message (only if not verbose)
pub fn spinner_start(message: &str) {
    if get_verbosity() > 0 || get_no_stdout() {
        return;
    }

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.cyan} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(message.to_string());

    if let Ok(mut spinner_guard) = SPINNER.lock() {
        *spinner_guard = Some(spinner);
    }
}

/// Complete the spinner with a success message
pub fn spinner_success(message: &str) {
    spinner_stop();
    success(message);
}

/// Stop the spinner with an error message
pub fn spinner_error(message: &str) {
    spinner_stop();
    write_to_log(&format!("ERROR {}", message));
    echo(format_args!("  {} {}", "✗".red().bold(), message));
}

/// Stop the spinner without any message
pub fn spinner_stop() {
    if let Ok(mut spinner_guard) = SPINNER.lock() {
        if let Some(spinner) = spinner_guard.take() {
            spinner.finish_and_clear();
        }
    }
}
