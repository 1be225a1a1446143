//! Tests against a real embedded interpreter
//!
//! One host is shared by every test in this binary. Tests return early when no
//! CPython with a shared library under its `sys.base_prefix` can be found.

mod common;

use common::{discover_installation, write_script, Installation};
use pyhost_bridge::{BridgeError, ColumnType, HostValue, PythonHost, TabularParameters};
use std::sync::OnceLock;
use std::thread;
use tempfile::TempDir;

static HOST: OnceLock<Option<(Installation, PythonHost)>> = OnceLock::new();

fn shared() -> Option<&'static (Installation, PythonHost)> {
    HOST.get_or_init(|| {
        let installation = discover_installation()?;
        match PythonHost::new(&installation.root, Some(&installation.version)) {
            Ok(host) => Some((installation, host)),
            Err(e) => {
                eprintln!("skipping interpreter tests: {}", e);
                None
            }
        }
    })
    .as_ref()
}

fn host() -> Option<&'static PythonHost> {
    shared().map(|(_, host)| host)
}

#[test]
fn test_host_reports_initialized() {
    let Some(host) = host() else {
        return;
    };
    assert!(PythonHost::is_initialized());
    assert!(host.library_path().is_some());
    let Some(info) = PythonHost::interpreter_info() else {
        panic!("interpreter info missing after construction");
    };
    assert_eq!(info.version, host.target().version());
}

#[test]
fn test_second_construction_is_rejected() {
    let Some((installation, _host)) = shared() else {
        return;
    };
    let second = PythonHost::new(&installation.root, Some(&installation.version));
    assert!(matches!(second, Err(BridgeError::AlreadyInitialized)));
    assert!(PythonHost::is_initialized());
}

#[test]
fn test_scopes_do_not_leak() {
    let Some(host) = host() else {
        return;
    };
    assert!(host.execute("leaked_marker = 1", Some("first")).is_ok());
    let second = host.execute("leaked_marker", Some("second"));
    assert!(
        matches!(&second, Err(BridgeError::Execution { message, .. }) if message.contains("NameError")),
        "unexpected result: {:?}",
        second
    );
}

#[test]
fn test_compile_and_runtime_failures_are_distinguished() {
    let Some(host) = host() else {
        return;
    };
    assert!(matches!(
        host.execute("def broken(:\n    pass\n", None),
        Err(BridgeError::Compilation { .. })
    ));
    let raised = host.execute("raise ValueError('boom')", Some("raiser"));
    assert!(
        matches!(&raised, Err(BridgeError::Execution { scope, message }) if scope == "raiser" && message.contains("boom")),
        "unexpected result: {:?}",
        raised
    );
}

#[test]
fn test_row_values_round_trip() {
    let Some(host) = host() else {
        return;
    };
    let params = TabularParameters::single_row([
        ("x", HostValue::Int(5)),
        ("y", HostValue::from("a")),
    ]);
    let result = host.get_text_from_script::<(i64, String)>(
        "def f(x, y):\n    return (x, y)\n",
        "f",
        Some(&params),
    );
    assert!(
        matches!(&result, Ok((5, text)) if text == "a"),
        "unexpected result: {:?}",
        result
    );
}

#[test]
fn test_null_and_missing_parameters() {
    let Some(host) = host() else {
        return;
    };
    let params = TabularParameters::new()
        .with_column("value", ColumnType::Int)
        .with_row(vec![HostValue::Null]);
    let Ok(params) = params else {
        panic!("a null cell fits any column");
    };
    let result = host.get_text_from_script::<Option<i64>>(
        "def echo(value):\n    return value\n",
        "echo",
        Some(&params),
    );
    assert!(matches!(result, Ok(None)));

    let no_args = host.get_text_from_script::<i64>("def answer():\n    return 42\n", "answer", None);
    assert!(matches!(no_args, Ok(42)));
}

#[test]
fn test_datetime_parameter() {
    let Some(host) = host() else {
        return;
    };
    let Some(stamp) = chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|date| date.and_hms_micro_opt(13, 45, 30, 250))
    else {
        panic!("fixed timestamp is valid");
    };
    let params = TabularParameters::single_row([("when", stamp)]);
    let result = host.get_text_from_script::<(i64, i64)>(
        "def parts(when):\n    return (when.year, when.microsecond)\n",
        "parts",
        Some(&params),
    );
    assert!(matches!(result, Ok((2024, 250))), "unexpected result: {:?}", result);
}

#[test]
fn test_result_type_mismatch() {
    let Some(host) = host() else {
        return;
    };
    let result = host.get_text_from_script::<i64>("def f():\n    return 'text'\n", "f", None);
    assert!(matches!(result, Err(BridgeError::InvalidCast { found, .. }) if found == "str"));
}

#[test]
fn test_unconvertible_column_is_rejected() {
    let Some(host) = host() else {
        return;
    };
    let params = TabularParameters::new()
        .with_column("blob", ColumnType::Object("Geometry".to_string()))
        .with_row(vec![HostValue::Null]);
    let Ok(params) = params else {
        panic!("row width matches");
    };
    let result = host.get_text_from_script::<bool>("def f(blob):\n    return True\n", "f", Some(&params));
    assert!(matches!(result, Err(BridgeError::Marshal(_))));
}

#[test]
fn test_missing_function_is_an_execution_error() {
    let Some(host) = host() else {
        return;
    };
    let result = host.get_text_from_script::<i64>("def f():\n    return 1\n", "g", None);
    assert!(matches!(result, Err(BridgeError::Execution { .. })));
}

#[test]
fn test_set_path_appends_every_call() {
    let Some(host) = host() else {
        return;
    };
    let entry = "/nonexistent/pyhost-set-path-entry";
    let count = |paths: Vec<String>| paths.iter().filter(|p| p.as_str() == entry).count();

    let Ok(before) = host.sys_path() else {
        panic!("sys.path should be readable");
    };
    assert_eq!(count(before), 0);

    assert!(host.set_path(entry).is_ok());
    assert!(matches!(host.sys_path().map(count), Ok(1)));
    assert!(host.set_path(entry).is_ok());
    assert!(matches!(host.sys_path().map(count), Ok(2)));
}

#[test]
fn test_non_script_path_is_rejected_before_import() {
    let Some(host) = host() else {
        return;
    };
    let Ok(dir) = TempDir::new() else {
        return;
    };
    let Some(path) = write_script(&dir, "helper.txt", "def f():\n    return 1\n") else {
        return;
    };
    let result = host.get_text_from_file::<i64>(&path, "f", None);
    assert!(matches!(result, Err(BridgeError::Configuration(_))));

    let entry = dir.path().to_string_lossy().into_owned();
    let Ok(paths) = host.sys_path() else {
        panic!("sys.path should be readable");
    };
    assert!(!paths.contains(&entry));
}

#[test]
fn test_concurrent_calls_are_serialized() {
    let Some(host) = host() else {
        return;
    };
    let Ok(dir) = TempDir::new() else {
        return;
    };
    let source = "\
import time

count = 0

def bump():
    global count
    seen = count
    time.sleep(0.01)
    count = seen + 1
    return count

def total():
    return count
";
    let Some(path) = write_script(&dir, "pyhost_slow_counter.py", source) else {
        return;
    };

    const WORKERS: usize = 8;
    thread::scope(|s| {
        let workers: Vec<_> = (0..WORKERS)
            .map(|_| s.spawn(|| host.get_text_from_file::<i64>(&path, "bump", None)))
            .collect();
        for worker in workers {
            assert!(matches!(worker.join(), Ok(Ok(_))));
        }
    });

    let total = host.get_text_from_file::<i64>(&path, "total", None);
    assert!(matches!(total, Ok(n) if n == WORKERS as i64), "unexpected total: {:?}", total);
}

#[test]
fn test_run_file_executes_script() {
    let Some(host) = host() else {
        return;
    };
    let Ok(dir) = TempDir::new() else {
        return;
    };
    let marker = dir.path().join("ran.txt");
    let source = format!(
        "with open({:?}, 'w') as handle:\n    handle.write(__name__)\n",
        marker.to_string_lossy()
    );
    let Some(path) = write_script(&dir, "writes_marker.py", &source) else {
        return;
    };

    assert!(host.run_file(&path, true).is_ok());
    assert!(matches!(std::fs::read_to_string(&marker), Ok(text) if text == "writes_marker"));

    assert!(host.run_file("inline_value = 3 * 7", false).is_ok());
    assert!(matches!(
        host.run_file(&dir.path().join("absent.py").to_string_lossy(), true),
        Err(BridgeError::Io(_))
    ));
}

#[test]
fn test_import_module() {
    let Some(host) = host() else {
        return;
    };
    assert!(host.import_module("json").is_ok());
    assert!(matches!(
        host.import_module("pyhost_no_such_module"),
        Err(BridgeError::Import(name, _)) if name == "pyhost_no_such_module"
    ));
    assert!(host.refresh_imports().is_ok());
}

#[test]
fn test_host_is_usable_from_other_threads() {
    let Some(host) = host() else {
        return;
    };
    let outer = host.get_text_from_script::<i64>("def f():\n    return 1\n", "f", None);
    let inner = thread::scope(|s| {
        s.spawn(|| host.get_text_from_script::<i64>("def f():\n    return 2\n", "f", None))
            .join()
    });
    assert!(matches!(outer, Ok(1)));
    assert!(matches!(inner, Ok(Ok(2))));
}

#[test]
fn test_file_function_receives_row_arguments() {
    let Some(host) = host() else {
        return;
    };
    let Ok(dir) = TempDir::new() else {
        return;
    };
    let source = "def scale(value, factor, label):\n    return (value * factor, label.upper())\n";
    let Some(path) = write_script(&dir, "pyhost_scaling.py", source) else {
        return;
    };
    let params = TabularParameters::single_row([
        ("value", HostValue::Int(6)),
        ("factor", HostValue::Float(1.5)),
        ("label", HostValue::from("kw")),
    ]);

    let result = host.get_text_from_file::<(f64, String)>(&path, "scale", Some(&params));
    assert!(
        matches!(&result, Ok((scaled, label)) if (*scaled - 9.0).abs() < f64::EPSILON && label == "KW"),
        "unexpected result: {:?}",
        result
    );
}

#[test]
fn test_file_calls_append_search_path_each_time() {
    let Some(host) = host() else {
        return;
    };
    let Ok(dir) = TempDir::new() else {
        return;
    };
    let Some(path) = write_script(&dir, "pyhost_path_growth.py", "def one():\n    return 1\n")
    else {
        return;
    };
    let entry = dir.path().to_string_lossy().into_owned();
    let occurrences = |paths: Vec<String>| paths.iter().filter(|p| **p == entry).count();

    for expected in 1..=3 {
        assert!(matches!(host.get_text_from_file::<i64>(&path, "one", None), Ok(1)));
        assert_eq!(host.sys_path().map(occurrences).ok(), Some(expected));
    }
}

#[test]
fn test_private_helpers_are_callable_through_alias() {
    let Some(host) = host() else {
        return;
    };
    let source = "def __helper():\n    return 7\n";
    let result = host.get_text_from_script::<i64>(source, "__helper", None);
    assert!(matches!(result, Ok(7)), "unexpected result: {:?}", result);
}
