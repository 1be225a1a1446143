//! Dynamic Python library loading
//!
//! This module loads the versioned Python shared library from the
//! installation root using dlopen (Unix) or LoadLibrary (Windows), before the
//! interpreter is initialized. The handle is owned by the `PythonHost` and
//! released exactly once when the host is closed.

use crate::errors::BridgeError;
use crate::version::InstallationTarget;
use pyhost_logger as logger;
use std::path::{Path, PathBuf};

/// Library file candidates for a target, in probing order
pub fn library_candidates(target: &InstallationTarget) -> Vec<PathBuf> {
    let root = target.root();
    let version = target.version();

    #[cfg(windows)]
    {
        let file_name = format!("python{}.dll", version.canonical());
        vec![root.join(&file_name), root.join("DLLs").join(&file_name)]
    }

    #[cfg(target_os = "macos")]
    {
        let file_name = format!("libpython{}.dylib", version);
        vec![root.join("lib").join(&file_name), root.join(&file_name)]
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        let multiarch = format!("{}-linux-gnu", std::env::consts::ARCH);
        let mut candidates = Vec::new();
        for file_name in [
            format!("libpython{}.so.1.0", version),
            format!("libpython{}.so", version),
        ] {
            candidates.push(root.join("lib").join(&file_name));
            candidates.push(root.join("lib64").join(&file_name));
            candidates.push(root.join("lib").join(&multiarch).join(&file_name));
            candidates.push(root.join(&file_name));
        }
        candidates
    }
}

/// Loaded Python library handle
///
/// The library stays mapped while this value is alive. Dropping it releases
/// the handle; the interpreter must not be used by this host afterwards.
pub struct PythonLibrary {
    path: PathBuf,
    _library: libloading::Library,
}

impl PythonLibrary {
    /// Find the versioned library under the installation root and load it
    pub fn locate_and_load(target: &InstallationTarget) -> Result<Self, BridgeError> {
        let candidates = library_candidates(target);
        for candidate in &candidates {
            logger::debug(&format!("Checking for library at: {}", candidate.display()));
        }

        let Some(lib_path) = candidates.iter().find(|candidate| candidate.is_file()) else {
            let expected = candidates
                .first()
                .and_then(|c| c.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(BridgeError::LibraryNotFound {
                root: target.root().to_path_buf(),
                expected,
            });
        };

        Self::load(lib_path)
    }

    /// Load a Python shared library from an explicit path
    ///
    /// On Unix, this uses RTLD_NOW | RTLD_GLOBAL so all symbols are resolved
    /// immediately and made available to extension modules loaded later.
    pub fn load(lib_path: &Path) -> Result<Self, BridgeError> {
        if !lib_path.is_file() {
            return Err(BridgeError::LibraryNotFound {
                root: lib_path.parent().unwrap_or(lib_path).to_path_buf(),
                expected: lib_path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            });
        }

        logger::debug(&format!(
            "Loading Python shared library: {}",
            lib_path.display()
        ));

        let library = Self::open(lib_path)
            .map_err(|e| BridgeError::LibraryLoad(format!("{}: {}", lib_path.display(), e)))?;

        logger::debug("Python library loaded successfully");

        Ok(Self {
            path: lib_path.to_path_buf(),
            _library: library,
        })
    }

    #[cfg(unix)]
    #[expect(unsafe_code, reason = "loading a foreign library runs its initializers")]
    fn open(lib_path: &Path) -> Result<libloading::Library, libloading::Error> {
        use libloading::os::unix::Library;

        let flags = libc::RTLD_NOW | libc::RTLD_GLOBAL;
        // SAFETY: libpython has no load-time initializers beyond its own
        // static setup; the interpreter itself is initialized later.
        let library = unsafe { Library::open(Some(lib_path), flags)? };
        Ok(library.into())
    }

    #[cfg(windows)]
    #[expect(unsafe_code, reason = "loading a foreign library runs its initializers")]
    fn open(lib_path: &Path) -> Result<libloading::Library, libloading::Error> {
        // The DLL's own directory has to be searchable so that its dependent
        // DLLs (vcruntime, libffi) resolve from the installation root.
        if let Some(parent) = lib_path.parent() {
            use std::os::windows::ffi::OsStrExt;
            let wide: Vec<u16> = parent
                .as_os_str()
                .encode_wide()
                .chain(std::iter::once(0))
                .collect();

            extern "system" {
                fn SetDllDirectoryW(lpPathName: *const u16) -> i32;
            }
            // SAFETY: `wide` is a NUL-terminated UTF-16 buffer that outlives the call.
            unsafe {
                SetDllDirectoryW(wide.as_ptr());
            }
        }

        // SAFETY: see the Unix variant.
        unsafe { libloading::Library::new(lib_path) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for PythonLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythonLibrary")
            .field("path", &self.path)
            .finish()
    }
}
