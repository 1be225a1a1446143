//! Interpreter version resolution
//!
//! The version is taken from an explicit "MAJOR.MINOR[...]" string when one is
//! given, otherwise it is read off the installation root (`C:\Python312`,
//! `/opt/python3.12`).

use crate::errors::BridgeError;
use std::fmt;
use std::path::{Path, PathBuf};

const PRODUCT_MARKER: &str = "python";

/// A Python release series
///
/// `minor` is absent when only the major digit is known, as in `C:\Python3`
/// (whose library is `python3.dll`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: Option<u32>,
}

impl PythonVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor: Some(minor),
        }
    }

    pub fn major_only(major: u32) -> Self {
        Self { major, minor: None }
    }

    /// Digits of major followed by digits of minor: 3.12 -> 312, 3 -> 3
    pub fn canonical(&self) -> u32 {
        let Some(minor) = self.minor else {
            return self.major;
        };
        let mut minor_scale = 10;
        while minor_scale <= minor {
            minor_scale *= 10;
        }
        self.major * minor_scale + minor
    }

    /// Whether an interpreter reporting `engine` belongs to this series
    pub fn matches(&self, engine: PythonVersion) -> bool {
        self.major == engine.major && self.minor.is_none_or(|minor| engine.minor == Some(minor))
    }

    /// Parse an explicit "MAJOR.MINOR[...]" version string
    pub fn parse(version: &str) -> Result<Self, BridgeError> {
        let parts: Vec<&str> = version.trim().split('.').collect();
        if parts.len() < 2 {
            return Err(BridgeError::Configuration(format!(
                "Invalid python version provided: {}",
                version
            )));
        }
        let component = |part: &str| {
            part.parse::<u32>().map_err(|_| {
                BridgeError::Configuration(format!(
                    "Invalid python version provided: {}",
                    version
                ))
            })
        };
        Ok(Self::new(component(parts[0])?, component(parts[1])?))
    }

    /// Extract the version from the segment following the last "Python" marker
    pub fn from_root_path(root: &Path) -> Result<Self, BridgeError> {
        let path = root.to_string_lossy();
        let marker = path
            .to_ascii_lowercase()
            .rfind(PRODUCT_MARKER)
            .ok_or_else(|| {
                BridgeError::Configuration(format!(
                    "Unable to extract python version from path: {}",
                    path
                ))
            })?;

        let remainder = &path[marker + PRODUCT_MARKER.len()..];
        let segment = remainder
            .split(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim_start_matches(|c: char| !c.is_ascii_digit());
        let numeric: String = segment
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        if numeric.contains('.') {
            return Self::parse(&numeric);
        }

        let unparseable = || {
            BridgeError::Configuration(format!(
                "Unable to extract python version from path: {}",
                path
            ))
        };
        if numeric.is_empty() {
            return Err(unparseable());
        }
        let (major, minor) = numeric.split_at(1);
        let major = major.parse::<u32>().map_err(|_| unparseable())?;
        if minor.is_empty() {
            return Ok(Self::major_only(major));
        }
        let minor = minor.parse::<u32>().map_err(|_| unparseable())?;
        Ok(Self::new(major, minor))
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "{}.{}", self.major, minor),
            None => write!(f, "{}", self.major),
        }
    }
}

/// Installation root plus the resolved version, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationTarget {
    root: PathBuf,
    version: PythonVersion,
}

impl InstallationTarget {
    /// Resolve the target; an explicit version wins over the path marker
    pub fn resolve(root: impl Into<PathBuf>, version: Option<&str>) -> Result<Self, BridgeError> {
        let root = root.into();
        let version = match version {
            Some(explicit) => PythonVersion::parse(explicit)?,
            None => PythonVersion::from_root_path(&root)?,
        };
        Ok(Self { root, version })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version(&self) -> PythonVersion {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_version_concatenates_first_two_groups() {
        let cases = [
            ("3.12", 312),
            ("3.8", 38),
            ("3.11.4", 311),
            ("2.7.18rc1", 27),
            ("3.10", 310),
        ];
        for (input, expected) in cases {
            let version = PythonVersion::parse(input);
            assert!(
                version.as_ref().is_ok_and(|v| v.canonical() == expected),
                "{} should resolve to {}, got {:?}",
                input,
                expected,
                version
            );
        }
    }

    #[test]
    fn test_explicit_version_needs_two_groups() {
        for input in ["3", "", "312", "3.x"] {
            assert!(
                matches!(
                    PythonVersion::parse(input),
                    Err(BridgeError::Configuration(_))
                ),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_path_marker_extracts_digits() {
        let cases = [
            (r"C:\Program Files\Python312", PythonVersion::new(3, 12)),
            ("/opt/Python39", PythonVersion::new(3, 9)),
            ("/opt/python3.12", PythonVersion::new(3, 12)),
            ("/opt/Python311/", PythonVersion::new(3, 11)),
            ("/home/me/python/envs/Python310-x64", PythonVersion::new(3, 10)),
        ];
        for (root, expected) in cases {
            let version = PythonVersion::from_root_path(Path::new(root));
            assert!(
                version.as_ref().is_ok_and(|v| *v == expected),
                "{} should resolve to {}, got {:?}",
                root,
                expected,
                version
            );
        }
    }

    #[test]
    fn test_path_without_marker_fails() {
        for root in ["/usr/local", r"C:\Interpreters\312", "/opt/Python", "/opt/Python-embed"] {
            assert!(
                matches!(
                    PythonVersion::from_root_path(Path::new(root)),
                    Err(BridgeError::Configuration(_))
                ),
                "{} should be rejected",
                root
            );
        }
    }

    #[test]
    fn test_explicit_version_wins_over_path() {
        let target = InstallationTarget::resolve("/opt/Python39", Some("3.12"));
        assert!(target.is_ok_and(|t| t.version() == PythonVersion::new(3, 12)));
    }

    #[test]
    fn test_single_digit_suffix_is_major_only() {
        for root in ["/opt/Python3", r"C:\Python3", "/srv/python3-embed"] {
            let version = PythonVersion::from_root_path(Path::new(root));
            assert!(
                version.as_ref().is_ok_and(|v| *v == PythonVersion::major_only(3) && v.canonical() == 3),
                "{} should resolve to major-only 3, got {:?}",
                root,
                version
            );
        }
    }

    #[test]
    fn test_major_only_matches_any_minor() {
        let series = PythonVersion::major_only(3);
        assert!(series.matches(PythonVersion::new(3, 12)));
        assert!(!series.matches(PythonVersion::new(2, 7)));
        assert!(PythonVersion::new(3, 12).matches(PythonVersion::new(3, 12)));
        assert!(!PythonVersion::new(3, 11).matches(PythonVersion::new(3, 12)));
    }

    #[test]
    fn test_display() {
        assert_eq!(PythonVersion::new(3, 12).to_string(), "3.12");
        assert_eq!(PythonVersion::major_only(3).to_string(), "3");
    }
}
