//! Target environment description.
//!
//! The facts here are supplied by an external environment-inspection
//! collaborator (or constructed directly for cross-environment resolution).
//! They feed two consumers: marker evaluation and platform-specific wheel
//! selection.

use std::collections::BTreeMap;

/// Coarse operating-system family used for wheel platform-tag matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    Macos,
    Windows,
}

/// Interpreter and platform facts for one target environment.
#[derive(Debug, Clone)]
pub struct Environment {
    pub python_version: (u64, u64, u64),
    /// `sys.platform` value: `linux`, `darwin`, `win32`.
    pub sys_platform: String,
    /// `platform.machine()` value: `x86_64`, `i686`, `AMD64`, `arm64`.
    pub platform_machine: String,
    /// Lowercase implementation name: `cpython`, `pypy`.
    pub implementation_name: String,
    pub is_32bit: bool,
    pub os: OsFamily,
    /// macOS release, consulted only for `macosx_*` wheel tags.
    pub macos_release: (u64, u64),
}

impl Environment {
    /// A 64-bit Linux CPython environment.
    pub fn linux_cpython(python_version: (u64, u64, u64)) -> Self {
        Self {
            python_version,
            sys_platform: "linux".to_string(),
            platform_machine: "x86_64".to_string(),
            implementation_name: "cpython".to_string(),
            is_32bit: false,
            os: OsFamily::Linux,
            macos_release: (0, 0),
        }
    }

    /// A Windows CPython environment of the given bitness.
    pub fn windows_cpython(python_version: (u64, u64, u64), is_32bit: bool) -> Self {
        Self {
            python_version,
            sys_platform: "win32".to_string(),
            platform_machine: if is_32bit { "x86" } else { "AMD64" }.to_string(),
            implementation_name: "cpython".to_string(),
            is_32bit,
            os: OsFamily::Windows,
            macos_release: (0, 0),
        }
    }

    /// A 64-bit macOS CPython environment at the given OS release.
    pub fn macos_cpython(python_version: (u64, u64, u64), macos_release: (u64, u64)) -> Self {
        Self {
            python_version,
            sys_platform: "darwin".to_string(),
            platform_machine: "x86_64".to_string(),
            implementation_name: "cpython".to_string(),
            is_32bit: false,
            os: OsFamily::Macos,
            macos_release,
        }
    }

    /// `major.minor` form used by the `python_version` marker variable.
    pub fn python_version_short(&self) -> String {
        format!("{}.{}", self.python_version.0, self.python_version.1)
    }

    /// `major.minor.patch` form used by `python_full_version`.
    pub fn python_version_full(&self) -> String {
        format!(
            "{}.{}.{}",
            self.python_version.0, self.python_version.1, self.python_version.2
        )
    }

    /// Interpreter tag family prefix used in wheel filenames
    /// (`cp` for CPython, `pp` for PyPy).
    pub fn interpreter_prefix(&self) -> &str {
        match self.implementation_name.as_str() {
            "cpython" => "cp",
            "pypy" => "pp",
            "ironpython" => "ip",
            "jython" => "jy",
            _ => "py",
        }
    }

    /// The exact interpreter tag for this environment, e.g. `cp37`.
    pub fn interpreter_tag(&self) -> String {
        format!(
            "{}{}{}",
            self.interpreter_prefix(),
            self.python_version.0,
            self.python_version.1
        )
    }

    /// Project the environment into the marker-variable map.
    pub fn marker_environment(&self) -> MarkerEnvironment {
        let mut values = BTreeMap::new();
        values.insert("python_version".to_string(), self.python_version_short());
        values.insert(
            "python_full_version".to_string(),
            self.python_version_full(),
        );
        values.insert("sys_platform".to_string(), self.sys_platform.clone());
        values.insert(
            "platform_machine".to_string(),
            self.platform_machine.clone(),
        );
        values.insert(
            "platform_system".to_string(),
            match self.os {
                OsFamily::Linux => "Linux",
                OsFamily::Macos => "Darwin",
                OsFamily::Windows => "Windows",
            }
            .to_string(),
        );
        values.insert(
            "implementation_name".to_string(),
            self.implementation_name.clone(),
        );
        values.insert(
            "implementation_version".to_string(),
            self.python_version_full(),
        );
        values.insert(
            "os_name".to_string(),
            match self.os {
                OsFamily::Windows => "nt",
                _ => "posix",
            }
            .to_string(),
        );
        MarkerEnvironment { values }
    }
}

/// Variable → value map markers evaluate against.
#[derive(Debug, Clone, Default)]
pub struct MarkerEnvironment {
    values: BTreeMap<String, String>,
}

impl MarkerEnvironment {
    /// Look up a marker variable. `None` for unknown variables, which
    /// marker evaluation treats as non-matching.
    pub fn get(&self, var: &str) -> Option<&str> {
        self.values.get(var).map(String::as_str)
    }

    /// A copy of this environment with the `extra` variable set, used when
    /// evaluating dependency edges gated by an activated extra.
    pub fn with_extra(&self, extra: &str) -> MarkerEnvironment {
        let mut values = self.values.clone();
        values.insert("extra".to_string(), extra.to_string());
        MarkerEnvironment { values }
    }

    /// Set a variable explicitly (test environments, unusual targets).
    pub fn set(&mut self, var: impl Into<String>, value: impl Into<String>) {
        self.values.insert(var.into(), value.into());
    }
}
