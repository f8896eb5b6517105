use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system family the toolchain itself runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPlatform {
    Linux,
    Darwin,
    #[serde(rename = "mingw")]
    MinGW,
}

impl HostPlatform {
    /// Detect the current platform at compile time.
    /// Unix flavours other than macOS are treated as Linux.
    pub fn detect() -> Self {
        #[cfg(target_os = "macos")]
        {
            HostPlatform::Darwin
        }
        #[cfg(windows)]
        {
            HostPlatform::MinGW
        }
        #[cfg(not(any(target_os = "macos", windows)))]
        {
            HostPlatform::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostPlatform::Linux => "linux",
            HostPlatform::Darwin => "darwin",
            HostPlatform::MinGW => "mingw",
        }
    }

    /// Name of the python interpreter inside an installed prefix
    pub fn python_executable(self) -> &'static str {
        match self {
            HostPlatform::MinGW => "python.exe",
            HostPlatform::Linux | HostPlatform::Darwin => "python3",
        }
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architecture name of the running binary
pub fn host_arch() -> &'static str {
    std::env::consts::ARCH
}
