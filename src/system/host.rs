//! Host facts that profiles expand into sandbox paths.

use std::path::{Path, PathBuf};

use nix::unistd::getuid;
use tracing::debug;

/// A snapshot of the host environment taken once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    /// `$HOME`, if set and non-empty.
    pub home: Option<PathBuf>,
    /// `$XDG_RUNTIME_DIR`, if set and non-empty.
    pub runtime_dir: Option<PathBuf>,
    /// Real uid of this process.
    pub uid: u32,
}

impl HostEnvironment {
    /// Reads the environment of the current process.
    #[must_use]
    pub fn detect() -> Self {
        let host = Self::from_lookup(getuid().as_raw(), |name| std::env::var_os(name));
        debug!(?host, "Detected host environment");
        host
    }

    /// Builds a snapshot from `lookup`, treating empty values as unset.
    pub fn from_lookup<F, V>(uid: u32, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<V>,
        V: Into<PathBuf>,
    {
        let path = |name: &str| {
            lookup(name)
                .map(Into::into)
                .filter(|p: &PathBuf| !p.as_os_str().is_empty())
        };

        Self {
            home: path("HOME"),
            runtime_dir: path("XDG_RUNTIME_DIR"),
            uid,
        }
    }

    /// Home directory, if known.
    #[must_use]
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// The conventional runtime directory for this uid: `/run/user/<uid>`.
    #[must_use]
    pub fn fallback_runtime_dir(&self) -> PathBuf {
        PathBuf::from(format!("/run/user/{}", self.uid))
    }
}
