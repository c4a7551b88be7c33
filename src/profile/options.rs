//! Typed view of a merged options mapping.
//!
//! Each known key is decoded on its own. A key with the wrong JSON type
//! produces a [`ProfileError::InvalidOption`] and keeps its default, so one bad
//! entry never disables the rest of a profile. A `mount-home` string other
//! than `ro` or `rw` is reported the same way. Unknown keys are ignored and
//! `null` counts as absent.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ProfileError;

pub const MOUNT_USR: &str = "mount-usr";
pub const MOUNT_DEV: &str = "mount-dev";
pub const MOUNT_PROC: &str = "mount-proc";
pub const MOUNT_TMP: &str = "mount-tmp";
pub const MOUNT_HOME: &str = "mount-home";
pub const MOUNT_RUNTIME_DIR: &str = "mount-runtime_dir";
pub const DIRECTORIES: &str = "directories";
pub const SYMLINKS: &str = "symlinks";
pub const MOUNTS_RO: &str = "mounts-ro";
pub const MOUNTS_RW: &str = "mounts-rw";
pub const CONFINE: &str = "confine";
pub const NETWORK: &str = "network";
pub const BINARY: &str = "binary";

const HOME_MODES: &str = "\"ro\" or \"rw\"";

/// How the host home directory appears in the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HomeMount {
    /// Read-only bind mount.
    Ro,
    /// Read-write bind mount.
    Rw,
}

impl HomeMount {
    /// Parses `"ro"` or `"rw"`. Anything else means no mount.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ro" => Some(Self::Ro),
            "rw" => Some(Self::Rw),
            _ => None,
        }
    }
}

/// Options a profile can set, with their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProfileOptions {
    pub mount_usr: bool,
    pub mount_dev: bool,
    pub mount_proc: bool,
    pub mount_tmp: bool,
    /// `None` creates an empty home directory instead.
    pub mount_home: Option<HomeMount>,
    #[serde(rename = "mount-runtime_dir")]
    pub mount_runtime_dir: bool,
    pub directories: Vec<String>,
    /// Link path inside the sandbox to link target.
    pub symlinks: BTreeMap<String, String>,
    /// Sandbox path to host path.
    pub mounts_ro: BTreeMap<String, String>,
    /// Sandbox path to host path.
    pub mounts_rw: BTreeMap<String, String>,
    /// Namespace names to unshare.
    pub confine: Vec<String>,
    pub network: bool,
    /// Runs this instead of the command named on the command line.
    pub binary: Option<String>,
}

impl ProfileOptions {
    /// Decodes `map`, returning the options and one warning per bad key.
    #[must_use]
    pub fn from_map(map: &Map<String, Value>) -> (Self, Vec<ProfileError>) {
        let mut reader = Reader {
            map,
            warnings: Vec::new(),
        };

        let options = Self {
            mount_usr: reader.take(MOUNT_USR, "a boolean").unwrap_or_default(),
            mount_dev: reader.take(MOUNT_DEV, "a boolean").unwrap_or_default(),
            mount_proc: reader.take(MOUNT_PROC, "a boolean").unwrap_or_default(),
            mount_tmp: reader.take(MOUNT_TMP, "a boolean").unwrap_or_default(),
            mount_home: reader
                .take::<String>(MOUNT_HOME, HOME_MODES)
                .and_then(|name| {
                    let mode = HomeMount::from_name(&name);
                    if mode.is_none() {
                        reader.reject(MOUNT_HOME, HOME_MODES, format!("\"{name}\""));
                    }
                    mode
                }),
            mount_runtime_dir: reader
                .take(MOUNT_RUNTIME_DIR, "a boolean")
                .unwrap_or_default(),
            directories: reader
                .take(DIRECTORIES, "a list of strings")
                .unwrap_or_default(),
            symlinks: reader
                .take(SYMLINKS, "an object of strings")
                .unwrap_or_default(),
            mounts_ro: reader
                .take(MOUNTS_RO, "an object of strings")
                .unwrap_or_default(),
            mounts_rw: reader
                .take(MOUNTS_RW, "an object of strings")
                .unwrap_or_default(),
            confine: reader.take(CONFINE, "a list of strings").unwrap_or_default(),
            network: reader.take(NETWORK, "a boolean").unwrap_or_default(),
            binary: reader.take(BINARY, "a string"),
        };

        (options, reader.warnings)
    }
}

struct Reader<'a> {
    map: &'a Map<String, Value>,
    warnings: Vec<ProfileError>,
}

impl Reader<'_> {
    fn take<T: DeserializeOwned>(&mut self, key: &str, expected: &'static str) -> Option<T> {
        let value = self.map.get(key).filter(|v| !v.is_null())?;
        match T::deserialize(value) {
            Ok(decoded) => Some(decoded),
            Err(_) => {
                self.reject(key, expected, describe(value).to_string());
                None
            }
        }
    }

    fn reject(&mut self, key: &str, expected: &'static str, found: String) {
        let err = ProfileError::InvalidOption {
            key: key.to_string(),
            expected,
            found,
        };
        warn!(error = %err, "Ignoring profile option");
        self.warnings.push(err);
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
