//! JSON profiles.
//!
//! A profile directory holds a system-wide `system.json` and optional
//! per-application `<name>.json` files. Resolution reads the `system` section
//! of the first and the `application` section of the second, then merges the
//! application options over the system ones (see [`merge`]).
//!
//! ```json
//! {
//!     "system": {
//!         "mount-usr": true,
//!         "confine": ["all"],
//!         "network": true
//!     }
//! }
//! ```
//!
//! Nothing in this module fails hard. Every problem is collected in
//! [`Resolution::warnings`], and the affected document counts as empty.

mod apply;
mod document;
mod merge;
mod options;

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::error::ProfileError;

pub use apply::{apply_profile, select_command};
pub use document::{APPLICATION_SECTION, ProfileDocument, SYSTEM_SECTION};
pub use merge::merge;
pub use options::{HomeMount, ProfileOptions};

/// File name of the system-wide profile inside a profile directory.
pub const SYSTEM_PROFILE: &str = "system.json";

/// Outcome of resolving a system and an application profile.
#[derive(Debug, Default)]
pub struct Resolution {
    /// The merged options mapping.
    pub options: Map<String, Value>,
    /// Everything that was ignored along the way.
    pub warnings: Vec<ProfileError>,
}

impl Resolution {
    /// Decodes the merged mapping, adding decoding problems to the warnings.
    #[must_use]
    pub fn into_options(mut self) -> (ProfileOptions, Vec<ProfileError>) {
        let (options, warnings) = ProfileOptions::from_map(&self.options);
        self.warnings.extend(warnings);
        (options, self.warnings)
    }
}

/// Loads both profiles and merges the application section over the system
/// section.
#[instrument(skip_all, fields(system = %system.display(), application = ?application))]
pub fn resolve(system: &Path, application: Option<&Path>) -> Resolution {
    let mut warnings = Vec::new();

    let low = load_section(system, SYSTEM_SECTION, &mut warnings);
    let high = match application {
        Some(path) => load_section(path, APPLICATION_SECTION, &mut warnings),
        None => Map::new(),
    };

    Resolution {
        options: merge(low, high),
        warnings,
    }
}

fn load_section(
    path: &Path,
    section: &'static str,
    warnings: &mut Vec<ProfileError>,
) -> Map<String, Value> {
    let result = ProfileDocument::load(path).and_then(|doc| doc.section(section));
    match result {
        Ok(map) => map,
        Err(err) => {
            warn!(error = %err, "Ignoring profile");
            warnings.push(err);
            Map::new()
        }
    }
}

/// A directory of profile files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDir {
    root: PathBuf,
}

impl ProfileDir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the system-wide profile.
    #[must_use]
    pub fn system_profile(&self) -> PathBuf {
        self.root.join(SYSTEM_PROFILE)
    }

    /// Path of the profile for `name`, whether or not it exists.
    #[must_use]
    pub fn application_profile(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    /// Looks up the profile for `name` and resolves it against the system
    /// profile.
    ///
    /// Names containing a path separator never match an application profile.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Resolution {
        let candidate = (!name.is_empty() && !name.contains('/'))
            .then(|| self.application_profile(name))
            .filter(|path| path.exists());

        if candidate.is_none() {
            info!(name, "No profile found for this application, using default settings");
        }

        resolve(&self.system_profile(), candidate.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_without_files_is_empty() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let resolution = resolve(&dir.path().join("system.json"), None);

        assert!(resolution.options.is_empty());
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn test_application_section_of_system_file_is_ignored() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("system.json");
        fs::write(&path, r#"{"application": {"mount-usr": true}}"#).unwrap();

        assert!(resolve(&path, None).options.is_empty());
    }

    #[test]
    fn test_profile_dir_paths() {
        let dir = ProfileDir::new("/etc/sbox");
        assert_eq!(dir.system_profile(), PathBuf::from("/etc/sbox/system.json"));
        assert_eq!(
            dir.application_profile("firefox"),
            PathBuf::from("/etc/sbox/firefox.json")
        );
    }

    #[test]
    fn test_profile_dir_ignores_path_like_names() {
        let dir = TempDir::new().expect("failed to create temp dir");
        fs::write(dir.path().join("system.json"), r#"{"system": {"mount-tmp": true}}"#).unwrap();

        let resolution = ProfileDir::new(dir.path()).resolve("/usr/bin/true");
        assert_eq!(Value::Object(resolution.options), json!({"mount-tmp": true}));
    }

    #[test]
    fn test_into_options_collects_decode_warnings() {
        let resolution = Resolution {
            options: match json!({"network": 1}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
            warnings: Vec::new(),
        };
        let (options, warnings) = resolution.into_options();

        assert!(!options.network);
        assert_eq!(warnings.len(), 1);
    }
}
