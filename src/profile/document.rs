//! Loading a single profile document.
//!
//! Loading never fails hard. A missing file is an empty document; any other
//! problem is returned as a [`ProfileError`] so the caller can report it and
//! carry on with an empty document.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, instrument, trace};

use crate::error::ProfileError;

/// Section read from the system-wide profile.
pub const SYSTEM_SECTION: &str = "system";

/// Section read from a per-application profile.
pub const APPLICATION_SECTION: &str = "application";

/// A parsed profile document: a JSON object whose sections hold options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileDocument {
    path: Option<PathBuf>,
    root: Map<String, Value>,
}

impl ProfileDocument {
    /// An empty document with no sections.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads and parses the document at `path`.
    ///
    /// A file that does not exist yields an empty document.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Read` if the file exists but cannot be read,
    /// `ProfileError::Parse` if it is not JSON and
    /// `ProfileError::NotAnObject` if the top level is not an object.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("Profile does not exist");
                return Ok(Self::empty());
            }
            Err(source) => {
                return Err(ProfileError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut doc = Self::parse(&text, path)?;
        doc.path = Some(path.to_path_buf());
        debug!(sections = doc.root.len(), "Loaded profile");
        Ok(doc)
    }

    /// Parses `text`; `origin` is only used in error values.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Parse` or `ProfileError::NotAnObject`.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ProfileError> {
        let value: Value = serde_json::from_str(text).map_err(|source| ProfileError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        match value {
            Value::Object(root) => Ok(Self { path: None, root }),
            _ => Err(ProfileError::NotAnObject {
                path: origin.to_path_buf(),
            }),
        }
    }

    /// Where this document was loaded from, if it came from a file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns a copy of section `name`. A missing section is empty.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::SectionNotAnObject` if the section exists but
    /// is not a JSON object.
    pub fn section(&self, name: &'static str) -> Result<Map<String, Value>, ProfileError> {
        match self.root.get(name) {
            None => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(ProfileError::SectionNotAnObject {
                path: self.path.clone().unwrap_or_default(),
                section: name,
            }),
        }
    }
}
