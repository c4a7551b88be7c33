//! sbox - application sandboxing with bubblewrap and JSON profiles.
//!
//! This crate builds command lines for [bwrap](https://github.com/containers/bubblewrap)
//! and runs them. It performs no isolation itself: namespaces, mounts and
//! seccomp filters are all set up by bwrap.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use sbox::profile::{apply_profile, resolve};
//! use sbox::sandbox::BubbleWrapper;
//! use sbox::system::HostEnvironment;
//!
//! let (options, _warnings) = resolve(Path::new("profiles/system.json"), None).into_options();
//!
//! let mut wrapper = BubbleWrapper::new();
//! apply_profile(&options, &HostEnvironment::detect(), &mut wrapper);
//!
//! let status = wrapper.exec("sh", &[]);
//! std::process::exit(status);
//! ```

pub mod error;
pub mod profile;
pub mod sandbox;
pub mod system;

// Re-export commonly used types
pub use error::{BuildWarning, DirectiveError, Error, LaunchError, ProfileError, Result};
pub use profile::{ProfileOptions, Resolution, resolve};
pub use sandbox::{BubbleWrapper, Namespace};
