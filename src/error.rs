//! Error types for sbox.
//!
//! Uses thiserror for deriving std::error::Error and miette for rich diagnostics.
//!
//! Only [`LaunchError`] ever stops an invocation. Profile problems and
//! rejected directives are collected as values and reported, and the rest of
//! the sandbox is still built.

use std::os::fd::RawFd;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the application.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A profile document could not be used
    #[error("Profile error")]
    #[diagnostic(code(sbox::profile))]
    Profile(#[from] ProfileError),

    /// A sandbox directive was rejected
    #[error("Sandbox directive rejected")]
    #[diagnostic(code(sbox::directive))]
    Directive(#[from] DirectiveError),

    /// The sandbox binary could not be run
    #[error("Failed to launch sandbox")]
    #[diagnostic(code(sbox::launch))]
    Launch(#[from] LaunchError),

    /// I/O error
    #[error("I/O error: {0}")]
    #[diagnostic(code(sbox::io))]
    Io(#[from] std::io::Error),
}

/// Problems with profile documents and their options.
///
/// All of these are soft: the affected document, section or key is treated as
/// empty and resolution continues.
#[derive(Error, Debug, Diagnostic)]
pub enum ProfileError {
    /// The profile exists but could not be read
    #[error("Failed to read profile {}", path.display())]
    #[diagnostic(code(sbox::profile::read), severity(Warning))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The profile is not valid JSON
    #[error("Profile {} is not valid JSON", path.display())]
    #[diagnostic(
        code(sbox::profile::parse),
        severity(Warning),
        help("The profile is ignored; default settings are used instead")
    )]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The profile parsed, but its top level is not a JSON object
    #[error("Profile {} must contain a JSON object at the top level", path.display())]
    #[diagnostic(code(sbox::profile::not_an_object), severity(Warning))]
    NotAnObject { path: PathBuf },

    /// The `system` or `application` section is not a JSON object
    #[error("Section \"{section}\" of profile {} must be a JSON object", path.display())]
    #[diagnostic(code(sbox::profile::section), severity(Warning))]
    SectionNotAnObject { path: PathBuf, section: &'static str },

    /// A known option has a value of the wrong type
    #[error("Option \"{key}\" expects {expected}, found {found}")]
    #[diagnostic(
        code(sbox::profile::invalid_option),
        severity(Warning),
        help("The option falls back to its default")
    )]
    InvalidOption {
        key: String,
        expected: &'static str,
        found: String,
    },
}

/// A sandbox directive that was rejected before it reached the command line.
#[derive(Error, Debug, Diagnostic)]
pub enum DirectiveError {
    /// Not a namespace bwrap can unshare
    #[error("Unrecognised namespace '{name}' (--unshare-{name})")]
    #[diagnostic(
        code(sbox::directive::unknown_namespace),
        help("Known namespaces: all, user, user-try, ipc, pid, net, uts, cgroup, cgroup-try")
    )]
    UnknownNamespace { name: String },

    /// The directive needs a namespace that has not been unshared
    #[error("{directive} requires unsharing the {required} namespace")]
    #[diagnostic(code(sbox::directive::namespace_required))]
    NamespaceRequired {
        directive: &'static str,
        required: &'static str,
    },

    /// Source for a file injection does not exist
    #[error("File at path {} could not be found", path.display())]
    #[diagnostic(code(sbox::directive::file_not_found))]
    FileNotFound { path: PathBuf },

    /// Source for a file injection exists but cannot be opened for reading
    #[error("File at path {} could not be read", path.display())]
    #[diagnostic(code(sbox::directive::file_unreadable))]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Temporary file for literal contents could not be created or written
    #[error("Failed to create temporary file for {dest}")]
    #[diagnostic(code(sbox::directive::temp_file))]
    TempFile {
        dest: String,
        #[source]
        source: std::io::Error,
    },

    /// Descriptor numbers 0-2 are the standard streams
    #[error("File descriptor number '{fd}' probably too small")]
    #[diagnostic(
        code(sbox::directive::descriptor_too_small),
        help("Descriptors 0, 1 and 2 are stdin, stdout and stderr")
    )]
    DescriptorTooSmall { fd: RawFd },
}

/// Failures to run the sandbox binary at all.
#[derive(Error, Debug, Diagnostic)]
pub enum LaunchError {
    /// The binary is missing or not executable
    #[error("Could not successfully execute {program}")]
    #[diagnostic(
        code(sbox::launch::spawn),
        help("Is bubblewrap installed and on PATH? Use --bwrap to point at it")
    )]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child started but waiting on it failed
    #[error("Failed to wait for sandbox process")]
    #[diagnostic(code(sbox::launch::wait))]
    Wait {
        #[source]
        source: std::io::Error,
    },

    /// A descriptor could not be made inheritable by the child
    #[error("Failed to pass file descriptor {fd} to the sandbox")]
    #[diagnostic(code(sbox::launch::inherit))]
    Inherit {
        fd: RawFd,
        #[source]
        source: nix::errno::Errno,
    },
}

/// Conditions reported while building or cleaning up a sandbox that never
/// stop the invocation.
#[derive(Error, Debug, Diagnostic)]
pub enum BuildWarning {
    /// Two directives target the same path inside the sandbox
    #[error("Destination '{dest}' supplied multiple times")]
    #[diagnostic(
        code(sbox::warning::duplicate_destination),
        severity(Warning),
        help("bwrap applies directives in order; the later one wins")
    )]
    DuplicateDestination { dest: String },

    /// A temporary file could not be deleted during cleanup
    #[error("Failed to remove temporary file {}", path.display())]
    #[diagnostic(code(sbox::warning::temp_file_removal), severity(Warning))]
    TempFileRemoval {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
