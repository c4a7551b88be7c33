//! Typed bwrap directives and the process that runs them.
//!
//! A [`BubbleWrapper`] holds three sections:
//! - [`FileSystem`]: bind mounts, special filesystems and created files
//! - [`Environment`]: namespaces, environment variables, uid/gid, hostname
//! - [`Confinement`]: seccomp, status descriptors, session and SELinux labels
//!
//! Directives that would be ignored or rejected by bwrap are refused here
//! with a `DirectiveError`, and nothing is added for them.

mod confinement;
mod environment;
pub mod fds;
mod filesystem;
mod wrapper;

pub use confinement::Confinement;
pub use environment::{Environment, Namespace};
pub use filesystem::{FileSystem, FsEntry};
pub use wrapper::{BubbleWrapper, DEFAULT_BWRAP, LAUNCH_FAILURE_STATUS, render_command_line};
