//! Facts about the host the sandbox is built on.

mod host;

pub use host::HostEnvironment;
