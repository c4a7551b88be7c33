//! Confinement directives: terminal session, seccomp, status descriptors and
//! SELinux labels.

use std::fs::File;
use std::io::ErrorKind;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;

use tracing::{debug, instrument, warn};

use crate::error::DirectiveError;

/// Confinement directives.
#[derive(Debug, Default)]
pub struct Confinement {
    new_session: bool,
    seccomp_fd: Option<RawFd>,
    owned_seccomp: Option<OwnedFd>,
    info_fd: Option<RawFd>,
    block_fds: Vec<RawFd>,
    exec_label: Option<String>,
    file_label: Option<String>,
}

impl Confinement {
    /// Creates an empty confinement section.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the child in a new terminal session (`setsid`), so it cannot
    /// inject input into the controlling terminal.
    pub fn use_new_terminal_session(&mut self) {
        self.new_session = true;
    }

    /// Loads a compiled seccomp BPF program from a caller-owned descriptor.
    ///
    /// # Errors
    ///
    /// Returns `DirectiveError::DescriptorTooSmall` for descriptors 0 to 2.
    pub fn set_seccomp_rules_by_fd(&mut self, fd: RawFd) -> Result<(), DirectiveError> {
        if fd <= 2 {
            let err = DirectiveError::DescriptorTooSmall { fd };
            warn!(error = %err, "Rejecting seccomp descriptor");
            return Err(err);
        }
        self.owned_seccomp = None;
        self.seccomp_fd = Some(fd);
        Ok(())
    }

    /// Opens the compiled seccomp BPF program at `path` and passes it to bwrap.
    ///
    /// The descriptor is owned by this section. Returns its number.
    ///
    /// # Errors
    ///
    /// Returns `DirectiveError::FileNotFound` or
    /// `DirectiveError::FileUnreadable` if `path` cannot be opened.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn set_seccomp_rules_from_file(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<RawFd, DirectiveError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            let err = if e.kind() == ErrorKind::NotFound {
                DirectiveError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                DirectiveError::FileUnreadable {
                    path: path.to_path_buf(),
                    source: e,
                }
            };
            warn!(error = %err, "Seccomp program unavailable");
            err
        })?;

        let fd = OwnedFd::from(file);
        let raw = fd.as_raw_fd();
        self.owned_seccomp = Some(fd);
        self.seccomp_fd = Some(raw);
        debug!(fd = raw, "Opened seccomp program");
        Ok(raw)
    }

    /// Has bwrap write sandbox information (child pid and namespace ids) as
    /// JSON to `fd`.
    pub fn add_info_fd(&mut self, fd: RawFd) {
        self.info_fd = Some(fd);
    }

    /// Blocks the sandboxed program from starting until data is readable on
    /// `fd`.
    pub fn add_block_fd(&mut self, fd: RawFd) {
        self.block_fds.push(fd);
    }

    /// Sets the SELinux label of the sandboxed process.
    pub fn set_exec_label(&mut self, label: impl Into<String>) {
        self.exec_label = Some(label.into());
    }

    /// Sets the SELinux label for files created in the sandbox.
    pub fn set_file_label(&mut self, label: impl Into<String>) {
        self.file_label = Some(label.into());
    }

    /// Every descriptor this section places on the command line.
    #[must_use]
    pub fn descriptors(&self) -> Vec<RawFd> {
        self.seccomp_fd
            .into_iter()
            .chain(self.info_fd)
            .chain(self.block_fds.iter().copied())
            .collect()
    }

    /// Closes the seccomp descriptor if this section opened it.
    pub fn release(&mut self) {
        if self.owned_seccomp.take().is_some() {
            debug!("Closed seccomp program descriptor");
        }
    }

    /// Appends labels, `--seccomp`, `--info-fd` and `--block-fd`.
    pub(crate) fn push_descriptor_args(&self, args: &mut Vec<String>) {
        if let Some(label) = &self.exec_label {
            args.extend(["--exec-label".to_string(), label.clone()]);
        }
        if let Some(label) = &self.file_label {
            args.extend(["--file-label".to_string(), label.clone()]);
        }
        if let Some(fd) = self.seccomp_fd {
            args.extend(["--seccomp".to_string(), fd.to_string()]);
        }
        if let Some(fd) = self.info_fd {
            args.extend(["--info-fd".to_string(), fd.to_string()]);
        }
        for fd in &self.block_fds {
            args.extend(["--block-fd".to_string(), fd.to_string()]);
        }
    }

    /// Appends `--new-session`. It comes after the lock file.
    pub(crate) fn push_session_args(&self, args: &mut Vec<String>) {
        if self.new_session {
            args.push("--new-session".to_string());
        }
    }

    /// Generates this section's arguments on their own.
    #[must_use]
    pub fn gen_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        self.push_descriptor_args(&mut args);
        self.push_session_args(&mut args);
        args
    }
}
