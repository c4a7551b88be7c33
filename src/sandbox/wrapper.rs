//! The top-level bwrap invocation.
//!
//! [`BubbleWrapper`] owns the three directive sections plus the handful of
//! directives that belong to bwrap itself (chdir, lock file, sync fds,
//! die-with-parent). It serializes all of them into one command line and runs
//! it.
//!
//! # Example
//!
//! ```no_run
//! use sbox::sandbox::{BubbleWrapper, Namespace};
//!
//! let mut wrapper = BubbleWrapper::new();
//! wrapper.filesystem.add_bind_mount_ro("/usr", "/usr");
//! wrapper.filesystem.create_symlink("usr/bin", "/bin");
//! wrapper.environment.add_unshare(Namespace::All);
//!
//! let status = wrapper.exec("sh", &["-c".to_string(), "echo hello".to_string()]);
//! assert_eq!(status, 0);
//! ```

use std::os::fd::RawFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Stdio};

use tracing::{debug, error, info, instrument, warn};

use super::confinement::Confinement;
use super::environment::Environment;
use super::fds;
use super::filesystem::FileSystem;
use crate::error::{BuildWarning, LaunchError};

/// Binary used when none is configured; looked up through `PATH`.
pub const DEFAULT_BWRAP: &str = "bwrap";

/// Status returned by [`BubbleWrapper::exec`] when bwrap could not be run.
pub const LAUNCH_FAILURE_STATUS: i32 = -1;

/// A complete bwrap invocation.
#[derive(Debug)]
pub struct BubbleWrapper {
    binary: String,

    /// Mounts and file creation.
    pub filesystem: FileSystem,

    /// Namespaces and environment variables.
    pub environment: Environment,

    /// Seccomp, session and labels.
    pub confinement: Confinement,

    chdir: Option<String>,
    lock_file: Option<String>,
    sync_fds: Vec<RawFd>,
    die_with_parent: bool,
}

impl Default for BubbleWrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl BubbleWrapper {
    /// Creates an empty invocation of [`DEFAULT_BWRAP`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_BWRAP.to_string(),
            filesystem: FileSystem::new(),
            environment: Environment::new(),
            confinement: Confinement::new(),
            chdir: None,
            lock_file: None,
            sync_fds: Vec::new(),
            die_with_parent: false,
        }
    }

    /// Uses `binary` instead of `bwrap` from `PATH`.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Uses `filesystem` as the filesystem section.
    #[must_use]
    pub fn with_filesystem(mut self, filesystem: FileSystem) -> Self {
        self.filesystem = filesystem;
        self
    }

    /// The binary that will be executed.
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Changes to `dir` inside the sandbox before running the command.
    pub fn set_chdir(&mut self, dir: impl Into<String>) {
        self.chdir = Some(dir.into());
    }

    /// Keeps `fd` open in bwrap for as long as the sandbox runs, so another
    /// process can watch it close.
    pub fn add_sync_fd(&mut self, fd: RawFd) {
        self.sync_fds.push(fd);
    }

    /// Has bwrap hold a lock on `path` while the sandbox runs.
    pub fn use_lock_file(&mut self, path: impl Into<String>) {
        self.lock_file = Some(path.into());
    }

    /// Kills the sandbox when this process dies.
    pub fn set_die_with_parent(&mut self) {
        self.die_with_parent = true;
    }

    /// Generates the bwrap command line, binary first, without the command.
    #[must_use]
    pub fn gen_args(&self) -> Vec<String> {
        let mut args = vec![self.binary.clone()];

        args.extend(self.filesystem.gen_args());
        self.environment.push_namespace_args(&mut args);
        if let Some(dir) = &self.chdir {
            args.extend(["--chdir".to_string(), dir.clone()]);
        }
        self.environment.push_hostname_args(&mut args);
        self.confinement.push_descriptor_args(&mut args);
        for fd in &self.sync_fds {
            args.extend(["--sync-fd".to_string(), fd.to_string()]);
        }
        if let Some(path) = &self.lock_file {
            args.extend(["--lock-file".to_string(), path.clone()]);
        }
        self.confinement.push_session_args(&mut args);
        if self.die_with_parent {
            args.push("--die-with-parent".to_string());
        }

        args
    }

    /// The full command line that runs `comm` with `args` in the sandbox.
    #[must_use]
    pub fn command_line(&self, comm: &str, args: &[String]) -> Vec<String> {
        let mut line = self.gen_args();
        line.push(comm.to_string());
        line.extend(args.iter().cloned());
        line
    }

    /// Warnings raised while directives were added.
    #[must_use]
    pub fn warnings(&self) -> &[BuildWarning] {
        self.filesystem.warnings()
    }

    /// Every descriptor on the command line that the child must inherit.
    #[must_use]
    pub fn inheritable_fds(&self) -> Vec<RawFd> {
        let mut fds = self.filesystem.descriptors();
        fds.extend(self.confinement.descriptors());
        fds.extend(self.sync_fds.iter().copied());
        fds
    }

    /// Runs `comm` in the sandbox and waits for it.
    ///
    /// Standard streams are inherited. Returns the child's exit code, or
    /// `128 + signal` if it was killed by a signal.
    ///
    /// # Errors
    ///
    /// Returns a `LaunchError` if a descriptor cannot be handed to the child
    /// or bwrap cannot be started or waited on.
    #[instrument(skip(self, args), fields(binary = %self.binary, command = %comm))]
    pub fn spawn(&self, comm: &str, args: &[String]) -> Result<i32, LaunchError> {
        for fd in self.inheritable_fds() {
            fds::mark_inheritable(fd)?;
        }

        let line = self.command_line(comm, args);
        debug!(args = ?&line[1..], "Spawning sandbox");

        let mut child = Command::new(&self.binary)
            .args(&line[1..])
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        let status = child.wait().map_err(|source| LaunchError::Wait { source })?;
        Ok(status_code(status))
    }

    /// Runs `comm` in the sandbox, then releases every descriptor and
    /// temporary file.
    ///
    /// A non-zero status is logged and passed through. If bwrap cannot be
    /// started the error is logged and [`LAUNCH_FAILURE_STATUS`] is returned.
    pub fn exec(mut self, comm: &str, args: &[String]) -> i32 {
        let status = match self.spawn(comm, args) {
            Ok(0) => {
                debug!("Sandbox exited successfully");
                0
            }
            Ok(code) => {
                warn!(code, "Process terminated with an error");
                code
            }
            Err(e) => {
                error!(error = %e, "Could not run sandbox");
                LAUNCH_FAILURE_STATUS
            }
        };

        self.cleanup();
        status
    }

    /// Closes owned descriptors and removes temporary files.
    ///
    /// Dropping the wrapper does the same; calling this first reports
    /// removal failures.
    pub fn cleanup(&mut self) -> Vec<BuildWarning> {
        self.confinement.release();
        let warnings = self.filesystem.release();
        if !warnings.is_empty() {
            info!(count = warnings.len(), "Cleanup finished with warnings");
        }
        warnings
    }
}

fn status_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => LAUNCH_FAILURE_STATUS,
    }
}

/// Renders a command line as a string that a POSIX shell reads back as the
/// same tokens.
#[must_use]
pub fn render_command_line(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|token| quote(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(token: &str) -> String {
    let plain = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));
    if plain {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Namespace;

    #[test]
    fn test_binary_is_first_token() {
        assert_eq!(BubbleWrapper::new().gen_args(), vec!["bwrap"]);

        let custom = BubbleWrapper::new().with_binary("/opt/bwrap");
        assert_eq!(custom.binary(), "/opt/bwrap");
        assert_eq!(custom.gen_args(), vec!["/opt/bwrap"]);
    }

    #[test]
    fn test_full_ordering() {
        let mut wrapper = BubbleWrapper::new();
        wrapper.set_die_with_parent();
        wrapper.confinement.use_new_terminal_session();
        wrapper.use_lock_file("/tmp/lock");
        wrapper.add_sync_fd(9);
        wrapper.confinement.set_seccomp_rules_by_fd(10).unwrap();
        wrapper.confinement.set_exec_label("exec_t");
        wrapper.environment.add_unshare(Namespace::All);
        wrapper.environment.set_hostname("box").unwrap();
        wrapper.set_chdir("/work");
        wrapper.environment.set_uid(0).unwrap();
        wrapper.environment.set_env("A", "1");
        wrapper.filesystem.create_directory("/work");
        wrapper.filesystem.add_bind_mount_rw("/src", "/work/src");

        let line = wrapper.command_line("ls", &["-l".to_string()]);
        assert_eq!(
            line,
            vec![
                "bwrap",
                "--bind",
                "/src",
                "/work/src",
                "--dir",
                "/work",
                "--unshare-all",
                "--setenv",
                "A",
                "1",
                "--uid",
                "0",
                "--chdir",
                "/work",
                "--hostname",
                "box",
                "--exec-label",
                "exec_t",
                "--seccomp",
                "10",
                "--sync-fd",
                "9",
                "--lock-file",
                "/tmp/lock",
                "--new-session",
                "--die-with-parent",
                "ls",
                "-l",
            ]
        );
    }

    #[test]
    fn test_generation_is_reproducible() {
        let mut wrapper = BubbleWrapper::new();
        wrapper.filesystem.add_tmpfs("/tmp");
        wrapper.environment.add_unshare(Namespace::Pid);

        assert_eq!(wrapper.gen_args(), wrapper.gen_args());
    }

    #[test]
    fn test_inheritable_fds_collects_all_sections() {
        let mut wrapper = BubbleWrapper::new();
        wrapper.filesystem.create_file_from_fd(5, "/etc/x");
        wrapper.confinement.add_block_fd(6);
        wrapper.add_sync_fd(7);

        assert_eq!(wrapper.inheritable_fds(), vec![5, 6, 7]);
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(status_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(status_code(ExitStatus::from_raw(3 << 8)), 3);
        // Raw wait status 9 is "killed by SIGKILL".
        assert_eq!(status_code(ExitStatus::from_raw(9)), 137);
    }

    #[test]
    fn test_render_command_line_quotes_when_needed() {
        let tokens: Vec<String> = ["bwrap", "--setenv", "MSG", "hello world", "it's", ""]
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(
            render_command_line(&tokens),
            r"bwrap --setenv MSG 'hello world' 'it'\''s' ''"
        );
    }
}
