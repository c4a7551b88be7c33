//! Filesystem directives for bwrap.
//!
//! Every mount and creation option is one variant of [`FsEntry`]. Entries are
//! kept in insertion order and emitted grouped by kind:
//!
//! 1. `--bind`, `--ro-bind`, `--dev-bind`
//! 2. `--remount-ro`
//! 3. `--proc`, `--dev`
//! 4. `--tmpfs`, `--mqueue`
//! 5. `--dir`, `--symlink`, `--file`
//!
//! Within a kind the insertion order is preserved, so the same calls always
//! produce the same command line.
//!
//! # Descriptors and temporary files
//!
//! `--file FD DEST` reads the file contents from a descriptor. Descriptors the
//! [`FileSystem`] opens itself (from a path, or from literal contents written
//! to a temporary file) are owned here and closed on [`FileSystem::release`]
//! or drop. Temporary files are removed at the same time.

use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, instrument, trace, warn};

use crate::error::{BuildWarning, DirectiveError};

/// One filesystem directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEntry {
    /// `--bind SRC DEST`: read-write bind mount.
    Bind { src: String, dest: String },
    /// `--ro-bind SRC DEST`: read-only bind mount.
    RoBind { src: String, dest: String },
    /// `--dev-bind SRC DEST`: bind mount that allows device access.
    DevBind { src: String, dest: String },
    /// `--remount-ro DEST`: remount an existing mount point read-only.
    RemountRo { dest: String },
    /// `--proc DEST`: fresh procfs.
    Proc { dest: String },
    /// `--dev DEST`: fresh devtmpfs.
    Dev { dest: String },
    /// `--tmpfs DEST`: fresh tmpfs.
    Tmpfs { dest: String },
    /// `--mqueue DEST`: POSIX message queue filesystem.
    Mqueue { dest: String },
    /// `--dir DEST`: empty directory.
    Dir { dest: String },
    /// `--symlink SRC DEST`: symbolic link at DEST pointing to SRC.
    Symlink { src: String, dest: String },
    /// `--file FD DEST`: file whose contents are read from FD.
    File { fd: RawFd, dest: String },
}

impl FsEntry {
    /// Position of this entry's kind in the generated command line.
    fn rank(&self) -> u8 {
        match self {
            Self::Bind { .. } => 0,
            Self::RoBind { .. } => 1,
            Self::DevBind { .. } => 2,
            Self::RemountRo { .. } => 3,
            Self::Proc { .. } => 4,
            Self::Dev { .. } => 5,
            Self::Tmpfs { .. } => 6,
            Self::Mqueue { .. } => 7,
            Self::Dir { .. } => 8,
            Self::Symlink { .. } => 9,
            Self::File { .. } => 10,
        }
    }

    /// The path inside the sandbox this entry creates or mounts.
    #[must_use]
    pub fn dest(&self) -> &str {
        match self {
            Self::Bind { dest, .. }
            | Self::RoBind { dest, .. }
            | Self::DevBind { dest, .. }
            | Self::RemountRo { dest }
            | Self::Proc { dest }
            | Self::Dev { dest }
            | Self::Tmpfs { dest }
            | Self::Mqueue { dest }
            | Self::Dir { dest }
            | Self::Symlink { dest, .. }
            | Self::File { dest, .. } => dest,
        }
    }

    /// Appends this entry's flag and arguments.
    pub fn push_args(&self, args: &mut Vec<String>) {
        match self {
            Self::Bind { src, dest } => push_pair(args, "--bind", src, dest),
            Self::RoBind { src, dest } => push_pair(args, "--ro-bind", src, dest),
            Self::DevBind { src, dest } => push_pair(args, "--dev-bind", src, dest),
            Self::RemountRo { dest } => push_single(args, "--remount-ro", dest),
            Self::Proc { dest } => push_single(args, "--proc", dest),
            Self::Dev { dest } => push_single(args, "--dev", dest),
            Self::Tmpfs { dest } => push_single(args, "--tmpfs", dest),
            Self::Mqueue { dest } => push_single(args, "--mqueue", dest),
            Self::Dir { dest } => push_single(args, "--dir", dest),
            Self::Symlink { src, dest } => push_pair(args, "--symlink", src, dest),
            Self::File { fd, dest } => push_pair(args, "--file", &fd.to_string(), dest),
        }
    }
}

fn push_single(args: &mut Vec<String>, flag: &str, dest: &str) {
    args.push(flag.to_string());
    args.push(dest.to_string());
}

fn push_pair(args: &mut Vec<String>, flag: &str, first: &str, second: &str) {
    args.push(flag.to_string());
    args.push(first.to_string());
    args.push(second.to_string());
}

/// The filesystem section of a bwrap invocation.
#[derive(Debug, Default)]
pub struct FileSystem {
    entries: Vec<FsEntry>,
    /// Number of live entries per destination.
    used_dests: HashMap<String, usize>,
    warnings: Vec<BuildWarning>,
    owned_fds: Vec<OwnedFd>,
    temp_files: Vec<TempPath>,
    temp_dir: Option<PathBuf>,
}

impl FileSystem {
    /// Creates an empty filesystem section.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates literal-content temp files in `dir` instead of the system
    /// temporary directory.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Adds a read-write bind mount.
    pub fn add_bind_mount_rw(&mut self, src: impl Into<String>, dest: impl Into<String>) {
        let (src, dest) = (src.into(), dest.into());
        self.push(FsEntry::Bind { src, dest });
    }

    /// Adds a read-only bind mount.
    pub fn add_bind_mount_ro(&mut self, src: impl Into<String>, dest: impl Into<String>) {
        let (src, dest) = (src.into(), dest.into());
        self.push(FsEntry::RoBind { src, dest });
    }

    /// Adds a bind mount that allows device access.
    pub fn add_bind_mount_dev(&mut self, src: impl Into<String>, dest: impl Into<String>) {
        let (src, dest) = (src.into(), dest.into());
        self.push(FsEntry::DevBind { src, dest });
    }

    /// Remounts an existing mount point read-only.
    ///
    /// This refers to a destination set up by another entry, so it is not
    /// counted as a duplicate.
    pub fn add_remount_readonly(&mut self, dest: impl Into<String>) {
        let dest = dest.into();
        trace!(%dest, "Adding remount-ro");
        self.entries.push(FsEntry::RemountRo { dest });
    }

    /// Mounts procfs at `dest`. A later call replaces an earlier one.
    pub fn add_proc(&mut self, dest: impl Into<String>) {
        self.replace_single(FsEntry::Proc { dest: dest.into() });
    }

    /// Mounts devtmpfs at `dest`. A later call replaces an earlier one.
    pub fn add_devtmpfs(&mut self, dest: impl Into<String>) {
        self.replace_single(FsEntry::Dev { dest: dest.into() });
    }

    /// Mounts a tmpfs at `dest`.
    pub fn add_tmpfs(&mut self, dest: impl Into<String>) {
        self.push(FsEntry::Tmpfs { dest: dest.into() });
    }

    /// Mounts an mqueue filesystem at `dest`.
    pub fn add_mqueue(&mut self, dest: impl Into<String>) {
        self.push(FsEntry::Mqueue { dest: dest.into() });
    }

    /// Creates an empty directory.
    pub fn create_directory(&mut self, dest: impl Into<String>) {
        self.push(FsEntry::Dir { dest: dest.into() });
    }

    /// Creates a symlink at `dest` pointing to `src`.
    pub fn create_symlink(&mut self, src: impl Into<String>, dest: impl Into<String>) {
        let (src, dest) = (src.into(), dest.into());
        self.push(FsEntry::Symlink { src, dest });
    }

    /// Creates a file whose contents bwrap reads from a caller-owned
    /// descriptor. The descriptor is passed through but never closed here.
    pub fn create_file_from_fd(&mut self, fd: RawFd, dest: impl Into<String>) {
        self.push(FsEntry::File {
            fd,
            dest: dest.into(),
        });
    }

    /// Creates a file with the contents of the host file at `src`.
    ///
    /// Returns the descriptor number placed on the command line. The
    /// descriptor is owned by this section.
    ///
    /// # Errors
    ///
    /// Returns `DirectiveError::FileNotFound` if `src` does not exist and
    /// `DirectiveError::FileUnreadable` if it cannot be opened for reading.
    /// Nothing is added in either case.
    #[instrument(skip(self, src, dest), fields(src = %src.as_ref().display()))]
    pub fn create_file_from_file(
        &mut self,
        src: impl AsRef<Path>,
        dest: impl Into<String>,
    ) -> Result<RawFd, DirectiveError> {
        let src = src.as_ref();
        let file = File::open(src).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DirectiveError::FileNotFound {
                path: src.to_path_buf(),
            },
            _ => DirectiveError::FileUnreadable {
                path: src.to_path_buf(),
                source: e,
            },
        })?;

        let fd = self.adopt(OwnedFd::from(file));
        self.create_file_from_fd(fd, dest);
        Ok(fd)
    }

    /// Creates a file containing `contents`.
    ///
    /// The contents are written to a temporary file, which is removed when
    /// this section is released. Returns the descriptor number placed on the
    /// command line.
    ///
    /// # Errors
    ///
    /// Returns `DirectiveError::TempFile` if the temporary file cannot be
    /// created, written or reopened.
    #[instrument(skip(self, contents, dest), fields(len = contents.len()))]
    pub fn create_file_from_contents(
        &mut self,
        contents: &str,
        dest: impl Into<String>,
    ) -> Result<RawFd, DirectiveError> {
        let dest = dest.into();
        let temp_error = |source| DirectiveError::TempFile {
            dest: dest.clone(),
            source,
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix(".sbox-");
        let mut temp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(temp_error)?;

        temp.write_all(contents.as_bytes()).map_err(temp_error)?;
        temp.flush().map_err(temp_error)?;

        // Hand bwrap a fresh read-only descriptor positioned at the start.
        let reader = File::open(temp.path()).map_err(temp_error)?;
        let path = temp.into_temp_path();
        debug!(path = %path.display(), "Wrote literal contents to temporary file");

        let fd = self.adopt(OwnedFd::from(reader));
        self.temp_files.push(path);
        self.create_file_from_fd(fd, dest);
        Ok(fd)
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[FsEntry] {
        &self.entries
    }

    /// Warnings collected so far.
    #[must_use]
    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }

    /// Paths of temporary files that are still alive.
    #[must_use]
    pub fn temp_files(&self) -> Vec<&Path> {
        self.temp_files.iter().map(|p| &**p).collect()
    }

    /// Every descriptor referenced by a `--file` entry.
    #[must_use]
    pub fn descriptors(&self) -> Vec<RawFd> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                FsEntry::File { fd, .. } => Some(*fd),
                _ => None,
            })
            .collect()
    }

    /// Generates the filesystem part of the command line.
    #[must_use]
    pub fn gen_args(&self) -> Vec<String> {
        let mut ordered: Vec<&FsEntry> = self.entries.iter().collect();
        ordered.sort_by_key(|entry| entry.rank());

        let mut args = Vec::new();
        for entry in ordered {
            entry.push_args(&mut args);
        }
        args
    }

    /// Closes owned descriptors and removes temporary files.
    ///
    /// Entries stay in place, so generating arguments afterwards would refer
    /// to closed descriptors. Returns a warning for each temp file that could
    /// not be removed.
    pub fn release(&mut self) -> Vec<BuildWarning> {
        let closed = self.owned_fds.len();
        self.owned_fds.clear();

        let mut warnings = Vec::new();
        for temp in self.temp_files.drain(..) {
            let path = temp.to_path_buf();
            if let Err(source) = temp.close() {
                warn!(path = %path.display(), error = %source, "Failed to remove temporary file");
                warnings.push(BuildWarning::TempFileRemoval { path, source });
            }
        }

        debug!(closed, "Released filesystem resources");
        warnings
    }

    fn adopt(&mut self, fd: OwnedFd) -> RawFd {
        let raw = fd.as_raw_fd();
        self.owned_fds.push(fd);
        raw
    }

    fn push(&mut self, entry: FsEntry) {
        self.note_dest(entry.dest());
        trace!(?entry, "Adding filesystem entry");
        self.entries.push(entry);
    }

    fn replace_single(&mut self, entry: FsEntry) {
        let rank = entry.rank();
        if let Some(pos) = self.entries.iter().position(|e| e.rank() == rank) {
            let old = self.entries.remove(pos);
            self.forget_dest(old.dest());
            debug!(?old, ?entry, "Replacing filesystem entry");
        }
        self.push(entry);
    }

    fn forget_dest(&mut self, dest: &str) {
        if let Some(count) = self.used_dests.get_mut(dest) {
            *count -= 1;
            if *count == 0 {
                self.used_dests.remove(dest);
            }
        }
    }

    fn note_dest(&mut self, dest: &str) {
        let count = self.used_dests.entry(dest.to_string()).or_insert(0);
        *count += 1;
        if *count > 1 {
            warn!(dest, "Destination supplied multiple times");
            self.warnings.push(BuildWarning::DuplicateDestination {
                dest: dest.to_string(),
            });
        }
    }
}
