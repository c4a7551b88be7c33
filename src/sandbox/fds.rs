//! File descriptor handoff to the bwrap child.
//!
//! Descriptors opened by the standard library carry `FD_CLOEXEC`, so they
//! would be closed when bwrap is exec'd. Every descriptor named on the command
//! line has the flag cleared right before spawn.

#![allow(unsafe_code)]

use std::os::fd::{BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use tracing::trace;

use crate::error::LaunchError;

/// Clears `FD_CLOEXEC` on `fd` so the next spawned child inherits it.
///
/// # Errors
///
/// Returns `LaunchError::Inherit` if `fd` is negative or not an open
/// descriptor.
pub fn mark_inheritable(fd: RawFd) -> Result<(), LaunchError> {
    // borrow_raw requires a non-negative number.
    if fd < 0 {
        return Err(LaunchError::Inherit {
            fd,
            source: Errno::EBADF,
        });
    }

    // SAFETY: fd is non-negative and the borrow only lives for the two fcntl
    // calls below. fcntl on a closed descriptor fails with EBADF instead of
    // touching memory.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };

    let current = fcntl(borrowed, FcntlArg::F_GETFD)
        .map_err(|source| LaunchError::Inherit { fd, source })?;
    let mut flags = FdFlag::from_bits_truncate(current);
    flags.remove(FdFlag::FD_CLOEXEC);

    fcntl(borrowed, FcntlArg::F_SETFD(flags))
        .map_err(|source| LaunchError::Inherit { fd, source })?;

    trace!(fd, "Cleared FD_CLOEXEC");
    Ok(())
}

/// Returns `true` if `fd` is open and will survive an exec.
#[must_use]
pub fn is_inheritable(fd: RawFd) -> bool {
    if fd < 0 {
        return false;
    }
    // SAFETY: see `mark_inheritable`.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    fcntl(borrowed, FcntlArg::F_GETFD)
        .map(|bits| !FdFlag::from_bits_truncate(bits).contains(FdFlag::FD_CLOEXEC))
        .unwrap_or(false)
}
