//! Turning profile options into sandbox directives.

use std::path::Path;

use tracing::{debug, instrument, warn};

use super::options::{HomeMount, ProfileOptions};
use crate::error::DirectiveError;
use crate::sandbox::{BubbleWrapper, Namespace};
use crate::system::HostEnvironment;

/// Directories under `/` that are symlinks into `/usr` on merged-usr systems.
const USR_SYMLINKS: [(&str, &str); 4] = [
    ("usr/bin", "/bin"),
    ("usr/sbin", "/sbin"),
    ("usr/lib", "/lib"),
    ("usr/lib64", "/lib64"),
];

const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Adds the directives described by `options` to `wrapper`.
///
/// Options are applied in a fixed order. A directive that the wrapper rejects
/// is returned and the remaining options are still applied.
#[instrument(skip_all)]
pub fn apply_profile(
    options: &ProfileOptions,
    host: &HostEnvironment,
    wrapper: &mut BubbleWrapper,
) -> Vec<DirectiveError> {
    let mut rejected = Vec::new();
    let fs = &mut wrapper.filesystem;

    if options.mount_usr {
        fs.add_bind_mount_ro("/usr", "/usr");
        for (target, link) in USR_SYMLINKS {
            fs.create_symlink(target, link);
        }
    }
    if options.mount_dev {
        fs.add_devtmpfs("/dev");
    }
    if options.mount_proc {
        fs.add_proc("/proc");
    }
    if options.mount_tmp {
        fs.add_tmpfs("/tmp");
    }

    match host.home() {
        Some(home) => {
            let home = path_string(home);
            match options.mount_home {
                Some(HomeMount::Ro) => fs.add_bind_mount_ro(home.clone(), home),
                Some(HomeMount::Rw) => fs.add_bind_mount_rw(home.clone(), home),
                None => fs.create_directory(home),
            }
        }
        None => warn!("HOME is not set, skipping home directory setup"),
    }

    if options.mount_runtime_dir {
        match &host.runtime_dir {
            Some(dir) => {
                let dir = path_string(dir);
                fs.add_bind_mount_rw(dir.clone(), dir);
            }
            None => debug!("XDG_RUNTIME_DIR is not set, nothing to mount"),
        }
    } else {
        let dir = path_string(&host.fallback_runtime_dir());
        fs.create_directory(dir.clone());
        wrapper.environment.set_env("XDG_RUNTIME_DIR", dir);
    }

    let fs = &mut wrapper.filesystem;
    for dir in &options.directories {
        fs.create_directory(dir.as_str());
    }
    for (link, target) in &options.symlinks {
        fs.create_symlink(target.as_str(), link.as_str());
    }
    for (dest, src) in &options.mounts_ro {
        fs.add_bind_mount_ro(src.as_str(), dest.as_str());
    }
    for (dest, src) in &options.mounts_rw {
        fs.add_bind_mount_rw(src.as_str(), dest.as_str());
    }

    for name in &options.confine {
        if let Err(e) = wrapper.environment.add_unshare_named(name) {
            rejected.push(e);
        }
    }

    if options.network {
        if wrapper.environment.unshares().contains(&Namespace::All) {
            if let Err(e) = wrapper.environment.add_share_net() {
                rejected.push(e);
            }
        }
        wrapper.filesystem.add_bind_mount_ro(RESOLV_CONF, RESOLV_CONF);
    }

    debug!(rejected = rejected.len(), "Applied profile");
    rejected
}

/// The command to run: the profile's `binary` if set, otherwise `requested`.
#[must_use]
pub fn select_command<'a>(options: &'a ProfileOptions, requested: &'a str) -> &'a str {
    options.binary.as_deref().unwrap_or(requested)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
